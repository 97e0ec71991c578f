//! Per-request scope.
//!
//! A [`Scope`] is the immutable descriptor handed to the application for
//! each logical request: transport version, method, path, query string,
//! headers, and peer addresses. It is constructed once by the front door
//! and read-only thereafter.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::message::HeaderList;

/// Immutable per-request descriptor.
///
/// On the multiplexed path, the scope is built from the stream's opening
/// header list: `:method`, `:path`, and `:scheme` are extracted and every
/// pseudo-header (`:authority` included) is stripped from the header list
/// the application sees. On the legacy path, it is built from the parsed
/// HTTP/1.1 request.
///
/// # Example
///
/// ```rust
/// use gangway_core::Scope;
///
/// let scope = Scope::builder()
///     .http_version("1.1")
///     .method("POST")
///     .path("/items")
///     .build();
///
/// assert_eq!(scope.method(), "POST");
/// assert_eq!(scope.path(), "/items");
/// ```
#[derive(Debug, Clone)]
pub struct Scope {
    http_version: String,
    scheme: String,
    method: String,
    path: String,
    raw_path: Bytes,
    query_string: Bytes,
    headers: HeaderList,
    client: Option<SocketAddr>,
    server: Option<SocketAddr>,
}

impl Scope {
    /// Creates a new scope builder.
    #[must_use]
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::default()
    }

    /// Builds a scope from a multiplexed stream's opening header list.
    ///
    /// Extracts `:method`, `:path`, and `:scheme`; strips every
    /// pseudo-header, `:authority` included; splits the query string out of
    /// `:path`. The remaining headers are kept in arrival order.
    #[must_use]
    pub fn from_stream_headers(
        headers: &[(Bytes, Bytes)],
        client: Option<SocketAddr>,
        server: Option<SocketAddr>,
    ) -> Self {
        let mut method = Bytes::from_static(b"GET");
        let mut raw_path = Bytes::from_static(b"/");
        let mut scheme = Bytes::from_static(b"https");
        let mut clean = HeaderList::with_capacity(headers.len());

        for (name, value) in headers {
            match name.as_ref() {
                b":method" => method = value.clone(),
                b":path" => raw_path = value.clone(),
                b":scheme" => scheme = value.clone(),
                other if other.starts_with(b":") => {}
                _ => clean.push((name.clone(), value.clone())),
            }
        }

        let (path, query_string) = split_target(&raw_path);

        Self {
            http_version: "3".to_string(),
            scheme: String::from_utf8_lossy(&scheme).into_owned(),
            method: String::from_utf8_lossy(&method).into_owned(),
            path,
            raw_path,
            query_string,
            headers: clean,
            client,
            server,
        }
    }

    /// Returns the HTTP version string (`"1.1"` or `"3"`).
    #[must_use]
    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    /// Returns the URL scheme (`"https"` on both transports).
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the decoded path, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw request target as received on the wire.
    #[must_use]
    pub fn raw_path(&self) -> &Bytes {
        &self.raw_path
    }

    /// Returns the query string (empty when the target carried none).
    #[must_use]
    pub fn query_string(&self) -> &Bytes {
        &self.query_string
    }

    /// Returns the header list in insertion order.
    ///
    /// Pseudo-headers are already stripped on the multiplexed path; keys
    /// are lower-cased on the legacy path.
    #[must_use]
    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    /// Looks up the first header with the given name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Bytes> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| v)
    }

    /// Returns the client (peer) address, when known.
    #[must_use]
    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    /// Returns the server (local) address, when known.
    #[must_use]
    pub fn server(&self) -> Option<SocketAddr> {
        self.server
    }
}

/// Splits a request target into path and query string.
fn split_target(target: &Bytes) -> (String, Bytes) {
    match target.iter().position(|&b| b == b'?') {
        Some(idx) => (
            String::from_utf8_lossy(&target[..idx]).into_owned(),
            target.slice(idx + 1..),
        ),
        None => (String::from_utf8_lossy(target).into_owned(), Bytes::new()),
    }
}

/// Builder for [`Scope`].
///
/// Used by the legacy front door and by tests; the multiplexed path goes
/// through [`Scope::from_stream_headers`].
#[derive(Debug, Clone)]
pub struct ScopeBuilder {
    http_version: String,
    scheme: String,
    method: String,
    target: Bytes,
    headers: HeaderList,
    client: Option<SocketAddr>,
    server: Option<SocketAddr>,
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self {
            http_version: "1.1".to_string(),
            scheme: "https".to_string(),
            method: "GET".to_string(),
            target: Bytes::from_static(b"/"),
            headers: Vec::new(),
            client: None,
            server: None,
        }
    }
}

impl ScopeBuilder {
    /// Sets the HTTP version string.
    #[must_use]
    pub fn http_version(mut self, version: impl Into<String>) -> Self {
        self.http_version = version.into();
        self
    }

    /// Sets the URL scheme.
    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Sets the request method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the request target (`path[?query]`), as received on the wire.
    #[must_use]
    pub fn path(mut self, target: impl Into<String>) -> Self {
        self.target = Bytes::from(target.into().into_bytes());
        self
    }

    /// Sets the request target from raw bytes.
    #[must_use]
    pub fn raw_target(mut self, target: Bytes) -> Self {
        self.target = target;
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: Bytes, value: Bytes) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Replaces the whole header list.
    #[must_use]
    pub fn headers(mut self, headers: HeaderList) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the client (peer) address.
    #[must_use]
    pub fn client(mut self, addr: Option<SocketAddr>) -> Self {
        self.client = addr;
        self
    }

    /// Sets the server (local) address.
    #[must_use]
    pub fn server(mut self, addr: Option<SocketAddr>) -> Self {
        self.server = addr;
        self
    }

    /// Builds the immutable [`Scope`].
    #[must_use]
    pub fn build(self) -> Scope {
        let (path, query_string) = split_target(&self.target);
        Scope {
            http_version: self.http_version,
            scheme: self.scheme,
            method: self.method,
            path,
            raw_path: self.target,
            query_string,
            headers: self.headers,
            client: self.client,
            server: self.server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(name: &'static str, value: &'static str) -> (Bytes, Bytes) {
        (
            Bytes::from_static(name.as_bytes()),
            Bytes::from_static(value.as_bytes()),
        )
    }

    #[test]
    fn test_from_stream_headers_extracts_pseudo() {
        let headers = vec![
            h(":method", "POST"),
            h(":path", "/upload"),
            h(":scheme", "https"),
            h(":authority", "example.com"),
            h("content-type", "text/plain"),
        ];

        let scope = Scope::from_stream_headers(&headers, None, None);

        assert_eq!(scope.method(), "POST");
        assert_eq!(scope.path(), "/upload");
        assert_eq!(scope.scheme(), "https");
        assert_eq!(scope.http_version(), "3");
        assert_eq!(scope.header("content-type").unwrap().as_ref(), b"text/plain");
        assert!(scope.header(":method").is_none());
    }

    #[test]
    fn test_from_stream_headers_does_not_synthesize_host() {
        // :authority is a pseudo-header like the rest: the application only
        // sees headers the request actually carried.
        let headers = vec![
            h(":method", "GET"),
            h(":path", "/"),
            h(":scheme", "https"),
            h(":authority", "example.com"),
        ];

        let scope = Scope::from_stream_headers(&headers, None, None);

        assert!(scope.header("host").is_none());
        assert!(scope.header(":authority").is_none());
        assert!(scope.headers().is_empty());
    }

    #[test]
    fn test_from_stream_headers_strips_unknown_pseudo() {
        let headers = vec![h(":method", "GET"), h(":protocol", "webtransport")];
        let scope = Scope::from_stream_headers(&headers, None, None);
        assert!(scope.headers().is_empty());
    }

    #[test]
    fn test_from_stream_headers_defaults() {
        let scope = Scope::from_stream_headers(&[], None, None);
        assert_eq!(scope.method(), "GET");
        assert_eq!(scope.path(), "/");
        assert_eq!(scope.scheme(), "https");
    }

    #[test]
    fn test_query_string_split() {
        let headers = vec![h(":path", "/search?q=rust&page=2")];
        let scope = Scope::from_stream_headers(&headers, None, None);

        assert_eq!(scope.path(), "/search");
        assert_eq!(scope.query_string().as_ref(), b"q=rust&page=2");
        assert_eq!(scope.raw_path().as_ref(), b"/search?q=rust&page=2");
    }

    #[test]
    fn test_builder_legacy_scope() {
        let scope = Scope::builder()
            .http_version("1.1")
            .method("PUT")
            .path("/a?b=c")
            .header(Bytes::from_static(b"host"), Bytes::from_static(b"x"))
            .build();

        assert_eq!(scope.http_version(), "1.1");
        assert_eq!(scope.method(), "PUT");
        assert_eq!(scope.path(), "/a");
        assert_eq!(scope.query_string().as_ref(), b"b=c");
        assert_eq!(scope.header("HOST").unwrap().as_ref(), b"x");
    }

    #[test]
    fn test_addresses() {
        let client: SocketAddr = "10.0.0.1:50000".parse().unwrap();
        let server: SocketAddr = "10.0.0.2:443".parse().unwrap();

        let scope = Scope::builder()
            .client(Some(client))
            .server(Some(server))
            .build();

        assert_eq!(scope.client(), Some(client));
        assert_eq!(scope.server(), Some(server));
    }
}
