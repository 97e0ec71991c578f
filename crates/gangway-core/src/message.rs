//! Request and response message types.
//!
//! A logical request flows through Gangway as a sequence of
//! [`InboundMessage`] values (transport to application) and
//! [`OutboundMessage`] values (application to transport). Chunks preserve
//! arrival order, and exactly one terminal inbound message is delivered
//! per stream.

use bytes::Bytes;
use http::StatusCode;

/// A header list in insertion order.
///
/// Keys are lower-cased byte strings; values are kept verbatim.
pub type HeaderList = Vec<(Bytes, Bytes)>;

/// One inbound body message, delivered to the application in arrival order.
///
/// The `more_body` flag discriminates between a streaming chunk (`true`)
/// and the terminal message (`false`). The terminal message is always the
/// last one delivered for a stream, and exactly one is ever delivered.
///
/// # Example
///
/// ```rust
/// use gangway_core::InboundMessage;
/// use bytes::Bytes;
///
/// let chunk = InboundMessage::chunk(Bytes::from_static(b"partial"));
/// assert!(chunk.more_body());
///
/// let end = InboundMessage::end();
/// assert!(end.is_last());
/// assert!(end.body().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    body: Bytes,
    more_body: bool,
}

impl InboundMessage {
    /// Creates a streaming chunk; more data will follow.
    #[must_use]
    pub fn chunk(body: Bytes) -> Self {
        Self {
            body,
            more_body: true,
        }
    }

    /// Creates a terminal message carrying the final body bytes.
    ///
    /// The legacy HTTP/1.1 path delivers the entire buffered body this way,
    /// as a single message.
    #[must_use]
    pub fn last(body: Bytes) -> Self {
        Self {
            body,
            more_body: false,
        }
    }

    /// Creates the empty terminal message.
    ///
    /// Delivered when the peer half-closes a stream, whether or not any
    /// data preceded it.
    #[must_use]
    pub fn end() -> Self {
        Self::last(Bytes::new())
    }

    /// Returns the body bytes of this message.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the message, returning the body bytes.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Returns `true` if more body messages will follow.
    #[must_use]
    pub fn more_body(&self) -> bool {
        self.more_body
    }

    /// Returns `true` if this is the terminal message for the stream.
    #[must_use]
    pub fn is_last(&self) -> bool {
        !self.more_body
    }
}

/// One outbound message, emitted by the application.
///
/// A well-formed application emits exactly one [`OutboundMessage::Start`]
/// before any [`OutboundMessage::Body`], and exactly one body message with
/// `more_body = false` as its terminal emission.
///
/// # Example
///
/// ```rust
/// use gangway_core::OutboundMessage;
/// use http::StatusCode;
/// use bytes::Bytes;
///
/// let start = OutboundMessage::start(StatusCode::OK)
///     .with_header("content-type", "text/plain");
/// let body = OutboundMessage::body(Bytes::from_static(b"hello"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Starts the response: status code plus application headers.
    Start {
        /// Response status code.
        status: StatusCode,
        /// Application-supplied headers, in insertion order.
        headers: HeaderList,
    },

    /// A response body frame.
    Body {
        /// Body bytes for this frame.
        body: Bytes,
        /// Whether more body frames will follow.
        more_body: bool,
    },
}

impl OutboundMessage {
    /// Creates a response-start message with no headers.
    #[must_use]
    pub fn start(status: StatusCode) -> Self {
        Self::Start {
            status,
            headers: Vec::new(),
        }
    }

    /// Appends a header to a response-start message.
    ///
    /// Has no effect on body messages.
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        if let Self::Start { headers, .. } = &mut self {
            headers.push((
                Bytes::from_static(name.as_bytes()),
                Bytes::from_static(value.as_bytes()),
            ));
        }
        self
    }

    /// Creates the terminal body message.
    #[must_use]
    pub fn body(body: Bytes) -> Self {
        Self::Body {
            body,
            more_body: false,
        }
    }

    /// Creates a streaming body message; more frames will follow.
    #[must_use]
    pub fn body_chunk(body: Bytes) -> Self {
        Self::Body {
            body,
            more_body: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_has_more_body() {
        let msg = InboundMessage::chunk(Bytes::from_static(b"data"));
        assert!(msg.more_body());
        assert!(!msg.is_last());
        assert_eq!(msg.body().as_ref(), b"data");
    }

    #[test]
    fn test_end_is_empty_terminal() {
        let msg = InboundMessage::end();
        assert!(msg.is_last());
        assert!(msg.body().is_empty());
    }

    #[test]
    fn test_last_carries_body() {
        let msg = InboundMessage::last(Bytes::from_static(b"whole body"));
        assert!(msg.is_last());
        assert_eq!(msg.into_body().as_ref(), b"whole body");
    }

    #[test]
    fn test_start_with_headers() {
        let msg = OutboundMessage::start(StatusCode::CREATED)
            .with_header("content-type", "application/json")
            .with_header("x-custom", "1");

        match msg {
            OutboundMessage::Start { status, headers } => {
                assert_eq!(status, StatusCode::CREATED);
                assert_eq!(headers.len(), 2);
                assert_eq!(headers[0].0.as_ref(), b"content-type");
            }
            OutboundMessage::Body { .. } => panic!("expected Start"),
        }
    }

    #[test]
    fn test_with_header_ignored_on_body() {
        let msg = OutboundMessage::body(Bytes::new()).with_header("a", "b");
        assert!(matches!(msg, OutboundMessage::Body { .. }));
    }

    #[test]
    fn test_body_terminal_flag() {
        assert!(matches!(
            OutboundMessage::body(Bytes::new()),
            OutboundMessage::Body {
                more_body: false,
                ..
            }
        ));
        assert!(matches!(
            OutboundMessage::body_chunk(Bytes::new()),
            OutboundMessage::Body {
                more_body: true,
                ..
            }
        ));
    }
}
