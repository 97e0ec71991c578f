//! Legacy HTTP/1.1 front door.
//!
//! One request per TCP/TLS connection, line-oriented parse, whole-body
//! buffering in both directions. This path exists for Alt-Svc discovery —
//! a compatibility fallback, not the primary transport — so buffering is
//! the accepted simplification. The functions are generic over
//! `AsyncRead + AsyncWrite`, keeping TLS termination a collaborator
//! concern.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use gangway_core::{
    inbound_queue, App, HeaderList, InboundMessage, Pool, ResponseSender, Scope, StreamTransport,
    TransportError,
};

/// Fixed body served when the application errors on this path.
const INTERNAL_ERROR_BODY: &[u8] = b"Internal Server Error";

/// Read buffer granularity.
const READ_CHUNK: usize = 4096;

/// Wire-format violations in the received request.
///
/// Any of these aborts the connection before the application is invoked.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The request line did not contain a method and target.
    #[error("malformed request line")]
    MalformedRequestLine,

    /// The peer closed before the header terminator arrived.
    #[error("unterminated headers")]
    UnterminatedHeaders,

    /// The `Content-Length` header was not a valid length.
    #[error("invalid content-length")]
    InvalidContentLength,
}

/// Errors while serving one legacy connection.
#[derive(Error, Debug)]
pub enum LegacyError {
    /// The request violated the wire format.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Socket-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one request into `data`: headers up to `\r\n\r\n`, then
/// `Content-Length` body bytes (or until the peer closes, whichever comes
/// first).
///
/// `data` is left empty when the peer closed without sending anything.
async fn read_request<R>(reader: &mut R, data: &mut Vec<u8>) -> Result<(), LegacyError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        data.extend_from_slice(&buf[..n]);

        if let Some(pos) = find_terminator(data) {
            let header_end = pos + 4;
            let content_length = parse_content_length(&data[..header_end])?;

            while data.len() - header_end < content_length {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                data.extend_from_slice(&buf[..n]);
            }
            return Ok(());
        }
    }
}

/// Locates the `\r\n\r\n` header terminator.
fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Extracts `Content-Length` from the raw header block, case-insensitively.
fn parse_content_length(headers: &[u8]) -> Result<usize, ProtocolError> {
    for line in headers.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        if line[..colon].eq_ignore_ascii_case(b"content-length") {
            let value = std::str::from_utf8(&line[colon + 1..])
                .map_err(|_| ProtocolError::InvalidContentLength)?;
            return value
                .trim()
                .parse()
                .map_err(|_| ProtocolError::InvalidContentLength);
        }
    }
    Ok(0)
}

/// Parses one buffered HTTP/1.1 request into a scope and body.
///
/// Header keys are lower-cased and values trimmed; the request target is
/// split into path and query by the scope itself.
pub fn parse_request(
    data: &[u8],
    client: Option<SocketAddr>,
    server: Option<SocketAddr>,
) -> Result<(Scope, Bytes), ProtocolError> {
    let header_end = find_terminator(data).ok_or(ProtocolError::UnterminatedHeaders)?;
    let headers_part = &data[..header_end];
    let body = Bytes::copy_from_slice(&data[header_end + 4..]);

    let mut lines = headers_part.split(|&b| b == b'\n');
    let request_line = lines
        .next()
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .ok_or(ProtocolError::MalformedRequestLine)?;

    let mut parts = request_line.split(|&b| b == b' ');
    let method = parts.next().filter(|m| !m.is_empty());
    let target = parts.next().filter(|t| !t.is_empty());
    let (Some(method), Some(target)) = (method, target) else {
        return Err(ProtocolError::MalformedRequestLine);
    };

    let mut headers = HeaderList::new();
    for line in lines {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let key: Vec<u8> = line[..colon]
            .iter()
            .map(u8::to_ascii_lowercase)
            .collect();
        let key = trim_bytes(&key);
        let value = trim_bytes(&line[colon + 1..]);
        headers.push((
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
        ));
    }

    let scope = Scope::builder()
        .http_version("1.1")
        .scheme("https")
        .method(String::from_utf8_lossy(method).into_owned())
        .raw_target(Bytes::copy_from_slice(target))
        .headers(headers)
        .client(client)
        .server(server)
        .build();

    Ok((scope, body))
}

/// Trims ASCII whitespace from both ends of a byte slice.
fn trim_bytes(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

/// Response state accumulated while the application runs.
///
/// Implements [`StreamTransport`] so the legacy path shares the exact
/// response mapping (status pseudo-header, server header, end-stream
/// flags) with the multiplexed bridge.
#[derive(Default)]
struct BufferedResponse {
    state: Mutex<ResponseBuffer>,
}

struct ResponseBuffer {
    status: StatusCode,
    headers: HeaderList,
    body: Vec<u8>,
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderList::new(),
            body: Vec::new(),
        }
    }
}

impl BufferedResponse {
    fn take(&self) -> ResponseBuffer {
        std::mem::take(&mut *self.state.lock())
    }
}

impl StreamTransport for BufferedResponse {
    fn send_headers(
        &self,
        _stream_id: u64,
        headers: &[(Bytes, Bytes)],
        _end_stream: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        for (name, value) in headers {
            if name.as_ref() == b":status" {
                if let Ok(status) = StatusCode::from_bytes(value) {
                    state.status = status;
                }
            } else if !name.starts_with(b":") {
                state.headers.push((name.clone(), value.clone()));
            }
        }
        Ok(())
    }

    fn send_data(
        &self,
        _stream_id: u64,
        body: Bytes,
        _end_stream: bool,
    ) -> Result<(), TransportError> {
        self.state.lock().body.extend_from_slice(&body);
        Ok(())
    }

    fn close(&self) {}
}

/// Serializes one complete HTTP/1.1 response.
///
/// Always carries `Alt-Svc` (advertising the multiplexed port for
/// subsequent connections), `Content-Length`, and `Connection: close`;
/// adds a default `Content-Type` when the application supplied none.
fn serialize_response(
    status: StatusCode,
    headers: &HeaderList,
    body: &[u8],
    alt_svc_port: u16,
) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("OK");
    let mut out = format!(
        "HTTP/1.1 {} {}\r\nAlt-Svc: h3=\":{}\"; ma=3600\r\nContent-Length: {}\r\nConnection: close\r\n",
        status.as_u16(),
        reason,
        alt_svc_port,
        body.len()
    )
    .into_bytes();

    let mut has_content_type = false;
    for (name, value) in headers {
        out.extend_from_slice(name);
        out.extend_from_slice(b": ");
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
        if name.eq_ignore_ascii_case(b"content-type") {
            has_content_type = true;
        }
    }
    if !has_content_type {
        out.extend_from_slice(b"Content-Type: text/plain\r\n");
    }

    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

/// Clears the busy flag when the request finishes or is cancelled.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Serves exactly one request on a legacy connection.
///
/// Reads and parses the request, runs the application against a single
/// synthetic stream session (the whole body arrives as one terminal
/// inbound message), buffers the response, and writes it out. The caller
/// closes the connection afterwards — this path has no keep-alive.
///
/// `busy` is set while a session is in flight, for the registry's
/// idle/busy classification. The read buffer comes out of `buffers`, the
/// worker's request-object pool, and goes back when the request finishes.
///
/// # Errors
///
/// Returns [`LegacyError::Protocol`] when the request is malformed (the
/// application is never invoked) and [`LegacyError::Io`] on socket
/// failures.
pub async fn serve_connection<IO, A>(
    io: &mut IO,
    app: &A,
    alt_svc_port: u16,
    client: Option<SocketAddr>,
    server: Option<SocketAddr>,
    busy: &AtomicBool,
    buffers: &Pool<Vec<u8>>,
) -> Result<(), LegacyError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    A: App,
{
    let mut data = buffers.acquire();
    data.clear();
    read_request(io, &mut data).await?;
    if data.is_empty() {
        return Ok(());
    }

    let (scope, body) = parse_request(&data, client, server)?;
    tracing::debug!(
        method = scope.method(),
        path = scope.path(),
        "legacy request"
    );

    busy.store(true, Ordering::SeqCst);
    let _busy = BusyGuard(busy);

    let (producer, receiver) = inbound_queue();
    producer.push(InboundMessage::last(body));

    let buffer = Arc::new(BufferedResponse::default());
    let sender = ResponseSender::new(
        Arc::clone(&buffer) as Arc<dyn StreamTransport>,
        0,
    );

    let response = match app.call(scope, receiver, sender).await {
        Ok(()) => {
            let state = buffer.take();
            serialize_response(state.status, &state.headers, &state.body, alt_svc_port)
        }
        Err(e) => {
            tracing::error!(error = %e, "application error on legacy path");
            serialize_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &HeaderList::new(),
                INTERNAL_ERROR_BODY,
                alt_svc_port,
            )
        }
    };

    io.write_all(&response).await?;
    io.flush().await?;
    Ok(())
}
