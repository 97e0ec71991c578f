//! Transport engine contract.
//!
//! Gangway consumes the wire-level transport (QUIC handshake, framing,
//! congestion control, TLS) as a black box. The engine surfaces stream
//! events to the front door and accepts the two send primitives defined
//! here. Send calls enqueue into the engine and must not block.

use bytes::Bytes;

use crate::error::TransportError;

/// Send-side operations exposed by a multiplexed transport engine.
///
/// One implementor exists per connection; streams are addressed by id.
/// The bridge's buffered legacy-path adapter implements this trait too,
/// which lets both transports share one response path.
pub trait StreamTransport: Send + Sync + 'static {
    /// Sends a header block on the given stream.
    ///
    /// The header list already includes the `:status` pseudo-header when
    /// called from the response path.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the stream or connection is gone.
    fn send_headers(
        &self,
        stream_id: u64,
        headers: &[(Bytes, Bytes)],
        end_stream: bool,
    ) -> Result<(), TransportError>;

    /// Sends a data frame on the given stream.
    ///
    /// Successive frames may be coalesced by the engine; Gangway never
    /// coalesces them itself.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the stream or connection is gone.
    fn send_data(&self, stream_id: u64, body: Bytes, end_stream: bool)
        -> Result<(), TransportError>;

    /// Closes the whole connection.
    ///
    /// Used by the drain coordinator on idle connections. Must be safe to
    /// call more than once.
    fn close(&self);
}

/// Events surfaced by a multiplexed transport engine for one connection.
///
/// The front door translates these into stream-session operations.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A new stream opened with its header block.
    StreamHeaders {
        /// Stream identifier, unique within the connection.
        stream_id: u64,
        /// The header list as received, pseudo-headers included.
        headers: Vec<(Bytes, Bytes)>,
    },

    /// Body bytes arrived on a stream.
    StreamData {
        /// Stream identifier.
        stream_id: u64,
        /// The received bytes.
        body: Bytes,
    },

    /// The peer half-closed a stream; no more request data will arrive.
    StreamHalfClosed {
        /// Stream identifier.
        stream_id: u64,
    },

    /// The connection closed at the transport level.
    ConnectionClosed,
}
