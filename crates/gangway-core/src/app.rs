//! Application calling convention.
//!
//! Every logical request — whatever transport it arrived on — reaches the
//! application the same way: one call with an immutable [`Scope`], a
//! receive capability for the request body, and a send capability for the
//! response.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{AppError, SendError};
use crate::message::OutboundMessage;
use crate::queue::BodyReceiver;
use crate::scope::Scope;
use crate::transport::StreamTransport;

/// Value of the `server` identification header added to every response.
pub const SERVER_NAME: &[u8] = b"gangway";

/// An application handler.
///
/// Invoked once per logical request. The handler consumes inbound messages
/// through `receiver` and emits its response through `sender`; it must emit
/// exactly one [`OutboundMessage::Start`] followed by body messages ending
/// with one whose `more_body` flag is cleared.
///
/// Implemented automatically for async functions with the matching
/// signature.
///
/// # Example
///
/// ```rust,ignore
/// async fn echo(
///     _scope: Scope,
///     mut receiver: BodyReceiver,
///     mut sender: ResponseSender,
/// ) -> Result<(), AppError> {
///     sender.send(OutboundMessage::start(StatusCode::OK)).await?;
///     loop {
///         let message = receiver.recv().await;
///         let last = message.is_last();
///         sender
///             .send(OutboundMessage::Body {
///                 body: message.into_body(),
///                 more_body: !last,
///             })
///             .await?;
///         if last {
///             return Ok(());
///         }
///     }
/// }
/// ```
pub trait App: Send + Sync + 'static {
    /// Handles one logical request.
    fn call(
        &self,
        scope: Scope,
        receiver: BodyReceiver,
        sender: ResponseSender,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

impl<F, Fut> App for F
where
    F: Fn(Scope, BodyReceiver, ResponseSender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AppError>> + Send,
{
    fn call(
        &self,
        scope: Scope,
        receiver: BodyReceiver,
        sender: ResponseSender,
    ) -> impl Future<Output = Result<(), AppError>> + Send {
        self(scope, receiver, sender)
    }
}

/// The application task's send capability.
///
/// Maps outbound messages onto transport operations for one stream:
/// a [`OutboundMessage::Start`] becomes a header block carrying a
/// `:status` pseudo-header plus the server identification header, and each
/// [`OutboundMessage::Body`] becomes a data frame whose `end_stream` flag
/// is the negation of `more_body`.
///
/// Not cloneable: the started/ended contract state lives in the sender
/// itself, and a copy could restate a response that is already underway.
pub struct ResponseSender {
    transport: Arc<dyn StreamTransport>,
    stream_id: u64,
    started: bool,
    ended: bool,
}

impl ResponseSender {
    /// Binds a sender to one stream of a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn StreamTransport>, stream_id: u64) -> Self {
        Self {
            transport,
            stream_id,
            started: false,
            ended: false,
        }
    }

    /// Returns whether the response has been started.
    #[must_use]
    pub fn response_started(&self) -> bool {
        self.started
    }

    /// Sends one outbound message.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::ResponseAlreadyStarted`] on a second `Start`,
    /// [`SendError::ResponseNotStarted`] for a body before any `Start`,
    /// [`SendError::ResponseComplete`] for a body after the terminal one,
    /// and [`SendError::Transport`] when the engine refuses the send.
    pub async fn send(&mut self, message: OutboundMessage) -> Result<(), SendError> {
        match message {
            OutboundMessage::Start { status, headers } => {
                if self.started {
                    return Err(SendError::ResponseAlreadyStarted);
                }
                self.started = true;

                let mut wire = Vec::with_capacity(headers.len() + 2);
                wire.push((
                    Bytes::from_static(b":status"),
                    Bytes::copy_from_slice(status.as_str().as_bytes()),
                ));
                wire.extend(headers);
                wire.push((Bytes::from_static(b"server"), Bytes::from_static(SERVER_NAME)));

                self.transport
                    .send_headers(self.stream_id, &wire, false)?;
            }
            OutboundMessage::Body { body, more_body } => {
                if !self.started {
                    return Err(SendError::ResponseNotStarted);
                }
                if self.ended {
                    return Err(SendError::ResponseComplete);
                }
                if !more_body {
                    self.ended = true;
                }
                self.transport.send_data(self.stream_id, body, !more_body)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResponseSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSender")
            .field("stream_id", &self.stream_id)
            .field("started", &self.started)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}
