//! Error types shared across the Gangway crates.

use thiserror::Error;

/// Errors reported by a transport engine when asked to send.
///
/// The transport itself is a collaborator; this type only classifies its
/// failures far enough for the bridge to log and tear down bookkeeping.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The stream (or its connection) is already closed.
    #[error("stream {0} is closed")]
    StreamClosed(u64),

    /// Any other transport-level failure.
    #[error("transport failure: {0}")]
    Failed(String),
}

/// Contract violations and failures on the outbound (send) path.
#[derive(Error, Debug)]
pub enum SendError {
    /// The application emitted a second response-start message.
    #[error("response already started")]
    ResponseAlreadyStarted,

    /// The application emitted a body message before starting the response.
    #[error("response body sent before response start")]
    ResponseNotStarted,

    /// The application emitted a body message after the terminal one.
    #[error("response already complete")]
    ResponseComplete,

    /// The underlying transport refused the send.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors returned by an application handler.
#[derive(Error, Debug)]
pub enum AppError {
    /// The handler failed with a message.
    #[error("application error: {0}")]
    Failure(String),

    /// The handler's outbound send failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// Any other handler error.
    #[error("application error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    /// Creates an application error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }
}
