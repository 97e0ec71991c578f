//! # Gangway Core
//!
//! Data model and application calling convention for the Gangway server.
//!
//! This crate defines the pieces shared by both transports:
//!
//! - [`Scope`] — immutable per-request descriptor
//! - [`InboundMessage`] / [`OutboundMessage`] — the body message types
//! - [`App`] — the handler calling convention
//! - [`BodyReceiver`] / [`ResponseSender`] — the per-request capabilities
//! - [`StreamTransport`] / [`TransportEvent`] — the transport engine contract
//! - [`Pool`] — process-wide object reuse with scoped acquisition
//!
//! ## Example
//!
//! ```rust,ignore
//! use gangway_core::{App, AppError, BodyReceiver, OutboundMessage, ResponseSender, Scope};
//! use http::StatusCode;
//!
//! async fn hello(
//!     _scope: Scope,
//!     mut receiver: BodyReceiver,
//!     mut sender: ResponseSender,
//! ) -> Result<(), AppError> {
//!     while !receiver.recv().await.is_last() {}
//!     sender.send(OutboundMessage::start(StatusCode::OK)).await?;
//!     sender.send(OutboundMessage::body("hello".into())).await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/gangway-core/0.1.0")]
#![warn(missing_docs)]

mod app;
mod error;
mod message;
mod pool;
mod queue;
mod scope;
mod transport;

pub use app::{App, ResponseSender, SERVER_NAME};
pub use error::{AppError, SendError, TransportError};
pub use message::{HeaderList, InboundMessage, OutboundMessage};
pub use pool::{Pool, Pooled};
pub use queue::{inbound_queue, BodyReceiver, QueueProducer};
pub use scope::{Scope, ScopeBuilder};
pub use transport::{StreamTransport, TransportEvent};
