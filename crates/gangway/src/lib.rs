//! # Gangway
//!
//! **Dual-transport application server**
//!
//! Gangway serves one application over two front doors:
//!
//! - A multiplexed stream transport, where every request is an
//!   independent, concurrently-served logical stream on one connection
//! - A legacy HTTP/1.1 listener (one request per TCP/TLS connection)
//!   that advertises the multiplexed endpoint via `Alt-Svc`
//!
//! An application is any async function of the calling convention: a
//! request [`Scope`], a [`BodyReceiver`] yielding inbound body messages,
//! and a [`ResponseSender`] accepting outbound ones. The same function
//! serves both transports unchanged.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gangway::prelude::*;
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
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder().bind_addr("0.0.0.0:8443").build();
//!     Server::new(config, hello).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Shutdown
//!
//! On SIGTERM or SIGINT the server stops accepting, closes idle
//! connections immediately, gives busy ones a bounded grace period, and
//! force-cancels whatever remains. Multi-process deployments run a
//! `Supervisor` that shares one listening socket across workers and
//! forwards termination signals.

#![doc(html_root_url = "https://docs.rs/gangway/0.1.0")]
#![warn(missing_docs)]

pub use gangway_core as core;

pub use gangway_server as server;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use gangway::prelude::*;
/// ```
pub mod prelude {
    pub use gangway_core::{
        App, AppError, BodyReceiver, HeaderList, InboundMessage, OutboundMessage, ResponseSender,
        Scope, SendError,
    };

    pub use gangway_server::{Server, ServerConfig, ServerError, ShutdownSignal};

    // Re-export logging setup
    pub use gangway_server::{init_logging, LogConfig};

    pub use http::StatusCode;
}

pub use gangway_core::{
    inbound_queue, App, AppError, BodyReceiver, HeaderList, InboundMessage, OutboundMessage,
    QueueProducer, ResponseSender, Scope, ScopeBuilder, SendError, StreamTransport,
    TransportError, TransportEvent,
};

pub use gangway_server::{
    ConnectionRegistry, Server, ServerConfig, ServerConfigBuilder, ServerError, ShutdownSignal,
    TransportBridge,
};

#[cfg(unix)]
pub use gangway_server::{inherited_listener, Supervisor, SupervisorError, WORKER_FD_ENV};
