//! # Gangway Server
//!
//! Dual-transport server runtime for Gangway applications.
//!
//! One application serves two front doors: a multiplexed transport engine
//! attached via [`Server::attach_connection`], and a legacy HTTP/1.1
//! listener served directly (one request per connection, `Alt-Svc`
//! advertising the multiplexed port). Both feed the same drain protocol
//! on shutdown, and a [`Supervisor`] can spread the listening socket
//! across worker processes.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gangway_server::{Server, ServerConfig, ShutdownSignal};
//!
//! let config = ServerConfig::builder().bind_addr("0.0.0.0:8443").build();
//! let server = Server::new(config, app);
//! server.run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/gangway-server/0.1.0")]
#![warn(missing_docs)]

mod bridge;
mod config;
mod http1;
pub mod logging;
mod registry;
mod server;
mod shutdown;
#[cfg(unix)]
mod worker;

pub use bridge::TransportBridge;
pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_BIND_ADDR, DEFAULT_DRAIN_INTERVAL,
    DEFAULT_DRAIN_RETRIES, DEFAULT_WORKER_NUM,
};
pub use http1::{LegacyError, ProtocolError};
pub use logging::{init_logging, LogConfig, LoggingError};
pub use registry::{ConnectionControl, ConnectionId, ConnectionRegistry};
pub use server::{Server, ServerError};
pub use shutdown::ShutdownSignal;
#[cfg(unix)]
pub use worker::{
    inherited_listener, Supervisor, SupervisorError, WorkerOutcome, WORKER_FD_ENV,
};
