//! Server front door.
//!
//! Owns the legacy TCP accept loop, registers every connection with the
//! drain registry, and exposes the attach point where a multiplexed
//! transport engine hands its connections to the application. On shutdown
//! the accept loop stops first, then the registry drains whatever is
//! still live.
//!
//! # Example
//!
//! ```rust,ignore
//! use gangway_server::{Server, ServerConfig};
//!
//! let server = Server::new(ServerConfig::default(), app);
//! server.run().await?;
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use gangway_core::{App, Pool, StreamTransport, TransportEvent};

use crate::bridge::TransportBridge;
use crate::config::ServerConfig;
use crate::http1;
use crate::registry::{ConnectionControl, ConnectionRegistry};
use crate::shutdown::ShutdownSignal;

/// Errors from running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The configured bind address did not parse.
    #[error("invalid bind address '{addr}': {source}")]
    InvalidAddr {
        addr: String,
        source: std::net::AddrParseError,
    },

    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Listener-level I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry bookkeeping for one legacy connection.
///
/// A legacy connection carries at most one session, so idle/busy is a
/// single flag, and both "close" and "cancel" come down to aborting the
/// serving task (which drops the socket).
struct LegacyConnection {
    busy: Arc<AtomicBool>,
    abort: Mutex<Option<AbortHandle>>,
}

impl LegacyConnection {
    fn abort_task(&self) {
        if let Some(handle) = self.abort.lock().as_ref() {
            handle.abort();
        }
    }
}

impl ConnectionControl for LegacyConnection {
    fn pipeline_empty(&self) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }

    fn close_transport(&self) {
        self.abort_task();
    }

    fn cancel_sessions(&self) {
        self.abort_task();
    }
}

/// Idle read buffers kept per worker process.
const READ_BUFFER_POOL_CAPACITY: usize = 64;

/// The Gangway server: one application behind two front doors.
///
/// The legacy TCP listener is served directly; a multiplexed transport
/// engine plugs in through [`Server::attach_connection`]. Every
/// connection, from either door, participates in the same drain protocol.
pub struct Server<A: App> {
    config: ServerConfig,
    app: Arc<A>,
    registry: ConnectionRegistry,
    buffers: Pool<Vec<u8>>,
}

impl<A: App> Server<A> {
    /// Creates a server for the given application.
    #[must_use]
    pub fn new(config: ServerConfig, app: A) -> Self {
        Self {
            config,
            app: Arc::new(app),
            registry: ConnectionRegistry::new(),
            buffers: Pool::new(READ_BUFFER_POOL_CAPACITY, Vec::new),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the number of live registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Runs until a process termination signal arrives, then drains.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the bind address is invalid or the
    /// listener cannot be bound.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals())
            .await
    }

    /// Runs until the given shutdown signal triggers, then drains.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the bind address is invalid or the
    /// listener cannot be bound.
    pub async fn run_with_shutdown(&self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|source| ServerError::InvalidAddr {
                addr: self.config.bind_addr().to_string(),
                source,
            })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.bind_addr().to_string(),
                source,
            })?;

        self.serve(listener, shutdown).await
    }

    /// Runs on an already-bound standard listener.
    ///
    /// This is how worker processes serve the socket they inherited from
    /// the supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] when the listener cannot be converted
    /// for async use.
    pub async fn run_on_listener(
        &self,
        listener: std::net::TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        self.serve(listener, shutdown).await
    }

    async fn serve(
        &self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local = listener.local_addr().ok();
        tracing::info!(addr = ?local, "listening");

        loop {
            tokio::select! {
                () = shutdown.wait() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_legacy(stream, peer, local),
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
            }
        }

        // Stop accepting before draining, so nothing registers behind the
        // drain's back.
        drop(listener);
        tracing::info!(
            connections = self.registry.len(),
            "accept loop stopped, draining"
        );
        self.registry
            .drain(self.config.drain_retries(), self.config.drain_interval())
            .await;

        Ok(())
    }

    fn spawn_legacy(&self, mut stream: TcpStream, peer: SocketAddr, local: Option<SocketAddr>) {
        let app = Arc::clone(&self.app);
        let registry = self.registry.clone();
        let alt_svc_port = self.config.alt_svc_port();
        let buffers = self.buffers.clone();

        let busy = Arc::new(AtomicBool::new(false));
        let conn = Arc::new(LegacyConnection {
            busy: Arc::clone(&busy),
            abort: Mutex::new(None),
        });
        let id = registry.register(Arc::clone(&conn) as Arc<dyn ConnectionControl>);

        let keepalive = Arc::clone(&conn);
        let task = tokio::spawn(async move {
            // Holds the control handle for the lifetime of the task so the
            // registry's weak reference stays upgradeable.
            let _keepalive = keepalive;
            if let Err(e) = http1::serve_connection(
                &mut stream,
                app.as_ref(),
                alt_svc_port,
                Some(peer),
                local,
                &busy,
                &buffers,
            )
            .await
            {
                tracing::debug!(error = %e, %peer, "legacy connection error");
            }
            registry.unregister(id);
        });

        // An already-finished task ignores the abort handle.
        conn.abort.lock().replace(task.abort_handle());
    }

    /// Attaches one multiplexed connection from a transport engine.
    ///
    /// Spawns the event pump: every event from `events` is dispatched to a
    /// dedicated [`TransportBridge`], which fans streams out to application
    /// tasks. The connection is registered for draining until the pump sees
    /// [`TransportEvent::ConnectionClosed`] or the event channel closes.
    pub fn attach_connection(
        &self,
        transport: Arc<dyn StreamTransport>,
        mut events: mpsc::Receiver<TransportEvent>,
        client: Option<SocketAddr>,
        server: Option<SocketAddr>,
    ) -> JoinHandle<()> {
        let bridge = Arc::new(TransportBridge::new(
            Arc::clone(&self.app),
            transport,
            client,
            server,
        ));
        let registry = self.registry.clone();
        let id = registry.register(Arc::clone(&bridge) as Arc<dyn ConnectionControl>);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !bridge.handle_event(event) {
                    break;
                }
            }
            registry.unregister(id);
            tracing::debug!(client = ?client, "multiplexed connection detached");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;
    use http::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use gangway_core::{
        AppError, BodyReceiver, OutboundMessage, ResponseSender, Scope, TransportError,
    };

    async fn echo(
        _scope: Scope,
        mut receiver: BodyReceiver,
        mut sender: ResponseSender,
    ) -> Result<(), AppError> {
        let mut body = Vec::new();
        loop {
            let message = receiver.recv().await;
            body.extend_from_slice(message.body());
            if message.is_last() {
                break;
            }
        }
        sender.send(OutboundMessage::start(StatusCode::OK)).await?;
        sender
            .send(OutboundMessage::body(Bytes::from(body)))
            .await?;
        Ok(())
    }

    fn test_config() -> ServerConfig {
        ServerConfig::builder()
            .drain_retries(2)
            .drain_interval(Duration::from_millis(10))
            .build()
    }

    struct NullTransport;

    impl StreamTransport for NullTransport {
        fn send_headers(
            &self,
            _stream_id: u64,
            _headers: &[(Bytes, Bytes)],
            _end_stream: bool,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        fn send_data(
            &self,
            _stream_id: u64,
            _body: Bytes,
            _end_stream: bool,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&self) {}
    }

    #[tokio::test]
    async fn test_legacy_round_trip_over_tcp() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Arc::new(Server::new(test_config(), echo));
        let shutdown = ShutdownSignal::new();

        let run = {
            let server = Arc::clone(&server);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.run_on_listener(listener, shutdown).await })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));

        shutdown.trigger();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_with_no_connections_returns_promptly() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let server = Server::new(test_config(), echo);
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        tokio::time::timeout(
            Duration::from_secs(1),
            server.run_on_listener(listener, shutdown),
        )
        .await
        .expect("shutdown should not hang")
        .unwrap();
    }

    #[tokio::test]
    async fn test_idle_legacy_connection_closed_by_drain() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Arc::new(Server::new(test_config(), echo));
        let shutdown = ShutdownSignal::new();

        let run = {
            let server = Arc::clone(&server);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.run_on_listener(listener, shutdown).await })
        };

        // Connect without sending a request, leaving the connection idle.
        let mut client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.connection_count(), 1);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("drain should close the idle connection")
            .unwrap()
            .unwrap();

        // The server side dropped the socket.
        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_connection_registers_and_detaches() {
        let server = Server::new(test_config(), echo);
        let (tx, rx) = mpsc::channel(8);

        let pump = server.attach_connection(Arc::new(NullTransport), rx, None, None);
        assert_eq!(server.connection_count(), 1);

        tx.send(TransportEvent::StreamHeaders {
            stream_id: 0,
            headers: vec![
                (Bytes::from_static(b":method"), Bytes::from_static(b"GET")),
                (Bytes::from_static(b":path"), Bytes::from_static(b"/")),
            ],
        })
        .await
        .unwrap();
        tx.send(TransportEvent::StreamHalfClosed { stream_id: 0 })
            .await
            .unwrap();
        tx.send(TransportEvent::ConnectionClosed).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump should stop on ConnectionClosed")
            .unwrap();
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_connection_detaches_on_channel_close() {
        let server = Server::new(test_config(), echo);
        let (tx, rx) = mpsc::channel::<TransportEvent>(1);

        let pump = server.attach_connection(Arc::new(NullTransport), rx, None, None);
        assert_eq!(server.connection_count(), 1);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump should stop when the engine goes away")
            .unwrap();
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_bind_addr() {
        let server = Server::new(
            ServerConfig::builder().bind_addr("nonsense").build(),
            echo,
        );
        let result = server.run_with_shutdown(ShutdownSignal::new()).await;
        assert!(matches!(result, Err(ServerError::InvalidAddr { .. })));
    }
}
