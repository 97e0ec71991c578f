//! Transport bridge: stream sessions over one multiplexed connection.
//!
//! The bridge translates transport events into stream-session operations
//! and application output into transport sends. Each logical stream gets
//! its own inbound queue and application task; the queue decouples the
//! transport event path (paced by the network) from the application task
//! (paced by its own computation), and the event-path push never blocks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::AbortHandle;

use gangway_core::{
    inbound_queue, App, InboundMessage, QueueProducer, ResponseSender, Scope, StreamTransport,
    TransportEvent,
};

use crate::registry::ConnectionControl;

/// Per-stream state: the inbound queue producer and the running
/// application task.
struct StreamSession {
    producer: QueueProducer,
    abort: Option<AbortHandle>,
}

type SessionMap = Arc<Mutex<HashMap<u64, StreamSession>>>;

/// Removes the session entry when the application task ends — normally,
/// by error, or by cancellation. Held inside the task so an abort cannot
/// skip the cleanup.
struct SessionGuard {
    sessions: SessionMap,
    stream_id: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.stream_id);
    }
}

/// Bridges one multiplexed connection to the application.
///
/// Owns the connection's stream sessions; the registry only holds a weak
/// handle for classification.
///
/// # Example
///
/// ```rust,ignore
/// let bridge = Arc::new(TransportBridge::new(app, transport, client, server));
/// registry.register(bridge.clone());
///
/// while let Some(event) = events.recv().await {
///     bridge.handle_event(event);
/// }
/// ```
pub struct TransportBridge<A: App> {
    app: Arc<A>,
    transport: Arc<dyn StreamTransport>,
    client: Option<SocketAddr>,
    server: Option<SocketAddr>,
    sessions: SessionMap,
}

impl<A: App> TransportBridge<A> {
    /// Creates a bridge for one connection.
    #[must_use]
    pub fn new(
        app: Arc<A>,
        transport: Arc<dyn StreamTransport>,
        client: Option<SocketAddr>,
        server: Option<SocketAddr>,
    ) -> Self {
        Self {
            app,
            transport,
            client,
            server,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Dispatches one transport event to the owning stream session.
    ///
    /// Returns `false` once the connection is closed and the caller should
    /// stop pumping events.
    pub fn handle_event(&self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::StreamHeaders { stream_id, headers } => {
                self.stream_headers(stream_id, &headers);
            }
            TransportEvent::StreamData { stream_id, body } => {
                self.stream_data(stream_id, body);
            }
            TransportEvent::StreamHalfClosed { stream_id } => {
                self.stream_half_closed(stream_id);
            }
            TransportEvent::ConnectionClosed => return false,
        }
        true
    }

    /// Handles a stream's opening header block: builds the scope, creates
    /// the session, and schedules the application task.
    pub fn stream_headers(&self, stream_id: u64, headers: &[(Bytes, Bytes)]) {
        let scope = Scope::from_stream_headers(headers, self.client, self.server);
        tracing::debug!(
            stream_id,
            method = scope.method(),
            path = scope.path(),
            "stream opened"
        );

        let (producer, receiver) = inbound_queue();
        let sender = ResponseSender::new(Arc::clone(&self.transport), stream_id);
        let guard = SessionGuard {
            sessions: Arc::clone(&self.sessions),
            stream_id,
        };

        // Insert before spawning so the task's own cleanup always finds
        // its entry, even if it finishes immediately.
        self.sessions.lock().insert(
            stream_id,
            StreamSession {
                producer,
                abort: None,
            },
        );

        let app = Arc::clone(&self.app);
        let task = tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = app.call(scope, receiver, sender).await {
                tracing::error!(stream_id, error = %e, "application task failed");
            }
        });

        // The task may already have finished and removed its entry; only a
        // still-live session needs the abort handle.
        if let Some(session) = self.sessions.lock().get_mut(&stream_id) {
            session.abort = Some(task.abort_handle());
        }
    }

    /// Handles inbound body bytes: a non-blocking enqueue.
    pub fn stream_data(&self, stream_id: u64, body: Bytes) {
        if let Some(session) = self.sessions.lock().get(&stream_id) {
            session.producer.push(InboundMessage::chunk(body));
        }
    }

    /// Handles the peer's half-close: enqueues the single terminal message.
    ///
    /// Delivered even when no data preceded it, so an application never
    /// blocks waiting for a body that will not arrive.
    pub fn stream_half_closed(&self, stream_id: u64) {
        if let Some(session) = self.sessions.lock().get(&stream_id) {
            session.producer.push(InboundMessage::end());
        }
    }

    /// Returns the number of in-flight stream sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl<A: App> ConnectionControl for TransportBridge<A> {
    fn pipeline_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    fn close_transport(&self) {
        self.transport.close();
    }

    fn cancel_sessions(&self) {
        // Collect handles first: aborting can drop a task future inline,
        // and its cleanup guard takes the sessions lock.
        let handles: Vec<AbortHandle> = self
            .sessions
            .lock()
            .values()
            .filter_map(|s| s.abort.clone())
            .collect();

        tracing::debug!(sessions = handles.len(), "cancelling stream sessions");
        for handle in handles {
            handle.abort();
        }
    }
}
