//! Per-stream inbound message queue.
//!
//! The queue is the sole synchronization point between the transport event
//! path and the application task: the producer pushes without blocking at
//! whatever pace the network dictates, the consumer suspends until a
//! message is available. Messages are never dropped or reordered.

use tokio::sync::mpsc;

use crate::message::InboundMessage;

/// Creates a new inbound queue pair for one stream.
#[must_use]
pub fn inbound_queue() -> (QueueProducer, BodyReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueProducer { tx }, BodyReceiver { rx })
}

/// Producer half, held by the transport bridge.
///
/// Pushes never block. An unbounded channel is deliberate: a blocking push
/// under backpressure would stall unrelated streams multiplexed on the
/// same connection.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl QueueProducer {
    /// Enqueues one inbound message.
    ///
    /// Returns `false` if the consumer is gone (application task already
    /// finished); the message is discarded in that case.
    pub fn push(&self, message: InboundMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Consumer half: the application task's receive capability.
///
/// # Example
///
/// ```rust,ignore
/// let mut body = Vec::new();
/// loop {
///     let message = receiver.recv().await;
///     body.extend_from_slice(message.body());
///     if message.is_last() {
///         break;
///     }
/// }
/// ```
#[derive(Debug)]
pub struct BodyReceiver {
    rx: mpsc::UnboundedReceiver<InboundMessage>,
}

impl BodyReceiver {
    /// Receives the next inbound message, suspending until one arrives.
    ///
    /// Exactly one terminal message (`more_body = false`) is delivered per
    /// stream, always last. If the producer side was torn down mid-request
    /// (the connection died), a synthetic terminal message is returned so
    /// the application never suspends forever.
    pub async fn recv(&mut self) -> InboundMessage {
        self.rx.recv().await.unwrap_or_else(InboundMessage::end)
    }
}
