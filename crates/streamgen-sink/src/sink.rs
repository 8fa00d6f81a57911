//! The transport capability consumed by the generators.

use crate::error::SinkError;
use async_trait::async_trait;
use std::time::Duration;

/// A message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, key: Option<Vec<u8>>, value: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key,
            value,
        }
    }
}

/// Acknowledgment of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub topic: String,
}

/// Delivery outcome reported to an [`AckCallback`].
pub type DeliveryResult = Result<DeliveryReceipt, SinkError>;

/// Invoked exactly once per accepted message with its delivery outcome.
pub type AckCallback = Box<dyn FnOnce(DeliveryResult) + Send + 'static>;

/// A message transport.
///
/// `send` only enqueues; the outcome arrives later through `on_ack`. An
/// `Err` from `send` means the message was not accepted and `on_ack` is
/// dropped without being called.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Enqueue a message for delivery.
    fn send(&self, message: OutboundMessage, on_ack: AckCallback) -> Result<(), SinkError>;

    /// Serve pending delivery callbacks. Returns the number served.
    fn poll_once(&self) -> usize {
        0
    }

    /// Wait up to `timeout` for queued messages to be delivered.
    /// Returns the number still pending.
    async fn flush(&self, timeout: Duration) -> usize;

    /// Release the transport. Further sends fail.
    async fn close(&self);
}
