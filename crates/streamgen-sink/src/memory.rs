//! In-process sinks: [`MemorySink`] retains messages, [`ConsoleSink`] prints
//! them as JSON lines (dry runs).

use crate::error::SinkError;
use crate::sink::{AckCallback, DeliveryReceipt, OutboundMessage, Sink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Sink that keeps every delivered message in memory and acknowledges
/// synchronously.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<OutboundMessage>>,
    fail_every: Option<u64>,
    attempts: AtomicU64,
    queue_full_every: Option<u64>,
    offers: AtomicU64,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every `n`-th accepted message as a delivery failure.
    pub fn failing_every(n: u64) -> Self {
        Self {
            fail_every: (n > 0).then_some(n),
            ..Self::default()
        }
    }

    /// Refuse every `n`-th offered message with [`SinkError::QueueFull`].
    /// Refused messages are not retained.
    pub fn queue_full_every(n: u64) -> Self {
        Self {
            queue_full_every: (n > 0).then_some(n),
            ..Self::default()
        }
    }

    /// Snapshot of delivered messages.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().clone()
    }

    /// Delivered messages for one topic.
    pub fn messages_for(&self, topic: &str) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn send(&self, message: OutboundMessage, on_ack: AckCallback) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }

        let offer = self.offers.fetch_add(1, Ordering::AcqRel) + 1;
        if self.queue_full_every.is_some_and(|n| offer % n == 0) {
            return Err(SinkError::QueueFull);
        }

        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if self.fail_every.is_some_and(|n| attempt % n == 0) {
            on_ack(Err(SinkError::Delivery(format!(
                "injected failure for message {attempt}"
            ))));
            return Ok(());
        }

        let receipt = DeliveryReceipt {
            topic: message.topic.clone(),
        };
        self.messages.lock().push(message);
        on_ack(Ok(receipt));
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> usize {
        0
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Sink that writes each message value to stdout, one per line.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    closed: AtomicBool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn send(&self, message: OutboundMessage, on_ack: AckCallback) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        let line = format!(
            "{}\t{}",
            message.topic,
            String::from_utf8_lossy(&message.value)
        );
        let outcome = writeln!(std::io::stdout().lock(), "{line}")
            .map(|_| DeliveryReceipt {
                topic: message.topic,
            })
            .map_err(|e| SinkError::Delivery(e.to_string()));
        on_ack(outcome);
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> usize {
        // stdout is line-buffered per write; nothing is queued here.
        let _ = std::io::stdout().flush();
        0
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_sink_acknowledges_and_retains() {
        let sink = MemorySink::new();
        let acked = Arc::new(AtomicU64::new(0));

        for i in 0..3 {
            let acked = Arc::clone(&acked);
            sink.send(
                OutboundMessage::new("orders", None, format!("{i}").into_bytes()),
                Box::new(move |result| {
                    assert!(result.is_ok());
                    acked.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        }

        assert_eq!(acked.load(Ordering::SeqCst), 3);
        assert_eq!(sink.messages_for("orders").len(), 3);
        assert!(sink.messages_for("payments").is_empty());
        assert_eq!(sink.flush(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn test_memory_sink_injected_failures() {
        let sink = MemorySink::failing_every(2);
        let failures = Arc::new(AtomicU64::new(0));

        for _ in 0..4 {
            let failures = Arc::clone(&failures);
            sink.send(
                OutboundMessage::new("orders", None, b"{}".to_vec()),
                Box::new(move |result| {
                    if result.is_err() {
                        failures.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .unwrap();
        }

        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert_eq!(sink.messages().len(), 2);
    }

    #[test]
    fn test_memory_sink_injected_queue_full() {
        let sink = MemorySink::queue_full_every(3);
        let outcomes: Vec<bool> = (0..6)
            .map(|_| {
                sink.send(
                    OutboundMessage::new("orders", None, b"{}".to_vec()),
                    Box::new(|_| {}),
                )
                .is_ok()
            })
            .collect();

        assert_eq!(outcomes, [true, true, false, true, true, false]);
        assert_eq!(sink.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_closed_sink_rejects_sends() {
        let sink = MemorySink::new();
        sink.close().await;

        let result = sink.send(
            OutboundMessage::new("orders", None, Vec::new()),
            Box::new(|_| {}),
        );
        assert!(matches!(result, Err(SinkError::Closed)));
        assert!(sink.is_closed());
    }
}
