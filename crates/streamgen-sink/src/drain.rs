//! Drain wrapper around a [`Sink`].
//!
//! Every accepted send increments an in-flight counter that its delivery
//! callback decrements. On shutdown the registered cleanup waits (bounded)
//! for the counter to reach zero and then closes the inner sink. Sends made
//! after shutdown began fail with [`SinkError::ShuttingDown`].

use crate::encoder::encode_record;
use crate::error::SinkError;
use crate::sink::{OutboundMessage, Sink};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamgen_core::{Record, ShutdownCoordinator, ShutdownError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default bound on how long shutdown waits for acknowledgments.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on how long one record waits for transport queue space.
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(30);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Delivery counters of a [`DrainingSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Messages accepted by the transport
    pub sent: u64,
    /// Messages acknowledged as delivered
    pub acknowledged: u64,
    /// Messages whose delivery failed
    pub failed: u64,
    /// Sends the transport refused outright
    pub rejected: u64,
    /// Sends refused for a full queue and offered again
    pub queue_full: u64,
    /// Accepted messages not yet acknowledged
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    sent: AtomicU64,
    acknowledged: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    queue_full: AtomicU64,
}

/// Sink wrapper that tracks in-flight sends and drains on shutdown.
pub struct DrainingSink {
    inner: Arc<dyn Sink>,
    shutdown: Arc<ShutdownCoordinator>,
    counters: Arc<Counters>,
    queue_timeout: Duration,
}

impl DrainingSink {
    pub fn new(inner: Arc<dyn Sink>, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self {
            inner,
            shutdown,
            counters: Arc::new(Counters::default()),
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
        }
    }

    /// Bound on how long [`send_record`](Self::send_record) retries a
    /// record the transport refused for a full queue.
    pub fn with_queue_timeout(mut self, queue_timeout: Duration) -> Self {
        self.queue_timeout = queue_timeout;
        self
    }

    /// Wrap `inner` and register the drain as a shutdown cleanup.
    pub fn install(
        inner: Arc<dyn Sink>,
        shutdown: Arc<ShutdownCoordinator>,
        drain_timeout: Duration,
    ) -> Result<Arc<Self>, ShutdownError> {
        let sink = Arc::new(Self::new(inner, shutdown));
        sink.register_drain(drain_timeout)?;
        Ok(sink)
    }

    /// Register [`drain`](Self::drain) with the shutdown coordinator.
    pub fn register_drain(self: &Arc<Self>, timeout: Duration) -> Result<(), ShutdownError> {
        let sink = Arc::clone(self);
        self.shutdown.register_cleanup("drain sink", move || async move {
            let remaining = sink.drain(timeout).await;
            if remaining > 0 {
                anyhow::bail!("{remaining} message(s) still unacknowledged after {timeout:?}");
            }
            anyhow::Ok(())
        })
    }

    /// Send a message, counting it in flight until acknowledged.
    pub fn send(&self, message: OutboundMessage) -> Result<(), SinkError> {
        if self.shutdown.is_shutting_down() {
            return Err(SinkError::ShuttingDown);
        }

        self.counters.in_flight.fetch_add(1, Ordering::AcqRel);
        let counters = Arc::clone(&self.counters);
        let on_ack = Box::new(move |result: crate::sink::DeliveryResult| {
            match result {
                Ok(_) => {
                    counters.acknowledged.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Message delivery failed: {e}");
                }
            }
            counters.in_flight.fetch_sub(1, Ordering::AcqRel);
        });

        match self.inner.send(message, on_ack) {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                // The callback was dropped unused.
                self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
                let counter = match e {
                    SinkError::QueueFull => &self.counters.queue_full,
                    _ => &self.counters.rejected,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Encode and send a record.
    ///
    /// A full transport queue is backpressure: the same message is offered
    /// again, serving delivery callbacks in between, until it is accepted,
    /// shutdown begins, or the queue timeout passes (then `QueueFull`).
    pub async fn send_record(
        &self,
        topic: &str,
        record: &Record,
        key_field: Option<&str>,
    ) -> Result<(), SinkError> {
        if self.shutdown.is_shutting_down() {
            return Err(SinkError::ShuttingDown);
        }
        let message = encode_record(topic, record, key_field)?;
        let deadline = Instant::now() + self.queue_timeout;

        loop {
            match self.send(message.clone()) {
                Err(SinkError::QueueFull) => {
                    if Instant::now() >= deadline {
                        warn!(
                            "Transport queue still full after {:?}; giving up on a '{}' record",
                            self.queue_timeout, topic
                        );
                        return Err(SinkError::QueueFull);
                    }
                    self.inner.poll_once();
                    tokio::select! {
                        _ = tokio::time::sleep(QUEUE_FULL_BACKOFF) => {}
                        _ = self.shutdown.wait_shutting_down() => return Err(SinkError::ShuttingDown),
                    }
                }
                outcome => return outcome,
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            acknowledged: self.counters.acknowledged.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            queue_full: self.counters.queue_full.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }

    /// Wait up to `timeout` for every in-flight send to be acknowledged,
    /// then close the inner sink. Returns the number left unacknowledged.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        info!("Draining sink ({} in flight)", self.in_flight());

        let pending = self.inner.flush(timeout).await;
        debug!("Transport flush reported {} pending", pending);

        loop {
            let in_flight = self.in_flight();
            if in_flight == 0 {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Drain timed out after {:?} with {} message(s) in flight",
                    timeout, in_flight
                );
                break;
            }
            self.inner.poll_once();
            tokio::time::sleep(DRAIN_POLL_INTERVAL.min(deadline - now)).await;
        }

        self.inner.close().await;

        let stats = self.stats();
        info!(
            "Sink drained: {} sent, {} acknowledged, {} failed, {} rejected",
            stats.sent, stats.acknowledged, stats.failed, stats.rejected
        );
        stats.in_flight
    }
}
