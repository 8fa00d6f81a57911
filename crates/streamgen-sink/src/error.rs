//! Error types for transport sinks.

use thiserror::Error;

/// Errors that can occur while publishing records.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Send attempted after shutdown began; the caller must stop producing.
    #[error("sink is draining for shutdown; no new sends are accepted")]
    ShuttingDown,

    /// The transport's local queue is full. The message was not accepted
    /// and can be offered again once the queue drains.
    #[error("transport queue is full")]
    QueueFull,

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("delivery canceled before acknowledgment")]
    Canceled,

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("sink is closed")]
    Closed,

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Topic creation error: {0}")]
    TopicCreation(String),

    #[error("failed to read transport config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse transport config: {0}")]
    Config(#[from] serde_yaml::Error),
}
