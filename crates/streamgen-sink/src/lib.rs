//! Message transports for generated records.
//!
//! A [`Sink`] accepts encoded messages without blocking and reports each
//! delivery outcome through a callback. [`KafkaSink`] is the production
//! transport; [`MemorySink`] and [`ConsoleSink`] serve tests and dry runs.
//! [`DrainingSink`] wraps any of them with in-flight accounting and a
//! bounded drain that runs as a shutdown cleanup.

pub mod config;
pub mod drain;
pub mod encoder;
pub mod error;
pub mod kafka;
pub mod memory;
pub mod sink;

pub use config::TransportConfig;
pub use drain::{DeliveryStats, DrainingSink, DEFAULT_DRAIN_TIMEOUT};
pub use encoder::{encode_record, get_message_key};
pub use error::SinkError;
pub use kafka::KafkaSink;
pub use memory::{ConsoleSink, MemorySink};
pub use sink::{AckCallback, DeliveryReceipt, DeliveryResult, OutboundMessage, Sink};
