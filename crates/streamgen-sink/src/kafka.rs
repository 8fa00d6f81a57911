//! Kafka transport backed by an rdkafka `FutureProducer`.
//!
//! `send` enqueues into librdkafka without waiting; a spawned task awaits
//! the delivery future and reports the outcome to the message's callback.
//! Sending therefore requires a running tokio runtime.

use crate::config::TransportConfig;
use crate::error::SinkError;
use crate::sink::{AckCallback, DeliveryReceipt, OutboundMessage, Sink};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Kafka sink.
pub struct KafkaSink {
    producer: FutureProducer,
    config: TransportConfig,
    closed: AtomicBool,
}

impl KafkaSink {
    /// Create a producer from the transport configuration.
    pub fn new(config: TransportConfig) -> Result<Self, SinkError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("message.timeout.ms", "30000")
            .set("queue.buffering.max.messages", "100000")
            .set("queue.buffering.max.kbytes", "1048576")
            .set("batch.size", "65536")
            .set("linger.ms", "5");
        for (key, value) in &config.properties {
            client_config.set(key, value);
        }

        let producer: FutureProducer = client_config.create()?;
        info!("Created Kafka producer for {}", config.bootstrap_servers);

        Ok(Self {
            producer,
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// Create each topic unless it already exists.
    pub async fn create_topics(&self, topics: &[String]) -> Result<(), SinkError> {
        if topics.is_empty() {
            return Ok(());
        }

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.config.bootstrap_servers)
            .create()?;

        let new_topics: Vec<NewTopic<'_>> = topics
            .iter()
            .map(|topic| {
                NewTopic::new(
                    topic,
                    self.config.partitions,
                    TopicReplication::Fixed(self.config.replication_factor),
                )
            })
            .collect();
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(10)));

        let results = admin_client
            .create_topics(&new_topics, &opts)
            .await
            .map_err(|e| SinkError::TopicCreation(format!("Failed to create topics: {e}")))?;

        for result in results {
            match result {
                Ok(topic_name) => info!("Topic '{}' created successfully", topic_name),
                Err((topic_name, err)) => {
                    let err_str = err.to_string();
                    if err_str.contains("already exists")
                        || err_str.contains("TopicExistsException")
                    {
                        info!("Topic '{}' already exists", topic_name);
                    } else {
                        return Err(SinkError::TopicCreation(format!(
                            "Failed to create topic {topic_name}: {err}"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Sink for KafkaSink {
    fn send(&self, message: OutboundMessage, on_ack: AckCallback) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        let mut record: FutureRecord<'_, [u8], [u8]> =
            FutureRecord::to(&message.topic).payload(message.value.as_slice());
        if let Some(key) = message.key.as_deref() {
            record = record.key(key);
        }

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(err, _)| match err {
                KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull) => SinkError::QueueFull,
                err => SinkError::Kafka(err),
            })?;

        let topic = message.topic;
        tokio::spawn(async move {
            let outcome = match delivery.await {
                Ok(Ok(_)) => Ok(DeliveryReceipt { topic }),
                Ok(Err((err, _))) => Err(SinkError::Kafka(err)),
                Err(_) => Err(SinkError::Canceled),
            };
            on_ack(outcome);
        });

        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> usize {
        let producer = self.producer.clone();
        let flushed = tokio::task::spawn_blocking(move || {
            if let Err(e) = producer.flush(Timeout::After(timeout)) {
                debug!("Kafka flush returned before completion: {e}");
            }
            producer.in_flight_count()
        })
        .await;

        match flushed {
            Ok(pending) => usize::try_from(pending).unwrap_or(0),
            Err(e) => {
                warn!("Kafka flush task failed: {e}");
                usize::try_from(self.producer.in_flight_count()).unwrap_or(0)
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending = self.flush(Duration::from_secs(5)).await;
        if pending > 0 {
            warn!("Closing Kafka producer with {} undelivered message(s)", pending);
        }
        info!("Kafka producer closed");
    }
}
