//! Master data loading.
//!
//! Every master type is realized from its source in generation order. Its
//! identifiers are committed to the [`ReferencePool`] in batches, and each
//! row may also be published to the type's topic. Any failure aborts the
//! whole load.

use crate::error::{GeneratorError, LoadError};
use crate::source::open_source;
use crate::{entity_rng, RngStream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use streamgen_core::{
    CorrelationConfig, MasterEntitySpec, RateLimiter, Record, ReferencePool, ShutdownCoordinator,
    Value,
};
use streamgen_sink::{DrainingSink, SinkError};
use tracing::{debug, info};

/// Identifiers committed to the pool per write.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Outcome of loading one master type.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterLoadStats {
    pub entity_type: String,
    /// Rows read from the source
    pub rows: u64,
    /// Rows handed to the sink
    pub published: u64,
    pub duration: Duration,
}

/// Loads every master type into the reference pool.
pub struct MasterDataGenerator {
    config: Arc<CorrelationConfig>,
    pool: Arc<ReferencePool>,
    shutdown: Arc<ShutdownCoordinator>,
    sink: Option<Arc<DrainingSink>>,
    batch_size: usize,
}

impl MasterDataGenerator {
    pub fn new(
        config: Arc<CorrelationConfig>,
        pool: Arc<ReferencePool>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            config,
            pool,
            shutdown,
            sink: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Publish rows of master types that declare a `sink_topic`.
    pub fn with_sink(mut self, sink: Arc<DrainingSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Load every master type in generation order.
    pub async fn load_all(&self) -> Result<Vec<MasterLoadStats>, LoadError> {
        let masters: Vec<String> = self.config.master_order().map(str::to_string).collect();
        info!("Loading {} master type(s)", masters.len());

        let mut stats = Vec::with_capacity(masters.len());
        for name in &masters {
            stats.push(self.load_type(name).await?);
        }

        info!(
            "Master load complete: {} identifier(s) across {} type(s)",
            self.pool.size(),
            masters.len()
        );
        Ok(stats)
    }

    /// Load a single master type. Types it references must already be loaded.
    pub async fn load_type(&self, name: &str) -> Result<MasterLoadStats, LoadError> {
        let Some(spec) = self.config.get_master_config(name) else {
            return Err(LoadError::Relationship {
                entity_type: name.to_string(),
                source: GeneratorError::TypeNotFound(name.to_string()),
            });
        };
        let position = self
            .config
            .generation_order()
            .iter()
            .position(|n| n == name)
            .unwrap_or_default();
        let seed = self.config.seed();

        let started = Instant::now();
        let source = open_source(&spec.source, entity_rng(seed, position, RngStream::Rows))
            .map_err(|source| LoadError::Source {
                entity_type: name.to_string(),
                source,
            })?;
        info!("Loading master type '{}' from {}", name, source.describe());

        let mut reference_rng = entity_rng(seed, position, RngStream::References);
        let topic = self.sink.as_ref().and(spec.sink_topic.as_deref());
        let mut limiter = RateLimiter::new(spec.rate_per_second);
        let mut batch: Vec<Value> = Vec::with_capacity(self.batch_size);
        let mut rows = 0u64;
        let mut published = 0u64;

        for row in source {
            if self.shutdown.is_shutting_down() {
                return Err(LoadError::Interrupted);
            }

            let row = row.map_err(|source| LoadError::Source {
                entity_type: name.to_string(),
                source,
            })?;
            let mut record = Record::new(name, rows, row);

            for relationship in self.config.relationships_of(name) {
                let target = &relationship.target.target_entity_type;
                let id = self
                    .pool
                    .get_random_with(target, &mut reference_rng)
                    .map_err(|_| LoadError::Relationship {
                        entity_type: name.to_string(),
                        source: GeneratorError::EmptyPool {
                            field: relationship.field.clone(),
                            entity_type: target.clone(),
                        },
                    })?;
                record.set(relationship.field.clone(), id);
            }

            batch.push(extract_id(name, spec, &record)?);
            rows += 1;

            if let (Some(sink), Some(topic)) = (&self.sink, topic) {
                limiter.wait().await;
                sink.send_record(topic, &record, Some(&spec.id_field))
                    .await
                    .map_err(|e| match e {
                        SinkError::ShuttingDown => LoadError::Interrupted,
                        other => LoadError::Publish {
                            entity_type: name.to_string(),
                            source: other,
                        },
                    })?;
                published += 1;
            }

            if batch.len() >= self.batch_size {
                self.commit(name, &mut batch);
                tokio::task::yield_now().await;
            }
        }

        // Always commit, so an empty source still registers the type.
        self.commit(name, &mut batch);

        let stats = MasterLoadStats {
            entity_type: name.to_string(),
            rows,
            published,
            duration: started.elapsed(),
        };
        info!(
            "Loaded master type '{}': {} row(s), {} published in {:?}",
            name, stats.rows, stats.published, stats.duration
        );
        Ok(stats)
    }

    fn commit(&self, name: &str, batch: &mut Vec<Value>) {
        debug!("Committing {} identifier(s) for '{}'", batch.len(), name);
        self.pool.add_references(name, batch.drain(..));
    }
}

fn extract_id(name: &str, spec: &MasterEntitySpec, record: &Record) -> Result<Value, LoadError> {
    record
        .get(&spec.id_field)
        .filter(|value| !value.is_null())
        .cloned()
        .ok_or_else(|| LoadError::MissingIdField {
            entity_type: name.to_string(),
            row: record.index,
            id_field: spec.id_field.clone(),
        })
}
