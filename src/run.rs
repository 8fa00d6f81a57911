//! Generation orchestrator.
//!
//! 1. Wrap the sink in a [`DrainingSink`] whose drain runs as a shutdown
//!    cleanup.
//! 2. Load every master type into the reference pool. Any failure aborts
//!    the run before a transactional worker starts.
//! 3. Spawn one worker task per transactional type. A worker whose type
//!    references other transactional types starts producing only once each
//!    of them has registered an identifier.
//! 4. When every worker has finished (limits reached or shutdown), run the
//!    shutdown sequence, which drains the sink.

use crate::metrics::{GenerationMetrics, RunSummary, WorkerFailure};
use anyhow::Context;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use streamgen_core::{CorrelationConfig, EntityKind, ReferencePool, ShutdownCoordinator};
use streamgen_generator::{CorrelatedDataGenerator, GeneratorError, LoadError, MasterDataGenerator};
use streamgen_sink::{DrainingSink, Sink, SinkError, DEFAULT_DRAIN_TIMEOUT};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DEPENDENCY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Knobs for a generation run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Bound on waiting for in-flight acknowledgments at shutdown
    pub drain_timeout: Duration,
    /// Publish master rows for types that declare a `sink_topic`
    pub publish_master: bool,
    /// Identifiers committed to the pool per write during master load
    pub batch_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            publish_master: true,
            batch_size: streamgen_generator::DEFAULT_BATCH_SIZE,
        }
    }
}

/// Types whose worker has finished, for dependency waits.
type Finished = Arc<Mutex<HashSet<String>>>;

/// Run master load and every transactional worker against `sink`.
///
/// Returns once all workers have ended and the shutdown sequence (including
/// the sink drain) has completed. Worker errors are reported in the summary;
/// master load errors are returned as `Err`.
pub async fn run_generation(
    config: CorrelationConfig,
    sink: Arc<dyn Sink>,
    shutdown: Arc<ShutdownCoordinator>,
    options: RunOptions,
) -> anyhow::Result<RunSummary> {
    let config = Arc::new(config);
    let pool = Arc::new(ReferencePool::new());
    let sink = DrainingSink::install(sink, Arc::clone(&shutdown), options.drain_timeout)
        .context("Failed to register sink drain")?;

    info!(
        "Generation order: {}",
        config.generation_order().join(" -> ")
    );

    let mut loader =
        MasterDataGenerator::new(Arc::clone(&config), Arc::clone(&pool), Arc::clone(&shutdown))
            .with_batch_size(options.batch_size);
    if options.publish_master {
        loader = loader.with_sink(Arc::clone(&sink));
    }

    let master_stats = match loader.load_all().await {
        Ok(stats) => stats,
        Err(LoadError::Interrupted) => {
            info!("Shutdown requested during master load; no transactional workers started");
            stop(&shutdown).await;
            return Ok(RunSummary {
                delivery: sink.stats(),
                ..RunSummary::default()
            });
        }
        Err(e) => {
            stop(&shutdown).await;
            return Err(e).context("Master data load failed");
        }
    };
    let masters = master_stats
        .into_iter()
        .map(|stats| GenerationMetrics {
            entity_type: stats.entity_type,
            kind: EntityKind::Master,
            records_generated: stats.rows,
            messages_sent: stats.published,
            send_failures: 0,
            duration: stats.duration,
        })
        .collect();

    let finished: Finished = Arc::default();
    let workers: Vec<(String, JoinHandle<Result<GenerationMetrics, WorkerError>>)> = config
        .transaction_order()
        .map(|name| {
            let worker = Worker {
                entity_type: name.to_string(),
                config: Arc::clone(&config),
                pool: Arc::clone(&pool),
                sink: Arc::clone(&sink),
                shutdown: Arc::clone(&shutdown),
                finished: Arc::clone(&finished),
            };
            (name.to_string(), tokio::spawn(worker.run()))
        })
        .collect();
    info!("Started {} transactional worker(s)", workers.len());

    let mut summary = RunSummary {
        masters,
        ..RunSummary::default()
    };
    for (name, handle) in workers {
        match handle.await {
            Ok(Ok(metrics)) => summary.transactions.push(metrics),
            Ok(Err(e)) => {
                error!("Worker '{}' terminated: {}", name, e.error);
                summary.transactions.push(e.metrics);
                summary.failures.push(WorkerFailure {
                    entity_type: name,
                    reason: e.error.to_string(),
                });
            }
            Err(e) => {
                error!("Worker '{}' did not complete: {}", name, e);
                summary.failures.push(WorkerFailure {
                    entity_type: name,
                    reason: e.to_string(),
                });
            }
        }
    }

    stop(&shutdown).await;
    summary.delivery = sink.stats();
    summary.log();
    Ok(summary)
}

/// Start shutdown if nobody has, then wait for the cleanups to finish.
async fn stop(shutdown: &ShutdownCoordinator) {
    shutdown.initiate_shutdown().await;
    shutdown.wait_stopped().await;
}

struct WorkerError {
    metrics: GenerationMetrics,
    error: GeneratorError,
}

struct Worker {
    entity_type: String,
    config: Arc<CorrelationConfig>,
    pool: Arc<ReferencePool>,
    sink: Arc<DrainingSink>,
    shutdown: Arc<ShutdownCoordinator>,
    finished: Finished,
}

impl Worker {
    async fn run(self) -> Result<GenerationMetrics, WorkerError> {
        let outcome = self.produce().await;
        self.finished.lock().insert(self.entity_type.clone());
        outcome
    }

    async fn produce(&self) -> Result<GenerationMetrics, WorkerError> {
        let mut metrics = GenerationMetrics::new(&self.entity_type, EntityKind::Transactional);
        let started = Instant::now();
        let fail = |metrics: GenerationMetrics, error: GeneratorError| WorkerError { metrics, error };

        if let Err(error) = self.wait_for_dependencies().await {
            return Err(fail(metrics, error));
        }
        if self.shutdown.is_shutting_down() {
            return Ok(metrics);
        }

        let generator =
            CorrelatedDataGenerator::new(&self.config, &self.entity_type, Arc::clone(&self.pool));
        let mut generator = match generator {
            Ok(generator) => generator.with_shutdown(Arc::clone(&self.shutdown)),
            Err(error) => return Err(fail(metrics, error)),
        };
        let topic = generator.spec().sink_topic.clone();
        let key_field = generator.spec().message_key_field().map(str::to_string);
        info!("Worker '{}' producing to topic '{}'", self.entity_type, topic);

        let mut result = Ok(());
        while let Some(next) = generator.next_paced().await {
            let record = match next {
                Ok(record) => record,
                Err(error) => {
                    result = Err(error);
                    break;
                }
            };
            metrics.records_generated += 1;

            match self
                .sink
                .send_record(&topic, &record, key_field.as_deref())
                .await
            {
                Ok(()) => metrics.messages_sent += 1,
                Err(SinkError::ShuttingDown) => {
                    debug!("Worker '{}' stopping: sink is draining", self.entity_type);
                    break;
                }
                Err(e) => {
                    metrics.send_failures += 1;
                    warn!("Worker '{}' send refused: {}", self.entity_type, e);
                }
            }
        }

        metrics.duration = started.elapsed();
        info!(
            "Worker '{}' finished: {} record(s) in {:?}",
            self.entity_type, metrics.records_generated, metrics.duration
        );
        match result {
            Ok(()) => Ok(metrics),
            Err(error) => Err(fail(metrics, error)),
        }
    }

    /// Wait until every referenced transactional type has at least one
    /// identifier. Fails if such a type's worker ended without producing one.
    async fn wait_for_dependencies(&self) -> Result<(), GeneratorError> {
        let upstream: Vec<&str> = self
            .config
            .dependencies_of(&self.entity_type)
            .iter()
            .map(String::as_str)
            .filter(|dep| self.config.entity_kind(dep) == Some(EntityKind::Transactional))
            .collect();

        for dep in upstream {
            debug!("Worker '{}' waiting for '{}'", self.entity_type, dep);
            loop {
                if self.pool.get_type_count(dep) > 0 || self.shutdown.is_shutting_down() {
                    break;
                }
                let dep_finished = self.finished.lock().contains(dep);
                // Re-check the pool: the upstream may have registered its
                // last identifier just before finishing.
                if dep_finished && self.pool.get_type_count(dep) == 0 {
                    let field = self
                        .config
                        .relationships_of(&self.entity_type)
                        .iter()
                        .find(|r| r.target.target_entity_type == dep)
                        .map(|r| r.field.clone())
                        .unwrap_or_default();
                    return Err(GeneratorError::EmptyPool {
                        field,
                        entity_type: dep.to_string(),
                    });
                }
                tokio::time::sleep(DEPENDENCY_POLL_INTERVAL).await;
            }
        }
        Ok(())
    }
}
