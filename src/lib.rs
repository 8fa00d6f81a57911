//! streamgen
//!
//! Generates correlated streaming test data: master entities (customers,
//! products, ...) are loaded first and their identifiers kept in a shared
//! reference pool; transactional entities (orders, payments, ...) are then
//! produced at a configured rate with every relationship field pointing at
//! an identifier known to exist.
//!
//! # Crates
//!
//! - `streamgen_core` - config, reference pool, rate limiting, shutdown
//! - `streamgen_sink` - Kafka / memory / console transports and the drain wrapper
//! - `streamgen_generator` - row sources, master loader, correlated generator
//!
//! # CLI Usage
//!
//! ```bash
//! # Check a correlation config and print its generation order
//! streamgen validate --config shop.yaml
//!
//! # Produce to Kafka
//! streamgen generate --config shop.yaml --transport-config kafka.yaml
//!
//! # Print records to stdout instead
//! streamgen generate --config shop.yaml --dry-run --seed 42
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use streamgen_sink::TransportConfig;

pub mod metrics;
pub mod run;

pub use metrics::{GenerationMetrics, RunSummary, WorkerFailure};
pub use run::{run_generation, RunOptions};

/// Transport selection shared by commands that produce.
#[derive(Parser, Clone, Debug)]
pub struct TransportOpts {
    /// Transport config YAML (bootstrap servers, producer properties, topic creation)
    #[arg(long, short = 't')]
    pub transport_config: Option<PathBuf>,

    /// Kafka brokers; overrides `bootstrap_servers` from the transport config
    #[arg(long, env = "KAFKA_BROKERS")]
    pub bootstrap_servers: Option<String>,

    /// Write records to stdout as JSON lines instead of Kafka
    #[arg(long)]
    pub dry_run: bool,
}

impl TransportOpts {
    /// Resolve the transport config from file, overrides and defaults.
    pub fn load(&self) -> anyhow::Result<TransportConfig> {
        let mut config = match &self.transport_config {
            Some(path) => TransportConfig::from_file(path)
                .with_context(|| format!("Failed to load transport config from {path:?}"))?,
            None => TransportConfig::default(),
        };
        if let Some(servers) = &self.bootstrap_servers {
            config.bootstrap_servers = servers.clone();
        }
        Ok(config)
    }
}
