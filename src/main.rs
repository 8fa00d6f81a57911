//! Command-line interface for streamgen
//!
//! # Usage Examples
//!
//! ```bash
//! # Validate a correlation config
//! streamgen validate --config shop.yaml
//!
//! # Generate into Kafka, creating topics from the transport config
//! streamgen generate \
//!   --config shop.yaml \
//!   --transport-config kafka.yaml \
//!   --drain-timeout-secs 60
//!
//! # Deterministic dry run to stdout
//! streamgen generate --config shop.yaml --dry-run --seed 42
//!
//! # Inside docker-compose: wait for the broker before first contact
//! STREAMGEN_CONTAINERIZED=true streamgen generate --config shop.yaml -t kafka.yaml
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamgen::{run_generation, RunOptions, TransportOpts};
use streamgen_core::{CorrelationConfig, EntityKind, ShutdownCoordinator};
use streamgen_sink::{ConsoleSink, KafkaSink, Sink};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "streamgen")]
#[command(about = "Correlated streaming test data generator")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load master data and stream correlated transactional records
    Generate(GenerateArgs),

    /// Validate a correlation config and print its generation order
    Validate {
        /// Correlation config YAML
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Correlation config YAML
    #[arg(long, short = 'c')]
    config: PathBuf,

    #[command(flatten)]
    transport: TransportOpts,

    /// Random seed for deterministic generation (overrides the config seed)
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds to wait for in-flight acknowledgments at shutdown
    #[arg(long, default_value = "30")]
    drain_timeout_secs: u64,

    /// Do not publish master rows, only load them into the reference pool
    #[arg(long)]
    no_publish_master: bool,

    /// Identifiers committed to the reference pool per write
    #[arg(long, default_value = "1000")]
    batch_size: usize,

    /// Running under a container orchestrator; delay first transport contact
    #[arg(long, env = "STREAMGEN_CONTAINERIZED")]
    containerized: bool,

    /// Startup delay applied when containerized
    #[arg(long, default_value = "10")]
    startup_delay_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Logs go to stderr so dry-run records own stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("streamgen=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => run_generate(args).await,
        Commands::Validate { config } => run_validate(config),
    }
}

fn load_config(path: &PathBuf) -> anyhow::Result<CorrelationConfig> {
    CorrelationConfig::from_file(path)
        .with_context(|| format!("Failed to load correlation config from {path:?}"))
}

fn run_validate(path: PathBuf) -> anyhow::Result<()> {
    let config = load_config(&path)?;

    println!("Generation order:");
    for (position, name) in config.generation_order().iter().enumerate() {
        let (kind, topic) = match config.entity_kind(name) {
            Some(EntityKind::Master) => (
                "master",
                config
                    .get_master_config(name)
                    .and_then(|spec| spec.sink_topic.clone()),
            ),
            _ => (
                "transactional",
                config
                    .get_transaction_config(name)
                    .map(|spec| spec.sink_topic.clone()),
            ),
        };
        let depends = config.dependencies_of(name).join(", ");
        println!(
            "  {}. {} ({}) topic={} depends_on=[{}]",
            position + 1,
            name,
            kind,
            topic.as_deref().unwrap_or("-"),
            depends
        );
    }
    Ok(())
}

async fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    info!(
        "Loaded correlation config: {} type(s), seed={:?}",
        config.generation_order().len(),
        config.seed()
    );

    let shutdown = Arc::new(ShutdownCoordinator::new());
    shutdown.install_signal_handlers();

    let sink: Arc<dyn Sink> = if args.transport.dry_run {
        info!("Dry run: writing records to stdout");
        Arc::new(ConsoleSink::new())
    } else {
        let transport = args.transport.load()?;

        if args.containerized && args.startup_delay_secs > 0 {
            info!(
                "Containerized run: waiting {}s before contacting {}",
                args.startup_delay_secs, transport.bootstrap_servers
            );
            tokio::time::sleep(Duration::from_secs(args.startup_delay_secs)).await;
        }

        let create_topics = transport.create_topics;
        let kafka = KafkaSink::new(transport).context("Failed to create Kafka producer")?;
        if create_topics {
            kafka
                .create_topics(&config.topics())
                .await
                .context("Failed to create topics")?;
        }
        Arc::new(kafka)
    };

    let options = RunOptions {
        drain_timeout: Duration::from_secs(args.drain_timeout_secs),
        publish_master: !args.no_publish_master,
        batch_size: args.batch_size,
    };
    let summary = run_generation(config, sink, shutdown, options).await?;

    if !summary.is_success() {
        let failed: Vec<&str> = summary
            .failures
            .iter()
            .map(|f| f.entity_type.as_str())
            .collect();
        anyhow::bail!(
            "{} worker(s) terminated with errors: {}",
            failed.len(),
            failed.join(", ")
        );
    }

    info!(
        "Generation complete: {} record(s), {} acknowledged, {} delivery failure(s)",
        summary.total_records(),
        summary.delivery.acknowledged,
        summary.delivery.failed
    );
    Ok(())
}
