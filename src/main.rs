//! Command-line interface for topic-cli
//!
//! # Usage Examples
//!
//! ## Produce
//! ```bash
//! # One record per line; finish with Ctrl+D
//! topic-cli topic produce orders --bootstrap localhost:9092
//!
//! # Keyed records with a static header
//! topic-cli topic produce orders --bootstrap localhost:9092 \
//!   --parse-key --delimiter : --header source:cli
//!
//! # Protobuf values with imported definitions
//! topic-cli topic produce orders --bootstrap localhost:9092 \
//!   --value-format protobuf --schema order.proto --references refs.json \
//!   --schema-registry-endpoint http://localhost:8081
//! ```
//!
//! ## Consume
//! ```bash
//! # Everything from the beginning, with keys and timestamps
//! topic-cli topic consume orders --bootstrap localhost:9092 \
//!   --from-beginning --print-key --timestamp
//!
//! # Resume a named group from its committed offsets
//! topic-cli topic consume orders --bootstrap localhost:9092 --group audit
//! ```
//!
//! Records go to stdout; logs and diagnostics go to stderr (`RUST_LOG`
//! controls verbosity, `warn` by default).

use clap::Parser;
use topic_cli::{run_consume, run_produce, suggestions, Cli, Commands, TopicCommand};
use topic_cli_kafka::setup_shutdown_handler;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        let hints = suggestions(&e);
        if !hints.is_empty() {
            eprintln!("\nSuggestions:");
            for hint in hints {
                eprintln!("    {hint}");
            }
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Stdout carries records only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut shutdown = setup_shutdown_handler();

    match cli.command {
        Commands::Topic { command } => match command {
            TopicCommand::Produce(args) => {
                let summary = run_produce(args, &mut shutdown).await?;
                if summary.failed > 0 {
                    tracing::warn!(
                        "{} records produced, {} failed",
                        summary.produced,
                        summary.failed
                    );
                } else {
                    tracing::info!("{} records produced", summary.produced);
                }
            }
            TopicCommand::Consume(args) => {
                let summary = run_consume(args, &mut shutdown).await?;
                tracing::info!(
                    "{} records printed, {} skipped",
                    summary.emitted,
                    summary.skipped
                );
            }
        },
    }

    Ok(())
}
