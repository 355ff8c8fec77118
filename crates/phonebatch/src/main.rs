//! phonebatch - bulk phone number lookup
//!
//! Usage:
//!   # Connection settings from .env / environment
//!   phonebatch data/PE_people.csv
//!
//!   # Explicit output file, slower pace
//!   phonebatch data/PE_people.csv \
//!     --output /srv/exports/pe_phones.csv \
//!     --batch-size 200 \
//!     --throttle 1.0

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use phonebatch::sink::ResultSink;
use phonebatch::source::RecordSource;
use phonebatch::{Cli, Orchestrator};
use phonebatch_rdbc::sqlserver::SqlServerConnectionFactory;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = cli.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let config = cli.to_run_config()?;
    let output = cli.output_path(chrono::Local::now().naive_local());

    let source = RecordSource::open(&cli.input, &config.input, config.batch_size)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let sink = ResultSink::create(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;

    info!(
        "Resolving {} -> {} (batch size {}, max retries {})",
        cli.input.display(),
        output.display(),
        config.batch_size,
        config.retry.max_retries
    );

    let mut orchestrator =
        Orchestrator::new(&config, Arc::new(SqlServerConnectionFactory::new()), sink)?;
    let summary = orchestrator.run(source).await?;
    summary.log();

    Ok(())
}
