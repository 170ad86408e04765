//! # xarb-runner
//!
//! Main entry point for the spread detection system.
//!
//! Loads a JSON configuration file, connects every configured exchange under
//! its own circuit breaker, feeds each (exchange, symbol) stream into a shared
//! spread detector and logs the resulting analyses.
//!
//! # Usage
//!
//! ```bash
//! xarb-runner config.json --log-level info
//! ```

mod pipeline;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use xarb_core::circuit_breaker::CircuitBreaker;
use xarb_core::logging::LogFormat;
use xarb_md::ExchangeConnector;
use xarb_md::guard::{RetryPolicy, connect_with_retry};
use xarb_md::ingestion::ExchangeDataIngestion;
use xarb_md::normalizer::ExchangeNormalizer;
use xarb_signal::SpreadDetector;

/// Cross-Exchange Spread Detection Runner.
#[derive(Parser)]
#[command(name = "xarb-runner", about = "Cross-Exchange Spread Detection Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output (overrides `module.log_path`).
    #[arg(long)]
    log_dir: Option<String>,

    /// Log file format (text, json).
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = xarb_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    xarb_core::logging::init_logging(
        &cli.log_level,
        log_dir.as_deref(),
        &config.module_name(),
        cli.log_format,
    )?;

    info!("xarb-runner starting, config={}, log_level={}", cli.config.display(), cli.log_level);
    config.validate().context("invalid configuration")?;
    info!(
        "config loaded: {} connection(s), {} symbol(s)",
        config.connections.len(),
        config.symbols.len()
    );

    // 3. Create and connect connectors from the connections array
    let mut connectors: Vec<Arc<dyn ExchangeConnector>> = Vec::new();

    for (idx, conn_config) in config.connections.iter().enumerate() {
        let connector = match xarb_md::registry::create_connector(conn_config) {
            Ok(connector) => connector,
            Err(e) => {
                error!("connection[{idx}]: failed to create connector for '{}': {e:#}", conn_config.exchange);
                continue;
            }
        };

        if let Some(events) = connector.connection_events() {
            tokio::spawn(pipeline::log_events(events));
        }

        let breaker = CircuitBreaker::new(config.circuit_breaker).with_label(conn_config.exchange.clone());
        let policy = RetryPolicy {
            max_attempts: conn_config.effective_max_connect_attempts(),
            ..RetryPolicy::default()
        };
        match connect_with_retry(connector.as_ref(), &breaker, policy).await {
            Ok(()) => connectors.push(connector),
            Err(e) => error!("connection[{idx}]: '{}' unavailable: {e}", conn_config.exchange),
        }
    }

    if connectors.len() < 2 {
        warn!("only {} exchange(s) connected, no spreads can be found", connectors.len());
    }

    // 4. Wire ingestion into the detector
    let detector = Arc::new(SpreadDetector::new(config.detector.clone()));
    let analyses = detector.analysis_stream().context("analysis stream already taken")?;
    let consumer = tokio::spawn(pipeline::log_analyses(analyses));

    let ingestion = ExchangeDataIngestion::new(Arc::new(ExchangeNormalizer::new(config.normalizer)));
    let mut feeds = pipeline::spawn_feeds(&connectors, &config.symbols, &ingestion, &detector);
    info!("{} feed(s) started, press Ctrl+C to stop", feeds.len());

    // 5. Wait for shutdown signal or for every feed to end
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown signal received");
        }
        summaries = pipeline::wait_feeds(&mut feeds) => {
            info!("all {} feed(s) ended", summaries.len());
        }
    }

    // 6. Stop feeds, then connectors
    feeds.abort_all();
    pipeline::wait_feeds(&mut feeds).await;
    drop(detector);

    for connector in &connectors {
        info!("disconnecting '{}'", connector.exchange());
        connector.disconnect().await;
    }

    let tally = consumer.await?;
    info!(
        "{} analysis(es), {} profitable, goodbye",
        tally.total, tally.profitable
    );
    Ok(())
}
