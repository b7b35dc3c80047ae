use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use minutecount::config::MinutecountConfig;
use minutecount::counter::CounterEngine;
use minutecount::ingest::{spawn_sweeper, Ingester};

/// Count JSON-lines events over a rolling window and report the totals.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Event input, `-` for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Window, in minutes, of the final report
    #[arg(short, long)]
    minutes: Option<i64>,

    /// Seconds between progress reports
    #[arg(long)]
    report_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("Starting minutecount");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = MinutecountConfig::load(args.config.as_deref())?;
    if let Some(minutes) = args.minutes {
        config.ingest.report_minutes = Some(minutes);
    }
    if let Some(interval) = args.report_interval {
        config.ingest.report_interval_secs = interval;
    }
    config.ingest.validate()?;
    info!(
        window_minutes = config.counter.window_minutes,
        granularity_secs = config.counter.bucket_granularity_secs,
        precision = config.counter.precision,
        "Configuration loaded"
    );

    let engine = Arc::new(CounterEngine::new(&config.counter)?);
    let sweeper = config
        .counter
        .sweep_interval()
        .map(|interval| spawn_sweeper(Arc::clone(&engine), interval));

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = if args.input == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        info!(path = %args.input, "Reading events from file");
        Box::new(BufReader::new(tokio::fs::File::open(&args.input).await?))
    };

    let ingester = Ingester::new(Arc::clone(&engine), config.ingest.clone());
    ingester.run_with_shutdown(reader, stop_requested()).await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    let report = engine.report(config.ingest.report_minutes)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!("minutecount stopped");
    Ok(())
}

/// Resolve once the process is asked to stop, leaving the final report to
/// be printed. A signal whose handler cannot be installed is never awaited.
async fn stop_requested() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let name = tokio::select! {
        _ = interrupt => "interrupt",
        _ = terminate => "SIGTERM",
    };
    info!(signal = name, "Stopping ingest and writing the final report");
}
