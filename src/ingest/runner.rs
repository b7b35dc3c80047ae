//! Ingest loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use super::event::parse_line;
use crate::config::IngestConfig;
use crate::counter::{Counter, CounterEngine};
use crate::error::Result;

/// Counts of what an ingest run processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines turned into increments
    pub accepted: u64,
    /// Lines that failed to parse
    pub rejected: u64,
}

/// Feeds JSON-lines events into a counter engine.
pub struct Ingester {
    /// The engine receiving increments
    engine: Arc<CounterEngine>,
    /// Reporting options
    config: IngestConfig,
}

impl Ingester {
    /// Create a new ingester for `engine`.
    pub fn new(engine: Arc<CounterEngine>, config: IngestConfig) -> Self {
        Self { engine, config }
    }

    /// Process one input line.
    ///
    /// Blank lines are skipped; malformed ones are logged and counted.
    pub fn ingest_line(&self, line: &str, stats: &mut IngestStats) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match parse_line(line) {
            Ok(increment) => {
                self.engine.incr(increment);
                stats.accepted += 1;
            }
            Err(e) => {
                warn!(error = %e, line = %line, "Skipping malformed event");
                stats.rejected += 1;
            }
        }
    }

    /// Read events from `reader` until end of input.
    pub async fn run<R>(&self, reader: R) -> Result<IngestStats>
    where
        R: AsyncBufRead + Unpin,
    {
        self.run_with_shutdown(reader, std::future::pending()).await
    }

    /// Read events from `reader` until end of input or until `signal` resolves.
    ///
    /// A report is logged every `report_interval_secs`. A report that cannot
    /// be built is logged as a warning and ingestion carries on.
    pub async fn run_with_shutdown<R, F>(&self, reader: R, signal: F) -> Result<IngestStats>
    where
        R: AsyncBufRead + Unpin,
        F: std::future::Future<Output = ()>,
    {
        let mut lines = reader.lines();
        let mut stats = IngestStats::default();
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.report_interval_secs.max(1)));
        ticker.tick().await;
        tokio::pin!(signal);

        info!("Ingesting events");
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => self.ingest_line(&line, &mut stats),
                        None => {
                            debug!("End of input");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.log_report(&stats) {
                        warn!(error = %e, "Failed to build progress report");
                    }
                }
                _ = &mut signal => {
                    info!("Shutdown requested, stopping ingest");
                    break;
                }
            }
        }

        info!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            "Ingest finished"
        );
        Ok(stats)
    }

    fn log_report(&self, stats: &IngestStats) -> Result<()> {
        let report = self.engine.report(self.config.report_minutes)?;
        info!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            series = report.series.len(),
            minutes = report.minutes,
            "Ingest progress"
        );
        for series in &report.series {
            debug!(
                family = %series.family,
                key = series.key,
                total = series.total,
                unique = series.unique,
                "Series totals"
            );
        }
        Ok(())
    }
}
