//! Core counter engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use super::backend::{Counter, Increment};
use super::clock::{Clock, SystemClock, TokenSource};
use super::family::{Family, SeriesKey};
use super::series::WindowSpec;
use super::store::{CounterStore, SweepStats};
use crate::config::CounterConfig;
use crate::error::Result;

/// Totals of one series, as reported by [`CounterEngine::report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesReport {
    /// Family of the series
    pub family: Family,
    /// Entity id within the family
    pub key: u64,
    /// Events in the reported window
    pub total: u64,
    /// Approximate distinct events in the reported window
    pub unique: u64,
}

/// Every resident series at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Time the report was taken
    pub generated_at: DateTime<Utc>,
    /// Window length in minutes
    pub minutes: u32,
    /// One entry per series, ordered by family then key
    pub series: Vec<SeriesReport>,
}

/// The in-memory counter.
///
/// Fans each increment out to the global series and to the team, project and
/// group series it names, and answers window queries against them.
///
/// When an increment has `amount > 1` and no token, every one of its events
/// gets its own synthesized token, so they count as distinct. With a token,
/// all of its events share it and count once, unless `is_new` is set, which
/// makes every event count.
pub struct CounterEngine {
    store: CounterStore,
    clock: Arc<dyn Clock>,
    tokens: TokenSource,
}

impl CounterEngine {
    /// Create an engine reading the wall clock.
    pub fn new(config: &CounterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine reading `clock`.
    pub fn with_clock(config: &CounterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let spec = WindowSpec::new(config)?;
        debug!(
            window_minutes = spec.window_minutes(),
            buckets = spec.capacity(),
            granularity_secs = spec.granularity_secs(),
            precision = spec.sketch().precision,
            exact_threshold = spec.sketch().exact_threshold,
            "Creating counter engine"
        );

        Ok(Self {
            store: CounterStore::new(spec),
            clock,
            tokens: TokenSource::new(),
        })
    }

    /// Events for `(family, key)` over the last `minutes` ending at `now`.
    pub fn total_at(
        &self,
        family: Family,
        key: u64,
        now: DateTime<Utc>,
        minutes: Option<i64>,
    ) -> Result<u64> {
        self.store.query_total(family, key, now, minutes)
    }

    /// Distinct events for `(family, key)` over the last `minutes` ending at `now`.
    pub fn unique_at(
        &self,
        family: Family,
        key: u64,
        now: DateTime<Utc>,
        minutes: Option<i64>,
    ) -> Result<u64> {
        self.store.query_unique(family, key, now, minutes)
    }

    /// Totals of every resident series over the last `minutes`.
    pub fn report(&self, minutes: Option<i64>) -> Result<Report> {
        let now = self.clock.now();
        let window = self.store.spec().resolve_minutes(minutes)?;
        let minutes = Some(i64::from(window));

        let series = self
            .store
            .keys()
            .into_iter()
            .map(|SeriesKey { family, key }| {
                Ok(SeriesReport {
                    family,
                    key,
                    total: self.total_at(family, key, now, minutes)?,
                    unique: self.unique_at(family, key, now, minutes)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Report {
            generated_at: now,
            minutes: window,
            series,
        })
    }

    /// Reclaim buckets and series that fell out of the window.
    pub fn sweep(&self) -> SweepStats {
        self.store.sweep(self.clock.now())
    }

    /// The underlying store.
    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    /// The current time according to the engine's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Counter for CounterEngine {
    fn incr(&self, increment: Increment) {
        if increment.amount == 0 {
            return;
        }

        let now = increment.now.unwrap_or_else(|| self.clock.now());
        trace!(
            amount = increment.amount,
            team_id = ?increment.team_id,
            project_id = ?increment.project_id,
            group_id = ?increment.group_id,
            is_new = increment.is_new,
            "Recording increment"
        );

        for _ in 0..increment.amount {
            let token = increment
                .token
                .unwrap_or_else(|| self.tokens.next_token());
            for (family, key) in increment.targets() {
                self.store
                    .increment_family(family, key, now, increment.is_new, token);
            }
        }
    }

    fn total(&self, family: Family, key: u64, minutes: Option<i64>) -> Result<u64> {
        self.total_at(family, key, self.clock.now(), minutes)
    }

    fn unique(&self, family: Family, key: u64, minutes: Option<i64>) -> Result<u64> {
        self.unique_at(family, key, self.clock.now(), minutes)
    }
}
