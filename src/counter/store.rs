//! Ownership and routing of every counter series.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::family::{Family, SeriesKey};
use super::series::{BucketSnapshot, KeyedCounterSeries, WindowSpec};
use crate::error::Result;

/// Outcome of a [`CounterStore::sweep`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Buckets evicted across all series
    pub buckets_evicted: usize,
    /// Series dropped because no bucket was left
    pub series_removed: usize,
}

/// Maps `(family, key)` pairs to their series.
///
/// The map is sharded, and each series sits behind its own mutex, so
/// increments to different pairs never wait on each other while increments
/// to the same pair are serialized.
pub struct CounterStore {
    spec: WindowSpec,
    series: DashMap<SeriesKey, Arc<Mutex<KeyedCounterSeries>>>,
}

impl CounterStore {
    /// Create an empty store whose series follow `spec`.
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            series: DashMap::new(),
        }
    }

    /// The window shape of every series.
    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Record one event against the `(family, key)` series.
    pub fn increment_family(
        &self,
        family: Family,
        key: u64,
        now: DateTime<Utc>,
        is_new: bool,
        token: u64,
    ) {
        let series_key = SeriesKey::new(family, key);
        trace!(key = %series_key, is_new = is_new, "Incrementing series");

        let series = self.get_or_create(series_key);
        series.lock().increment(now, is_new, token);
    }

    /// Events recorded for `(family, key)` over the last `minutes` buckets.
    pub fn query_total(
        &self,
        family: Family,
        key: u64,
        now: DateTime<Utc>,
        minutes: Option<i64>,
    ) -> Result<u64> {
        let minutes = self.spec.resolve_minutes(minutes)?;
        Ok(self
            .get(SeriesKey::new(family, key))
            .map_or(0, |s| s.lock().range_total(now, minutes)))
    }

    /// Distinct events recorded for `(family, key)` over the last `minutes` buckets.
    pub fn query_unique(
        &self,
        family: Family,
        key: u64,
        now: DateTime<Utc>,
        minutes: Option<i64>,
    ) -> Result<u64> {
        let minutes = self.spec.resolve_minutes(minutes)?;
        Ok(self
            .get(SeriesKey::new(family, key))
            .map_or(0, |s| s.lock().range_unique(now, minutes)))
    }

    /// Per-bucket view of one series, empty if it was never incremented.
    pub fn snapshot(&self, family: Family, key: u64, now: DateTime<Utc>) -> Vec<BucketSnapshot> {
        self.get(SeriesKey::new(family, key))
            .map(|s| s.lock().snapshot(now))
            .unwrap_or_default()
    }

    /// Evict stale buckets from every series and drop the emptied series.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepStats {
        let mut stats = SweepStats::default();
        self.series.retain(|key, series| {
            let mut series = series.lock();
            stats.buckets_evicted += series.evict_stale(now);
            if series.is_empty() {
                trace!(key = %key, "Dropping empty series");
                stats.series_removed += 1;
                false
            } else {
                true
            }
        });

        debug!(
            buckets_evicted = stats.buckets_evicted,
            series_removed = stats.series_removed,
            series_remaining = self.series.len(),
            "Swept counter store"
        );
        stats
    }

    /// Keys of every resident series, sorted.
    pub fn keys(&self) -> Vec<SeriesKey> {
        let mut keys: Vec<SeriesKey> = self.series.iter().map(|e| *e.key()).collect();
        keys.sort();
        keys
    }

    /// Get the number of resident series.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Clear all series.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.series.clear();
    }

    fn get(&self, key: SeriesKey) -> Option<Arc<Mutex<KeyedCounterSeries>>> {
        self.series.get(&key).map(|e| Arc::clone(e.value()))
    }

    fn get_or_create(&self, key: SeriesKey) -> Arc<Mutex<KeyedCounterSeries>> {
        if let Some(series) = self.get(key) {
            return series;
        }

        // The entry guard holds the shard lock, so racing first touches agree
        // on a single series.
        let entry = self.series.entry(key).or_insert_with(|| {
            debug!(key = %key, capacity = self.spec.capacity(), "Creating new counter series");
            Arc::new(Mutex::new(KeyedCounterSeries::new(self.spec)))
        });
        Arc::clone(entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CounterConfig;
    use crate::counter::sketch::hash_token;
    use crate::error::CounterError;
    use chrono::TimeZone;
    use std::thread;

    fn at_minute(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(minute * 60, 0).unwrap()
    }

    fn default_store() -> CounterStore {
        CounterStore::new(WindowSpec::new(&CounterConfig::default()).unwrap())
    }

    #[test]
    fn test_store_creation() {
        let store = default_store();
        assert_eq!(store.series_count(), 0);
    }

    #[test]
    fn test_unseen_key_reads_zero() {
        let store = default_store();
        assert_eq!(store.query_total(Family::Group, 9, at_minute(1), None).unwrap(), 0);
        assert_eq!(store.query_unique(Family::Group, 9, at_minute(1), Some(3)).unwrap(), 0);
        assert!(store.snapshot(Family::Group, 9, at_minute(1)).is_empty());
        assert_eq!(store.series_count(), 0);
    }

    #[test]
    fn test_invalid_minutes_rejected_even_for_unseen_key() {
        let store = default_store();
        let err = store.query_total(Family::Team, 1, at_minute(1), Some(0)).unwrap_err();
        assert!(matches!(err, CounterError::InvalidArgument(_)));
    }

    #[test]
    fn test_increment_creates_series() {
        let store = default_store();
        store.increment_family(Family::Project, 7, at_minute(5), false, hash_token("a"));
        store.increment_family(Family::Project, 7, at_minute(5), false, hash_token("b"));

        assert_eq!(store.series_count(), 1);
        assert_eq!(store.query_total(Family::Project, 7, at_minute(5), Some(1)).unwrap(), 2);
        assert_eq!(store.keys(), vec![SeriesKey::new(Family::Project, 7)]);
    }

    #[test]
    fn test_same_key_in_different_families_is_separate() {
        let store = default_store();
        store.increment_family(Family::Team, 1, at_minute(5), false, hash_token("a"));
        store.increment_family(Family::Group, 1, at_minute(5), false, hash_token("a"));
        store.increment_family(Family::Group, 1, at_minute(5), false, hash_token("b"));

        assert_eq!(store.query_total(Family::Team, 1, at_minute(5), None).unwrap(), 1);
        assert_eq!(store.query_total(Family::Group, 1, at_minute(5), None).unwrap(), 2);
    }

    #[test]
    fn test_sweep_drops_stale_series() {
        let store = default_store();
        store.increment_family(Family::Group, 1, at_minute(0), false, hash_token("a"));
        store.increment_family(Family::Group, 2, at_minute(10), false, hash_token("b"));

        let stats = store.sweep(at_minute(20));
        assert_eq!(
            stats,
            SweepStats {
                buckets_evicted: 1,
                series_removed: 1,
            }
        );
        assert_eq!(store.keys(), vec![SeriesKey::new(Family::Group, 2)]);
    }

    #[test]
    fn test_clear() {
        let store = default_store();
        store.increment_family(Family::Global, 0, at_minute(0), false, hash_token("a"));
        store.clear();
        assert_eq!(store.series_count(), 0);
    }

    #[test]
    fn test_parallel_increments_same_key() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 1_000;

        let store = Arc::new(default_store());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        store.increment_family(
                            Family::Project,
                            1,
                            at_minute(3),
                            false,
                            hash_token(&(t, i)),
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.series_count(), 1);
        assert_eq!(
            store.query_total(Family::Project, 1, at_minute(3), Some(1)).unwrap(),
            THREADS * PER_THREAD
        );
    }

    #[test]
    fn test_parallel_first_touch_creates_one_series() {
        for _ in 0..50 {
            let store = Arc::new(default_store());
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        store.increment_family(Family::Team, 5, at_minute(1), false, hash_token("x"));
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(store.series_count(), 1);
            assert_eq!(store.query_total(Family::Team, 5, at_minute(1), None).unwrap(), 4);
        }
    }
}
