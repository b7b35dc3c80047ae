//! Rolling window of buckets for one counter key.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::trace;

use super::bucket::Bucket;
use super::sketch::{SketchParams, UniqueSketch};
use crate::config::CounterConfig;
use crate::error::{CounterError, Result};

/// Shape of every series owned by one store.
///
/// Queries are expressed in minutes and converted to a bucket count using
/// the bucket width, rounding up so a partial bucket is always included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    window_minutes: u32,
    capacity: i64,
    granularity_secs: i64,
    sketch: SketchParams,
}

impl WindowSpec {
    /// Derive the window shape from engine options, validating them first.
    pub fn new(config: &CounterConfig) -> Result<Self> {
        config.validate()?;
        let granularity_secs = i64::try_from(config.bucket_granularity_secs).map_err(|_| {
            CounterError::Config(format!(
                "bucket_granularity_secs is out of range: {}",
                config.bucket_granularity_secs
            ))
        })?;

        let mut spec = Self {
            window_minutes: config.window_minutes,
            capacity: 0,
            granularity_secs,
            sketch: SketchParams {
                precision: config.precision,
                exact_threshold: config.exact_threshold,
            },
        };
        spec.capacity = spec.buckets_for(config.window_minutes);
        Ok(spec)
    }

    /// Length of the window in minutes.
    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }

    /// Maximum number of buckets retained per series.
    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Width of one bucket in seconds.
    pub fn granularity_secs(&self) -> i64 {
        self.granularity_secs
    }

    /// Parameters of each bucket's sketch.
    pub fn sketch(&self) -> SketchParams {
        self.sketch
    }

    /// Floor `now` to the bucket it belongs to.
    pub fn epoch_of(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.granularity_secs)
    }

    /// Number of buckets needed to cover `minutes`, never less than one.
    pub fn buckets_for(&self, minutes: u32) -> i64 {
        let secs = i64::from(minutes) * 60;
        let partial = i64::from(secs % self.granularity_secs != 0);
        (secs / self.granularity_secs + partial).max(1)
    }

    /// Validate a caller supplied window length in minutes.
    ///
    /// `None` means the whole window. Zero or negative values are rejected,
    /// values above the window are clamped to it.
    pub fn resolve_minutes(&self, minutes: Option<i64>) -> Result<u32> {
        match minutes {
            None => Ok(self.window_minutes),
            Some(m) if m <= 0 => Err(CounterError::InvalidArgument(format!(
                "minutes must be positive, got {}",
                m
            ))),
            Some(m) => Ok(u32::try_from(m)
                .map_or(self.window_minutes, |m| m.min(self.window_minutes))),
        }
    }
}

/// Per-bucket view returned by [`KeyedCounterSeries::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketSnapshot {
    /// Bucket epoch (timestamp divided by the granularity)
    pub epoch: i64,
    /// Events in the bucket
    pub total: u64,
    /// Approximate distinct events in the bucket
    pub unique: u64,
}

/// The last `capacity` buckets of one `(family, key)` pair.
///
/// Buckets are sparse: a slot without events has no bucket and reads as zero.
#[derive(Debug)]
pub struct KeyedCounterSeries {
    spec: WindowSpec,
    buckets: BTreeMap<i64, Bucket>,
    latest_epoch: Option<i64>,
}

impl KeyedCounterSeries {
    /// Create an empty series.
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            buckets: BTreeMap::new(),
            latest_epoch: None,
        }
    }

    /// Record one event at `now`.
    ///
    /// Out-of-order timestamps land in their own bucket. Eviction is always
    /// relative to the latest epoch this series has seen, so an event older
    /// than the retained window is dropped straight away.
    pub fn increment(&mut self, now: DateTime<Utc>, is_new: bool, token: u64) {
        let epoch = self.spec.epoch_of(now);
        let sketch = self.spec.sketch;
        self.buckets
            .entry(epoch)
            .or_insert_with(|| Bucket::new(epoch, sketch))
            .record_event(is_new, token);

        let latest = self.latest_epoch.map_or(epoch, |l| l.max(epoch));
        self.latest_epoch = Some(latest);
        self.evict_before(self.retained_floor(latest));
    }

    /// Sum of totals over the last `minutes` ending at `now`.
    pub fn range_total(&self, now: DateTime<Utc>, minutes: u32) -> u64 {
        self.window(now, minutes).map(Bucket::total).sum()
    }

    /// Distinct events over the last `minutes` ending at `now`.
    ///
    /// Sketches of the selected buckets are merged, so an entity seen in
    /// several buckets is counted once. An `is_new` event still counts when
    /// its token already showed up in an earlier bucket of the range.
    pub fn range_unique(&self, now: DateTime<Utc>, minutes: u32) -> u64 {
        let mut buckets = self.window(now, minutes);
        let Some(first) = buckets.next() else {
            return 0;
        };

        let mut merged: UniqueSketch = first.sketch().clone();
        let mut forced = first.forced();
        let mut total = first.total();
        for bucket in buckets {
            let repeated = bucket
                .new_hashes()
                .iter()
                .filter(|&&hash| merged.covers(hash))
                .count() as u64;
            forced += bucket.forced() + repeated;
            merged.merge(bucket.sketch());
            total += bucket.total();
        }

        (merged.estimate() + forced).min(total)
    }

    /// Per-bucket view of everything inside the window ending at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<BucketSnapshot> {
        self.window(now, self.spec.window_minutes)
            .map(|b| BucketSnapshot {
                epoch: b.epoch(),
                total: b.total(),
                unique: b.estimate_unique(),
            })
            .collect()
    }

    /// Drop buckets that fell out of the window as of `now`.
    ///
    /// Returns the number of buckets removed.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let current = self.spec.epoch_of(now);
        let latest = self.latest_epoch.map_or(current, |l| l.max(current));
        self.evict_before(self.retained_floor(latest))
    }

    /// Number of resident buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no bucket is resident.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Greatest epoch ever recorded.
    pub fn latest_epoch(&self) -> Option<i64> {
        self.latest_epoch
    }

    fn retained_floor(&self, latest: i64) -> i64 {
        latest - self.spec.capacity + 1
    }

    fn evict_before(&mut self, floor: i64) -> usize {
        let kept = self.buckets.split_off(&floor);
        let removed = std::mem::replace(&mut self.buckets, kept).len();
        if removed > 0 {
            trace!(floor = floor, removed = removed, "Evicted buckets");
        }
        removed
    }

    fn window(&self, now: DateTime<Utc>, minutes: u32) -> impl Iterator<Item = &Bucket> {
        let minutes = minutes.clamp(1, self.spec.window_minutes.max(1));
        let current = self.spec.epoch_of(now);
        let mut lower = current - self.spec.buckets_for(minutes) + 1;
        if let Some(latest) = self.latest_epoch {
            lower = lower.max(self.retained_floor(latest));
        }

        // BTreeMap::range panics on an inverted range.
        let range = if lower <= current {
            Some(self.buckets.range(lower..=current))
        } else {
            None
        };
        range.into_iter().flatten().map(|(_, b)| b)
    }
}
