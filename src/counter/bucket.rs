//! A single time slot of one counter series.

use super::sketch::{SketchParams, UniqueSketch};

/// Totals and distinct tokens recorded during one bucket-wide time slot.
#[derive(Debug, Clone)]
pub struct Bucket {
    epoch: i64,
    total: u64,
    sketch: UniqueSketch,
    // `is_new` events the sketch did not register as new on its own
    forced: u64,
    // Hashes of `is_new` events the sketch did register as new
    new_hashes: Vec<u64>,
}

impl Bucket {
    /// Create an empty bucket for `epoch`.
    pub fn new(epoch: i64, params: SketchParams) -> Self {
        Self {
            epoch,
            total: 0,
            sketch: UniqueSketch::new(params),
            forced: 0,
            new_hashes: Vec::new(),
        }
    }

    /// Record one event carrying the hashed token `token`.
    ///
    /// `is_new` marks an event whose entity is known to be new; such an event
    /// always adds to the unique count even if the sketch collides it with a
    /// previously seen token.
    pub fn record_event(&mut self, is_new: bool, token: u64) {
        self.total += 1;
        let changed = self.sketch.insert_hash(token);
        match (is_new, changed) {
            (true, true) => self.new_hashes.push(token),
            (true, false) => self.forced += 1,
            (false, _) => {}
        }
    }

    /// The epoch this bucket covers.
    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    /// Number of events recorded.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Approximate number of distinct events recorded.
    pub fn estimate_unique(&self) -> u64 {
        (self.sketch.estimate() + self.forced).min(self.total)
    }

    pub(crate) fn sketch(&self) -> &UniqueSketch {
        &self.sketch
    }

    pub(crate) fn forced(&self) -> u64 {
        self.forced
    }

    /// `is_new` tokens that were new to this bucket. A range query checks
    /// them against earlier buckets, where they may already be present.
    pub(crate) fn new_hashes(&self) -> &[u64] {
        &self.new_hashes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::sketch::hash_token;

    #[test]
    fn test_bucket_counts_total_and_unique() {
        let mut bucket = Bucket::new(10, SketchParams::default());
        bucket.record_event(false, hash_token("a"));
        bucket.record_event(false, hash_token("a"));
        bucket.record_event(false, hash_token("b"));

        assert_eq!(bucket.epoch(), 10);
        assert_eq!(bucket.total(), 3);
        assert_eq!(bucket.estimate_unique(), 2);
    }

    #[test]
    fn test_is_new_always_counts_as_unique() {
        let mut bucket = Bucket::new(0, SketchParams::default());
        bucket.record_event(true, hash_token("a"));
        // Same token again, but the caller says the entity is new.
        bucket.record_event(true, hash_token("a"));

        assert_eq!(bucket.total(), 2);
        assert_eq!(bucket.estimate_unique(), 2);
        assert_eq!(bucket.forced(), 1);
        assert_eq!(bucket.new_hashes(), &[hash_token("a")]);
    }

    #[test]
    fn test_repeated_token_without_is_new() {
        let mut bucket = Bucket::new(0, SketchParams::default());
        for i in 0..5u64 {
            bucket.record_event(true, hash_token(&i));
        }
        for _ in 0..3 {
            bucket.record_event(false, hash_token(&0u64));
        }

        assert_eq!(bucket.total(), 8);
        assert_eq!(bucket.estimate_unique(), 5);
    }

    #[test]
    fn test_empty_bucket() {
        let bucket = Bucket::new(3, SketchParams::default());
        assert_eq!(bucket.total(), 0);
        assert_eq!(bucket.estimate_unique(), 0);
    }
}
