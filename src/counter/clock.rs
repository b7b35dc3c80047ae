//! Time and token sources injected into the engine.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use super::sketch::hash_token;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to, with second resolution.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            secs: AtomicI64::new(now.timestamp()),
        }
    }

    /// Create a clock frozen at the start of `minute` since the Unix epoch.
    pub fn at_minute(minute: i64) -> Self {
        Self {
            secs: AtomicI64::new(minute * 60),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        self.secs.store(now.timestamp(), Ordering::SeqCst);
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.secs.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.secs.load(Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }
}

/// Synthesizes tokens for events that carry no identity of their own.
///
/// Tokens are a per-source random salt combined with a sequence number, so
/// every call yields a token no other call of any source returns.
#[derive(Debug)]
pub struct TokenSource {
    salt: Uuid,
    next: AtomicU64,
}

impl TokenSource {
    /// Create a source with a random salt.
    pub fn new() -> Self {
        Self {
            salt: Uuid::new_v4(),
            next: AtomicU64::new(0),
        }
    }

    /// A fresh hashed token.
    pub fn next_token(&self) -> u64 {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        hash_token(&(self.salt.as_u128(), seq))
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_minute(10);
        assert_eq!(clock.now().timestamp(), 600);
        clock.advance(Duration::minutes(2));
        assert_eq!(clock.now().timestamp(), 720);
        clock.set(Utc.timestamp_opt(30, 0).unwrap());
        assert_eq!(clock.now().timestamp(), 30);
    }

    #[test]
    fn test_system_clock_is_recent() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }

    #[test]
    fn test_token_source_yields_distinct_tokens() {
        let source = TokenSource::new();
        let tokens: HashSet<u64> = (0..10_000).map(|_| source.next_token()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_token_sources_do_not_collide() {
        let a = TokenSource::new();
        let b = TokenSource::new();
        assert_ne!(a.next_token(), b.next_token());
    }
}
