//! Counter trait for abstracting over counter implementations.

use std::hash::Hash;

use chrono::{DateTime, Utc};

use super::family::Family;
use super::sketch::hash_token;
use crate::error::Result;

/// One call's worth of events to record.
///
/// An increment always counts against the global series, and additionally
/// against every team, project or group id it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    /// Number of events
    pub amount: u64,
    /// Team the events belong to
    pub team_id: Option<u64>,
    /// Project the events belong to
    pub project_id: Option<u64>,
    /// Group the events belong to
    pub group_id: Option<u64>,
    /// Whether each event is known to be a new entity
    pub is_new: bool,
    /// Event time, the engine's clock when unset
    pub now: Option<DateTime<Utc>>,
    /// Hashed identity shared by all `amount` events
    pub token: Option<u64>,
}

impl Default for Increment {
    fn default() -> Self {
        Self {
            amount: 1,
            team_id: None,
            project_id: None,
            group_id: None,
            is_new: false,
            now: None,
            token: None,
        }
    }
}

impl Increment {
    /// A single event with no family ids.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of events.
    pub fn amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    /// Count against team `id`.
    pub fn team(mut self, id: u64) -> Self {
        self.team_id = Some(id);
        self
    }

    /// Count against project `id`.
    pub fn project(mut self, id: u64) -> Self {
        self.project_id = Some(id);
        self
    }

    /// Count against group `id`.
    pub fn group(mut self, id: u64) -> Self {
        self.group_id = Some(id);
        self
    }

    /// Mark the events as new entities.
    pub fn is_new(mut self, is_new: bool) -> Self {
        self.is_new = is_new;
        self
    }

    /// Record the events at `now` instead of the engine's clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Identify the events by `token` for unique counting.
    pub fn token<T: Hash + ?Sized>(mut self, token: &T) -> Self {
        self.token = Some(hash_token(token));
        self
    }

    /// Every `(family, key)` pair this increment counts against.
    pub fn targets(&self) -> impl Iterator<Item = (Family, u64)> {
        [
            Some((Family::Global, super::family::GLOBAL_KEY)),
            self.team_id.map(|id| (Family::Team, id)),
            self.project_id.map(|id| (Family::Project, id)),
            self.group_id.map(|id| (Family::Group, id)),
        ]
        .into_iter()
        .flatten()
    }
}

/// Trait for real-time event counters.
///
/// Implementations answer how many events, and how many distinct events,
/// were recorded for a key over a trailing window of minutes.
pub trait Counter: Send + Sync {
    /// Record the events described by `increment`.
    fn incr(&self, increment: Increment);

    /// Events recorded for `(family, key)` over the last `minutes`, or the
    /// whole window when `minutes` is `None`.
    fn total(&self, family: Family, key: u64, minutes: Option<i64>) -> Result<u64>;

    /// Approximate distinct events recorded for `(family, key)` over the last
    /// `minutes`, or the whole window when `minutes` is `None`.
    fn unique(&self, family: Family, key: u64, minutes: Option<i64>) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_global_event() {
        let increment = Increment::new();
        assert_eq!(increment.amount, 1);
        assert!(!increment.is_new);
        assert_eq!(increment.targets().collect::<Vec<_>>(), vec![(Family::Global, 0)]);
    }

    #[test]
    fn test_targets_fan_out() {
        let increment = Increment::new().team(1).project(2).group(3);
        assert_eq!(
            increment.targets().collect::<Vec<_>>(),
            vec![
                (Family::Global, 0),
                (Family::Team, 1),
                (Family::Project, 2),
                (Family::Group, 3),
            ]
        );
    }

    #[test]
    fn test_targets_skip_missing_ids() {
        let increment = Increment::new().group(9);
        assert_eq!(
            increment.targets().collect::<Vec<_>>(),
            vec![(Family::Global, 0), (Family::Group, 9)]
        );
    }

    #[test]
    fn test_token_is_hashed() {
        let a = Increment::new().token("event-1");
        let b = Increment::new().token("event-1");
        assert_eq!(a.token, b.token);
        assert!(a.token.is_some());
    }
}
