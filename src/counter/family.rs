//! Counter families and series keys.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CounterError;

/// Key used by the single global series.
pub const GLOBAL_KEY: u64 = 0;

/// The scope a series counts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Every event
    Global,
    /// Events of one team
    Team,
    /// Events of one project
    Project,
    /// Events of one group
    Group,
}

impl Family {
    /// All families, in fan-out order.
    pub const ALL: [Family; 4] = [Family::Global, Family::Team, Family::Project, Family::Group];

    /// Lowercase name of the family.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Global => "global",
            Family::Team => "team",
            Family::Project => "project",
            Family::Group => "group",
        }
    }
}

impl FromStr for Family {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Family::Global),
            "team" => Ok(Family::Team),
            "project" => Ok(Family::Project),
            "group" => Ok(Family::Group),
            other => Err(CounterError::InvalidArgument(format!(
                "unknown counter family: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key that uniquely identifies one counter series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SeriesKey {
    /// The family this series belongs to
    pub family: Family,
    /// Entity id within the family
    pub key: u64,
}

impl SeriesKey {
    /// Create a new series key.
    pub fn new(family: Family, key: u64) -> Self {
        Self { family, key }
    }

    /// The key of the global series.
    pub fn global() -> Self {
        Self::new(Family::Global, GLOBAL_KEY)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.key)
    }
}
