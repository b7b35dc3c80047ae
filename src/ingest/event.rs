//! JSON-lines event format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::counter::Increment;
use crate::error::Result;

/// One line of ingest input.
///
/// ```json
/// {"amount": 1, "team_id": 1, "project_id": 2, "group_id": 3,
///  "is_new": false, "token": "evt-42", "timestamp": "2024-05-01T12:00:00Z"}
/// ```
///
/// Every field is optional; an empty object records one global event now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLine {
    /// Number of events
    #[serde(default = "default_amount")]
    pub amount: u64,
    /// Team the events belong to
    #[serde(default)]
    pub team_id: Option<u64>,
    /// Project the events belong to
    #[serde(default)]
    pub project_id: Option<u64>,
    /// Group the events belong to
    #[serde(default)]
    pub group_id: Option<u64>,
    /// Whether each event is a new entity
    #[serde(default)]
    pub is_new: bool,
    /// Identity used for unique counting
    #[serde(default)]
    pub token: Option<String>,
    /// Event time, ingest time when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_amount() -> u64 {
    1
}

impl From<EventLine> for Increment {
    fn from(line: EventLine) -> Self {
        let mut increment = Increment::new().amount(line.amount).is_new(line.is_new);
        increment.team_id = line.team_id;
        increment.project_id = line.project_id;
        increment.group_id = line.group_id;
        increment.now = line.timestamp;
        if let Some(token) = line.token.as_deref() {
            increment = increment.token(token);
        }
        increment
    }
}

/// Parse one input line into an increment.
pub fn parse_line(line: &str) -> Result<Increment> {
    let event: EventLine = serde_json::from_str(line)?;
    Ok(event.into())
}
