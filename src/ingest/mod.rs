//! Event ingestion for the `minutecount` process.
//!
//! Events arrive as JSON lines, one increment per line, and are fed to a
//! shared [`CounterEngine`](crate::counter::CounterEngine). A background task
//! can sweep stale series while ingestion runs.

mod event;
mod runner;
mod sweeper;

pub use event::{parse_line, EventLine};
pub use runner::{IngestStats, Ingester};
pub use sweeper::spawn_sweeper;
