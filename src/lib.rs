//! Minutecount - Real-time Windowed Event Counters
//!
//! This crate keeps approximate counts of events over a rolling window of
//! minutes, per global, team, project and group scope. Each scope tracks the
//! total number of events and an estimate of how many of them were distinct.
//! State lives in memory only; nothing outlives the window.

pub mod config;
pub mod counter;
pub mod error;
pub mod ingest;
