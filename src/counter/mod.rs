//! Time-windowed event counting.

mod backend;
mod bucket;
mod clock;
mod engine;
mod family;
mod series;
pub mod sketch;
mod store;

pub use backend::{Counter, Increment};
pub use bucket::Bucket;
pub use clock::{Clock, ManualClock, SystemClock, TokenSource};
pub use engine::{CounterEngine, Report, SeriesReport};
pub use family::{Family, SeriesKey, GLOBAL_KEY};
pub use series::{BucketSnapshot, KeyedCounterSeries, WindowSpec};
pub use store::{CounterStore, SweepStats};
