//! CGM glucose statistics
//!
//! A [`ReadingCache`] keeps a rolling window of readings from a
//! [`ReadingSource`], refreshing it with bounded retries. The
//! [`StatisticsEngine`] turns a window plus a [`ThresholdPolicy`] into a
//! [`StatisticsBundle`] in both mg/dL and mmol/L.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod reading;
pub mod report;
pub mod retry;
pub mod source;
pub mod stats;
pub mod units;

pub use cache::{CacheConfig, CacheEntry, ReadingCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DexStatsError;
pub use reading::{Reading, ReadingSeries, Trend};
pub use retry::RetryPolicy;
pub use source::{JsonFileSource, ReadingSource, SourceError};
pub use stats::{StatisticsBundle, StatisticsEngine, UnitStats};
pub use units::{GlucoseRange, GlucoseUnit, ThresholdPolicy};
