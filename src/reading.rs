//! CGM readings and the rolling series they form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DexStatsError;

/// Default lookback window in minutes (one day)
pub const DEFAULT_WINDOW_MINUTES: u32 = 1440;

/// Default maximum number of samples (one day at a 5 minute cadence)
pub const DEFAULT_MAX_COUNT: usize = 288;

/// Rate-of-change direction reported alongside a reading
///
/// Decoding also accepts the provider's direction names (`DoubleUp`,
/// `FortyFiveDown`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    #[serde(alias = "DoubleUp")]
    RisingFast,
    #[serde(alias = "SingleUp", alias = "FortyFiveUp")]
    Rising,
    #[serde(alias = "Flat")]
    Stable,
    #[serde(alias = "SingleDown", alias = "FortyFiveDown")]
    Falling,
    #[serde(alias = "DoubleDown")]
    FallingFast,
    #[default]
    #[serde(alias = "None", alias = "NotComputable", alias = "RateOutOfRange")]
    Unknown,
}

impl Trend {
    pub fn arrow(self) -> &'static str {
        match self {
            Trend::RisingFast => "↑↑",
            Trend::Rising => "↑",
            Trend::Stable => "→",
            Trend::Falling => "↓",
            Trend::FallingFast => "↓↓",
            Trend::Unknown => "?",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Trend::RisingFast => "rising quickly",
            Trend::Rising => "rising",
            Trend::Stable => "steady",
            Trend::Falling => "falling",
            Trend::FallingFast => "falling quickly",
            Trend::Unknown => "unable to determine trend",
        }
    }
}

/// A single CGM glucose reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawReading")]
pub struct Reading {
    timestamp: DateTime<Utc>,
    #[serde(rename = "mg/dL")]
    value_mgdl: f64,
    trend: Trend,
}

impl Reading {
    /// Create a reading; the value must be a positive, finite mg/dL number
    pub fn new(timestamp: DateTime<Utc>, value_mgdl: f64, trend: Trend) -> Result<Self, DexStatsError> {
        if !value_mgdl.is_finite() || value_mgdl <= 0.0 {
            return Err(DexStatsError::InvalidReading(value_mgdl));
        }
        Ok(Self { timestamp, value_mgdl, trend })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn value_mgdl(&self) -> f64 {
        self.value_mgdl
    }

    pub fn trend(&self) -> Trend {
        self.trend
    }
}

/// Wire shape used to validate readings during deserialization
#[derive(Deserialize)]
struct RawReading {
    timestamp: DateTime<Utc>,
    #[serde(rename = "mg/dL", alias = "value")]
    value_mgdl: f64,
    #[serde(default)]
    trend: Trend,
}

impl TryFrom<RawReading> for Reading {
    type Error = DexStatsError;

    fn try_from(raw: RawReading) -> Result<Self, Self::Error> {
        Reading::new(raw.timestamp, raw.value_mgdl, raw.trend)
    }
}

/// Chronologically ordered readings, most recent last
///
/// The source is trusted for ordering and uniqueness; nothing is sorted or
/// de-duplicated here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReadingSeries {
    readings: Vec<Reading>,
}

impl ReadingSeries {
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    /// Keep only the most recent `max_count` readings
    pub fn bounded(mut readings: Vec<Reading>, max_count: usize) -> Self {
        if readings.len() > max_count {
            readings.drain(..readings.len() - max_count);
        }
        Self { readings }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Most recent reading
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.last()
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn values_mgdl(&self) -> Vec<f64> {
        self.readings.iter().map(Reading::value_mgdl).collect()
    }
}
