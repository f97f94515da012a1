//! Glucose unit types, conversion and threshold policy
//!
//! mg/dL is the canonical unit. mmol/L values are always derived from mg/dL
//! with [`MGDL_PER_MMOL`] and rounded to [`PRECISION`] decimal places, so a
//! value never drifts between the two representations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DexStatsError;

/// mg/dL per mmol/L for glucose
pub const MGDL_PER_MMOL: f64 = 18.01559;

/// Decimal places kept for every derived value
pub const PRECISION: i32 = 4;

/// Round to [`PRECISION`] decimal places, ties to even
pub fn round_to_precision(value: f64) -> f64 {
    let scale = 10f64.powi(PRECISION);
    (value * scale).round_ties_even() / scale
}

/// Convert mg/dL to mmol/L, rounded to [`PRECISION`]
pub fn mgdl_to_mmol(mg_dl: f64) -> f64 {
    round_to_precision(mg_dl / MGDL_PER_MMOL)
}

/// Convert mmol/L to mg/dL, rounded to [`PRECISION`]
pub fn mmol_to_mgdl(mmol_l: f64) -> f64 {
    round_to_precision(mmol_l * MGDL_PER_MMOL)
}

/// Glucose value in mg/dL (milligrams per deciliter)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct MgDl(pub f64);

/// Glucose value in mmol/L (millimoles per liter)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct MmolL(pub f64);

impl MgDl {
    /// Format the value with unit suffix
    pub fn format(self) -> String {
        format!("{} mg/dL", self.0)
    }

    /// Format just the value without unit suffix
    pub fn format_value(self) -> String {
        format!("{}", self.0)
    }

    /// Get the unit label
    pub fn unit_label() -> &'static str {
        "mg/dL"
    }
}

impl MmolL {
    /// Format the value with unit suffix
    pub fn format(self) -> String {
        format!("{:.1} mmol/L", self.0)
    }

    /// Format just the value without unit suffix
    pub fn format_value(self) -> String {
        format!("{:.1}", self.0)
    }

    /// Get the unit label
    pub fn unit_label() -> &'static str {
        "mmol/L"
    }
}

/// Glucose measurement unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlucoseUnit {
    #[default]
    MgDl,
    MmolL,
}

impl GlucoseUnit {
    /// Format a value already expressed in this unit
    pub fn format(self, value: f64) -> String {
        match self {
            GlucoseUnit::MgDl => MgDl(value).format(),
            GlucoseUnit::MmolL => MmolL(value).format(),
        }
    }

    /// Format a value already expressed in this unit, without suffix
    pub fn format_value(self, value: f64) -> String {
        match self {
            GlucoseUnit::MgDl => MgDl(value).format_value(),
            GlucoseUnit::MmolL => MmolL(value).format_value(),
        }
    }

    /// Get the unit label
    pub fn label(self) -> &'static str {
        match self {
            GlucoseUnit::MgDl => MgDl::unit_label(),
            GlucoseUnit::MmolL => MmolL::unit_label(),
        }
    }
}

impl fmt::Display for GlucoseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GlucoseUnit {
    type Err = DexStatsError;

    /// Accepts `mgdl`, `mg/dl`, `mmol` and `mmol/l`, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mgdl" | "mg/dl" => Ok(GlucoseUnit::MgDl),
            "mmol" | "mmol/l" => Ok(GlucoseUnit::MmolL),
            other => Err(DexStatsError::Config(format!(
                "unknown glucose unit '{}', expected 'mgdl' or 'mmol'",
                other
            ))),
        }
    }
}

/// Low/high glucose bounds, stored canonically in mg/dL
///
/// The only way to change the bounds after construction is
/// [`ThresholdPolicy::set_range`], which keeps `low_mgdl < high_mgdl`.
/// Decoding goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub struct ThresholdPolicy {
    low_mgdl: f64,
    high_mgdl: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            low_mgdl: Self::DEFAULT_LOW_MGDL,
            high_mgdl: Self::DEFAULT_HIGH_MGDL,
        }
    }
}

impl ThresholdPolicy {
    pub const DEFAULT_LOW_MGDL: f64 = 70.0;
    pub const DEFAULT_HIGH_MGDL: f64 = 180.0;

    /// Create a policy from mg/dL bounds
    pub fn new(low_mgdl: f64, high_mgdl: f64) -> Result<Self, DexStatsError> {
        validate(GlucoseUnit::MgDl, low_mgdl, high_mgdl)?;
        Ok(Self { low_mgdl, high_mgdl })
    }

    /// Replace both bounds, given in `unit`
    ///
    /// Bounds are checked in the caller's unit before conversion. On error the
    /// policy is left untouched.
    pub fn set_range(&mut self, unit: GlucoseUnit, low: f64, high: f64) -> Result<(), DexStatsError> {
        validate(unit, low, high)?;
        let (low_mgdl, high_mgdl) = match unit {
            GlucoseUnit::MgDl => (low, high),
            GlucoseUnit::MmolL => (mmol_to_mgdl(low), mmol_to_mgdl(high)),
        };
        // Rounding during conversion cannot reorder the bounds, but a pair
        // closer than the precision could collapse onto one value.
        validate(GlucoseUnit::MgDl, low_mgdl, high_mgdl)?;
        self.low_mgdl = low_mgdl;
        self.high_mgdl = high_mgdl;
        Ok(())
    }

    pub fn low_mgdl(&self) -> f64 {
        self.low_mgdl
    }

    pub fn high_mgdl(&self) -> f64 {
        self.high_mgdl
    }

    pub fn low_mmol(&self) -> f64 {
        mgdl_to_mmol(self.low_mgdl)
    }

    pub fn high_mmol(&self) -> f64 {
        mgdl_to_mmol(self.high_mgdl)
    }

    /// Whether a mg/dL value lies within `[low, high]`
    pub fn contains(&self, mg_dl: f64) -> bool {
        self.low_mgdl <= mg_dl && mg_dl <= self.high_mgdl
    }

    /// Classify a reading using its mg/dL value; both bounds are in range
    pub fn classify(&self, mg_dl: f64) -> GlucoseRange {
        if mg_dl < self.low_mgdl {
            GlucoseRange::Low
        } else if mg_dl > self.high_mgdl {
            GlucoseRange::High
        } else {
            GlucoseRange::InRange
        }
    }

    /// Get threshold display string for the given unit
    pub fn format_range(&self, unit: GlucoseUnit) -> String {
        match unit {
            GlucoseUnit::MgDl => format!("{}-{} mg/dL", self.low_mgdl, self.high_mgdl),
            GlucoseUnit::MmolL => format!("{:.1}-{:.1} mmol/L", self.low_mmol(), self.high_mmol()),
        }
    }
}

/// Wire shape used to validate policies during deserialization
#[derive(Deserialize)]
struct RawPolicy {
    low_mgdl: f64,
    high_mgdl: f64,
}

impl TryFrom<RawPolicy> for ThresholdPolicy {
    type Error = DexStatsError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        ThresholdPolicy::new(raw.low_mgdl, raw.high_mgdl)
    }
}

fn validate(unit: GlucoseUnit, low: f64, high: f64) -> Result<(), DexStatsError> {
    if !low.is_finite() || !high.is_finite() || low >= high {
        return Err(DexStatsError::InvalidThresholds { unit, low, high });
    }
    Ok(())
}

/// Classification of glucose value against the policy bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlucoseRange {
    Low,     // below the low threshold
    InRange, // low threshold to high threshold, inclusive
    High,    // above the high threshold
}

impl GlucoseRange {
    /// Get a display label for the range
    pub fn label(self) -> &'static str {
        match self {
            GlucoseRange::Low => "Low",
            GlucoseRange::InRange => "In Range",
            GlucoseRange::High => "High",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_round_trip() {
        for mg_dl in [40.0, 70.0, 99.5, 130.0, 180.0, 400.0] {
            let back = mmol_to_mgdl(mgdl_to_mmol(mg_dl));
            // one mmol/L rounding step is worth at most 0.00005 * 18.01559 mg/dL
            assert!((back - mg_dl).abs() < 0.001, "{} -> {}", mg_dl, back);
        }
    }

    #[test]
    fn test_conversion_precision() {
        assert_eq!(mgdl_to_mmol(130.0), 7.216);
        assert_eq!(mgdl_to_mmol(70.0), 3.8855);
        assert_eq!(mmol_to_mgdl(10.0), 180.1559);
    }

    #[test]
    fn test_unit_formatting() {
        assert_eq!(MgDl(180.0).format(), "180 mg/dL");
        assert_eq!(MmolL(9.9913).format(), "10.0 mmol/L");
        assert_eq!(GlucoseUnit::MgDl.format_value(126.0), "126");
        assert_eq!(GlucoseUnit::MmolL.format(6.9939), "7.0 mmol/L");
    }

    #[test]
    fn test_glucose_unit_parse() {
        assert_eq!("mgdl".parse::<GlucoseUnit>().unwrap(), GlucoseUnit::MgDl);
        assert_eq!("mmol/L".parse::<GlucoseUnit>().unwrap(), GlucoseUnit::MmolL);
        assert!("grams".parse::<GlucoseUnit>().is_err());
    }

    #[test]
    fn test_default_policy() {
        let policy = ThresholdPolicy::default();
        assert_eq!(policy.low_mgdl(), 70.0);
        assert_eq!(policy.high_mgdl(), 180.0);
        assert_eq!(policy.low_mmol(), 3.8855);
        assert_eq!(policy.high_mmol(), 9.9913);
    }

    #[test]
    fn test_new_rejects_inverted_bounds() {
        assert!(matches!(
            ThresholdPolicy::new(180.0, 70.0),
            Err(DexStatsError::InvalidThresholds { .. })
        ));
        assert!(ThresholdPolicy::new(100.0, 100.0).is_err());
        assert!(ThresholdPolicy::new(f64::NAN, 100.0).is_err());
    }

    #[test]
    fn test_set_range_mmol() {
        let mut policy = ThresholdPolicy::default();
        policy.set_range(GlucoseUnit::MmolL, 4.0, 10.0).unwrap();
        assert_eq!(policy.low_mgdl(), 72.0624);
        assert_eq!(policy.high_mgdl(), 180.1559);
    }

    #[test]
    fn test_set_range_rejects_inverted_mmol() {
        let mut policy = ThresholdPolicy::default();
        let err = policy.set_range(GlucoseUnit::MmolL, 10.0, 4.0).unwrap_err();
        assert!(matches!(
            err,
            DexStatsError::InvalidThresholds { unit: GlucoseUnit::MmolL, .. }
        ));
        // rejected update leaves the previous bounds in place
        assert_eq!(policy, ThresholdPolicy::default());
    }

    #[test]
    fn test_thresholds_classification() {
        let policy = ThresholdPolicy::default();

        assert_eq!(policy.classify(40.0), GlucoseRange::Low);
        assert_eq!(policy.classify(69.9), GlucoseRange::Low);
        assert_eq!(policy.classify(70.0), GlucoseRange::InRange);
        assert_eq!(policy.classify(180.0), GlucoseRange::InRange);
        assert_eq!(policy.classify(180.1), GlucoseRange::High);
        assert_eq!(policy.classify(300.0), GlucoseRange::High);
    }

    #[test]
    fn test_classify_follows_custom_bounds() {
        let policy = ThresholdPolicy::new(50.0, 300.0).unwrap();

        assert_eq!(policy.classify(49.0), GlucoseRange::Low);
        assert_eq!(policy.classify(52.0), GlucoseRange::InRange);
        assert_eq!(policy.classify(300.0), GlucoseRange::InRange);
        assert_eq!(policy.classify(301.0), GlucoseRange::High);
        assert_eq!(GlucoseRange::InRange.label(), "In Range");
    }

    #[test]
    fn test_policy_decode_validates_bounds() {
        let policy: ThresholdPolicy = serde_json::from_str(r#"{"low_mgdl": 80.0, "high_mgdl": 160.0}"#).unwrap();
        assert_eq!(policy.low_mgdl(), 80.0);
        assert_eq!(policy.high_mgdl(), 160.0);

        let inverted = serde_json::from_str::<ThresholdPolicy>(r#"{"low_mgdl": 200.0, "high_mgdl": 100.0}"#);
        assert!(inverted.is_err());
        assert!(serde_json::from_str::<ThresholdPolicy>(r#"{"low_mgdl": 90.0, "high_mgdl": 90.0}"#).is_err());

        let json = serde_json::to_string(&ThresholdPolicy::default()).unwrap();
        assert_eq!(serde_json::from_str::<ThresholdPolicy>(&json).unwrap(), ThresholdPolicy::default());
    }

    #[test]
    fn test_thresholds_display() {
        let policy = ThresholdPolicy::default();

        assert_eq!(policy.format_range(GlucoseUnit::MgDl), "70-180 mg/dL");
        assert_eq!(policy.format_range(GlucoseUnit::MmolL), "3.9-10.0 mmol/L");
    }
}
