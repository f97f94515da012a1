//! Statistics calculations for CGM readings
//!
//! Everything is computed once in mg/dL. The mmol/L block of a bundle is the
//! mg/dL block converted value by value, so the two units always agree to
//! the rounding precision. Every number in a bundle is rounded to
//! [`PRECISION`](crate::units::PRECISION) decimal places.
//!
//! Failure is all-or-nothing: if any aggregate is undefined no bundle is
//! produced.

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::DexStatsError;
use crate::reading::{ReadingSeries, Trend};
use crate::units::{mgdl_to_mmol, round_to_precision, GlucoseRange, GlucoseUnit, ThresholdPolicy};

/// |total area| below this makes the glycemic variability index undefined
const GVI_AREA_EPSILON: f64 = 1e-9;

/// Aggregates for one unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitStats {
    pub current: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    /// Percentages and A1C do not depend on the unit and repeat in both blocks
    pub time_in_range: f64,
    pub coefficient_of_variation: f64,
    pub glycemic_variability_index: f64,
    pub estimated_a1c: f64,
}

impl UnitStats {
    fn to_mmol(self) -> Self {
        Self {
            current: mgdl_to_mmol(self.current),
            mean: mgdl_to_mmol(self.mean),
            median: mgdl_to_mmol(self.median),
            std_dev: mgdl_to_mmol(self.std_dev),
            min: mgdl_to_mmol(self.min),
            max: mgdl_to_mmol(self.max),
            range: mgdl_to_mmol(self.range),
            ..self
        }
    }
}

/// Snapshot of derived statistics for one series under one threshold policy
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsBundle {
    pub sample_count: usize,
    pub current_timestamp: DateTime<Utc>,
    pub current_trend: Trend,
    pub current_state: GlucoseRange,
    pub time_below_range: f64,
    pub time_above_range: f64,
    pub low_mgdl: f64,
    pub high_mgdl: f64,
    pub mgdl: UnitStats,
    pub mmol: UnitStats,
}

/// A single named value of a flattened bundle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Count(usize),
    Number(f64),
    Text(String),
}

impl StatisticsBundle {
    /// Aggregates in the requested unit
    pub fn in_unit(&self, unit: GlucoseUnit) -> &UnitStats {
        match unit {
            GlucoseUnit::MgDl => &self.mgdl,
            GlucoseUnit::MmolL => &self.mmol,
        }
    }

    /// Flattened view with stable names, in a fixed order
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        use FieldValue::{Count, Number, Text};

        let (g, m) = (&self.mgdl, &self.mmol);
        vec![
            ("sample_count", Count(self.sample_count)),
            ("current_timestamp", Text(self.current_timestamp.to_rfc3339())),
            ("current_trend", Text(trend_name(self.current_trend).to_string())),
            ("current_trend_arrow", Text(self.current_trend.arrow().to_string())),
            ("current_state", Text(self.current_state.label().to_string())),
            ("current_mgdl", Number(g.current)),
            ("current_mmol", Number(m.current)),
            ("mean_mgdl", Number(g.mean)),
            ("mean_mmol", Number(m.mean)),
            ("median_mgdl", Number(g.median)),
            ("median_mmol", Number(m.median)),
            ("std_dev_mgdl", Number(g.std_dev)),
            ("std_dev_mmol", Number(m.std_dev)),
            ("min_mgdl", Number(g.min)),
            ("min_mmol", Number(m.min)),
            ("max_mgdl", Number(g.max)),
            ("max_mmol", Number(m.max)),
            ("range_mgdl", Number(g.range)),
            ("range_mmol", Number(m.range)),
            ("time_in_range", Number(g.time_in_range)),
            ("time_below_range", Number(self.time_below_range)),
            ("time_above_range", Number(self.time_above_range)),
            ("coefficient_of_variation", Number(g.coefficient_of_variation)),
            ("glycemic_variability_index", Number(g.glycemic_variability_index)),
            ("estimated_a1c", Number(g.estimated_a1c)),
            ("low_mgdl", Number(self.low_mgdl)),
            ("high_mgdl", Number(self.high_mgdl)),
        ]
    }
}

impl Serialize for StatisticsBundle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (name, value) in &fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn trend_name(trend: Trend) -> &'static str {
    match trend {
        Trend::RisingFast => "rising_fast",
        Trend::Rising => "rising",
        Trend::Stable => "stable",
        Trend::Falling => "falling",
        Trend::FallingFast => "falling_fast",
        Trend::Unknown => "unknown",
    }
}

/// Pure computation of [`StatisticsBundle`]s; holds no state
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticsEngine;

impl StatisticsEngine {
    /// Compute the bundle for `series` under `policy`
    ///
    /// The most recent reading supplies the current value, trend and state.
    pub fn compute(series: &ReadingSeries, policy: &ThresholdPolicy) -> Result<StatisticsBundle, DexStatsError> {
        let latest = series.latest().ok_or(DexStatsError::InsufficientData)?;
        let values = series.values_mgdl();
        let agg = Aggregates::from_values(&values, policy)?;

        let mgdl = UnitStats {
            current: round_to_precision(latest.value_mgdl()),
            mean: agg.mean,
            median: agg.median,
            std_dev: agg.std_dev,
            min: agg.min,
            max: agg.max,
            range: agg.range,
            time_in_range: agg.time_in_range,
            coefficient_of_variation: agg.coefficient_of_variation,
            glycemic_variability_index: agg.glycemic_variability_index,
            estimated_a1c: agg.estimated_a1c,
        };

        Ok(StatisticsBundle {
            sample_count: values.len(),
            current_timestamp: latest.timestamp(),
            current_trend: latest.trend(),
            current_state: policy.classify(latest.value_mgdl()),
            time_below_range: agg.time_below_range,
            time_above_range: agg.time_above_range,
            low_mgdl: policy.low_mgdl(),
            high_mgdl: policy.high_mgdl(),
            mgdl,
            mmol: mgdl.to_mmol(),
        })
    }
}

/// Rounded mg/dL aggregates of a value list
#[derive(Debug, Clone, Copy, PartialEq)]
struct Aggregates {
    mean: f64,
    median: f64,
    std_dev: f64,
    min: f64,
    max: f64,
    range: f64,
    time_in_range: f64,
    time_below_range: f64,
    time_above_range: f64,
    coefficient_of_variation: f64,
    glycemic_variability_index: f64,
    estimated_a1c: f64,
}

impl Aggregates {
    fn from_values(values: &[f64], policy: &ThresholdPolicy) -> Result<Self, DexStatsError> {
        if values.is_empty() {
            return Err(DexStatsError::InsufficientData);
        }
        if values.len() < 2 {
            return Err(DexStatsError::DegenerateStatistics(
                "standard deviation needs at least two readings",
            ));
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        if mean == 0.0 {
            return Err(DexStatsError::DegenerateStatistics("mean glucose is zero"));
        }
        let std_dev = sample_std_dev(values, mean);

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];

        let (low, high) = (policy.low_mgdl(), policy.high_mgdl());
        let percent_of = |count: usize| 100.0 * count as f64 / n;
        let time_in_range = round_to_precision(percent_of(values.iter().filter(|&&v| policy.contains(v)).count()));
        let time_below_range = round_to_precision(percent_of(values.iter().filter(|&&v| v < low).count()));
        let time_above_range = round_to_precision(percent_of(values.iter().filter(|&&v| v > high).count()));

        let glycemic_variability_index = glycemic_variability_index(values, max, time_in_range, low, high)?;

        let mean_mgdl = round_to_precision(mean);
        // literal form of the A1C estimate; do not simplify
        let estimated_a1c = round_to_precision((28.7 * mgdl_to_mmol(mean_mgdl) + 46.7) / 28.7);

        let agg = Self {
            mean: mean_mgdl,
            median: round_to_precision(median(&sorted)),
            std_dev: round_to_precision(std_dev),
            min: round_to_precision(min),
            max: round_to_precision(max),
            range: round_to_precision(max - min),
            time_in_range,
            time_below_range,
            time_above_range,
            coefficient_of_variation: round_to_precision(100.0 * std_dev / mean),
            glycemic_variability_index,
            estimated_a1c,
        };
        agg.ensure_finite()?;
        Ok(agg)
    }

    fn ensure_finite(&self) -> Result<(), DexStatsError> {
        let all = [
            self.mean,
            self.median,
            self.std_dev,
            self.min,
            self.max,
            self.range,
            self.time_in_range,
            self.coefficient_of_variation,
            self.glycemic_variability_index,
            self.estimated_a1c,
        ];
        if all.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(DexStatsError::DegenerateStatistics("non-finite aggregate"))
        }
    }
}

/// Excursions beyond the bounds relative to an "area" term
///
/// `time_in_range` is the rounded percentage.
fn glycemic_variability_index(
    values: &[f64],
    max: f64,
    time_in_range: f64,
    low: f64,
    high: f64,
) -> Result<f64, DexStatsError> {
    let excess_high: f64 = values.iter().filter(|&&v| v > high).map(|&v| v - high).sum();
    let excess_low: f64 = values.iter().filter(|&&v| v < low).map(|&v| low - v).sum();
    let total_area = (max - high) * time_in_range / 100.0 + excess_high + excess_low;

    if total_area.abs() < GVI_AREA_EPSILON {
        return Err(DexStatsError::DegenerateStatistics(
            "glycemic variability index area is zero",
        ));
    }

    let excursions = excess_high + excess_low;
    if excursions == 0.0 {
        return Ok(0.0);
    }
    Ok(round_to_precision(100.0 * excursions / total_area))
}

/// Median of sorted values; the mean of the middle pair for even counts
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Bessel-corrected standard deviation; callers guarantee two or more values
fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    let variance: f64 = values.iter()
        .map(|&v| (v - mean).powi(2))
        .sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Reading;
    use chrono::{Duration, TimeZone};

    fn series(values: &[f64]) -> ReadingSeries {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let readings = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Reading::new(start + Duration::minutes(5 * i as i64), v, Trend::Stable).unwrap())
            .collect();
        ReadingSeries::new(readings)
    }

    #[test]
    fn test_reference_series() {
        let bundle = StatisticsEngine::compute(&series(&[70.0, 100.0, 130.0, 160.0, 190.0]), &ThresholdPolicy::default())
            .unwrap();
        let g = &bundle.mgdl;

        assert_eq!(bundle.sample_count, 5);
        assert_eq!(g.time_in_range, 80.0);
        assert_eq!(g.min, 70.0);
        assert_eq!(g.max, 190.0);
        assert_eq!(g.mean, 130.0);
        assert_eq!(g.median, 130.0);
        assert_eq!(g.range, 120.0);
        assert_eq!(g.std_dev, 47.4342);
        assert_eq!(g.coefficient_of_variation, 36.4878);
        assert_eq!(g.glycemic_variability_index, 55.5556);
        assert_eq!(g.estimated_a1c, 8.8432);
        assert_eq!(g.current, 190.0);
        assert_eq!(bundle.time_below_range, 0.0);
        assert_eq!(bundle.time_above_range, 20.0);
        assert_eq!(bundle.current_state, GlucoseRange::High);
    }

    #[test]
    fn test_current_state_uses_policy_bounds() {
        let policy = ThresholdPolicy::default();

        let high = StatisticsEngine::compute(&series(&[120.0, 300.0]), &policy).unwrap();
        assert_eq!(high.current_state, GlucoseRange::High);

        let low = StatisticsEngine::compute(&series(&[150.0, 40.0]), &policy).unwrap();
        assert_eq!(low.current_state, GlucoseRange::Low);

        let at_bound = StatisticsEngine::compute(&series(&[200.0, 180.0]), &policy).unwrap();
        assert_eq!(at_bound.current_state, GlucoseRange::InRange);
    }

    #[test]
    fn test_mmol_block_is_converted_mgdl() {
        let bundle = StatisticsEngine::compute(&series(&[70.0, 100.0, 130.0, 160.0, 190.0]), &ThresholdPolicy::default())
            .unwrap();
        let m = &bundle.mmol;

        assert_eq!(m.mean, 7.216);
        assert_eq!(m.min, 3.8855);
        assert_eq!(m.max, 10.5464);
        assert_eq!(m.range, 6.6609);
        assert_eq!(m.std_dev, 2.633);
        assert_eq!(m.time_in_range, bundle.mgdl.time_in_range);
        assert_eq!(m.estimated_a1c, bundle.mgdl.estimated_a1c);
        assert_eq!(bundle.in_unit(GlucoseUnit::MmolL), m);
    }

    #[test]
    fn test_empty_series_is_insufficient() {
        let err = StatisticsEngine::compute(&ReadingSeries::default(), &ThresholdPolicy::default()).unwrap_err();
        assert!(matches!(err, DexStatsError::InsufficientData));
    }

    #[test]
    fn test_single_reading_is_degenerate() {
        let err = StatisticsEngine::compute(&series(&[120.0]), &ThresholdPolicy::default()).unwrap_err();
        assert!(matches!(err, DexStatsError::DegenerateStatistics(_)));
    }

    #[test]
    fn test_zero_mean_is_degenerate() {
        let err = Aggregates::from_values(&[0.0, 0.0], &ThresholdPolicy::default()).unwrap_err();
        assert!(matches!(err, DexStatsError::DegenerateStatistics("mean glucose is zero")));
    }

    #[test]
    fn test_in_range_touching_high_bound_is_degenerate() {
        let err = StatisticsEngine::compute(&series(&[100.0, 140.0, 180.0]), &ThresholdPolicy::default()).unwrap_err();
        assert!(matches!(err, DexStatsError::DegenerateStatistics(_)));
    }

    #[test]
    fn test_in_range_below_high_bound_has_zero_gvi() {
        let bundle = StatisticsEngine::compute(&series(&[100.0, 120.0]), &ThresholdPolicy::default()).unwrap();
        assert_eq!(bundle.mgdl.glycemic_variability_index, 0.0);
        assert!(bundle.mgdl.glycemic_variability_index.is_sign_positive());
        assert_eq!(bundle.mgdl.time_in_range, 100.0);
    }

    #[test]
    fn test_even_count_median() {
        let bundle = StatisticsEngine::compute(&series(&[130.0, 100.0, 120.0, 110.0]), &ThresholdPolicy::default())
            .unwrap();
        assert_eq!(bundle.mgdl.median, 115.0);
        // the current reading is the last one, not the largest
        assert_eq!(bundle.mgdl.current, 110.0);
    }

    #[test]
    fn test_policy_changes_time_in_range() {
        let readings = series(&[70.0, 100.0, 130.0, 160.0, 190.0]);
        let mut policy = ThresholdPolicy::default();
        policy.set_range(GlucoseUnit::MmolL, 4.0, 10.0).unwrap();

        let bundle = StatisticsEngine::compute(&readings, &policy).unwrap();
        // 70 now falls below 72.0624
        assert_eq!(bundle.mgdl.time_in_range, 60.0);
        assert_eq!(bundle.time_below_range, 20.0);
        assert_eq!(bundle.low_mgdl, 72.0624);
    }

    #[test]
    fn test_ordering_properties_hold() {
        // deterministic pseudo-random series
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        for len in 2..40 {
            let values: Vec<f64> = (0..len)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    40.0 + (state >> 33) as f64 % 360.0
                })
                .collect();
            let bundle = match StatisticsEngine::compute(&series(&values), &ThresholdPolicy::default()) {
                Ok(bundle) => bundle,
                Err(DexStatsError::DegenerateStatistics(_)) => continue,
                Err(other) => panic!("unexpected error: {}", other),
            };
            let g = bundle.mgdl;
            assert!(g.min <= g.median && g.median <= g.max);
            assert!(g.min <= g.mean && g.mean <= g.max);
            assert!((0.0..=100.0).contains(&g.time_in_range));
            let total = g.time_in_range + bundle.time_below_range + bundle.time_above_range;
            assert!((total - 100.0).abs() < 0.001);
        }
    }

    #[test]
    fn test_fields_are_stable_and_ordered() {
        let bundle = StatisticsEngine::compute(&series(&[70.0, 100.0, 130.0, 160.0, 190.0]), &ThresholdPolicy::default())
            .unwrap();
        let names: Vec<&str> = bundle.fields().iter().map(|(name, _)| *name).collect();

        assert_eq!(names[0], "sample_count");
        assert_eq!(names.len(), 27);
        assert!(names.contains(&"glycemic_variability_index"));

        let json = serde_json::to_string(&bundle).unwrap();
        assert!(json.starts_with("{\"sample_count\":5,\"current_timestamp\":"));
        assert!(json.contains("\"current_trend\":\"stable\""));
        assert!(json.contains("\"time_in_range\":80.0"));
    }
}
