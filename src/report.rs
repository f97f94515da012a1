//! Plain-text rendering of statistics bundles

use crate::reading::ReadingSeries;
use crate::stats::StatisticsBundle;
use crate::units::{mgdl_to_mmol, GlucoseUnit};

/// Multi-line summary of a bundle in the given unit
pub fn verbose_message(bundle: &StatisticsBundle, unit: GlucoseUnit) -> String {
    let stats = bundle.in_unit(unit);
    let label = unit.label();
    let (low, high) = match unit {
        GlucoseUnit::MgDl => (bundle.low_mgdl, bundle.high_mgdl),
        GlucoseUnit::MmolL => (
            mgdl_to_mmol(bundle.low_mgdl),
            mgdl_to_mmol(bundle.high_mgdl),
        ),
    };

    [
        format!(
            "Current glucose: {} {} ({} {})",
            unit.format_value(stats.current),
            label,
            bundle.current_trend.description(),
            bundle.current_trend.arrow()
        ),
        format!("Time of reading: {}", bundle.current_timestamp.format("%Y-%m-%d %H:%M")),
        format!("Glucose state: {}", bundle.current_state.label()),
        format!("Average glucose: {} {}", unit.format_value(stats.mean), label),
        format!("Estimated A1C: {:.1}%", stats.estimated_a1c),
        format!(
            "Time in range ({}-{} {}): {:.1}%",
            unit.format_value(low),
            unit.format_value(high),
            label,
            stats.time_in_range
        ),
        format!("Median glucose: {} {}", unit.format_value(stats.median), label),
        format!("Standard deviation: {} {}", unit.format_value(stats.std_dev), label),
        format!("Minimum glucose: {} {}", unit.format_value(stats.min), label),
        format!("Maximum glucose: {} {}", unit.format_value(stats.max), label),
        format!("Glucose range: {} {}", unit.format_value(stats.range), label),
        format!("Coef. of variation: {:.1}%", stats.coefficient_of_variation),
        format!("Glycemic variability index: {:.1}%", stats.glycemic_variability_index),
    ]
    .join("\n")
}

/// One-line message suitable for SMS
pub fn concise_message(bundle: &StatisticsBundle, unit: GlucoseUnit) -> String {
    format!(
        "{} and {}",
        unit.format(bundle.in_unit(unit).current),
        bundle.current_trend.description()
    )
}

/// ASCII plot of the most recent `width` readings, `height` rows tall
///
/// Each column holds one `x`; a flat series is drawn on the bottom row.
pub fn bit_board(series: &ReadingSeries, height: usize, width: usize) -> String {
    if height == 0 || width == 0 {
        return String::new();
    }

    let values = series.values_mgdl();
    let recent = &values[values.len().saturating_sub(width)..];
    let min = recent.iter().copied().fold(f64::INFINITY, f64::min);
    let max = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };

    let mut board = vec![vec![' '; width]; height];
    for (col, &value) in recent.iter().enumerate() {
        let level = ((value - min) / span * (height - 1) as f64) as usize;
        board[height - 1 - level.min(height - 1)][col] = 'x';
    }

    board
        .into_iter()
        .map(|row| row.into_iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
