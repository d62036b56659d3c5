// SPDX-License-Identifier: MIT

//! Glucose readings, thresholds, and the aggregate statistics engine.
//!
//! Values are stored in mg/dL internally; mmol/L is a display concern.
//! Statistics are pure functions of the reading set and are invariant to
//! input ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversion factor: 1 mmol/L = 18.0182 mg/dL.
const MGDL_PER_MMOL: f64 = 18.0182;

/// A single CGM reading, normalized to mg/dL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    /// When the sensor recorded the value
    pub timestamp: DateTime<Utc>,
    /// Glucose value in mg/dL
    pub value: f64,
}

/// User-configurable range thresholds in mg/dL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 70.0,
            high: 180.0,
        }
    }
}

/// Display unit for glucose values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlucoseUnit {
    #[serde(rename = "mg/dL")]
    MgDl,
    #[serde(rename = "mmol/L")]
    MmolL,
}

/// Aggregate statistics over a non-empty reading set.
///
/// The three range percentages are each rounded independently, so their sum
/// can land at 99 or 101. That artifact is accepted rather than corrected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GlucoseStats {
    pub count: usize,
    /// Mean value, rounded to the nearest mg/dL
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation (divide by N), 1 decimal
    pub std_dev: f64,
    /// Percent of readings within [low, high]
    pub time_in_range: f64,
    /// Percent of readings below `low`
    pub time_below_range: f64,
    /// Percent of readings above `high`
    pub time_above_range: f64,
    /// std_dev / average * 100, 1 decimal. NaN when the average is zero;
    /// callers must check `is_finite` before rendering.
    pub coefficient_of_variation: f64,
}

impl GlucoseStats {
    /// Compute aggregate statistics for a set of readings.
    ///
    /// Returns `None` for an empty set - stats are undefined without data.
    pub fn compute(readings: &[GlucoseReading], thresholds: &Thresholds) -> Option<Self> {
        if readings.is_empty() {
            return None;
        }

        let count = readings.len();
        let n = count as f64;

        let sum: f64 = readings.iter().map(|r| r.value).sum();
        let average = sum / n;
        let min = readings.iter().map(|r| r.value).fold(f64::INFINITY, f64::min);
        let max = readings
            .iter()
            .map(|r| r.value)
            .fold(f64::NEG_INFINITY, f64::max);

        let variance: f64 = readings
            .iter()
            .map(|r| (r.value - average).powi(2))
            .sum::<f64>()
            / n;
        let std_dev = variance.sqrt();

        let coefficient_of_variation = std_dev / average * 100.0;

        let below = readings.iter().filter(|r| r.value < thresholds.low).count();
        let above = readings
            .iter()
            .filter(|r| r.value > thresholds.high)
            .count();
        let in_range = count - below - above;

        Some(Self {
            count,
            average: average.round(),
            min,
            max,
            std_dev: round_to_1dp(std_dev),
            time_in_range: (in_range as f64 / n * 100.0).round(),
            time_below_range: (below as f64 / n * 100.0).round(),
            time_above_range: (above as f64 / n * 100.0).round(),
            coefficient_of_variation: round_to_1dp(coefficient_of_variation),
        })
    }
}

fn round_to_1dp(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Convert mg/dL to mmol/L (1 decimal).
pub fn mgdl_to_mmol(mgdl: f64) -> f64 {
    round_to_1dp(mgdl / MGDL_PER_MMOL)
}

/// Convert mmol/L to mg/dL (nearest integer).
pub fn mmol_to_mgdl(mmol: f64) -> f64 {
    (mmol * MGDL_PER_MMOL).round()
}

/// Format a mg/dL value in the requested display unit.
pub fn format_value(value_mgdl: f64, unit: GlucoseUnit) -> String {
    match unit {
        GlucoseUnit::MmolL => format!("{} mmol/L", mgdl_to_mmol(value_mgdl)),
        GlucoseUnit::MgDl => format!("{} mg/dL", value_mgdl.round()),
    }
}

/// Keep only readings inside the inclusive [start, end] window.
pub fn filter_to_window(
    readings: Vec<GlucoseReading>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<GlucoseReading> {
    readings
        .into_iter()
        .filter(|r| r.timestamp >= start && r.timestamp <= end)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(minute: u32, value: f64) -> GlucoseReading {
        GlucoseReading {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 10, minute, 0).unwrap(),
            value,
        }
    }

    fn readings(values: &[f64]) -> Vec<GlucoseReading> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| reading(i as u32, *v))
            .collect()
    }

    #[test]
    fn test_empty_input_yields_none() {
        assert!(GlucoseStats::compute(&[], &Thresholds::default()).is_none());
    }

    #[test]
    fn test_scenario_partition() {
        let input = readings(&[65.0, 75.0, 120.0, 190.0, 200.0]);
        let stats = GlucoseStats::compute(&input, &Thresholds::default()).unwrap();

        assert_eq!(stats.count, 5);
        assert_eq!(stats.time_below_range, 20.0);
        assert_eq!(stats.time_in_range, 40.0);
        assert_eq!(stats.time_above_range, 40.0);
        assert_eq!(stats.average, 130.0);
        assert_eq!(stats.min, 65.0);
        assert_eq!(stats.max, 200.0);
    }

    #[test]
    fn test_boundary_values_count_as_in_range() {
        // Partition is strict: v < low and v > high
        let input = readings(&[70.0, 180.0]);
        let stats = GlucoseStats::compute(&input, &Thresholds::default()).unwrap();

        assert_eq!(stats.time_in_range, 100.0);
        assert_eq!(stats.time_below_range, 0.0);
        assert_eq!(stats.time_above_range, 0.0);
    }

    #[test]
    fn test_percentages_sum_near_100() {
        // 7 readings split 1/3/3 produces rounding drift
        let input = readings(&[60.0, 100.0, 110.0, 120.0, 190.0, 200.0, 210.0]);
        let stats = GlucoseStats::compute(&input, &Thresholds::default()).unwrap();

        let sum = stats.time_below_range + stats.time_in_range + stats.time_above_range;
        assert!((sum - 100.0).abs() <= 2.0, "sum was {sum}");
    }

    #[test]
    fn test_order_invariance() {
        let forward = readings(&[65.0, 75.0, 120.0, 190.0, 200.0]);
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = GlucoseStats::compute(&forward, &Thresholds::default()).unwrap();
        let b = GlucoseStats::compute(&reversed, &Thresholds::default()).unwrap();

        assert_eq!(a.average, b.average);
        assert_eq!(a.std_dev, b.std_dev);
        assert_eq!(a.time_in_range, b.time_in_range);
        assert_eq!(a.coefficient_of_variation, b.coefficient_of_variation);
    }

    #[test]
    fn test_std_dev_is_population() {
        // Divide by N, not N-1: [100, 120] -> mean 110, variance 100, sd 10
        let input = readings(&[100.0, 120.0]);
        let stats = GlucoseStats::compute(&input, &Thresholds::default()).unwrap();
        assert_eq!(stats.std_dev, 10.0);
    }

    #[test]
    fn test_cv_undefined_for_zero_average() {
        let input = readings(&[0.0, 0.0]);
        let stats = GlucoseStats::compute(&input, &Thresholds::default()).unwrap();
        assert!(!stats.coefficient_of_variation.is_finite());
    }

    #[test]
    fn test_unit_round_trip() {
        for mgdl in (40..=400).step_by(5) {
            let mgdl = mgdl as f64;
            let back = mmol_to_mgdl(mgdl_to_mmol(mgdl));
            assert!(
                (back - mgdl).abs() <= 1.0,
                "{mgdl} round-tripped to {back}"
            );
        }
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(180.0, GlucoseUnit::MgDl), "180 mg/dL");
        assert_eq!(format_value(180.0, GlucoseUnit::MmolL), "10 mmol/L");
        assert_eq!(format_value(100.0, GlucoseUnit::MmolL), "5.5 mmol/L");
    }

    #[test]
    fn test_filter_to_window_inclusive() {
        let input = readings(&[100.0, 110.0, 120.0, 130.0]);
        let start = input[1].timestamp;
        let end = input[2].timestamp;

        let filtered = filter_to_window(input, start, end);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].value, 110.0);
        assert_eq!(filtered[1].value, 120.0);
    }
}
