//! Display range for the dashboard chart's y-axis.

use crate::core::signal::{GLUCOSE_MAX, GLUCOSE_MIN};
use crate::core::types::GlucosePoint;
use serde::{Deserialize, Serialize};

/// Range used when there is nothing to plot.
pub const DEFAULT_RANGE: AxisRange = AxisRange {
    min: 50.0,
    max: 150.0,
};

/// Smallest span the axis is allowed to show.
const MIN_SPAN: f64 = 20.0;
const MIN_PADDING: f64 = 5.0;
const PADDING_FRACTION: f64 = 0.15;

/// Inclusive y-axis bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Derive a padded, clamped range from the buffered points.
///
/// When the padded window is narrower than 20 units it is replaced by a
/// 20-unit window centered on its midpoint, even if that crosses the
/// 20..200 clamp.
pub fn estimate_range(history: &[GlucosePoint]) -> AxisRange {
    let Some((lo, hi)) = min_max(history.iter().map(|p| p.glucose)) else {
        return DEFAULT_RANGE;
    };

    let padding = ((hi - lo) * PADDING_FRACTION).max(MIN_PADDING);
    let mut range = AxisRange {
        min: (lo - padding).max(GLUCOSE_MIN),
        max: (hi + padding).min(GLUCOSE_MAX),
    };

    if range.span() < MIN_SPAN {
        let center = (range.min + range.max) / 2.0;
        range = AxisRange {
            min: center - MIN_SPAN / 2.0,
            max: center + MIN_SPAN / 2.0,
        };
    }

    range
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn points(values: &[f64]) -> Vec<GlucosePoint> {
        values
            .iter()
            .map(|&glucose| GlucosePoint {
                time: Utc::now(),
                glucose,
                red: 0.6,
                ir: 0.7,
                temperature: 36.5,
                motion: 0.3,
            })
            .collect()
    }

    #[test]
    fn test_empty_history_uses_default() {
        assert_eq!(estimate_range(&[]), AxisRange { min: 50.0, max: 150.0 });
    }

    #[test]
    fn test_flat_history_is_centered_window() {
        let range = estimate_range(&points(&[100.0; 10]));
        assert_eq!(range, AxisRange { min: 90.0, max: 110.0 });
    }

    #[test]
    fn test_recenter_overrides_lower_clamp() {
        // padded window clamps to 20..25, then recenters on 22.5
        let range = estimate_range(&points(&[20.0, 20.0]));
        assert_eq!(range, AxisRange { min: 12.5, max: 32.5 });
        assert!(range.min < GLUCOSE_MIN);
    }

    #[test]
    fn test_recenter_overrides_upper_clamp() {
        let range = estimate_range(&points(&[200.0]));
        assert_eq!(range, AxisRange { min: 187.5, max: 207.5 });
    }

    #[test]
    fn test_wide_history_uses_proportional_padding() {
        let range = estimate_range(&points(&[60.0, 140.0, 100.0]));
        // span 80 -> padding 12
        assert!((range.min - 48.0).abs() < 1e-9);
        assert!((range.max - 152.0).abs() < 1e-9);
    }

    #[test]
    fn test_narrow_history_uses_minimum_padding() {
        let range = estimate_range(&points(&[95.0, 110.0]));
        // span 15 -> padding max(5, 2.25) = 5
        assert_eq!(range, AxisRange { min: 90.0, max: 115.0 });
    }

    #[test]
    fn test_range_clamped_to_valid_band() {
        let range = estimate_range(&points(&[22.0, 198.0]));
        assert_eq!(range, AxisRange { min: 20.0, max: 200.0 });
    }
}
