//! Period-over-period trend math.

use chrono::Duration;

use crate::models::{TimeWindow, TrendResult};

/// Sentinel display for growth from a zero baseline; the numeric field is
/// `None` so downstream UI cannot mistake it for a real percentage.
pub const UNMEASURABLE_GROWTH: &str = "+∞%";

/// The comparison period: immediately preceding, equal length,
/// non-overlapping, ending exactly at the current window's lower bound.
pub fn comparison_window(current: TimeWindow) -> TimeWindow {
    let length = current.upper - current.lower;
    let upper = current.lower - Duration::seconds(1);
    TimeWindow {
        lower: upper - length,
        upper,
    }
}

/// Percentage delta for one metric between the current and comparison
/// periods, formatted signed to one decimal.
pub fn trend(metric: impl Into<String>, current_total: u64, comparison_total: u64) -> TrendResult {
    let (percent_change, display) = if comparison_total == 0 {
        if current_total == 0 {
            (Some(0.0), "0.0%".to_string())
        } else {
            (None, UNMEASURABLE_GROWTH.to_string())
        }
    } else {
        let percent = (current_total as f64 - comparison_total as f64) / comparison_total as f64
            * 100.0;
        (Some(percent), format_percent(percent))
    };

    TrendResult {
        metric: metric.into(),
        current_total,
        comparison_total,
        percent_change,
        display,
    }
}

fn format_percent(percent: f64) -> String {
    if percent >= 0.0 {
        format!("+{percent:.1}%")
    } else {
        format!("{percent:.1}%")
    }
}
