//! Timeframe resolution and bucket-boundary resampling.
//!
//! Maps the dashboard's closed set of timeframe labels onto concrete time
//! windows and resolutions, and derives the deterministic bucket grid every
//! downstream series aligns to.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::models::{Bucket, Resolution, SeriesEntry, TimeWindow};

/// Enumerated dashboard timeframe labels.
///
/// Unrecognized labels fall back to [`Timeframe::SevenDays`] without an
/// error, both in [`Timeframe::parse`] and when deserializing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Timeframe {
    OneHour,
    FourHours,
    OneDay,
    #[default]
    SevenDays,
    ThirtyDays,
    CurrentPeriod,
    LastPeriod,
}

impl Timeframe {
    pub fn parse(label: &str) -> Self {
        match label {
            "1h" => Timeframe::OneHour,
            "4h" => Timeframe::FourHours,
            "1d" => Timeframe::OneDay,
            "7d" => Timeframe::SevenDays,
            "30d" => Timeframe::ThirtyDays,
            "currentPeriod" => Timeframe::CurrentPeriod,
            "lastPeriod" => Timeframe::LastPeriod,
            _ => Timeframe::default(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
            Timeframe::SevenDays => "7d",
            Timeframe::ThirtyDays => "30d",
            Timeframe::CurrentPeriod => "currentPeriod",
            Timeframe::LastPeriod => "lastPeriod",
        }
    }

    /// Map the label to its inclusive window and resolution, relative to
    /// `now`.
    pub fn resolve(self, now: DateTime<Utc>) -> (TimeWindow, Resolution) {
        match self {
            Timeframe::OneHour => (window_ending(now, Duration::hours(1)), Resolution::FiveMinutes),
            Timeframe::FourHours => {
                (window_ending(now, Duration::hours(4)), Resolution::FiveMinutes)
            }
            Timeframe::OneDay => (window_ending(now, Duration::hours(24)), Resolution::OneHour),
            Timeframe::SevenDays => (window_ending(now, Duration::days(7)), Resolution::OneHour),
            Timeframe::ThirtyDays => (window_ending(now, Duration::days(30)), Resolution::OneDay),
            Timeframe::CurrentPeriod => (
                TimeWindow {
                    lower: month_start(now),
                    upper: now,
                },
                Resolution::OneDay,
            ),
            Timeframe::LastPeriod => {
                // Final second of the previous month keeps the
                // inclusive-bounds convention.
                let upper = month_start(now) - Duration::seconds(1);
                (
                    TimeWindow {
                        lower: previous_month_start(now),
                        upper,
                    },
                    Resolution::OneDay,
                )
            }
        }
    }
}

impl Serialize for Timeframe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Timeframe::parse(&label))
    }
}

fn window_ending(now: DateTime<Utc>, length: Duration) -> TimeWindow {
    TimeWindow {
        lower: now - length,
        upper: now,
    }
}

fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

fn previous_month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if at.month() == 1 {
        (at.year() - 1, 12)
    } else {
        (at.year(), at.month() - 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

/// Deterministic bucket boundary sequence for a window at a resolution.
///
/// This is the single source of truth for bucket boundaries: every series
/// produced for a query aligns to the same grid so entries are comparable
/// bucket-for-bucket. The first start is the window's lower bound floored to
/// the epoch-aligned resolution grid; starts step by exactly the width; the
/// last bucket covers the upper bound. A boundary-aligned upper bound does
/// not open a new bucket: it belongs to the final one.
#[derive(Debug, Clone)]
pub struct BucketGrid {
    starts: Vec<DateTime<Utc>>,
    first_start_secs: i64,
    width_secs: i64,
    window: TimeWindow,
}

impl BucketGrid {
    pub fn build(window: TimeWindow, resolution: Resolution) -> Self {
        Self::with_width(window, resolution.width_secs())
    }

    pub(crate) fn with_width(window: TimeWindow, width_secs: i64) -> Self {
        let first_start_secs = window.lower.timestamp().div_euclid(width_secs) * width_secs;
        let mut starts = Vec::new();
        let mut start = first_start_secs;
        // Strict comparison: a start equal to the upper bound would open a
        // bucket holding at most that single aligned instant, which belongs
        // to the previous bucket. A single-instant window still gets one.
        while start < window.upper.timestamp() || starts.is_empty() {
            starts.push(
                DateTime::from_timestamp(start, 0).unwrap_or(window.lower),
            );
            start += width_secs;
        }
        Self {
            starts,
            first_start_secs,
            width_secs,
            window,
        }
    }

    pub fn starts(&self) -> &[DateTime<Utc>] {
        &self.starts
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn width_secs(&self) -> i64 {
        self.width_secs
    }

    /// Index of the bucket owning a timestamp, or `None` when the timestamp
    /// falls outside the window. An inclusive upper bound sitting exactly on
    /// a grid boundary clamps into the final bucket.
    pub fn index_of(&self, at: DateTime<Utc>) -> Option<usize> {
        if !self.window.contains(at) {
            return None;
        }
        let index = (at.timestamp() - self.first_start_secs).div_euclid(self.width_secs);
        let index = usize::try_from(index).ok()?;
        Some(index.min(self.starts.len() - 1))
    }

    /// A full-length series of zero-value buckets for one subject.
    pub fn zero_series(&self, subject_id: Uuid) -> SeriesEntry {
        SeriesEntry {
            subject_id,
            buckets: self
                .starts
                .iter()
                .map(|start| Bucket {
                    bucket_start: *start,
                    value: 0,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[rstest]
    #[case::one_hour("1h", Timeframe::OneHour)]
    #[case::four_hours("4h", Timeframe::FourHours)]
    #[case::one_day("1d", Timeframe::OneDay)]
    #[case::seven_days("7d", Timeframe::SevenDays)]
    #[case::thirty_days("30d", Timeframe::ThirtyDays)]
    #[case::current_period("currentPeriod", Timeframe::CurrentPeriod)]
    #[case::last_period("lastPeriod", Timeframe::LastPeriod)]
    #[case::unrecognized("yesterday", Timeframe::SevenDays)]
    #[case::empty("", Timeframe::SevenDays)]
    fn test_label_parsing(#[case] label: &str, #[case] expected: Timeframe) {
        assert_eq!(Timeframe::parse(label), expected);
    }

    #[rstest]
    #[case::one_hour(Timeframe::OneHour, 3_600, Resolution::FiveMinutes)]
    #[case::four_hours(Timeframe::FourHours, 4 * 3_600, Resolution::FiveMinutes)]
    #[case::one_day(Timeframe::OneDay, 86_400, Resolution::OneHour)]
    #[case::seven_days(Timeframe::SevenDays, 7 * 86_400, Resolution::OneHour)]
    #[case::thirty_days(Timeframe::ThirtyDays, 30 * 86_400, Resolution::OneDay)]
    fn test_relative_windows(
        #[case] timeframe: Timeframe,
        #[case] length_secs: i64,
        #[case] resolution: Resolution,
    ) {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 34, 56).unwrap();
        let (window, got) = timeframe.resolve(now);
        assert_eq!(window.upper, now);
        assert_eq!(window.upper.timestamp() - window.lower.timestamp(), length_secs);
        assert_eq!(got, resolution);
    }

    #[test]
    fn test_current_period_starts_at_month_start() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let (window, resolution) = Timeframe::CurrentPeriod.resolve(now);
        assert_eq!(window.lower, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(window.upper, now);
        assert_eq!(resolution, Resolution::OneDay);
    }

    #[test]
    fn test_last_period_is_previous_calendar_month() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let (window, resolution) = Timeframe::LastPeriod.resolve(now);
        assert_eq!(window.lower, Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(window.upper, Utc.with_ymd_and_hms(2025, 5, 31, 23, 59, 59).unwrap());
        assert_eq!(resolution, Resolution::OneDay);
    }

    #[test]
    fn test_last_period_crosses_year_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
        let (window, _) = Timeframe::LastPeriod.resolve(now);
        assert_eq!(window.lower, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(window.upper, Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_last_period_leap_february() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let (window, _) = Timeframe::LastPeriod.resolve(now);
        assert_eq!(window.upper, Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_timeframe_deserializes_with_fallback() {
        let timeframe: Timeframe = serde_json::from_str("\"30d\"").unwrap();
        assert_eq!(timeframe, Timeframe::ThirtyDays);
        let fallback: Timeframe = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(fallback, Timeframe::SevenDays);
    }

    #[test]
    fn test_grid_covers_window_without_gaps_or_overlaps() {
        let window = TimeWindow::new(at(130), at(950)).unwrap();
        let grid = BucketGrid::with_width(window, 300);
        let starts = grid.starts();

        // First start is the lower bound floored to the grid.
        assert_eq!(starts[0], at(0));
        assert!(starts[0] <= window.lower);
        assert!(window.lower < starts[0] + Duration::seconds(300));

        // Consecutive starts differ by exactly the width.
        for pair in starts.windows(2) {
            assert_eq!(pair[1].timestamp() - pair[0].timestamp(), 300);
        }

        // The last bucket covers the upper bound.
        let last = starts[starts.len() - 1];
        assert!(last <= window.upper);
        assert!(window.upper < last + Duration::seconds(300));
    }

    #[test]
    fn test_grid_when_upper_lands_on_boundary() {
        // A window of exactly three widths yields exactly three buckets; no
        // trailing bucket opens at the aligned upper bound.
        let window = TimeWindow::new(at(0), at(300)).unwrap();
        let grid = BucketGrid::with_width(window, 100);
        assert_eq!(
            grid.starts().iter().map(|s| s.timestamp()).collect::<Vec<_>>(),
            vec![0, 100, 200]
        );

        let window = TimeWindow::new(at(0), at(600)).unwrap();
        let grid = BucketGrid::with_width(window, 300);
        assert_eq!(
            grid.starts().iter().map(|s| s.timestamp()).collect::<Vec<_>>(),
            vec![0, 300]
        );
    }

    #[test]
    fn test_index_of_clamps_aligned_upper_into_final_bucket() {
        let window = TimeWindow::new(at(0), at(300)).unwrap();
        let grid = BucketGrid::with_width(window, 100);
        assert_eq!(grid.index_of(at(299)), Some(2));
        assert_eq!(grid.index_of(at(300)), Some(2));
        assert_eq!(grid.index_of(at(301)), None);
    }

    #[test]
    fn test_grid_single_instant_window_on_boundary() {
        let window = TimeWindow::new(at(600), at(600)).unwrap();
        let grid = BucketGrid::with_width(window, 300);
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.starts()[0], at(600));
        assert_eq!(grid.index_of(at(600)), Some(0));
    }

    #[test]
    fn test_grid_single_instant_window() {
        let window = TimeWindow::new(at(450), at(450)).unwrap();
        let grid = BucketGrid::with_width(window, 300);
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.starts()[0], at(300));
    }

    #[test]
    fn test_index_of_respects_window_bounds() {
        let window = TimeWindow::new(at(130), at(950)).unwrap();
        let grid = BucketGrid::with_width(window, 300);

        // In-window timestamps land in their owning bucket.
        assert_eq!(grid.index_of(at(130)), Some(0));
        assert_eq!(grid.index_of(at(299)), Some(0));
        assert_eq!(grid.index_of(at(300)), Some(1));
        assert_eq!(grid.index_of(at(950)), Some(3));

        // Outside the window, even if inside the grid's first bucket.
        assert_eq!(grid.index_of(at(100)), None);
        assert_eq!(grid.index_of(at(951)), None);
    }

    #[test]
    fn test_zero_series_matches_grid() {
        let window = TimeWindow::new(at(0), at(950)).unwrap();
        let grid = BucketGrid::with_width(window, 300);
        let series = grid.zero_series(Uuid::new_v4());
        assert_eq!(series.buckets.len(), grid.len());
        assert!(series.buckets.iter().all(|bucket| bucket.value == 0));
        assert_eq!(series.total(), 0);
    }
}
