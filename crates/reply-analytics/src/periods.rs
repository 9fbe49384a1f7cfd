//! The three standard reporting periods and how their windows are cut.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use reply_core::config::DailyWindow;

use crate::aggregations::{aggregate, Window, WindowStats};
use crate::pairing::ResponsePair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Last24h,
    Last7d,
    Last28d,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Last24h, Period::Last7d, Period::Last28d];

    pub fn label(&self) -> &'static str {
        match self {
            Period::Last24h => "Daily",
            Period::Last7d => "Last 7 Days",
            Period::Last28d => "Last 28 Days",
        }
    }
}

/// Windows for the three periods of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindows {
    pub last_24h: Window,
    pub last_7d: Window,
    pub last_28d: Window,
}

impl PeriodWindows {
    /// Cut the windows for a run at `now`. The weekly and four-week windows
    /// always trail `now`; the daily window follows `daily`.
    pub fn compute(now: DateTime<Utc>, daily: DailyWindow, tz: Tz) -> Self {
        let last_24h = match daily {
            DailyWindow::Trailing24h => Window::trailing(now, Duration::hours(24)),
            DailyWindow::PreviousCalendarDay => previous_calendar_day(now, tz),
        };
        Self {
            last_24h,
            last_7d: Window::trailing(now, Duration::days(7)),
            last_28d: Window::trailing(now, Duration::days(28)),
        }
    }

    pub fn get(&self, period: Period) -> Window {
        match period {
            Period::Last24h => self.last_24h,
            Period::Last7d => self.last_7d,
            Period::Last28d => self.last_28d,
        }
    }

    /// Range that must be fetched to fill every window.
    pub fn covering(&self) -> Window {
        self.last_24h.span(&self.last_7d).span(&self.last_28d)
    }
}

/// Yesterday in `tz`, from local midnight up to the last microsecond
/// before the following local midnight, expressed in UTC.
pub fn previous_calendar_day(now: DateTime<Utc>, tz: Tz) -> Window {
    let today = now.with_timezone(&tz).date_naive();
    let yesterday = today - Duration::days(1);
    Window::new(
        local_midnight(yesterday, tz),
        local_midnight(today, tz) - Duration::microseconds(1),
    )
}

fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    // Zones that shift clocks at midnight skip it; the day starts an hour later.
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Window statistics for the three periods.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodStats {
    pub last_24h: WindowStats,
    pub last_7d: WindowStats,
    pub last_28d: WindowStats,
}

impl PeriodStats {
    /// Aggregate one pair set over each of the windows.
    pub fn compute(pairs: &[ResponsePair], windows: &PeriodWindows) -> Self {
        Self {
            last_24h: aggregate(pairs, windows.last_24h),
            last_7d: aggregate(pairs, windows.last_7d),
            last_28d: aggregate(pairs, windows.last_28d),
        }
    }

    pub fn get(&self, period: Period) -> &WindowStats {
        match period {
            Period::Last24h => &self.last_24h,
            Period::Last7d => &self.last_7d,
            Period::Last28d => &self.last_28d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reply_core::event::{Event, SourceKind};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_trailing_windows() {
        let now = utc(2025, 3, 10, 12, 0);
        let windows = PeriodWindows::compute(now, DailyWindow::Trailing24h, chrono_tz::UTC);
        assert_eq!(windows.last_24h, Window::new(utc(2025, 3, 9, 12, 0), now));
        assert_eq!(windows.last_7d.start, utc(2025, 3, 3, 12, 0));
        assert_eq!(windows.last_28d.start, utc(2025, 2, 10, 12, 0));
        assert_eq!(windows.covering(), windows.last_28d);
    }

    #[test]
    fn test_previous_calendar_day_pacific() {
        // 05:30 UTC on the 10th is still the evening of the 9th in Los Angeles,
        // so the previous calendar day there is the 8th (PST, UTC-8).
        let now = utc(2025, 3, 10, 5, 30);
        let window = previous_calendar_day(now, chrono_tz::America::Los_Angeles);
        assert_eq!(window.start, utc(2025, 3, 8, 8, 0));
        assert_eq!(window.end, utc(2025, 3, 9, 8, 0) - Duration::microseconds(1));
    }

    #[test]
    fn test_previous_calendar_day_across_dst_change() {
        // 2025-03-09 is 23 hours long in Los Angeles (clocks spring forward).
        let now = utc(2025, 3, 10, 20, 0);
        let window = previous_calendar_day(now, chrono_tz::America::Los_Angeles);
        assert_eq!(window.start, utc(2025, 3, 9, 8, 0));
        assert_eq!(window.end, utc(2025, 3, 10, 7, 0) - Duration::microseconds(1));
    }

    #[test]
    fn test_daily_window_contains_last_moment_of_day() {
        let now = utc(2025, 3, 10, 12, 0);
        let window = previous_calendar_day(now, chrono_tz::UTC);
        assert!(window.contains(utc(2025, 3, 9, 23, 59) + Duration::seconds(59)));
        assert!(!window.contains(utc(2025, 3, 10, 0, 0)));
        assert!(window.contains(utc(2025, 3, 9, 0, 0)));
    }

    #[test]
    fn test_covering_includes_calendar_day() {
        let now = utc(2025, 3, 10, 12, 0);
        let windows =
            PeriodWindows::compute(now, DailyWindow::PreviousCalendarDay, chrono_tz::UTC);
        let covering = windows.covering();
        assert_eq!(covering.start, windows.last_28d.start);
        assert_eq!(covering.end, now);
    }

    #[test]
    fn test_period_stats_compute() {
        let now = utc(2025, 3, 10, 12, 0);
        let windows = PeriodWindows::compute(now, DailyWindow::Trailing24h, chrono_tz::UTC);
        let pair = |days_ago: i64| {
            let responded = now - Duration::days(days_ago);
            ResponsePair::new(
                &Event::received("c", responded - Duration::minutes(10), SourceKind::Email),
                &Event::sent("c", responded, SourceKind::Email),
            )
        };
        let pairs = vec![pair(0), pair(3), pair(20), pair(40)];

        let stats = PeriodStats::compute(&pairs, &windows);
        assert_eq!(stats.get(Period::Last24h).count(), 1);
        assert_eq!(stats.get(Period::Last7d).count(), 2);
        assert_eq!(stats.get(Period::Last28d).count(), 3);
    }

    #[test]
    fn test_period_labels() {
        let labels: Vec<&str> = Period::ALL.iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec!["Daily", "Last 7 Days", "Last 28 Days"]);
    }
}
