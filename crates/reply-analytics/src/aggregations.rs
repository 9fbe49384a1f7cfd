//! Windowed latency statistics.
//!
//! Reduces a set of response pairs to count, mean, median, extrema, and a
//! three-bucket distribution for one closed time window.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::pairing::ResponsePair;

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 86_400;

/// Closed instant range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of `length` ending at `end`.
    pub fn trailing(end: DateTime<Utc>, length: Duration) -> Self {
        Self::new(end - length, end)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Smallest window covering both.
    pub fn span(&self, other: &Window) -> Window {
        Window::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Response counts by latency bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Distribution {
    /// Under one hour.
    pub under_1h: usize,
    /// One hour up to (not including) 24 hours.
    pub from_1h_to_24h: usize,
    /// 24 hours or more.
    pub over_24h: usize,
}

impl Distribution {
    pub fn record(&mut self, latency: Duration) {
        let secs = latency.num_seconds();
        if secs < HOUR_SECS {
            self.under_1h += 1;
        } else if secs < DAY_SECS {
            self.from_1h_to_24h += 1;
        } else {
            self.over_24h += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.under_1h + self.from_1h_to_24h + self.over_24h
    }

    /// Share of `count` in the total as a floored whole percent.
    pub fn percent(&self, count: usize) -> usize {
        match self.total() {
            0 => 0,
            total => count * 100 / total,
        }
    }

    /// Buckets in display order with their labels.
    pub fn buckets(&self) -> [(&'static str, usize); 3] {
        [
            ("Under 1 hour", self.under_1h),
            ("1-24 hours", self.from_1h_to_24h),
            ("Over 24 hours", self.over_24h),
        ]
    }
}

/// Statistics for a window that contains at least one response.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulatedStats {
    window: Window,
    mean: Duration,
    median: Duration,
    min: Duration,
    max: Duration,
    distribution: Distribution,
    pairs: Vec<ResponsePair>,
}

impl PopulatedStats {
    pub fn window(&self) -> Window {
        self.window
    }

    pub fn count(&self) -> usize {
        self.pairs.len()
    }

    pub fn mean(&self) -> Duration {
        self.mean
    }

    /// Lower-middle element on even counts; never interpolated.
    pub fn median(&self) -> Duration {
        self.median
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    pub fn pairs(&self) -> &[ResponsePair] {
        &self.pairs
    }

    /// Count responses by a metadata value of the received event, e.g.
    /// `service` for iMessage vs SMS. Pairs without the key count as "unknown".
    pub fn breakdown(&self, metadata_key: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for pair in &self.pairs {
            let value = pair
                .metadata()
                .get(metadata_key)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            *counts.entry(value).or_insert(0) += 1;
        }
        counts
    }
}

/// Statistics for one (source, window) combination.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowStats {
    /// No responses landed in the window.
    Empty { window: Window },
    Populated(PopulatedStats),
}

impl WindowStats {
    pub fn window(&self) -> Window {
        match self {
            WindowStats::Empty { window } => *window,
            WindowStats::Populated(stats) => stats.window,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            WindowStats::Empty { .. } => 0,
            WindowStats::Populated(stats) => stats.count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, WindowStats::Empty { .. })
    }

    pub fn as_populated(&self) -> Option<&PopulatedStats> {
        match self {
            WindowStats::Empty { .. } => None,
            WindowStats::Populated(stats) => Some(stats),
        }
    }

    /// Pairs counted in this window; empty for `Empty`.
    pub fn pairs(&self) -> &[ResponsePair] {
        match self {
            WindowStats::Empty { .. } => &[],
            WindowStats::Populated(stats) => &stats.pairs,
        }
    }
}

/// Compute statistics over the pairs whose response falls in `window`.
pub fn aggregate(pairs: &[ResponsePair], window: Window) -> WindowStats {
    let selected: Vec<ResponsePair> = pairs
        .iter()
        .filter(|p| window.contains(p.responded_at()))
        .cloned()
        .collect();

    if selected.is_empty() {
        return WindowStats::Empty { window };
    }

    let mut latencies: Vec<Duration> = selected.iter().map(|p| p.latency()).collect();

    let total_ms: i128 = latencies.iter().map(|l| l.num_milliseconds() as i128).sum();
    let mean = Duration::milliseconds((total_ms / latencies.len() as i128) as i64);

    let mut distribution = Distribution::default();
    let mut min = latencies[0];
    let mut max = latencies[0];
    for &latency in &latencies {
        distribution.record(latency);
        min = min.min(latency);
        max = max.max(latency);
    }

    latencies.sort();
    let median = latencies[latencies.len() / 2];

    WindowStats::Populated(PopulatedStats {
        window,
        mean,
        median,
        min,
        max,
        distribution,
        pairs: selected,
    })
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Format a duration for display, always rounding down.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);

    if secs < 60 {
        plural(secs, "second")
    } else if secs < HOUR_SECS {
        plural(secs / 60, "minute")
    } else if secs < DAY_SECS {
        format!(
            "{} {} min",
            plural(secs / HOUR_SECS, "hour"),
            (secs % HOUR_SECS) / 60
        )
    } else {
        format!(
            "{} {}",
            plural(secs / DAY_SECS, "day"),
            plural((secs % DAY_SECS) / HOUR_SECS, "hour")
        )
    }
}
