//! JSON summary export.
//!
//! Carries the numbers only; individual pairs (subjects, contacts) are
//! left out so the summary can be shared.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use reply_core::event::SourceKind;
use serde::Serialize;

use crate::aggregations::{format_duration, Distribution, WindowStats};
use crate::orchestrator::{MultiPeriodResult, SourceDiagnostics, SourceOutcome};
use crate::periods::PeriodStats;

#[derive(Debug, Serialize)]
pub struct SummaryExport {
    pub generated_at: DateTime<Utc>,
    pub timezone: String,
    pub combined: PeriodExport,
    pub sources: BTreeMap<String, SourceExport>,
}

#[derive(Debug, Serialize)]
pub struct PeriodExport {
    pub last_24h: WindowExport,
    pub last_7d: WindowExport,
    pub last_28d: WindowExport,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowExport {
    Empty {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        total_responses: usize,
        message: String,
    },
    Populated {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        total_responses: usize,
        avg_response_secs: f64,
        avg_response_formatted: String,
        median_response_secs: f64,
        median_response_formatted: String,
        fastest_response_secs: f64,
        slowest_response_secs: f64,
        distribution: Distribution,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceExport {
    Available {
        kind: SourceKind,
        periods: PeriodExport,
        diagnostics: SourceDiagnostics,
    },
    Unavailable {
        kind: SourceKind,
        reason: String,
    },
}

fn secs(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

impl From<&WindowStats> for WindowExport {
    fn from(stats: &WindowStats) -> Self {
        let window = stats.window();
        match stats {
            WindowStats::Empty { .. } => WindowExport::Empty {
                window_start: window.start,
                window_end: window.end,
                total_responses: 0,
                message: "No responses found in the specified period".into(),
            },
            WindowStats::Populated(s) => WindowExport::Populated {
                window_start: window.start,
                window_end: window.end,
                total_responses: s.count(),
                avg_response_secs: secs(s.mean()),
                avg_response_formatted: format_duration(s.mean()),
                median_response_secs: secs(s.median()),
                median_response_formatted: format_duration(s.median()),
                fastest_response_secs: secs(s.min()),
                slowest_response_secs: secs(s.max()),
                distribution: *s.distribution(),
            },
        }
    }
}

impl From<&PeriodStats> for PeriodExport {
    fn from(stats: &PeriodStats) -> Self {
        Self {
            last_24h: (&stats.last_24h).into(),
            last_7d: (&stats.last_7d).into(),
            last_28d: (&stats.last_28d).into(),
        }
    }
}

impl From<&MultiPeriodResult> for SummaryExport {
    fn from(result: &MultiPeriodResult) -> Self {
        let sources = result
            .by_source
            .iter()
            .map(|(id, outcome)| {
                let export = match outcome {
                    SourceOutcome::Available(report) => SourceExport::Available {
                        kind: report.kind,
                        periods: (&report.stats).into(),
                        diagnostics: report.diagnostics,
                    },
                    SourceOutcome::Unavailable { kind, reason } => SourceExport::Unavailable {
                        kind: *kind,
                        reason: reason.clone(),
                    },
                };
                (id.to_string(), export)
            })
            .collect();

        Self {
            generated_at: result.generated_at,
            timezone: result.timezone.name().to_string(),
            combined: (&result.combined).into(),
            sources,
        }
    }
}

/// Render the result as pretty-printed JSON.
pub fn summary_json(result: &MultiPeriodResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&SummaryExport::from(result))
}
