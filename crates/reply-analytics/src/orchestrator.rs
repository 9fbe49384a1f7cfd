//! Multi-source, multi-period analysis.
//!
//! Fetches every registered source concurrently, pairs and aggregates each
//! one over its three windows, then builds the combined view by
//! re-aggregating the union of the per-source pairs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use reply_core::config::{AppConfig, DailyWindow, LatencyPolicy};
use reply_core::error::ReplyError;
use reply_core::event::SourceKind;
use reply_core::source::{EventSource, FetchedEvents, SourceId, SourceRegistry};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregations::aggregate;
use crate::grouping::group_by_conversation;
use crate::pairing::{PairingDiagnostics, ResponsePair, ResponsePairer};
use crate::periods::{Period, PeriodStats, PeriodWindows};

/// Everything that controls how one source is analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePolicy {
    pub latency: LatencyPolicy,
    pub daily_window: DailyWindow,
    pub lookback: Duration,
}

impl SourcePolicy {
    pub fn for_kind(kind: SourceKind) -> Self {
        Self {
            latency: LatencyPolicy::for_kind(kind),
            daily_window: DailyWindow::for_kind(kind),
            lookback: Duration::days(7),
        }
    }
}

/// Orchestrator settings, built once per run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Reference timezone for calendar-day windows.
    pub timezone: Tz,
    /// Upper bound on each source's fetch.
    pub fetch_timeout: std::time::Duration,
    /// Per-source overrides. Sources not listed use their kind's defaults.
    pub policies: HashMap<SourceId, SourcePolicy>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::Los_Angeles,
            fetch_timeout: std::time::Duration::from_secs(60),
            policies: HashMap::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ReplyError> {
        config.validate()?;

        let policies = config
            .enabled_sources()
            .map(|s| {
                (
                    SourceId::new(s.id.clone()),
                    SourcePolicy {
                        latency: s.latency_policy(),
                        daily_window: s.daily_window(),
                        lookback: s.lookback(),
                    },
                )
            })
            .collect();

        Ok(Self {
            timezone: config.reference_timezone()?,
            fetch_timeout: std::time::Duration::from_secs(config.fetch.timeout_secs),
            policies,
        })
    }

    pub fn policy_for(&self, id: &SourceId, kind: SourceKind) -> SourcePolicy {
        self.policies
            .get(id)
            .copied()
            .unwrap_or_else(|| SourcePolicy::for_kind(kind))
    }
}

/// What happened to a source's data on the way through the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceDiagnostics {
    pub events: usize,
    pub dropped: usize,
    pub conversations: usize,
    pub pairing: PairingDiagnostics,
}

/// Analysis of one source that was fetched successfully.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub kind: SourceKind,
    pub windows: PeriodWindows,
    pub stats: PeriodStats,
    pub diagnostics: SourceDiagnostics,
}

impl SourceReport {
    /// Group, pair, and aggregate an already-fetched snapshot.
    pub fn build(
        kind: SourceKind,
        policy: &SourcePolicy,
        windows: PeriodWindows,
        fetched: FetchedEvents,
    ) -> Self {
        let events = fetched.events.len();
        let conversations = group_by_conversation(fetched.events);
        let (pairs, pairing) = ResponsePairer::new(policy.latency).pair_all(&conversations);
        let stats = PeriodStats::compute(&pairs, &windows);

        Self {
            kind,
            windows,
            stats,
            diagnostics: SourceDiagnostics {
                events,
                dropped: fetched.dropped,
                conversations: conversations.len(),
                pairing,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Available(SourceReport),
    /// The fetch failed or timed out; no stats for this run.
    Unavailable { kind: SourceKind, reason: String },
}

impl SourceOutcome {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceOutcome::Available(report) => report.kind,
            SourceOutcome::Unavailable { kind, .. } => *kind,
        }
    }

    pub fn report(&self) -> Option<&SourceReport> {
        match self {
            SourceOutcome::Available(report) => Some(report),
            SourceOutcome::Unavailable { .. } => None,
        }
    }
}

/// Result of one run: per-source breakouts plus the combined view.
#[derive(Debug, Clone)]
pub struct MultiPeriodResult {
    pub generated_at: DateTime<Utc>,
    pub timezone: Tz,
    pub by_source: BTreeMap<SourceId, SourceOutcome>,
    pub combined: PeriodStats,
}

impl MultiPeriodResult {
    pub fn available(&self) -> impl Iterator<Item = (&SourceId, &SourceReport)> {
        self.by_source
            .iter()
            .filter_map(|(id, outcome)| outcome.report().map(|r| (id, r)))
    }

    pub fn unavailable(&self) -> impl Iterator<Item = (&SourceId, &str)> {
        self.by_source.iter().filter_map(|(id, outcome)| match outcome {
            SourceOutcome::Unavailable { reason, .. } => Some((id, reason.as_str())),
            SourceOutcome::Available(_) => None,
        })
    }
}

pub struct MultiPeriodOrchestrator {
    config: OrchestratorConfig,
}

impl MultiPeriodOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Fetch and analyze every registered source as of `now`.
    pub async fn run(&self, registry: &SourceRegistry, now: DateTime<Utc>) -> MultiPeriodResult {
        let jobs = registry.iter().map(|(id, source)| {
            let policy = self.config.policy_for(id, source.kind());
            let windows = PeriodWindows::compute(now, policy.daily_window, self.config.timezone);
            async move {
                let fetched = self.fetch(source, &windows, policy.lookback).await;
                (id.clone(), source.kind(), policy, windows, fetched)
            }
        });
        let fetched = futures::future::join_all(jobs).await;

        let mut by_source = BTreeMap::new();
        for (id, kind, policy, windows, result) in fetched {
            let outcome = match result {
                Ok(events) => {
                    let report = SourceReport::build(kind, &policy, windows, events);
                    info!(
                        "{}: {} events, {} conversations, {} pairs ({} dropped, {} rejected)",
                        id,
                        report.diagnostics.events,
                        report.diagnostics.conversations,
                        report.diagnostics.pairing.pairs,
                        report.diagnostics.dropped,
                        report.diagnostics.pairing.rejected(),
                    );
                    SourceOutcome::Available(report)
                }
                Err(e) => {
                    warn!("Source '{}' unavailable: {}", id, e);
                    SourceOutcome::Unavailable {
                        kind,
                        reason: e.to_string(),
                    }
                }
            };
            by_source.insert(id, outcome);
        }

        let combined = combine(&by_source, now, self.config.timezone);

        MultiPeriodResult {
            generated_at: now,
            timezone: self.config.timezone,
            by_source,
            combined,
        }
    }

    async fn fetch(
        &self,
        source: &Arc<dyn EventSource>,
        windows: &PeriodWindows,
        lookback: Duration,
    ) -> Result<FetchedEvents, ReplyError> {
        let range = windows.covering();
        match tokio::time::timeout(
            self.config.fetch_timeout,
            source.fetch_events(range.start, range.end, lookback),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReplyError::Timeout(source.id().to_string())),
        }
    }
}

/// Combined statistics across the available sources.
///
/// Each period is recomputed from the union of the per-source pairs, so the
/// combined mean and median weigh every response equally regardless of
/// which source it came from.
pub fn combine(
    by_source: &BTreeMap<SourceId, SourceOutcome>,
    now: DateTime<Utc>,
    tz: Tz,
) -> PeriodStats {
    let reports: Vec<&SourceReport> = by_source.values().filter_map(|o| o.report()).collect();
    let fallback = PeriodWindows::compute(now, DailyWindow::Trailing24h, tz);

    let combine_period = |period: Period| {
        let pairs: Vec<ResponsePair> = reports
            .iter()
            .flat_map(|r| r.stats.get(period).pairs().iter().cloned())
            .collect();
        let window = reports
            .iter()
            .map(|r| r.windows.get(period))
            .reduce(|a, b| a.span(&b))
            .unwrap_or_else(|| fallback.get(period));
        aggregate(&pairs, window)
    };

    PeriodStats {
        last_24h: combine_period(Period::Last24h),
        last_7d: combine_period(Period::Last7d),
        last_28d: combine_period(Period::Last28d),
    }
}
