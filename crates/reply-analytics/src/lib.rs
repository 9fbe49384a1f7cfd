//! Response pairing, windowed latency aggregation, and reporting.
//!
//! Turns normalized events into first-response pairs per conversation,
//! computes descriptive statistics over the daily, weekly, and four-week
//! windows, combines sources, and renders markdown/text/JSON summaries.

pub mod aggregations;
pub mod export;
pub mod grouping;
pub mod orchestrator;
pub mod pairing;
pub mod periods;
pub mod reports;

pub use aggregations::{aggregate, format_duration, Distribution, PopulatedStats, Window, WindowStats};
pub use export::{summary_json, SummaryExport};
pub use grouping::group_by_conversation;
pub use orchestrator::{MultiPeriodOrchestrator, MultiPeriodResult, OrchestratorConfig, SourceOutcome};
pub use pairing::{PairingDiagnostics, ResponsePair, ResponsePairer};
pub use periods::{Period, PeriodStats};
pub use reports::ReportGenerator;
