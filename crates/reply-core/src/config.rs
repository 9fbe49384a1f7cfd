use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{ReplyError, Result};
use crate::event::SourceKind;

/// Largest latency bound a policy may set (100 years).
pub const MAX_LATENCY_SECS: u64 = 100 * 365 * 24 * 3600;

/// Largest look-back a source may request.
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// IANA timezone used for calendar-day windows.
    pub timezone: String,
    pub fetch: FetchConfig,
    pub report: ReportConfig,
    pub sources: Vec<SourceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let exports = Self::data_dir().join("exports");
        Self {
            timezone: "America/Los_Angeles".into(),
            fetch: FetchConfig::default(),
            report: ReportConfig::default(),
            sources: vec![
                SourceConfig::new("gmail", SourceKind::Email, exports.join("gmail.jsonl")),
                SourceConfig::new("outlook", SourceKind::Email, exports.join("outlook.jsonl"))
                    .disabled(),
                SourceConfig::new("messages", SourceKind::Message, exports.join("messages.jsonl"))
                    .disabled(),
                SourceConfig::new("todoist", SourceKind::Task, exports.join("todoist.json"))
                    .disabled(),
            ],
        }
    }
}

impl AppConfig {
    /// Load configuration from default path (~/.config/reply-meter/config.toml),
    /// falling back to defaults if the file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write current configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reply-meter")
            .join("config.toml")
    }

    /// Data directory for exported source files.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reply-meter")
    }

    /// Parse the configured reference timezone.
    pub fn reference_timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ReplyError::Config(format!("invalid timezone '{}': {}", self.timezone, e)))
    }

    /// Sources switched on for this run, in file order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Check the settings that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        self.reference_timezone()?;

        if self.fetch.timeout_secs == 0 {
            return Err(ReplyError::Config("fetch.timeout_secs must be positive".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(ReplyError::Config("source id must not be empty".into()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ReplyError::Config(format!("duplicate source id '{}'", source.id)));
            }
            if source.enabled && source.path.is_none() {
                return Err(ReplyError::Config(format!(
                    "source '{}' is enabled but has no path",
                    source.id
                )));
            }
            if source.lookback_days > MAX_LOOKBACK_DAYS {
                return Err(ReplyError::Config(format!(
                    "source '{}': lookback_days must be at most {}",
                    source.id, MAX_LOOKBACK_DAYS
                )));
            }
            if let Some(problem) = source.latency_policy().bounds_error() {
                return Err(ReplyError::Config(format!("source '{}': {}", source.id, problem)));
            }
        }
        Ok(())
    }
}

/// Fetch-phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-source fetch timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

/// Report rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
    /// Write the report here instead of stdout.
    pub output: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::Markdown,
            output: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Markdown,
    Text,
    Json,
}

/// How the daily window of a source is cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyWindow {
    /// `[now - 24h, now]`.
    #[serde(rename = "trailing_24h")]
    Trailing24h,
    /// Yesterday, midnight to midnight, in the reference timezone.
    PreviousCalendarDay,
}

impl DailyWindow {
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Email => DailyWindow::Trailing24h,
            SourceKind::Message | SourceKind::Task => DailyWindow::PreviousCalendarDay,
        }
    }
}

/// Which unanswered received event a response is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorMode {
    /// The most recent received event before the response.
    #[default]
    Latest,
    /// The first received event since the last counted response.
    Earliest,
}

/// Sanity bounds applied to every candidate response latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyPolicy {
    /// Latencies below this are dropped. Zero still drops non-positive values.
    pub min_latency_secs: u64,
    /// Latencies above this are dropped. `None` means unbounded.
    pub max_latency_secs: Option<u64>,
    pub anchor: AnchorMode,
}

impl LatencyPolicy {
    /// Default thresholds for a channel kind. Chats drop sub-second sync
    /// artifacts and gaps over a week; email and tasks are unbounded.
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Message => Self {
                min_latency_secs: 1,
                max_latency_secs: Some(7 * 24 * 3600),
                anchor: AnchorMode::Latest,
            },
            SourceKind::Email | SourceKind::Task => Self {
                min_latency_secs: 0,
                max_latency_secs: None,
                anchor: AnchorMode::Latest,
            },
        }
    }

    /// Bounds that are out of range or contradict each other.
    fn bounds_error(&self) -> Option<String> {
        if self.min_latency_secs > MAX_LATENCY_SECS {
            return Some(format!("min_latency_secs must be at most {}", MAX_LATENCY_SECS));
        }
        match self.max_latency_secs {
            Some(max) if max > MAX_LATENCY_SECS => {
                Some(format!("max_latency_secs must be at most {}", MAX_LATENCY_SECS))
            }
            Some(max) if max < self.min_latency_secs => {
                Some("max_latency_secs is below min_latency_secs".into())
            }
            _ => None,
        }
    }

    pub fn min_latency(&self) -> Duration {
        bounded_secs(self.min_latency_secs)
    }

    pub fn max_latency(&self) -> Option<Duration> {
        self.max_latency_secs.map(bounded_secs)
    }
}

fn bounded_secs(secs: u64) -> Duration {
    // Within i64 and TimeDelta range once clamped.
    Duration::seconds(secs.min(MAX_LATENCY_SECS) as i64)
}

/// Partial override of a source's latency policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverride {
    pub min_latency_secs: Option<u64>,
    pub max_latency_secs: Option<u64>,
    pub anchor: Option<AnchorMode>,
}

/// One configured source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub kind: SourceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Export file the adapter reads.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub daily_window: Option<DailyWindow>,
    /// Extra days fetched before the widest window.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default)]
    pub policy: Option<PolicyOverride>,
}

fn default_enabled() -> bool {
    true
}

fn default_lookback_days() -> u32 {
    7
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
            path: Some(path.into()),
            daily_window: None,
            lookback_days: default_lookback_days(),
            policy: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Effective latency policy: kind defaults with any overrides applied.
    pub fn latency_policy(&self) -> LatencyPolicy {
        let mut policy = LatencyPolicy::for_kind(self.kind);
        if let Some(o) = &self.policy {
            if let Some(min) = o.min_latency_secs {
                policy.min_latency_secs = min;
            }
            if let Some(max) = o.max_latency_secs {
                policy.max_latency_secs = Some(max);
            }
            if let Some(anchor) = o.anchor {
                policy.anchor = anchor;
            }
        }
        policy
    }

    pub fn daily_window(&self) -> DailyWindow {
        self.daily_window
            .unwrap_or_else(|| DailyWindow::for_kind(self.kind))
    }

    pub fn lookback(&self) -> Duration {
        Duration::days(i64::from(self.lookback_days.min(MAX_LOOKBACK_DAYS)))
    }
}
