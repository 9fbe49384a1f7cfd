use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::{Event, SourceKind};

/// Identifier of one configured source ("gmail", "messages", ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Events returned by a single fetch, plus how many raw records were
/// unusable and dropped on the way in.
#[derive(Debug, Clone, Default)]
pub struct FetchedEvents {
    pub events: Vec<Event>,
    pub dropped: usize,
}

impl FetchedEvents {
    pub fn new(events: Vec<Event>, dropped: usize) -> Self {
        Self { events, dropped }
    }
}

/// Trait that every data adapter implements.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Registry key of this source.
    fn id(&self) -> &SourceId;

    /// Channel kind, used to pick default pairing policy.
    fn kind(&self) -> SourceKind;

    /// Fetch normalized events whose timestamps fall in
    /// `[window_start - lookback, window_end]`. Adapters may also return
    /// earlier events of a conversation that is answered inside that range.
    async fn fetch_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<FetchedEvents>;
}

/// Earliest instant an adapter needs, saturating at the start of time.
pub fn lookback_start(window_start: DateTime<Utc>, lookback: Duration) -> DateTime<Utc> {
    window_start
        .checked_sub_signed(lookback)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Registry of the sources enabled for this run.
///
/// Ordered by id so that runs iterate sources deterministically.
pub struct SourceRegistry {
    sources: BTreeMap<SourceId, Arc<dyn EventSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
        }
    }

    /// Register a source. Overwrites any existing source with the same id.
    pub fn register(&mut self, source: Arc<dyn EventSource>) {
        let id = source.id().clone();
        tracing::debug!("Registered source: {} ({})", id, source.kind());
        self.sources.insert(id, source);
    }

    /// Unregister a source by id.
    pub fn unregister(&mut self, id: &SourceId) -> Option<Arc<dyn EventSource>> {
        self.sources.remove(id)
    }

    pub fn get(&self, id: &SourceId) -> Option<&Arc<dyn EventSource>> {
        self.sources.get(id)
    }

    pub fn ids(&self) -> Vec<&SourceId> {
        self.sources.keys().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourceId, &Arc<dyn EventSource>)> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
