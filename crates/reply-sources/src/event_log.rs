//! JSON-lines event log adapter.
//!
//! Each line is one `RawEvent`. Email and chat exporters write this format
//! after mapping provider labels (SENT, is_from_me, ...) to a direction.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reply_core::error::ReplyError;
use reply_core::event::{normalize_batch, Event, RawEvent, SourceKind};
use reply_core::source::{lookback_start, EventSource, FetchedEvents, SourceId};

pub struct EventLogSource {
    id: SourceId,
    kind: SourceKind,
    path: PathBuf,
}

impl EventLogSource {
    pub fn new(id: SourceId, kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            kind,
            path: path.into(),
        }
    }
}

#[async_trait]
impl EventSource for EventLogSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<FetchedEvents, ReplyError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ReplyError::Fetch {
                source_id: self.id.to_string(),
                message: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        let (raws, unparseable) = parse_lines(&contents);
        let (events, malformed) = normalize_batch(raws, self.kind);

        let events = select_range(events, lookback_start(window_start, lookback), window_end);

        tracing::debug!(
            "{}: {} events in range, {} lines dropped",
            self.id,
            events.len(),
            unparseable + malformed
        );

        Ok(FetchedEvents::new(events, unparseable + malformed))
    }
}

/// Keep events in `[from, to]`, plus the earlier history of every
/// conversation answered in that range, so a reply is never orphaned by
/// the look-back cut.
fn select_range(events: Vec<Event>, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Event> {
    let in_range = |e: &Event| e.timestamp() >= from && e.timestamp() <= to;
    let answered: HashSet<String> = events
        .iter()
        .filter(|e| e.is_sent() && in_range(e))
        .map(|e| e.conversation_key().to_string())
        .collect();

    events
        .into_iter()
        .filter(|e| {
            in_range(e) || (e.timestamp() < from && answered.contains(e.conversation_key()))
        })
        .collect()
}

/// Parse JSON lines, skipping blanks. Returns the records and the number
/// of lines that were not valid JSON records.
fn parse_lines(contents: &str) -> (Vec<RawEvent>, usize) {
    let mut raws = Vec::new();
    let mut bad = 0;

    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEvent>(line) {
            Ok(raw) => raws.push(raw),
            Err(e) => {
                tracing::debug!("Line {}: not an event record: {}", lineno + 1, e);
                bad += 1;
            }
        }
    }

    (raws, bad)
}
