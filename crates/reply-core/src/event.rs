use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReplyError, Result};

/// Whether an event arrived at the account owner or was produced by them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Received,
    Sent,
}

impl Direction {
    /// Parse the direction markers used by exports. Tasks use
    /// `created`/`completed`, chats use `incoming`/`outgoing`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "received" | "incoming" | "inbound" | "created" => Some(Direction::Received),
            "sent" | "outgoing" | "outbound" | "completed" => Some(Direction::Sent),
            _ => None,
        }
    }
}

/// Kind of channel an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Email,
    Message,
    Task,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Email => "email",
            SourceKind::Message => "message",
            SourceKind::Task => "task",
        };
        f.write_str(name)
    }
}

/// A normalized directional event.
///
/// Fields are private: once an adapter has built an event it is not
/// changed again, only grouped, sorted, and paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    conversation_key: String,
    timestamp: DateTime<Utc>,
    direction: Direction,
    source: SourceKind,
    metadata: BTreeMap<String, String>,
}

impl Event {
    pub fn new(
        conversation_key: impl Into<String>,
        timestamp: DateTime<Utc>,
        direction: Direction,
        source: SourceKind,
    ) -> Self {
        Self {
            conversation_key: conversation_key.into(),
            timestamp,
            direction,
            source,
            metadata: BTreeMap::new(),
        }
    }

    pub fn received(
        conversation_key: impl Into<String>,
        timestamp: DateTime<Utc>,
        source: SourceKind,
    ) -> Self {
        Self::new(conversation_key, timestamp, Direction::Received, source)
    }

    pub fn sent(
        conversation_key: impl Into<String>,
        timestamp: DateTime<Utc>,
        source: SourceKind,
    ) -> Self {
        Self::new(conversation_key, timestamp, Direction::Sent, source)
    }

    /// Attach a metadata entry (subject, contact, service, ...).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn conversation_key(&self) -> &str {
        &self.conversation_key
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn is_received(&self) -> bool {
        self.direction == Direction::Received
    }

    pub fn is_sent(&self) -> bool {
        self.direction == Direction::Sent
    }
}

/// Adapter intake record. Every field is optional because exports are
/// not trusted; `normalize` decides whether the record is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, alias = "thread_id", alias = "chat_id")]
    pub conversation_key: Option<String>,
    /// RFC 3339 timestamp with an explicit offset.
    #[serde(default, alias = "date")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RawEvent {
    /// Convert into a normalized event, resolving the timestamp to UTC.
    pub fn normalize(self, source: SourceKind) -> Result<Event> {
        let conversation_key = self
            .conversation_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ReplyError::MalformedEvent("missing conversation key".into()))?;

        let raw_ts = self
            .timestamp
            .ok_or_else(|| ReplyError::MalformedEvent("missing timestamp".into()))?;
        let timestamp = DateTime::parse_from_rfc3339(raw_ts.trim())
            .map_err(|e| ReplyError::MalformedEvent(format!("bad timestamp '{}': {}", raw_ts, e)))?
            .with_timezone(&Utc);

        let raw_dir = self
            .direction
            .ok_or_else(|| ReplyError::MalformedEvent("missing direction".into()))?;
        let direction = Direction::parse(&raw_dir).ok_or_else(|| {
            ReplyError::MalformedEvent(format!("unknown direction '{}'", raw_dir))
        })?;

        Ok(Event {
            conversation_key,
            timestamp,
            direction,
            source,
            metadata: self.metadata,
        })
    }
}

/// Normalize a batch of raw records, dropping the malformed ones.
///
/// Returns the usable events (in input order) and the number dropped.
pub fn normalize_batch(
    raws: impl IntoIterator<Item = RawEvent>,
    source: SourceKind,
) -> (Vec<Event>, usize) {
    let mut events = Vec::new();
    let mut dropped = 0;

    for raw in raws {
        match raw.normalize(source) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::debug!("Dropping {} record: {}", source, e);
                dropped += 1;
            }
        }
    }

    (events, dropped)
}
