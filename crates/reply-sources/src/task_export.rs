//! Completed-task export adapter.
//!
//! Reads a JSON array of completed tasks. Each task becomes its own
//! conversation: a received event when it was added and a sent event when
//! it was completed, so the pairer measures time-to-completion.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reply_core::error::ReplyError;
use reply_core::event::{Event, RawEvent, SourceKind};
use reply_core::source::{lookback_start, EventSource, FetchedEvents, SourceId};
use serde::Deserialize;
use serde_json::Value;

/// Task titles are cut to this many characters before they reach metadata.
const MAX_CONTENT_CHARS: usize = 50;

#[derive(Debug, Deserialize)]
struct TaskRecord {
    #[serde(default, alias = "task_id")]
    id: Option<Value>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "date_added")]
    added_at: Option<String>,
    #[serde(default, alias = "completed_date")]
    completed_at: Option<String>,
}

pub struct TaskExportSource {
    id: SourceId,
    path: PathBuf,
}

impl TaskExportSource {
    pub fn new(id: SourceId, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }
}

#[async_trait]
impl EventSource for TaskExportSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Task
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

        let tasks: Vec<TaskRecord> =
            serde_json::from_str(&contents).map_err(|e| ReplyError::Fetch {
                source_id: self.id.to_string(),
                message: format!("invalid task export: {}", e),
            })?;

        let from = lookback_start(window_start, lookback);
        let mut events = Vec::new();
        let mut dropped = 0;

        for task in tasks {
            match task_events(task) {
                Ok((completed, added)) => {
                    // A task belongs to the run when its completion does; the
                    // creation event is kept however old it is.
                    let ts = completed.timestamp();
                    if ts < from || ts > window_end {
                        continue;
                    }
                    if let Some(added) = added {
                        events.push(added);
                    }
                    events.push(completed);
                }
                Err(e) => {
                    tracing::debug!("Dropping task record: {}", e);
                    dropped += 1;
                }
            }
        }

        Ok(FetchedEvents::new(events, dropped))
    }
}

/// Build the completion event and, when the creation time is known and
/// valid, the creation event.
fn task_events(task: TaskRecord) -> Result<(Event, Option<Event>), ReplyError> {
    let key = match task.id {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let content: Option<String> = task
        .content
        .map(|c| c.chars().take(MAX_CONTENT_CHARS).collect());

    let metadata: BTreeMap<String, String> = content
        .map(|c| [("content".to_string(), c)].into_iter().collect())
        .unwrap_or_default();

    let completed = RawEvent {
        conversation_key: key.clone(),
        timestamp: task.completed_at,
        direction: Some("completed".into()),
        metadata: metadata.clone(),
    }
    .normalize(SourceKind::Task)?;

    let added = task.added_at.and_then(|added_at| {
        RawEvent {
            conversation_key: key,
            timestamp: Some(added_at),
            direction: Some("created".into()),
            metadata,
        }
        .normalize(SourceKind::Task)
        .ok()
    });

    Ok((completed, added))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn write_export(json: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), json).unwrap();
        file
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_task_becomes_created_and_completed_events() {
        let file = write_export(
            r#"[
                {"id": "t1", "content": "Write the quarterly summary for the board and circulate it", "added_at": "2025-01-02T08:00:00Z", "completed_at": "2025-03-10T12:00:00Z"},
                {"id": 42, "content": "Call back", "completed_at": "2025-03-10T13:00:00Z"}
            ]"#,
        );
        let source = TaskExportSource::new(SourceId::from("todoist"), file.path());
        let (start, end) = window();
        let fetched = source
            .fetch_events(start, end, Duration::days(7))
            .await
            .unwrap();

        assert_eq!(fetched.dropped, 0);
        assert_eq!(fetched.events.len(), 3);

        let created = &fetched.events[0];
        assert!(created.is_received());
        assert_eq!(created.conversation_key(), "t1");
        assert_eq!(created.metadata()["content"].chars().count(), MAX_CONTENT_CHARS);

        let orphan = &fetched.events[2];
        assert!(orphan.is_sent());
        assert_eq!(orphan.conversation_key(), "42");
    }

    #[tokio::test]
    async fn test_incomplete_and_out_of_range_tasks() {
        let file = write_export(
            r#"[
                {"id": "a", "added_at": "2025-03-09T08:00:00Z"},
                {"content": "no id", "completed_at": "2025-03-10T12:00:00Z"},
                {"id": "b", "added_at": "2025-02-01T08:00:00Z", "completed_at": "2025-02-02T08:00:00Z"},
                {"id": "c", "added_at": "garbage", "completed_at": "2025-03-10T09:00:00Z"}
            ]"#,
        );
        let source = TaskExportSource::new(SourceId::from("todoist"), file.path());
        let (start, end) = window();
        let fetched = source
            .fetch_events(start, end, Duration::days(7))
            .await
            .unwrap();

        assert_eq!(fetched.dropped, 2);
        assert_eq!(fetched.events.len(), 1);
        assert_eq!(fetched.events[0].conversation_key(), "c");
    }

    #[tokio::test]
    async fn test_invalid_export_is_fetch_error() {
        let file = write_export("{\"items\": 3}");
        let source = TaskExportSource::new(SourceId::from("todoist"), file.path());
        let (start, end) = window();
        let err = source
            .fetch_events(start, end, Duration::days(7))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplyError::Fetch { .. }));
    }
}
