use std::collections::BTreeMap;

use reply_core::event::Event;

/// Bucket events by conversation key, each bucket sorted by timestamp.
///
/// The sort is stable, so events with equal timestamps keep their input
/// order. Keys iterate in lexical order.
pub fn group_by_conversation(
    events: impl IntoIterator<Item = Event>,
) -> BTreeMap<String, Vec<Event>> {
    let mut groups: BTreeMap<String, Vec<Event>> = BTreeMap::new();

    for event in events {
        groups
            .entry(event.conversation_key().to_string())
            .or_default()
            .push(event);
    }

    for conversation in groups.values_mut() {
        conversation.sort_by_key(|e| e.timestamp());
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use reply_core::event::SourceKind;

    #[test]
    fn test_empty_input() {
        assert!(group_by_conversation(Vec::new()).is_empty());
    }

    #[test]
    fn test_groups_and_sorts() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let events = vec![
            Event::sent("a", t0 + Duration::minutes(5), SourceKind::Email),
            Event::received("b", t0, SourceKind::Email),
            Event::received("a", t0, SourceKind::Email),
        ];

        let groups = group_by_conversation(events);
        assert_eq!(groups.len(), 2);

        let a = &groups["a"];
        assert_eq!(a.len(), 2);
        assert!(a[0].is_received());
        assert!(a[1].is_sent());
        assert_eq!(groups["b"].len(), 1);
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let events = vec![
            Event::sent("a", t0, SourceKind::Message).with_metadata("n", "1"),
            Event::received("a", t0, SourceKind::Message).with_metadata("n", "2"),
            Event::sent("a", t0 - Duration::seconds(1), SourceKind::Message).with_metadata("n", "0"),
            Event::sent("a", t0, SourceKind::Message).with_metadata("n", "3"),
        ];

        let groups = group_by_conversation(events);
        let order: Vec<&str> = groups["a"]
            .iter()
            .map(|e| e.metadata()["n"].as_str())
            .collect();
        assert_eq!(order, vec!["0", "1", "2", "3"]);
    }
}
