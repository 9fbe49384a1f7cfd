//! First-response pairing.
//!
//! Walks each conversation once, in timestamp order, and pairs a received
//! event with the first sent event that answers it. Follow-up sends and
//! implausible latencies are filtered out and counted.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use reply_core::config::{AnchorMode, LatencyPolicy};
use reply_core::event::{Direction, Event, SourceKind};
use serde::Serialize;

/// A received event and the response that answered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePair {
    received_at: DateTime<Utc>,
    responded_at: DateTime<Utc>,
    latency: Duration,
    conversation_key: String,
    source: SourceKind,
    metadata: BTreeMap<String, String>,
}

impl ResponsePair {
    /// Pair `anchor` with `response`. Metadata comes from the received side.
    pub fn new(anchor: &Event, response: &Event) -> Self {
        Self {
            received_at: anchor.timestamp(),
            responded_at: response.timestamp(),
            latency: response.timestamp() - anchor.timestamp(),
            conversation_key: anchor.conversation_key().to_string(),
            source: anchor.source(),
            metadata: anchor.metadata().clone(),
        }
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn responded_at(&self) -> DateTime<Utc> {
        self.responded_at
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn conversation_key(&self) -> &str {
        &self.conversation_key
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// Counts of what the pairer saw and discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairingDiagnostics {
    pub pairs: usize,
    /// Sends directly after another send while a received event was pending.
    pub followups_skipped: usize,
    /// Sends with nothing pending to answer.
    pub orphan_sends: usize,
    pub non_positive: usize,
    pub below_minimum: usize,
    pub above_maximum: usize,
}

impl PairingDiagnostics {
    pub fn rejected(&self) -> usize {
        self.non_positive + self.below_minimum + self.above_maximum
    }

    pub fn merge(&mut self, other: &PairingDiagnostics) {
        self.pairs += other.pairs;
        self.followups_skipped += other.followups_skipped;
        self.orphan_sends += other.orphan_sends;
        self.non_positive += other.non_positive;
        self.below_minimum += other.below_minimum;
        self.above_maximum += other.above_maximum;
    }
}

#[derive(Debug, Clone, Copy)]
enum Rejection {
    NonPositive,
    BelowMinimum,
    AboveMaximum,
}

#[derive(Debug, Clone, Copy)]
enum PairingState<'a> {
    AwaitingReceived,
    AwaitingResponse(&'a Event),
}

/// Extracts response pairs under one source's latency policy.
#[derive(Debug, Clone)]
pub struct ResponsePairer {
    policy: LatencyPolicy,
}

impl ResponsePairer {
    pub fn new(policy: LatencyPolicy) -> Self {
        Self { policy }
    }

    /// Pair every conversation. Pairs come out grouped by conversation key,
    /// in timestamp order within each conversation.
    pub fn pair_all(
        &self,
        conversations: &BTreeMap<String, Vec<Event>>,
    ) -> (Vec<ResponsePair>, PairingDiagnostics) {
        let mut diagnostics = PairingDiagnostics::default();
        let mut pairs = Vec::new();

        for events in conversations.values() {
            pairs.extend(self.pair_conversation(events, &mut diagnostics));
        }

        (pairs, diagnostics)
    }

    /// Pair one conversation. `events` must already be sorted by timestamp.
    pub fn pair_conversation(
        &self,
        events: &[Event],
        diagnostics: &mut PairingDiagnostics,
    ) -> Vec<ResponsePair> {
        let mut pairs = Vec::new();
        let mut state = PairingState::AwaitingReceived;
        let mut previous: Option<&Event> = None;

        for event in events {
            match (event.direction(), state) {
                (Direction::Received, PairingState::AwaitingResponse(_))
                    if self.policy.anchor == AnchorMode::Earliest => {}
                (Direction::Received, _) => {
                    state = PairingState::AwaitingResponse(event);
                }
                (Direction::Sent, PairingState::AwaitingReceived) => {
                    diagnostics.orphan_sends += 1;
                }
                (Direction::Sent, PairingState::AwaitingResponse(anchor)) => {
                    if previous.is_some_and(|p| p.is_sent()) {
                        diagnostics.followups_skipped += 1;
                    } else {
                        let latency = event.timestamp() - anchor.timestamp();
                        match self.screen(latency) {
                            Ok(()) => {
                                pairs.push(ResponsePair::new(anchor, event));
                                diagnostics.pairs += 1;
                                state = PairingState::AwaitingReceived;
                            }
                            Err(Rejection::NonPositive) => diagnostics.non_positive += 1,
                            Err(Rejection::BelowMinimum) => diagnostics.below_minimum += 1,
                            Err(Rejection::AboveMaximum) => diagnostics.above_maximum += 1,
                        }
                    }
                }
            }
            previous = Some(event);
        }

        pairs
    }

    fn screen(&self, latency: Duration) -> Result<(), Rejection> {
        if latency <= Duration::zero() {
            return Err(Rejection::NonPositive);
        }
        if latency < self.policy.min_latency() {
            return Err(Rejection::BelowMinimum);
        }
        match self.policy.max_latency() {
            Some(max) if latency > max => Err(Rejection::AboveMaximum),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(mins: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap() + Duration::minutes(mins)
    }

    fn recv(mins: i64) -> Event {
        Event::received("c", t(mins), SourceKind::Email)
    }

    fn sent(mins: i64) -> Event {
        Event::sent("c", t(mins), SourceKind::Email)
    }

    fn email_pairer() -> ResponsePairer {
        ResponsePairer::new(LatencyPolicy::for_kind(SourceKind::Email))
    }

    fn pair(events: &[Event]) -> (Vec<ResponsePair>, PairingDiagnostics) {
        let mut diagnostics = PairingDiagnostics::default();
        let pairs = email_pairer().pair_conversation(events, &mut diagnostics);
        (pairs, diagnostics)
    }

    #[test]
    fn test_no_received_no_pairs() {
        let (pairs, diag) = pair(&[sent(0), sent(5), sent(10)]);
        assert!(pairs.is_empty());
        assert_eq!(diag.orphan_sends, 3);
    }

    #[test]
    fn test_only_received_no_pairs() {
        let (pairs, _) = pair(&[recv(0), recv(5)]);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_followup_send_not_paired() {
        let (pairs, diag) = pair(&[recv(0), sent(5), sent(9)]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].received_at(), t(0));
        assert_eq!(pairs[0].responded_at(), t(5));
        assert_eq!(pairs[0].latency(), Duration::minutes(5));
        assert_eq!(diag.orphan_sends, 1);
    }

    #[test]
    fn test_anchors_to_latest_received() {
        let (pairs, _) = pair(&[recv(0), recv(10), sent(30)]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].received_at(), t(10));
        assert_eq!(pairs[0].latency(), Duration::minutes(20));
    }

    #[test]
    fn test_earliest_anchor_mode() {
        let policy = LatencyPolicy {
            anchor: AnchorMode::Earliest,
            ..LatencyPolicy::for_kind(SourceKind::Email)
        };
        let pairer = ResponsePairer::new(policy);
        let mut diag = PairingDiagnostics::default();
        let pairs = pairer.pair_conversation(&[recv(0), recv(10), sent(30)], &mut diag);
        assert_eq!(pairs[0].received_at(), t(0));
    }

    #[test]
    fn test_back_and_forth_pairs_each_exchange() {
        let (pairs, diag) = pair(&[recv(0), sent(5), recv(20), sent(60), sent(61)]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].latency(), Duration::minutes(40));
        assert_eq!(diag.pairs, 2);
        assert_eq!(diag.orphan_sends, 1);
    }

    #[test]
    fn test_zero_latency_rejected() {
        let (pairs, diag) = pair(&[recv(0), sent(0)]);
        assert!(pairs.is_empty());
        assert_eq!(diag.non_positive, 1);
    }

    #[test]
    fn test_rejected_send_keeps_anchor_and_blocks_followup() {
        // The zero-latency send is rejected; the next send follows a send,
        // so it is a follow-up too. A fresh received event resets things.
        let (pairs, diag) = pair(&[recv(0), sent(0), sent(3), recv(10), sent(12)]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].received_at(), t(10));
        assert_eq!(diag.non_positive, 1);
        assert_eq!(diag.followups_skipped, 1);
    }

    #[test]
    fn test_message_policy_bounds() {
        let pairer = ResponsePairer::new(LatencyPolicy::for_kind(SourceKind::Message));
        let base = t(0);
        let events = vec![
            Event::received("m", base, SourceKind::Message),
            Event::sent("m", base + Duration::milliseconds(500), SourceKind::Message),
        ];
        let mut diag = PairingDiagnostics::default();
        assert!(pairer.pair_conversation(&events, &mut diag).is_empty());
        assert_eq!(diag.below_minimum, 1);

        let events = vec![
            Event::received("m", base, SourceKind::Message),
            Event::sent("m", base + Duration::days(8), SourceKind::Message),
        ];
        let mut diag = PairingDiagnostics::default();
        assert!(pairer.pair_conversation(&events, &mut diag).is_empty());
        assert_eq!(diag.above_maximum, 1);

        let events = vec![
            Event::received("m", base, SourceKind::Message),
            Event::sent("m", base + Duration::days(7), SourceKind::Message),
        ];
        let mut diag = PairingDiagnostics::default();
        assert_eq!(pairer.pair_conversation(&events, &mut diag).len(), 1);
    }

    #[test]
    fn test_email_policy_is_unbounded() {
        let (pairs, _) = pair(&[recv(0), sent(60 * 24 * 40)]);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_pair_carries_received_metadata() {
        let events = vec![
            Event::received("c", t(0), SourceKind::Message)
                .with_metadata("service", "SMS")
                .with_metadata("contact", "+15550100"),
            Event::sent("c", t(2), SourceKind::Message).with_metadata("service", "iMessage"),
        ];
        let pairer = ResponsePairer::new(LatencyPolicy::for_kind(SourceKind::Message));
        let mut diag = PairingDiagnostics::default();
        let pairs = pairer.pair_conversation(&events, &mut diag);
        assert_eq!(pairs[0].metadata()["service"], "SMS");
        assert_eq!(pairs[0].conversation_key(), "c");
        assert_eq!(pairs[0].source(), SourceKind::Message);
    }

    #[test]
    fn test_pair_all_is_idempotent() {
        let mut conversations = BTreeMap::new();
        conversations.insert("c".to_string(), vec![recv(0), sent(5), recv(7), sent(9)]);
        conversations.insert(
            "d".to_string(),
            vec![
                Event::received("d", t(1), SourceKind::Email),
                Event::sent("d", t(100), SourceKind::Email),
            ],
        );

        let pairer = email_pairer();
        let (first, first_diag) = pairer.pair_all(&conversations);
        let (second, second_diag) = pairer.pair_all(&conversations);
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first_diag, second_diag);
    }

    #[test]
    fn test_diagnostics_merge() {
        let mut total = PairingDiagnostics {
            pairs: 1,
            non_positive: 1,
            ..Default::default()
        };
        total.merge(&PairingDiagnostics {
            pairs: 2,
            above_maximum: 3,
            ..Default::default()
        });
        assert_eq!(total.pairs, 3);
        assert_eq!(total.rejected(), 4);
    }
}
