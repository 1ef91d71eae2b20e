//! Deduplicating message store for one conversation.
//!
//! The ledger is the only place that answers "have we seen this message".
//! Admission is idempotent and order-insensitive, which is what lets sends and
//! polls interleave freely.

use std::collections::HashMap;

use livechat_api::{Message, MessageId, Timestamp};

#[derive(Debug, Default)]
pub struct MessageLedger {
    messages: HashMap<MessageId, Message>,
    high_watermark: Timestamp,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every message whose id is new and return those, in input order.
    ///
    /// A duplicate id later in the same batch is dropped like any other
    /// already-known id. Stored messages are never replaced.
    pub fn admit(&mut self, batch: impl IntoIterator<Item = Message>) -> Vec<Message> {
        let mut admitted = Vec::new();
        for message in batch {
            if self.messages.contains_key(&message.id) {
                continue;
            }
            self.advance_watermark(message.created_at);
            self.messages.insert(message.id.clone(), message.clone());
            admitted.push(message);
        }
        admitted
    }

    /// `high_watermark = max(high_watermark, candidate)`.
    pub fn advance_watermark(&mut self, candidate: Timestamp) {
        if candidate > self.high_watermark {
            self.high_watermark = candidate;
        }
    }

    /// Latest `created_at` ever admitted, or the epoch.
    pub fn watermark(&self) -> Timestamp {
        self.high_watermark
    }

    /// All messages, oldest first, ties broken by id.
    pub fn snapshot_ordered(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self.messages.values().cloned().collect();
        sort_chronologically(&mut messages);
        messages
    }
}

fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
}

/// The chronologically latest message of a batch.
pub fn latest(messages: &[Message]) -> Option<&Message> {
    messages.iter().max_by(|a, b| a.order_key().cmp(&b.order_key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{agent, visitor};

    fn ids(messages: &[Message]) -> Vec<MessageId> {
        messages.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn admitting_twice_is_a_no_op() {
        let batch = vec![agent(1, 100, "a"), visitor(2, 200, "b")];
        let mut ledger = MessageLedger::new();

        assert_eq!(ledger.admit(batch.clone()).len(), 2);
        let before = ledger.snapshot_ordered();
        assert!(ledger.admit(batch).is_empty());
        assert_eq!(ledger.snapshot_ordered(), before);
    }

    #[test]
    fn duplicate_inside_one_batch_is_admitted_once() {
        let mut ledger = MessageLedger::new();
        let admitted = ledger.admit(vec![agent(1, 100, "a"), agent(1, 100, "a")]);
        assert_eq!(ids(&admitted), vec![MessageId::from(1)]);
        assert_eq!(ledger.snapshot_ordered().len(), 1);
    }

    #[test]
    fn first_copy_of_an_id_wins() {
        let mut ledger = MessageLedger::new();
        ledger.admit(vec![agent(1, 100, "original")]);
        ledger.admit(vec![agent(1, 900, "edited")]);
        let snapshot = ledger.snapshot_ordered();
        assert_eq!(snapshot[0].body, "original");
        assert_eq!(ledger.watermark(), Timestamp::from_millis(100).unwrap());
    }

    #[test]
    fn admitted_order_follows_input_not_time() {
        let mut ledger = MessageLedger::new();
        let admitted = ledger.admit(vec![agent(3, 300, "c"), agent(1, 100, "a"), agent(2, 200, "b")]);
        assert_eq!(
            ids(&admitted),
            vec![MessageId::from(3), MessageId::from(1), MessageId::from(2)]
        );
    }

    #[test]
    fn watermark_never_regresses() {
        let mut ledger = MessageLedger::new();
        assert!(ledger.watermark().is_epoch());

        let mut seen = Vec::new();
        for batch in [
            vec![agent(5, 500, "e"), agent(2, 200, "b")],
            vec![agent(1, 100, "a")],
            vec![agent(9, 900, "i"), agent(7, 700, "g")],
            vec![agent(3, 300, "c")],
        ] {
            ledger.admit(batch);
            seen.push(ledger.watermark());
        }

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ledger.watermark(), Timestamp::from_millis(900).unwrap());

        ledger.advance_watermark(Timestamp::from_millis(10).unwrap());
        assert_eq!(ledger.watermark(), Timestamp::from_millis(900).unwrap());
    }

    #[test]
    fn snapshot_is_chronological_with_id_tie_break() {
        let mut ledger = MessageLedger::new();
        ledger.admit(vec![
            agent(20, 200, "later"),
            visitor(11, 100, "tie-b"),
            agent(10, 100, "tie-a"),
            visitor(1, 50, "first"),
        ]);
        assert_eq!(
            ids(&ledger.snapshot_ordered()),
            vec![
                MessageId::from(1),
                MessageId::from(10),
                MessageId::from(11),
                MessageId::from(20)
            ]
        );
    }

    #[test]
    fn latest_picks_newest_then_highest_id() {
        let batch = vec![agent(4, 400, "x"), agent(6, 400, "y"), agent(5, 100, "z")];
        assert_eq!(latest(&batch).map(|m| m.body.as_str()), Some("y"));
        assert!(latest(&[]).is_none());
    }
}
