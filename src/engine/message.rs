//! Inter-agent messaging inside the simulation.
//!
//! Visibility is a pure function of the recipient and the message age.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::types::{EntityId, Position, TeamId};
use crate::Id;

/// Who a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Recipient {
    Agent(Id),
    Team(TeamId),
    Broadcast,
}

/// Message content.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MessagePayload {
    Text(String),
    /// A point of interest, e.g. "meet here".
    Location(Position),
    /// Report of an entity seen at a position.
    EntitySighted { entity: EntityId, position: Position },
    /// Free numeric signal.
    Signal(f64),
}

/// A message stamped with the step it was sent in.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Message {
    pub from: Id,
    pub to: Recipient,
    pub payload: MessagePayload,
    pub step: u32,
}

impl Message {
    /// Whether `reader` (on `team`) is an addressee of this message.
    /// Senders never receive their own messages.
    pub fn is_addressed_to(&self, reader: &str, team: Option<&str>) -> bool {
        if self.from == reader {
            return false;
        }
        match &self.to {
            Recipient::Agent(id) => id == reader,
            Recipient::Team(t) => team == Some(t.as_str()),
            Recipient::Broadcast => true,
        }
    }
}

/// Append-only message log with a retention window.
#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
    retention: u32,
}

impl MessageLog {
    pub fn new(retention: u32) -> Self {
        Self {
            messages: Vec::new(),
            retention,
        }
    }

    pub fn retention(&self) -> u32 {
        self.retention
    }

    /// Records a message. Messages are appended in send order, so the log
    /// stays sorted by step stamp.
    pub fn post(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Whether a message stamped `stamp` is still readable at `now`.
    pub fn is_fresh(&self, stamp: u32, now: u32) -> bool {
        now.saturating_sub(stamp) <= self.retention
    }

    /// Messages visible to `reader` at step `now`, oldest first.
    pub fn inbox(&self, reader: &str, team: Option<&str>, now: u32) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| self.is_fresh(m.step, now) && m.is_addressed_to(reader, team))
            .cloned()
            .collect()
    }

    /// Drops messages that can no longer be read at `now`.
    pub fn prune(&mut self, now: u32) {
        let retention = self.retention;
        self.messages
            .retain(|m| now.saturating_sub(m.step) <= retention);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: &str, to: Recipient, step: u32) -> Message {
        Message {
            from: from.into(),
            to,
            payload: MessagePayload::Signal(step as f64),
            step,
        }
    }

    #[test]
    fn addressing_rules() {
        let direct = msg("a", Recipient::Agent("b".into()), 0);
        assert!(direct.is_addressed_to("b", None));
        assert!(!direct.is_addressed_to("c", None));

        let team = msg("a", Recipient::Team("red".into()), 0);
        assert!(team.is_addressed_to("b", Some("red")));
        assert!(!team.is_addressed_to("b", Some("blue")));
        assert!(!team.is_addressed_to("b", None));

        let all = msg("a", Recipient::Broadcast, 0);
        assert!(all.is_addressed_to("z", None));
        assert!(!all.is_addressed_to("a", None));
    }

    #[test]
    fn inbox_filters_by_age_and_keeps_order() {
        let mut log = MessageLog::new(3);
        for step in 0..6 {
            log.post(msg("a", Recipient::Broadcast, step));
        }
        let inbox = log.inbox("b", None, 6);
        let steps: Vec<u32> = inbox.iter().map(|m| m.step).collect();
        assert_eq!(steps, vec![3, 4, 5]);
    }

    #[test]
    fn prune_drops_stale_messages() {
        let mut log = MessageLog::new(2);
        log.post(msg("a", Recipient::Broadcast, 0));
        log.post(msg("a", Recipient::Broadcast, 4));
        log.prune(5);
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }
}
