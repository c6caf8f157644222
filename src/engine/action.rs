//! Agent actions.
//!
//! One [`Action`] per agent per step: either staying put, a directional
//! move or an interaction, optionally accompanied by an outgoing message.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::message::{MessagePayload, Recipient};
use super::types::Direction;
use crate::Id;

/// Non-movement interactions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Interaction {
    /// Lift the entity on (or, for heavy entities, next to) the agent's cell.
    PickUp,
    /// Release the carried entity where it is.
    Drop,
    /// Strengthen or contest the territory cell the agent stands on.
    Claim,
    /// Hit an adjacent opponent. `None` picks the first adjacent opponent
    /// in registration order.
    Attack { target: Option<Id> },
    /// Hand the carried entity to an adjacent teammate.
    Pass { to: Id },
    /// Take the carried entity of an adjacent opponent.
    Steal { from: Id },
    /// Scenario-defined activation (e.g. solving a puzzle node).
    Activate,
}

impl Interaction {
    pub fn kind(&self) -> InteractionKind {
        match self {
            Interaction::PickUp => InteractionKind::PickUp,
            Interaction::Drop => InteractionKind::Drop,
            Interaction::Claim => InteractionKind::Claim,
            Interaction::Attack { .. } => InteractionKind::Attack,
            Interaction::Pass { .. } => InteractionKind::Pass,
            Interaction::Steal { .. } => InteractionKind::Steal,
            Interaction::Activate => InteractionKind::Activate,
        }
    }
}

/// Payload-free discriminant of [`Interaction`], used for the scenario
/// interaction table and cooldown bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InteractionKind {
    PickUp,
    Drop,
    Claim,
    Attack,
    Pass,
    Steal,
    Activate,
}

/// What the agent does with its body this step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ActionKind {
    #[default]
    Stay,
    Move(Direction),
    Interact(Interaction),
}

/// A message an agent sends alongside its action.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutgoingMessage {
    pub to: Recipient,
    pub payload: MessagePayload,
}

/// A full per-step action.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Action {
    pub kind: ActionKind,
    pub message: Option<OutgoingMessage>,
}

impl Action {
    /// The no-op action used for agents without a submitted action.
    pub fn stay() -> Self {
        Self::default()
    }

    pub fn moving(direction: Direction) -> Self {
        Self {
            kind: ActionKind::Move(direction),
            message: None,
        }
    }

    pub fn interact(interaction: Interaction) -> Self {
        Self {
            kind: ActionKind::Interact(interaction),
            message: None,
        }
    }

    /// Attaches an outgoing message to this action.
    pub fn with_message(mut self, to: Recipient, payload: MessagePayload) -> Self {
        self.message = Some(OutgoingMessage { to, payload });
        self
    }

    /// The movement direction, if this is a move.
    pub fn direction(&self) -> Option<Direction> {
        match self.kind {
            ActionKind::Move(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_action_is_stay() {
        let a = Action::default();
        assert_eq!(a.kind, ActionKind::Stay);
        assert!(a.message.is_none());
        assert_eq!(a.direction(), None);
    }

    #[test]
    fn builders() {
        let a = Action::moving(Direction::Left)
            .with_message(Recipient::Broadcast, MessagePayload::Text("hi".into()));
        assert_eq!(a.direction(), Some(Direction::Left));
        assert!(a.message.is_some());
        let b = Action::interact(Interaction::Attack { target: None });
        assert_eq!(
            b.kind,
            ActionKind::Interact(Interaction::Attack { target: None })
        );
    }

    #[test]
    fn interaction_kinds() {
        assert_eq!(Interaction::PickUp.kind(), InteractionKind::PickUp);
        assert_eq!(
            Interaction::Pass { to: "b".into() }.kind(),
            InteractionKind::Pass
        );
        assert_eq!(
            Interaction::Steal { from: "b".into() }.kind(),
            InteractionKind::Steal
        );
    }
}
