//! Message types for match actor communication.
//!
//! Producers talk to a match actor only through [`MatchMessage`]s on its
//! bounded mailbox. The join bridge carries a oneshot reply sender; the actor
//! answers once and ignores a receiver that already gave up.

use crate::presence::MatchPresence;
use bytes::Bytes;
use common::types::{SessionId, UserId};
use tokio::sync::oneshot;

/// A session asking to join an authoritative match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAttempt {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub username: String,
    /// Node the joining session is connected to.
    pub from_node: String,
}

impl JoinAttempt {
    /// The presence this attempt becomes once accepted.
    #[must_use]
    pub fn presence(&self) -> MatchPresence {
        MatchPresence {
            node: self.from_node.clone(),
            user_id: self.user_id,
            session_id: self.session_id,
            username: self.username.clone(),
        }
    }
}

/// Client data addressed to an authoritative match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDataMessage {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub username: String,
    /// Node the sending session is connected to.
    pub node: String,
    pub op_code: i64,
    pub data: Bytes,
}

impl MatchDataMessage {
    /// The sender as a match presence.
    #[must_use]
    pub fn sender(&self) -> MatchPresence {
        MatchPresence {
            node: self.node.clone(),
            user_id: self.user_id,
            session_id: self.session_id,
            username: self.username.clone(),
        }
    }
}

/// Messages processed by a `MatchActor`, strictly in arrival order.
#[derive(Debug)]
pub enum MatchMessage {
    /// Ask the match logic whether a session may join.
    JoinAttempt {
        attempt: JoinAttempt,
        respond_to: oneshot::Sender<bool>,
    },

    /// Presences that left the match.
    Leave { presences: Vec<MatchPresence> },

    /// Client data for the match logic.
    Data(MatchDataMessage),
}

impl MatchMessage {
    /// Message kind for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            MatchMessage::JoinAttempt { .. } => "join_attempt",
            MatchMessage::Leave { .. } => "leave",
            MatchMessage::Data(_) => "data",
        }
    }
}

/// Result of a registry join bridge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Wrong node, or no such match on this node.
    NotFound,
    /// The match exists but declined, was saturated, or did not answer in time.
    Rejected,
    /// The match logic accepted the join.
    Accepted,
}

impl JoinOutcome {
    /// Whether the match was found on this node.
    #[must_use]
    pub const fn found(self) -> bool {
        !matches!(self, JoinOutcome::NotFound)
    }

    /// Whether the join was allowed.
    #[must_use]
    pub const fn allowed(self) -> bool {
        matches!(self, JoinOutcome::Accepted)
    }

    /// Returns the outcome as a string for metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            JoinOutcome::NotFound => "not_found",
            JoinOutcome::Rejected => "rejected",
            JoinOutcome::Accepted => "accepted",
        }
    }
}
