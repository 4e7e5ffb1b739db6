//! Presence model shared by the tracker, router and match actors.
//!
//! Presence records are owned by the [`Tracker`](crate::tracker::Tracker); the
//! match core only reads them and asks the tracker to track or untrack.

use common::types::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of stream a presence is tracked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamMode {
    /// Members of a relayed match.
    MatchRelayed,
    /// Members of an authoritative match.
    MatchAuthoritative,
}

/// An addressable channel of presences.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PresenceStream {
    pub mode: StreamMode,
    /// Identifier part of the match id.
    pub subject: Uuid,
    /// Owning node for authoritative matches, empty for relayed ones.
    pub label: String,
}

/// Wire encoding negotiated by a client connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFormat {
    #[default]
    Json,
    Protobuf,
}

/// Mutable metadata attached to a tracked presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceMeta {
    pub username: String,
    pub format: SessionFormat,
}

/// Identity of a presence: the session and the node it is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresenceId {
    pub node: String,
    pub session_id: SessionId,
}

/// A tracked (user, session) membership record on a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub id: PresenceId,
    pub stream: PresenceStream,
    pub user_id: UserId,
    pub meta: PresenceMeta,
}

impl Presence {
    /// Whether this presence belongs to the given user session.
    #[must_use]
    pub fn is_session(&self, user_id: UserId, session_id: SessionId) -> bool {
        self.id.session_id == session_id && self.user_id == user_id
    }
}

/// The view of a match participant handed to match logic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchPresence {
    pub node: String,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub username: String,
}

impl From<&Presence> for MatchPresence {
    fn from(presence: &Presence) -> Self {
        Self {
            node: presence.id.node.clone(),
            user_id: presence.user_id,
            session_id: presence.id.session_id,
            username: presence.meta.username.clone(),
        }
    }
}

/// Restricts a relayed broadcast to one (user, session) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataFilter {
    pub user_id: UserId,
    pub session_id: SessionId,
}

impl DataFilter {
    /// Whether the filter names this presence.
    #[must_use]
    pub fn matches(&self, presence: &Presence) -> bool {
        presence.is_session(self.user_id, self.session_id)
    }
}
