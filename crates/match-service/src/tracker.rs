//! Presence tracking seam.
//!
//! The [`Tracker`] records which sessions are members of which stream. Relayed
//! match existence is derived entirely from it: a relayed match exists while its
//! stream has at least one presence.
//!
//! [`LocalTracker`] is the single-node implementation. All membership changes
//! go through one lock, so concurrent track/untrack calls on the same stream
//! are serialized.

use crate::presence::{Presence, PresenceId, PresenceMeta, PresenceStream};
use common::types::{SessionId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Presence/stream membership store consumed by the match core.
pub trait Tracker: Send + Sync {
    /// Track a session on a stream. Returns `false` if it was already tracked.
    fn track(
        &self,
        session_id: SessionId,
        stream: &PresenceStream,
        user_id: UserId,
        meta: PresenceMeta,
    ) -> bool;

    /// Stop tracking a session on a stream, returning the removed presence.
    fn untrack(
        &self,
        session_id: SessionId,
        stream: &PresenceStream,
        user_id: UserId,
    ) -> Option<Presence>;

    /// Stop tracking a session on every stream, returning the removed presences.
    fn untrack_all(&self, session_id: SessionId) -> Vec<Presence>;

    /// Evict every presence on a stream regardless of node.
    fn untrack_by_stream(&self, stream: &PresenceStream) -> Vec<Presence>;

    /// Current members of a stream.
    fn list_by_stream(&self, stream: &PresenceStream) -> Vec<Presence>;

    /// Whether a stream has at least one member.
    fn stream_exists(&self, stream: &PresenceStream) -> bool;

    /// Metadata of a presence connected to this node, if tracked.
    fn get_local(
        &self,
        session_id: SessionId,
        stream: &PresenceStream,
        user_id: UserId,
    ) -> Option<PresenceMeta>;
}

#[derive(Debug, Default)]
struct TrackerState {
    /// Members per stream, keyed by session.
    streams: HashMap<PresenceStream, HashMap<SessionId, Presence>>,
    /// Reverse index for session teardown.
    sessions: HashMap<SessionId, HashSet<PresenceStream>>,
}

impl TrackerState {
    fn remove(&mut self, session_id: SessionId, stream: &PresenceStream) -> Option<Presence> {
        let members = self.streams.get_mut(stream)?;
        let removed = members.remove(&session_id)?;
        if members.is_empty() {
            self.streams.remove(stream);
        }
        if let Some(streams) = self.sessions.get_mut(&session_id) {
            streams.remove(stream);
            if streams.is_empty() {
                self.sessions.remove(&session_id);
            }
        }
        Some(removed)
    }
}

/// In-memory tracker for presences connected to this node.
#[derive(Debug)]
pub struct LocalTracker {
    node: String,
    state: RwLock<TrackerState>,
}

impl LocalTracker {
    /// Create an empty tracker for `node`.
    #[must_use]
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            state: RwLock::new(TrackerState::default()),
        }
    }

    /// The node presences tracked here are attributed to.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Number of streams with at least one member.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.read().streams.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, TrackerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrackerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Tracker for LocalTracker {
    fn track(
        &self,
        session_id: SessionId,
        stream: &PresenceStream,
        user_id: UserId,
        meta: PresenceMeta,
    ) -> bool {
        let mut state = self.write();
        let members = state.streams.entry(stream.clone()).or_default();
        if members.contains_key(&session_id) {
            return false;
        }
        members.insert(
            session_id,
            Presence {
                id: PresenceId {
                    node: self.node.clone(),
                    session_id,
                },
                stream: stream.clone(),
                user_id,
                meta,
            },
        );
        state
            .sessions
            .entry(session_id)
            .or_default()
            .insert(stream.clone());

        debug!(
            target: "ms.tracker",
            session_id = %session_id,
            subject = %stream.subject,
            "Presence tracked"
        );
        true
    }

    fn untrack(
        &self,
        session_id: SessionId,
        stream: &PresenceStream,
        user_id: UserId,
    ) -> Option<Presence> {
        let mut state = self.write();
        let matches_user = state
            .streams
            .get(stream)
            .and_then(|members| members.get(&session_id))
            .is_some_and(|presence| presence.user_id == user_id);
        if !matches_user {
            return None;
        }
        let removed = state.remove(session_id, stream);
        if removed.is_some() {
            debug!(
                target: "ms.tracker",
                session_id = %session_id,
                subject = %stream.subject,
                "Presence untracked"
            );
        }
        removed
    }

    fn untrack_all(&self, session_id: SessionId) -> Vec<Presence> {
        let mut state = self.write();
        let streams: Vec<PresenceStream> = state
            .sessions
            .get(&session_id)
            .map(|streams| streams.iter().cloned().collect())
            .unwrap_or_default();
        streams
            .iter()
            .filter_map(|stream| state.remove(session_id, stream))
            .collect()
    }

    fn untrack_by_stream(&self, stream: &PresenceStream) -> Vec<Presence> {
        let mut state = self.write();
        let Some(members) = state.streams.remove(stream) else {
            return Vec::new();
        };
        for session_id in members.keys() {
            if let Some(streams) = state.sessions.get_mut(session_id) {
                streams.remove(stream);
                if streams.is_empty() {
                    state.sessions.remove(session_id);
                }
            }
        }

        debug!(
            target: "ms.tracker",
            subject = %stream.subject,
            evicted = members.len(),
            "Stream untracked"
        );
        members.into_values().collect()
    }

    fn list_by_stream(&self, stream: &PresenceStream) -> Vec<Presence> {
        self.read()
            .streams
            .get(stream)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    fn stream_exists(&self, stream: &PresenceStream) -> bool {
        self.read()
            .streams
            .get(stream)
            .is_some_and(|members| !members.is_empty())
    }

    fn get_local(
        &self,
        session_id: SessionId,
        stream: &PresenceStream,
        user_id: UserId,
    ) -> Option<PresenceMeta> {
        self.read()
            .streams
            .get(stream)
            .and_then(|members| members.get(&session_id))
            .filter(|presence| presence.user_id == user_id && presence.id.node == self.node)
            .map(|presence| presence.meta.clone())
    }
}
