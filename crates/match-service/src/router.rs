//! Outbound message delivery seam.
//!
//! The match core hands envelopes plus an explicit presence list to a
//! [`MessageRouter`]; connection management is someone else's job.
//! [`LocalMessageRouter`] delivers to sessions connected to this node through
//! per-session bounded queues and never blocks the caller.

use crate::envelope::Envelope;
use crate::observability::metrics;
use crate::presence::Presence;
use common::types::SessionId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Delivers an envelope to an explicit list of presences.
pub trait MessageRouter: Send + Sync {
    fn send_to_presences(&self, presences: &[Presence], envelope: Envelope);
}

/// Router for sessions connected to this node.
#[derive(Debug)]
pub struct LocalMessageRouter {
    node: String,
    capacity: usize,
    sessions: RwLock<HashMap<SessionId, mpsc::Sender<Envelope>>>,
}

impl LocalMessageRouter {
    /// Create a router whose session queues hold `capacity` envelopes.
    #[must_use]
    pub fn new(node: impl Into<String>, capacity: usize) -> Self {
        Self {
            node: node.into(),
            capacity: capacity.max(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connected session and return its outbound queue.
    ///
    /// Registering an already-known session replaces its queue.
    pub fn register(&self, session_id: SessionId) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, tx);
        debug!(target: "ms.router", session_id = %session_id, "Session registered");
        rx
    }

    /// Forget a session; later deliveries to it are skipped.
    pub fn unregister(&self, session_id: SessionId) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id);
        if removed.is_some() {
            debug!(target: "ms.router", session_id = %session_id, "Session unregistered");
        }
    }

    /// Deliver directly to one local session.
    ///
    /// Returns `false` when the session is unknown, its queue is full, or its
    /// receiver is gone.
    pub fn send_to_session(&self, session_id: SessionId, envelope: Envelope) -> bool {
        let sender = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .cloned();
        let Some(sender) = sender else {
            return false;
        };

        match sender.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                metrics::record_router_drop();
                warn!(
                    target: "ms.router",
                    session_id = %session_id,
                    "Session queue full, dropping envelope"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                metrics::record_router_drop();
                debug!(
                    target: "ms.router",
                    session_id = %session_id,
                    "Session queue closed, dropping envelope"
                );
                false
            }
        }
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl MessageRouter for LocalMessageRouter {
    fn send_to_presences(&self, presences: &[Presence], envelope: Envelope) {
        for presence in presences {
            if presence.id.node != self.node {
                // Remote sessions are delivered by their own node
                continue;
            }
            self.send_to_session(presence.id.session_id, envelope.clone());
        }
    }
}
