//! Message router that records deliveries instead of sending them.

use match_service::envelope::{Envelope, EnvelopeMessage, MatchData};
use match_service::presence::Presence;
use match_service::router::MessageRouter;
use match_service::session::SessionInfo;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One `send_to_presences` call.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub recipients: Vec<Presence>,
    pub envelope: Envelope,
}

impl Delivery {
    /// The `MatchData` payload, if that is what was delivered.
    pub fn match_data(&self) -> Option<&MatchData> {
        match &self.envelope.message {
            Some(EnvelopeMessage::MatchData(data)) => Some(data),
            _ => None,
        }
    }

    /// Whether `session` is among the recipients.
    pub fn reaches(&self, session: &SessionInfo) -> bool {
        self.recipients
            .iter()
            .any(|r| r.is_session(session.user_id, session.session_id))
    }
}

/// Router capturing every delivery for later assertions.
#[derive(Debug, Default)]
pub struct RecordingRouter {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Delivery>> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.lock().len()
    }

    pub fn last(&self) -> Option<Delivery> {
        self.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Wait up to one second for at least `count` deliveries.
    pub async fn wait_for_deliveries(&self, count: usize) -> bool {
        for _ in 0..200 {
            if self.delivery_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.delivery_count() >= count
    }
}

impl MessageRouter for RecordingRouter {
    fn send_to_presences(&self, presences: &[Presence], envelope: Envelope) {
        self.lock().push(Delivery {
            recipients: presences.to_vec(),
            envelope,
        });
    }
}
