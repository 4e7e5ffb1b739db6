//! `LocalMatchRegistry` - the per-node directory of match actors.
//!
//! The registry maps match UUIDs to actor handles behind a reader/writer lock:
//! lookups (join, leave, send data) take the read lock and release it before
//! awaiting anything; create, remove and stop take the write lock.
//!
//! Every operation addressed to a node label other than the local one is a
//! no-op that reports "not found". Cross-node forwarding is the caller's job.
//!
//! Each actor task is supervised. A panic in match logic is logged, counted,
//! and the match is removed with its stream evicted; other matches carry on.

use super::match_actor::{MatchActor, MatchActorDeps, MatchActorHandle};
use super::messages::{JoinAttempt, JoinOutcome, MatchDataMessage, MatchMessage};
use super::metrics::ActorMetrics;
use crate::errors::MatchError;
use crate::identifier::MatchId;
use crate::logic::LogicModules;
use crate::observability::metrics;
use crate::presence::{MatchPresence, PresenceStream, StreamMode};
use crate::router::MessageRouter;
use crate::tracker::Tracker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Ceiling on how long a join caller waits for the match logic to answer.
pub const JOIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Directory of the authoritative matches owned by this node.
pub struct LocalMatchRegistry {
    /// Local node label.
    node: String,
    /// Mailbox capacity for new actors.
    mailbox_capacity: usize,
    /// Logic modules available to `new_match`.
    modules: LogicModules,
    tracker: Arc<dyn Tracker>,
    router: Arc<dyn MessageRouter>,
    metrics: Arc<ActorMetrics>,
    /// Matches by UUID.
    matches: RwLock<HashMap<Uuid, MatchActorHandle>>,
    /// Cleared by `stop`.
    accepting: AtomicBool,
    /// Handed to actors and supervisors.
    self_ref: Weak<LocalMatchRegistry>,
}

impl LocalMatchRegistry {
    /// Create a registry for `node`.
    #[must_use]
    pub fn new(
        node: impl Into<String>,
        mailbox_capacity: usize,
        modules: LogicModules,
        tracker: Arc<dyn Tracker>,
        router: Arc<dyn MessageRouter>,
        metrics: Arc<ActorMetrics>,
    ) -> Arc<Self> {
        let node = node.into();
        Arc::new_cyclic(|self_ref| Self {
            node,
            mailbox_capacity,
            modules,
            tracker,
            router,
            metrics,
            matches: RwLock::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            self_ref: self_ref.clone(),
        })
    }

    /// Local node label.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Shared actor metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.metrics
    }

    /// Number of registered matches.
    pub async fn match_count(&self) -> usize {
        self.matches.read().await.len()
    }

    /// Whether a match is registered.
    pub async fn contains(&self, id: Uuid) -> bool {
        self.matches.read().await.contains_key(&id)
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        !self.accepting.load(Ordering::SeqCst)
    }

    /// Create and register a new authoritative match running `module`.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::ModuleNotFound` or the module's own load error if
    /// the logic cannot be instantiated, and `MatchError::RegistryStopped`
    /// after `stop`. Nothing is registered on failure.
    #[instrument(skip_all, fields(module = %module))]
    pub async fn new_match(&self, module: &str) -> Result<MatchActorHandle, MatchError> {
        if self.is_stopped() {
            return Err(MatchError::RegistryStopped);
        }

        let match_id = MatchId::new_authoritative(self.node.clone());
        let logic = self.modules.load(module, &match_id).inspect_err(|e| {
            warn!(
                target: "ms.registry",
                module = %module,
                error = %e,
                "Failed to load match logic"
            );
        })?;

        let handle = {
            let mut matches = self.matches.write().await;
            // Re-check under the lock; stop flips the flag while holding it
            if self.is_stopped() {
                return Err(MatchError::RegistryStopped);
            }

            let (handle, task) = MatchActor::spawn(
                match_id.clone(),
                logic,
                MatchActorDeps {
                    registry: self.self_ref.clone(),
                    tracker: Arc::clone(&self.tracker),
                    router: Arc::clone(&self.router),
                    metrics: Arc::clone(&self.metrics),
                    mailbox_capacity: self.mailbox_capacity,
                },
            );
            matches.insert(match_id.id(), handle.clone());
            self.supervise(match_id.clone(), task);
            handle
        };
        self.metrics.match_created();

        info!(
            target: "ms.registry",
            match_id = %match_id,
            module = %module,
            "Match created"
        );

        Ok(handle)
    }

    /// Remove a match and evict every presence on `stream`, on any node.
    ///
    /// Idempotent; the eviction runs even when the match is already gone.
    pub async fn remove_match(&self, id: Uuid, stream: &PresenceStream) {
        let removed = self.matches.write().await.remove(&id);
        if let Some(handle) = removed {
            handle.close();
            self.metrics.match_removed();
            info!(
                target: "ms.registry",
                match_id = %handle.match_id(),
                age_secs = chrono::Utc::now().timestamp() - handle.created_at(),
                "Match removed"
            );
        }

        let evicted = self.tracker.untrack_by_stream(stream);
        if !evicted.is_empty() {
            debug!(
                target: "ms.registry",
                match_id = %id,
                evicted = evicted.len(),
                "Match stream evicted"
            );
        }
    }

    /// Close every match and refuse new ones. Called once at node shutdown.
    pub async fn stop(&self) {
        let mut matches = self.matches.write().await;
        self.accepting.store(false, Ordering::SeqCst);

        let count = matches.len();
        for (_, handle) in matches.drain() {
            handle.close();
            self.metrics.match_removed();
        }

        info!(
            target: "ms.registry",
            closed = count,
            "Match registry stopped"
        );
    }

    /// Ask a match whether a session may join, waiting at most
    /// [`JOIN_ATTEMPT_TIMEOUT`] for the answer.
    ///
    /// A saturated or closed mailbox is rejected immediately; an actor that
    /// does not answer in time is treated as a rejection.
    #[instrument(skip_all, fields(match_id = %id, node = %node))]
    pub async fn join(&self, id: Uuid, node: &str, attempt: JoinAttempt) -> JoinOutcome {
        let start = Instant::now();
        let outcome = self.join_inner(id, node, attempt).await;
        metrics::record_join_attempt(outcome.as_str(), start.elapsed());
        outcome
    }

    async fn join_inner(&self, id: Uuid, node: &str, attempt: JoinAttempt) -> JoinOutcome {
        let Some(handle) = self.lookup(id, node).await else {
            return JoinOutcome::NotFound;
        };

        let (respond_to, response) = oneshot::channel();
        if !handle.queue_call(MatchMessage::JoinAttempt {
            attempt,
            respond_to,
        }) {
            warn!(
                target: "ms.registry",
                match_id = %id,
                "Join attempt refused by match mailbox"
            );
            return JoinOutcome::Rejected;
        }

        match tokio::time::timeout(JOIN_ATTEMPT_TIMEOUT, response).await {
            Ok(Ok(true)) => JoinOutcome::Accepted,
            Ok(Ok(false)) => JoinOutcome::Rejected,
            Ok(Err(_)) => {
                debug!(
                    target: "ms.registry",
                    match_id = %id,
                    "Match closed before answering join attempt"
                );
                JoinOutcome::Rejected
            }
            Err(_) => {
                warn!(
                    target: "ms.registry",
                    match_id = %id,
                    timeout_secs = JOIN_ATTEMPT_TIMEOUT.as_secs(),
                    "Join attempt timed out"
                );
                JoinOutcome::Rejected
            }
        }
    }

    /// Tell a match that presences left. Best-effort.
    pub async fn leave(&self, id: Uuid, node: &str, presences: Vec<MatchPresence>) {
        if presences.is_empty() {
            return;
        }
        if let Some(handle) = self.lookup(id, node).await {
            // A full mailbox means the match is in trouble; the leave is moot
            let _ = handle.queue_call(MatchMessage::Leave { presences });
        }
    }

    /// Evict presences connected to this node from `stream`.
    ///
    /// Presences on other nodes are skipped; their own node evicts them. The
    /// owning match is then told about the evictions as a normal leave.
    pub async fn kick(&self, stream: &PresenceStream, presences: &[MatchPresence]) {
        let kicked: Vec<MatchPresence> = presences
            .iter()
            .filter(|presence| presence.node == self.node)
            .filter_map(|presence| {
                self.tracker
                    .untrack(presence.session_id, stream, presence.user_id)
            })
            .map(|removed| MatchPresence::from(&removed))
            .collect();

        if kicked.is_empty() {
            return;
        }
        debug!(
            target: "ms.registry",
            match_id = %stream.subject,
            kicked = kicked.len(),
            "Presences kicked"
        );

        if stream.mode == StreamMode::MatchAuthoritative {
            self.leave(stream.subject, &stream.label, kicked).await;
        }
    }

    /// Hand client data to a match. Best-effort, at most once.
    pub async fn send_data(&self, id: Uuid, node: &str, message: MatchDataMessage) {
        if let Some(handle) = self.lookup(id, node).await {
            let _ = handle.queue_data(message);
        }
    }

    /// Node-affine lookup; the read lock is released before returning.
    async fn lookup(&self, id: Uuid, node: &str) -> Option<MatchActorHandle> {
        if node != self.node {
            return None;
        }
        self.matches.read().await.get(&id).cloned()
    }

    /// Watch an actor task and clean up after a panic.
    fn supervise(&self, match_id: MatchId, task: JoinHandle<()>) {
        let registry = self.self_ref.clone();
        let actor_metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    actor_metrics.record_panic();
                    error!(
                        target: "ms.registry",
                        match_id = %match_id,
                        "Match actor panicked, removing match"
                    );
                    if let Some(registry) = registry.upgrade() {
                        registry
                            .remove_match(match_id.id(), &match_id.stream())
                            .await;
                    }
                }
                Err(_) => {
                    debug!(
                        target: "ms.registry",
                        match_id = %match_id,
                        "Match actor task cancelled"
                    );
                }
            }
        });
    }
}
