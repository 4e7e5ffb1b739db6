//! `MatchActor` - per-match actor that owns the match logic.
//!
//! Each `MatchActor`:
//! - Owns one [`MatchLogic`] instance; nothing else ever touches it
//! - Processes its bounded mailbox strictly in FIFO order, one message at a time
//! - Applies the kick/broadcast/terminate requests its logic records
//!
//! Producers never wait on the actor: `queue_call` and `queue_data` either
//! enqueue immediately or return `false`. `close` cancels the actor, which
//! aborts any in-flight callback and discards whatever is still queued.

use super::messages::{MatchDataMessage, MatchMessage};
use super::metrics::{ActorMetrics, DropKind, MailboxMonitor};
use super::registry::LocalMatchRegistry;
use crate::envelope::{Envelope, EnvelopeMessage, MatchData, StreamPresence};
use crate::identifier::MatchId;
use crate::logic::{MatchContext, MatchEffect, MatchLogic};
use crate::presence::{MatchPresence, PresenceStream};
use crate::router::MessageRouter;
use crate::tracker::Tracker;

use bytes::Bytes;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default mailbox capacity for a match actor.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 128;

/// Collaborators a match actor needs to apply its logic's requests.
#[derive(Clone)]
pub struct MatchActorDeps {
    /// Owning registry, for kicks and self-termination.
    pub registry: Weak<LocalMatchRegistry>,
    pub tracker: Arc<dyn Tracker>,
    pub router: Arc<dyn MessageRouter>,
    pub metrics: Arc<ActorMetrics>,
    pub mailbox_capacity: usize,
}

/// Handle to a `MatchActor`.
#[derive(Clone, Debug)]
pub struct MatchActorHandle {
    match_id: MatchId,
    sender: mpsc::Sender<MatchMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
    /// Unix timestamp of actor creation.
    created_at: i64,
}

impl MatchActorHandle {
    /// Get the match ID.
    #[must_use]
    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    /// Unix timestamp (seconds) at which the actor was spawned.
    #[must_use]
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Enqueue a join attempt or leave notification.
    ///
    /// Returns `false` if the mailbox is full or the actor is closed.
    pub fn queue_call(&self, message: MatchMessage) -> bool {
        self.enqueue(message)
    }

    /// Enqueue client data.
    ///
    /// Returns `false` if the mailbox is full or the actor is closed.
    pub fn queue_data(&self, message: MatchDataMessage) -> bool {
        self.enqueue(MatchMessage::Data(message))
    }

    /// Stop the actor. Queued messages are discarded.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled() || self.sender.is_closed()
    }

    /// Mailbox statistics for this actor.
    #[must_use]
    pub fn mailbox(&self) -> &MailboxMonitor {
        &self.mailbox
    }

    fn enqueue(&self, message: MatchMessage) -> bool {
        if self.cancel_token.is_cancelled() {
            return false;
        }

        let kind = drop_kind(&message);
        let depth = self.mailbox.record_enqueue();
        match self.sender.try_send(message) {
            Ok(()) => {
                self.mailbox.confirm_enqueue(depth);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.mailbox.revert_enqueue();
                self.mailbox.record_drop(kind);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.mailbox.revert_enqueue();
                debug!(
                    target: "ms.actor.match",
                    match_id = %self.match_id,
                    kind = kind.as_str(),
                    "Mailbox closed, message refused"
                );
                false
            }
        }
    }
}

fn drop_kind(message: &MatchMessage) -> DropKind {
    match message {
        MatchMessage::JoinAttempt { .. } => DropKind::Join,
        MatchMessage::Leave { .. } => DropKind::Leave,
        MatchMessage::Data(_) => DropKind::Data,
    }
}

/// The `MatchActor` implementation.
pub struct MatchActor {
    /// Match ID.
    match_id: MatchId,
    /// Stream tracking this match's members.
    stream: PresenceStream,
    /// Message receiver.
    receiver: mpsc::Receiver<MatchMessage>,
    /// Cancelled by `close`.
    cancel_token: CancellationToken,
    /// Game logic.
    logic: Box<dyn MatchLogic>,
    /// Requests recorded by the logic during a callback.
    ctx: MatchContext,
    deps: MatchActorDeps,
    /// Shared with every handle.
    mailbox: Arc<MailboxMonitor>,
}

impl MatchActor {
    /// Spawn a new match actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        match_id: MatchId,
        logic: Box<dyn MatchLogic>,
        deps: MatchActorDeps,
    ) -> (MatchActorHandle, JoinHandle<()>) {
        let capacity = deps.mailbox_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let cancel_token = CancellationToken::new();
        let mailbox = Arc::new(MailboxMonitor::new(match_id.to_string(), capacity));

        let actor = Self {
            stream: match_id.stream(),
            match_id: match_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            logic,
            ctx: MatchContext::new(match_id.clone()),
            deps,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = MatchActorHandle {
            match_id,
            sender,
            cancel_token,
            mailbox,
            created_at: chrono::Utc::now().timestamp(),
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "ms.actor.match", fields(match_id = %self.match_id))]
    async fn run(mut self) {
        info!(
            target: "ms.actor.match",
            match_id = %self.match_id,
            "MatchActor started"
        );

        let cancel_token = self.cancel_token.clone();
        loop {
            let message = tokio::select! {
                biased;

                () = cancel_token.cancelled() => {
                    info!(
                        target: "ms.actor.match",
                        match_id = %self.match_id,
                        "MatchActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => match msg {
                    Some(message) => message,
                    None => {
                        info!(
                            target: "ms.actor.match",
                            match_id = %self.match_id,
                            "MatchActor channel closed, exiting"
                        );
                        break;
                    }
                },
            };

            self.mailbox.record_dequeue();
            self.deps.metrics.record_message_processed();

            // Close must not wait on a callback that never returns
            let flow = tokio::select! {
                biased;
                () = cancel_token.cancelled() => ControlFlow::Break(()),
                flow = self.handle_message(message) => flow,
            };
            if flow.is_break() {
                break;
            }
        }

        self.discard_mailbox();

        info!(
            target: "ms.actor.match",
            match_id = %self.match_id,
            messages_processed = self.mailbox.messages_processed(),
            messages_discarded = self.mailbox.messages_discarded(),
            "MatchActor stopped"
        );
    }

    /// Handle a single message, then apply the effects the logic recorded.
    async fn handle_message(&mut self, message: MatchMessage) -> ControlFlow<()> {
        match message {
            MatchMessage::JoinAttempt {
                attempt,
                respond_to,
            } => {
                let allowed = self.logic.on_join_attempt(&mut self.ctx, &attempt).await;
                debug!(
                    target: "ms.actor.match",
                    match_id = %self.match_id,
                    session_id = %attempt.session_id,
                    allowed,
                    "Join attempt decided"
                );
                // A caller that timed out never becomes a member, so the
                // logic must forget any seat it just granted
                if respond_to.send(allowed).is_err() && allowed {
                    debug!(
                        target: "ms.actor.match",
                        match_id = %self.match_id,
                        session_id = %attempt.session_id,
                        "Join caller gone, releasing seat"
                    );
                    self.logic
                        .on_leave(&mut self.ctx, &[attempt.presence()])
                        .await;
                }
            }

            MatchMessage::Leave { presences } => {
                self.logic.on_leave(&mut self.ctx, &presences).await;
            }

            MatchMessage::Data(message) => {
                self.logic.on_data(&mut self.ctx, &message).await;
            }
        }

        self.apply_effects().await
    }

    async fn apply_effects(&mut self) -> ControlFlow<()> {
        let mut flow = ControlFlow::Continue(());

        for effect in self.ctx.take_effects() {
            match effect {
                MatchEffect::Kick(presences) => {
                    if let Some(registry) = self.deps.registry.upgrade() {
                        registry.kick(&self.stream, &presences).await;
                    }
                }
                MatchEffect::Broadcast {
                    op_code,
                    data,
                    sender,
                    recipients,
                } => {
                    self.broadcast(op_code, data, sender.as_ref(), recipients.as_deref());
                }
                MatchEffect::Terminate => flow = ControlFlow::Break(()),
            }
        }

        if flow.is_break() {
            info!(
                target: "ms.actor.match",
                match_id = %self.match_id,
                "Match logic requested termination"
            );
            match self.deps.registry.upgrade() {
                Some(registry) => {
                    registry
                        .remove_match(self.match_id.id(), &self.stream)
                        .await;
                }
                None => {
                    self.deps.tracker.untrack_by_stream(&self.stream);
                }
            }
        }

        flow
    }

    /// Deliver logic-originated data to the stream members named by `recipients`,
    /// or to every member when `recipients` is `None`.
    fn broadcast(
        &self,
        op_code: i64,
        data: Bytes,
        sender: Option<&MatchPresence>,
        recipients: Option<&[MatchPresence]>,
    ) {
        let mut members = self.deps.tracker.list_by_stream(&self.stream);
        if let Some(recipients) = recipients {
            members.retain(|member| {
                recipients
                    .iter()
                    .any(|r| member.is_session(r.user_id, r.session_id))
            });
        }
        if members.is_empty() {
            return;
        }

        let envelope = Envelope::new(
            None,
            EnvelopeMessage::MatchData(MatchData {
                match_id: self.match_id.to_string(),
                presence: sender.map(StreamPresence::from),
                op_code,
                data: data.to_vec(),
            }),
        );
        self.deps.router.send_to_presences(&members, envelope);
    }

    fn discard_mailbox(&mut self) {
        self.receiver.close();
        let mut discarded = 0_usize;
        while self.receiver.try_recv().is_ok() {
            self.mailbox.record_discard();
            discarded += 1;
        }
        if discarded > 0 {
            warn!(
                target: "ms.actor.match",
                match_id = %self.match_id,
                discarded,
                "Discarded unprocessed mailbox messages"
            );
        }
    }
}
