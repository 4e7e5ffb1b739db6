//! Match message pipeline.
//!
//! Entry point for match envelopes from connected sessions. The match id's node
//! label decides the path:
//!
//! - **Authoritative** (non-empty label): the sender's membership is checked
//!   against the tracker, then the call goes to the [`LocalMatchRegistry`],
//!   whose node-affinity check ignores matches owned by other nodes.
//! - **Relayed** (empty label): never touches the registry. Membership is the
//!   tracker stream itself, and data is fanned out by [`select_recipients`].

use crate::actors::messages::{JoinAttempt, JoinOutcome, MatchDataMessage};
use crate::actors::registry::LocalMatchRegistry;
use crate::envelope::{
    Envelope, EnvelopeMessage, ErrorCode, ErrorMessage, JoinTarget, MatchData, MatchDataSend,
    MatchDescriptor, MatchJoin, MatchLeave, StreamPresence,
};
use crate::errors::MatchError;
use crate::identifier::{MatchId, MatchMode};
use crate::observability::metrics;
use crate::presence::{DataFilter, MatchPresence, Presence, StreamMode};
use crate::router::MessageRouter;
use crate::session::SessionInfo;
use crate::tracker::Tracker;

use bytes::Bytes;
use common::types::{SessionId, UserId};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Where a relayed data message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayDecision {
    /// Deliver to exactly these presences.
    Deliver(Vec<Presence>),
    /// The sender is not on the stream; drop.
    SenderNotMember,
    /// Nobody is left after exclusion and filtering; drop.
    NoRecipients,
}

impl RelayDecision {
    /// Returns the decision as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RelayDecision::Deliver(_) => "delivered",
            RelayDecision::SenderNotMember => "not_member",
            RelayDecision::NoRecipients => "no_recipients",
        }
    }
}

/// Compute the recipients of a relayed data message.
///
/// The sender never receives its own message. A non-empty `filters` list
/// keeps only members it names, each filter entry admitting at most one
/// member. A sender that is not among `members` cannot broadcast at all,
/// whatever the filters say.
#[must_use]
pub fn select_recipients(
    members: Vec<Presence>,
    sender_user: UserId,
    sender_session: SessionId,
    filters: &[DataFilter],
) -> RelayDecision {
    let mut sender_found = false;
    let mut unused_filters: Vec<&DataFilter> = filters.iter().collect();
    let mut recipients = Vec::with_capacity(members.len());

    for presence in members {
        if presence.is_session(sender_user, sender_session) {
            sender_found = true;
            continue;
        }
        if filters.is_empty() {
            recipients.push(presence);
            continue;
        }
        if let Some(pos) = unused_filters.iter().position(|f| f.matches(&presence)) {
            unused_filters.swap_remove(pos);
            recipients.push(presence);
        }
    }

    if !sender_found {
        return RelayDecision::SenderNotMember;
    }
    if recipients.is_empty() {
        return RelayDecision::NoRecipients;
    }
    RelayDecision::Deliver(recipients)
}

/// Parse wire recipient filters; `None` if any id is not a UUID.
fn parse_filters(presences: &[StreamPresence]) -> Option<Vec<DataFilter>> {
    presences
        .iter()
        .map(|p| {
            Some(DataFilter {
                user_id: UserId(Uuid::parse_str(&p.user_id).ok()?),
                session_id: SessionId(Uuid::parse_str(&p.session_id).ok()?),
            })
        })
        .collect()
}

/// Handles match envelopes for sessions connected to this node.
pub struct MatchPipeline {
    node: String,
    tracker: Arc<dyn Tracker>,
    router: Arc<dyn MessageRouter>,
    registry: Arc<LocalMatchRegistry>,
}

impl MatchPipeline {
    #[must_use]
    pub fn new(
        tracker: Arc<dyn Tracker>,
        router: Arc<dyn MessageRouter>,
        registry: Arc<LocalMatchRegistry>,
    ) -> Self {
        Self {
            node: registry.node().to_string(),
            tracker,
            router,
            registry,
        }
    }

    /// Handle one envelope from `session` and return the response, if any.
    ///
    /// Data sends never produce a response.
    #[instrument(skip_all, fields(session_id = %session.session_id))]
    pub async fn process(&self, session: &SessionInfo, envelope: Envelope) -> Option<Envelope> {
        let cid = envelope.cid;
        let Some(message) = envelope.message else {
            return Some(protocol_error(
                cid,
                ErrorCode::MissingPayload,
                "Missing message payload",
            ));
        };
        debug!(target: "ms.pipeline", kind = message.kind(), "Processing match envelope");

        let result = match message {
            EnvelopeMessage::MatchCreate(_) => Ok(Some(EnvelopeMessage::Match(
                self.match_create(session),
            ))),
            EnvelopeMessage::MatchJoin(join) => self
                .match_join(session, &join)
                .await
                .map(|descriptor| Some(EnvelopeMessage::Match(descriptor))),
            EnvelopeMessage::MatchLeave(leave) => {
                self.match_leave(session, &leave).await.map(|()| None)
            }
            EnvelopeMessage::MatchDataSend(send) => {
                self.match_data_send(session, send).await;
                return None;
            }
            EnvelopeMessage::Error(_) | EnvelopeMessage::Match(_) | EnvelopeMessage::MatchData(_) => {
                return Some(protocol_error(
                    cid,
                    ErrorCode::UnrecognizedPayload,
                    "Unrecognized message payload",
                ));
            }
        };

        Some(match result {
            Ok(Some(message)) => Envelope::new(cid, message),
            Ok(None) => Envelope::ack(cid),
            Err(e) => {
                debug!(target: "ms.pipeline", error = %e, "Match request failed");
                Envelope::error(cid, &e)
            }
        })
    }

    /// Create a relayed match with `session` as its only member.
    pub fn match_create(&self, session: &SessionInfo) -> MatchDescriptor {
        let match_id = MatchId::new_relayed();
        self.tracker.track(
            session.session_id,
            &match_id.stream(),
            session.user_id,
            session.presence_meta(),
        );

        debug!(target: "ms.pipeline", match_id = %match_id, "Relayed match created");

        let self_presence = StreamPresence::from(session);
        MatchDescriptor {
            match_id: match_id.to_string(),
            presences: vec![self_presence.clone()],
            self_presence,
        }
    }

    /// Join a match and return its current membership.
    ///
    /// A session already on the match stream gets the membership back without
    /// the match logic being asked again.
    ///
    /// # Errors
    ///
    /// - `MatchError::BadInput` for a missing target or a token join
    /// - `MatchError::InvalidMatchId` for a malformed match id
    /// - `MatchError::MatchNotFound` for an empty relayed match or an
    ///   authoritative match this node does not own
    /// - `MatchError::MatchJoinRejected` when the match logic declines, is
    ///   saturated, or does not answer in time
    pub async fn match_join(
        &self,
        session: &SessionInfo,
        join: &MatchJoin,
    ) -> Result<MatchDescriptor, MatchError> {
        let raw_id = match join.target() {
            Some(JoinTarget::MatchId(raw_id)) => raw_id,
            Some(JoinTarget::Token(_)) => {
                return Err(MatchError::BadInput(
                    "Token-based match join not available".to_string(),
                ));
            }
            None => {
                return Err(MatchError::BadInput(
                    "No match ID or token found".to_string(),
                ));
            }
        };
        let match_id = MatchId::parse(raw_id)?;
        let stream = match_id.stream();
        let mode = match_id.mode();

        if mode == MatchMode::Relayed && !self.tracker.stream_exists(&stream) {
            return Err(MatchError::MatchNotFound);
        }

        let meta = match self
            .tracker
            .get_local(session.session_id, &stream, session.user_id)
        {
            Some(meta) => meta,
            None => {
                if mode == MatchMode::Authoritative {
                    let attempt = JoinAttempt {
                        user_id: session.user_id,
                        session_id: session.session_id,
                        username: session.username.clone(),
                        from_node: self.node.clone(),
                    };
                    match self
                        .registry
                        .join(match_id.id(), match_id.node(), attempt)
                        .await
                    {
                        JoinOutcome::NotFound => return Err(MatchError::MatchNotFound),
                        JoinOutcome::Rejected => return Err(MatchError::MatchJoinRejected),
                        JoinOutcome::Accepted => {}
                    }
                }
                let meta = session.presence_meta();
                self.tracker
                    .track(session.session_id, &stream, session.user_id, meta.clone());
                debug!(
                    target: "ms.pipeline",
                    match_id = %match_id,
                    mode = mode.as_str(),
                    "Session joined match"
                );
                meta
            }
        };

        let presences = self
            .tracker
            .list_by_stream(&stream)
            .iter()
            .map(|p| StreamPresence::from(&MatchPresence::from(p)))
            .collect();

        Ok(MatchDescriptor {
            match_id: raw_id.to_string(),
            self_presence: StreamPresence {
                user_id: session.user_id.to_string(),
                session_id: session.session_id.to_string(),
                username: meta.username,
            },
            presences,
        })
    }

    /// Leave a match. Succeeds whether or not the session was a member.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::InvalidMatchId` for a malformed match id.
    pub async fn match_leave(
        &self,
        session: &SessionInfo,
        leave: &MatchLeave,
    ) -> Result<(), MatchError> {
        let match_id = MatchId::parse(&leave.match_id)?;
        let removed =
            self.tracker
                .untrack(session.session_id, &match_id.stream(), session.user_id);

        if let Some(presence) = removed {
            debug!(target: "ms.pipeline", match_id = %match_id, "Session left match");
            if match_id.mode() == MatchMode::Authoritative {
                self.registry
                    .leave(
                        match_id.id(),
                        match_id.node(),
                        vec![MatchPresence::from(&presence)],
                    )
                    .await;
            }
        }
        Ok(())
    }

    /// Send data to a match. Fire-and-forget: every failure is a silent drop.
    pub async fn match_data_send(&self, session: &SessionInfo, send: MatchDataSend) {
        let Ok(match_id) = MatchId::parse(&send.match_id) else {
            metrics::record_relay_message("bad_input");
            return;
        };
        let stream = match_id.stream();

        if match_id.mode() == MatchMode::Authoritative {
            if self
                .tracker
                .get_local(session.session_id, &stream, session.user_id)
                .is_none()
            {
                debug!(
                    target: "ms.pipeline",
                    match_id = %match_id,
                    "Data from non-member dropped"
                );
                return;
            }
            let message = MatchDataMessage {
                user_id: session.user_id,
                session_id: session.session_id,
                username: session.username.clone(),
                node: self.node.clone(),
                op_code: send.op_code,
                data: Bytes::from(send.data),
            };
            self.registry
                .send_data(match_id.id(), match_id.node(), message)
                .await;
            return;
        }

        let Some(filters) = parse_filters(&send.presences) else {
            metrics::record_relay_message("bad_input");
            return;
        };

        let members = self.tracker.list_by_stream(&stream);
        let decision = select_recipients(members, session.user_id, session.session_id, &filters);
        metrics::record_relay_message(decision.as_str());

        let RelayDecision::Deliver(recipients) = decision else {
            debug!(
                target: "ms.pipeline",
                match_id = %match_id,
                result = decision.as_str(),
                "Relayed data dropped"
            );
            return;
        };

        let envelope = Envelope::new(
            None,
            EnvelopeMessage::MatchData(MatchData {
                match_id: send.match_id,
                presence: Some(StreamPresence::from(session)),
                op_code: send.op_code,
                data: send.data,
            }),
        );
        self.router.send_to_presences(&recipients, envelope);
    }

    /// Remove a disconnected session from every match it was in.
    ///
    /// Authoritative matches are told about the departure like a normal leave.
    pub async fn session_closed(&self, session: &SessionInfo) {
        let removed = self.tracker.untrack_all(session.session_id);
        for presence in &removed {
            if presence.stream.mode == StreamMode::MatchAuthoritative {
                self.registry
                    .leave(
                        presence.stream.subject,
                        &presence.stream.label,
                        vec![MatchPresence::from(presence)],
                    )
                    .await;
            }
        }
        if !removed.is_empty() {
            debug!(
                target: "ms.pipeline",
                session_id = %session.session_id,
                matches = removed.len(),
                "Session removed from matches"
            );
        }
    }
}

fn protocol_error(cid: Option<String>, code: ErrorCode, message: &str) -> Envelope {
    Envelope::new(
        cid,
        EnvelopeMessage::Error(ErrorMessage {
            code: code.code(),
            message: message.to_string(),
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::presence::{PresenceId, PresenceMeta, PresenceStream, SessionFormat};

    struct Member {
        user_id: UserId,
        session_id: SessionId,
    }

    impl Member {
        fn new() -> Self {
            Self {
                user_id: UserId::new(),
                session_id: SessionId::new(),
            }
        }

        fn presence(&self, stream: &PresenceStream) -> Presence {
            Presence {
                id: PresenceId {
                    node: "node-a".to_string(),
                    session_id: self.session_id,
                },
                stream: stream.clone(),
                user_id: self.user_id,
                meta: PresenceMeta {
                    username: String::new(),
                    format: SessionFormat::Json,
                },
            }
        }

        fn filter(&self) -> DataFilter {
            DataFilter {
                user_id: self.user_id,
                session_id: self.session_id,
            }
        }
    }

    fn sessions(decision: &RelayDecision) -> Vec<SessionId> {
        match decision {
            RelayDecision::Deliver(recipients) => {
                let mut ids: Vec<SessionId> =
                    recipients.iter().map(|p| p.id.session_id).collect();
                ids.sort_by_key(|id| id.0);
                ids
            }
            _ => Vec::new(),
        }
    }

    fn sorted(mut ids: Vec<SessionId>) -> Vec<SessionId> {
        ids.sort_by_key(|id| id.0);
        ids
    }

    fn setup() -> (PresenceStream, Member, Member, Member, Vec<Presence>) {
        let stream = MatchId::new_relayed().stream();
        let (a, b, c) = (Member::new(), Member::new(), Member::new());
        let members = vec![a.presence(&stream), b.presence(&stream), c.presence(&stream)];
        (stream, a, b, c, members)
    }

    #[test]
    fn test_sender_excluded_without_filter() {
        let (_, a, b, c, members) = setup();
        let decision = select_recipients(members, a.user_id, a.session_id, &[]);
        assert_eq!(
            sessions(&decision),
            sorted(vec![b.session_id, c.session_id])
        );
    }

    #[test]
    fn test_filter_restricts_recipients() {
        let (_, a, b, _, members) = setup();
        let decision = select_recipients(members, a.user_id, a.session_id, &[b.filter()]);
        assert_eq!(sessions(&decision), vec![b.session_id]);
    }

    #[test]
    fn test_filter_naming_non_member_drops() {
        let (_, a, _, _, members) = setup();
        let d = Member::new();
        let decision = select_recipients(members, a.user_id, a.session_id, &[d.filter()]);
        assert_eq!(decision, RelayDecision::NoRecipients);
    }

    #[test]
    fn test_non_member_sender_dropped_even_with_valid_filter() {
        let (_, _, b, c, members) = setup();
        let outsider = Member::new();
        let decision = select_recipients(
            members,
            outsider.user_id,
            outsider.session_id,
            &[b.filter(), c.filter()],
        );
        assert_eq!(decision, RelayDecision::SenderNotMember);
    }

    #[test]
    fn test_filter_naming_sender_only_drops() {
        let (_, a, _, _, members) = setup();
        let decision = select_recipients(members, a.user_id, a.session_id, &[a.filter()]);
        assert_eq!(decision, RelayDecision::NoRecipients);
    }

    #[test]
    fn test_duplicate_filters_admit_member_once() {
        let (_, a, b, _, members) = setup();
        let decision = select_recipients(
            members,
            a.user_id,
            a.session_id,
            &[b.filter(), b.filter()],
        );
        assert_eq!(sessions(&decision), vec![b.session_id]);
    }

    #[test]
    fn test_filter_requires_matching_user_and_session() {
        let (_, a, b, _, members) = setup();
        let mismatched = DataFilter {
            user_id: b.user_id,
            session_id: SessionId::new(),
        };
        let decision = select_recipients(members, a.user_id, a.session_id, &[mismatched]);
        assert_eq!(decision, RelayDecision::NoRecipients);
    }

    #[test]
    fn test_lone_sender_has_no_recipients() {
        let stream = MatchId::new_relayed().stream();
        let a = Member::new();
        let decision = select_recipients(vec![a.presence(&stream)], a.user_id, a.session_id, &[]);
        assert_eq!(decision, RelayDecision::NoRecipients);
    }

    #[test]
    fn test_empty_stream_is_not_member() {
        let a = Member::new();
        let decision = select_recipients(Vec::new(), a.user_id, a.session_id, &[]);
        assert_eq!(decision, RelayDecision::SenderNotMember);
    }

    #[test]
    fn test_parse_filters() {
        let good = StreamPresence {
            user_id: Uuid::new_v4().to_string(),
            session_id: Uuid::new_v4().to_string(),
            username: String::new(),
        };
        assert_eq!(parse_filters(&[good.clone()]).unwrap().len(), 1);
        assert!(parse_filters(&[]).unwrap().is_empty());

        let bad = StreamPresence {
            session_id: "nope".to_string(),
            ..good.clone()
        };
        assert!(parse_filters(&[good, bad]).is_none());
    }

    #[test]
    fn test_relay_decision_labels() {
        assert_eq!(RelayDecision::Deliver(Vec::new()).as_str(), "delivered");
        assert_eq!(RelayDecision::SenderNotMember.as_str(), "not_member");
        assert_eq!(RelayDecision::NoRecipients.as_str(), "no_recipients");
    }
}
