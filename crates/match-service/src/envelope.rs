//! Client-facing envelope model.
//!
//! Only the match message kinds are modelled. Envelopes carry an optional
//! correlation id (`cid`) that responses echo back to the sender.

use crate::errors::MatchError;
use crate::presence::MatchPresence;
use crate::session::SessionInfo;
use serde::{Deserialize, Serialize};

/// Error codes carried by `Error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    RuntimeException = 0,
    UnrecognizedPayload = 1,
    MissingPayload = 2,
    BadInput = 3,
    MatchNotFound = 4,
    MatchJoinRejected = 5,
}

impl ErrorCode {
    /// Numeric value sent on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// One realtime message, request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<EnvelopeMessage>,
}

/// Message payloads handled by the match pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeMessage {
    Error(ErrorMessage),
    Match(MatchDescriptor),
    MatchCreate(MatchCreate),
    MatchData(MatchData),
    MatchDataSend(MatchDataSend),
    MatchJoin(MatchJoin),
    MatchLeave(MatchLeave),
}

impl EnvelopeMessage {
    /// Message kind for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            EnvelopeMessage::Error(_) => "error",
            EnvelopeMessage::Match(_) => "match",
            EnvelopeMessage::MatchCreate(_) => "match_create",
            EnvelopeMessage::MatchData(_) => "match_data",
            EnvelopeMessage::MatchDataSend(_) => "match_data_send",
            EnvelopeMessage::MatchJoin(_) => "match_join",
            EnvelopeMessage::MatchLeave(_) => "match_leave",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: i32,
    pub message: String,
}

/// A user session as seen by other match members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPresence {
    pub user_id: String,
    pub session_id: String,
    pub username: String,
}

impl From<&MatchPresence> for StreamPresence {
    fn from(presence: &MatchPresence) -> Self {
        Self {
            user_id: presence.user_id.to_string(),
            session_id: presence.session_id.to_string(),
            username: presence.username.clone(),
        }
    }
}

impl From<&SessionInfo> for StreamPresence {
    fn from(session: &SessionInfo) -> Self {
        Self {
            user_id: session.user_id.to_string(),
            session_id: session.session_id.to_string(),
            username: session.username.clone(),
        }
    }
}

/// Match descriptor returned by create and join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDescriptor {
    pub match_id: String,
    #[serde(rename = "self")]
    pub self_presence: StreamPresence,
    pub presences: Vec<StreamPresence>,
}

/// Create a relayed match with the sender as its first member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCreate {}

/// Join by match id. Token joins are not available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchJoin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// What a `MatchJoin` addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTarget<'a> {
    MatchId(&'a str),
    Token(&'a str),
}

impl MatchJoin {
    /// The join target; a match id takes precedence over a token.
    #[must_use]
    pub fn target(&self) -> Option<JoinTarget<'_>> {
        match (&self.match_id, &self.token) {
            (Some(match_id), _) => Some(JoinTarget::MatchId(match_id)),
            (None, Some(token)) => Some(JoinTarget::Token(token)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLeave {
    pub match_id: String,
}

/// Client data addressed to a match, optionally restricted to some members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDataSend {
    pub match_id: String,
    pub op_code: i64,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presences: Vec<StreamPresence>,
}

/// Data delivered to match members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchData {
    pub match_id: String,
    /// Sender, absent for messages originating from match logic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<StreamPresence>,
    pub op_code: i64,
    pub data: Vec<u8>,
}

impl Envelope {
    /// Envelope carrying a message.
    #[must_use]
    pub fn new(cid: Option<String>, message: EnvelopeMessage) -> Self {
        Self {
            cid,
            message: Some(message),
        }
    }

    /// Empty acknowledgement for `cid`.
    #[must_use]
    pub fn ack(cid: Option<String>) -> Self {
        Self { cid, message: None }
    }

    /// Error response carrying the client-safe view of `err`.
    #[must_use]
    pub fn error(cid: Option<String>, err: &MatchError) -> Self {
        Self::new(
            cid,
            EnvelopeMessage::Error(ErrorMessage {
                code: err.error_code().code(),
                message: err.client_message(),
            }),
        )
    }

    /// Decode a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns the decoder error for malformed JSON or unknown message kinds.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns the encoder error; envelope types always encode in practice.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
