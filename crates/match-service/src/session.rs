//! The session view consumed by the match pipeline.
//!
//! Transport and authentication live outside this crate; the pipeline only needs
//! the identity of the caller and the format its connection negotiated.

use crate::presence::{PresenceMeta, SessionFormat};
use common::types::{SessionId, UserId};

/// Identity of the connected session that sent a client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub username: String,
    pub format: SessionFormat,
}

impl SessionInfo {
    /// Create a session view with the default wire format.
    #[must_use]
    pub fn new(user_id: UserId, session_id: SessionId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            session_id,
            username: username.into(),
            format: SessionFormat::default(),
        }
    }

    /// Presence metadata recorded when this session joins a stream.
    #[must_use]
    pub fn presence_meta(&self) -> PresenceMeta {
        PresenceMeta {
            username: self.username.clone(),
            format: self.format,
        }
    }
}
