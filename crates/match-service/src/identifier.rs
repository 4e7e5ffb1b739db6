//! Match identifiers.
//!
//! A match is addressed on the wire as `"<uuid>:<node>"`. The node label names
//! the node whose registry owns the match actor; an empty label marks a relayed
//! match, which has no actor anywhere.

use crate::presence::{PresenceStream, StreamMode};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Separator between the UUID part and the node label.
pub const MATCH_ID_SEPARATOR: char = ':';

/// Whether a match runs server-side logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// No server logic; a labelled group of presences exchanging data.
    Relayed,
    /// Logic runs in a match actor on exactly one node.
    Authoritative,
}

impl MatchMode {
    /// Returns the mode as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Relayed => "relayed",
            MatchMode::Authoritative => "authoritative",
        }
    }

    /// The presence stream mode used to track members of a match in this mode.
    #[must_use]
    pub const fn stream_mode(&self) -> StreamMode {
        match self {
            MatchMode::Relayed => StreamMode::MatchRelayed,
            MatchMode::Authoritative => StreamMode::MatchAuthoritative,
        }
    }
}

/// Errors from parsing a wire match identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchIdError {
    /// No `:` between identifier and node label.
    #[error("match id is missing the node separator")]
    MissingSeparator,

    /// The identifier part is not a UUID.
    #[error("match id is not a valid identifier")]
    InvalidId,
}

/// A globally unique match identifier plus the label of its owning node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchId {
    id: Uuid,
    node: String,
}

impl MatchId {
    /// A fresh relayed match identifier (empty node label).
    #[must_use]
    pub fn new_relayed() -> Self {
        Self {
            id: Uuid::new_v4(),
            node: String::new(),
        }
    }

    /// A fresh authoritative match identifier owned by `node`.
    #[must_use]
    pub fn new_authoritative(node: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node: node.into(),
        }
    }

    /// Build an identifier from its parts.
    #[must_use]
    pub fn from_parts(id: Uuid, node: impl Into<String>) -> Self {
        Self {
            id,
            node: node.into(),
        }
    }

    /// Parse the wire representation `"<uuid>:<node>"`.
    ///
    /// Only the first separator splits; everything after it is the node label.
    ///
    /// # Errors
    ///
    /// Returns [`MatchIdError::MissingSeparator`] when there is no `:` and
    /// [`MatchIdError::InvalidId`] when the identifier part is not a UUID.
    pub fn parse(s: &str) -> Result<Self, MatchIdError> {
        let (id, node) = s
            .split_once(MATCH_ID_SEPARATOR)
            .ok_or(MatchIdError::MissingSeparator)?;
        let id = Uuid::parse_str(id).map_err(|_| MatchIdError::InvalidId)?;
        Ok(Self {
            id,
            node: node.to_string(),
        })
    }

    /// The identifier part.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The owning node label (empty for relayed matches).
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Relayed when the node label is empty, authoritative otherwise.
    #[must_use]
    pub fn mode(&self) -> MatchMode {
        if self.node.is_empty() {
            MatchMode::Relayed
        } else {
            MatchMode::Authoritative
        }
    }

    /// The presence stream that tracks this match's members.
    #[must_use]
    pub fn stream(&self) -> PresenceStream {
        PresenceStream {
            mode: self.mode().stream_mode(),
            subject: self.id,
            label: self.node.clone(),
        }
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.id, MATCH_ID_SEPARATOR, self.node)
    }
}

impl FromStr for MatchId {
    type Err = MatchIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
