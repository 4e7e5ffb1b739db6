//! Match service error types.
//!
//! Error types map to envelope [`ErrorCode`] values for client responses.
//! Internal details are logged server-side but not exposed to clients.

use crate::envelope::ErrorCode;
use crate::identifier::MatchIdError;
use thiserror::Error;

/// Match service error type.
///
/// Maps to envelope `ErrorCode` values:
/// - `InvalidMatchId`, `BadInput`: `BAD_INPUT` (3)
/// - `MatchNotFound`: `MATCH_NOT_FOUND` (4)
/// - `MatchJoinRejected`: `MATCH_JOIN_REJECTED` (5)
/// - Module and registry failures: `RUNTIME_EXCEPTION` (0)
#[derive(Debug, Error)]
pub enum MatchError {
    /// Match id on the wire could not be parsed.
    #[error("Invalid match ID: {0}")]
    InvalidMatchId(#[from] MatchIdError),

    /// Request is missing or carries unusable input.
    #[error("Bad input: {0}")]
    BadInput(String),

    /// Relayed match has no members, or the owning node does not know the match.
    #[error("Match not found")]
    MatchNotFound,

    /// Match logic declined the join, or the join hit backpressure or timed out.
    #[error("Match join rejected")]
    MatchJoinRejected,

    /// No logic module registered under this name.
    #[error("Match logic module not found: {0}")]
    ModuleNotFound(String),

    /// Logic module failed to initialize.
    #[error("Match logic init failed: {0}")]
    LogicInit(String),

    /// Registry has been stopped and no longer creates matches.
    #[error("Match registry stopped")]
    RegistryStopped,
}

impl MatchError {
    /// Returns the envelope `ErrorCode` for this error.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            MatchError::InvalidMatchId(_) | MatchError::BadInput(_) => ErrorCode::BadInput,
            MatchError::MatchNotFound => ErrorCode::MatchNotFound,
            MatchError::MatchJoinRejected => ErrorCode::MatchJoinRejected,
            MatchError::ModuleNotFound(_)
            | MatchError::LogicInit(_)
            | MatchError::RegistryStopped => ErrorCode::RuntimeException,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            MatchError::InvalidMatchId(_) => "Invalid match ID".to_string(),
            MatchError::BadInput(msg) => msg.clone(),
            MatchError::MatchNotFound => "Match not found".to_string(),
            MatchError::MatchJoinRejected => "Match join rejected".to_string(),
            MatchError::ModuleNotFound(_)
            | MatchError::LogicInit(_)
            | MatchError::RegistryStopped => "An internal error occurred".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            MatchError::InvalidMatchId(MatchIdError::MissingSeparator).error_code(),
            ErrorCode::BadInput
        );
        assert_eq!(
            MatchError::BadInput("No match ID or token found".to_string()).error_code(),
            ErrorCode::BadInput
        );
        assert_eq!(MatchError::MatchNotFound.error_code(), ErrorCode::MatchNotFound);
        assert_eq!(
            MatchError::MatchJoinRejected.error_code(),
            ErrorCode::MatchJoinRejected
        );
        assert_eq!(
            MatchError::ModuleNotFound("arena".to_string()).error_code(),
            ErrorCode::RuntimeException
        );
        assert_eq!(
            MatchError::RegistryStopped.error_code(),
            ErrorCode::RuntimeException
        );
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(ErrorCode::BadInput.code(), 3);
        assert_eq!(ErrorCode::MatchNotFound.code(), 4);
        assert_eq!(ErrorCode::MatchJoinRejected.code(), 5);
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = MatchError::LogicInit("script error at arena.lua:42".to_string());
        assert!(!err.client_message().contains("arena.lua"));
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = MatchError::ModuleNotFound("arena".to_string());
        assert!(!err.client_message().contains("arena"));
    }

    #[test]
    fn test_bad_input_message_passes_through() {
        let err = MatchError::BadInput("Token-based match join not available".to_string());
        assert_eq!(err.client_message(), "Token-based match join not available");
    }

    #[test]
    fn test_match_id_error_conversion() {
        let err: MatchError = MatchIdError::InvalidId.into();
        assert!(matches!(err, MatchError::InvalidMatchId(_)));
        assert_eq!(err.client_message(), "Invalid match ID");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", MatchError::ModuleNotFound("arena".to_string())),
            "Match logic module not found: arena"
        );
        assert_eq!(format!("{}", MatchError::MatchNotFound), "Match not found");
    }
}
