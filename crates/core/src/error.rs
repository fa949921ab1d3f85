//! Error types for the LessonLive signaling core

use thiserror::Error;

use crate::session::TokenError;

/// Result type alias for signaling core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the signaling core
///
/// Every variant is local to the operation that produced it: a failed
/// join, relay, or command is reported back to the originating connection
/// and never affects other sessions.
#[derive(Debug, Error)]
pub enum Error {
    /// Session token failed structural validation
    #[error("Invalid session token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The booking record does not authorize this user for the session
    #[error("User {user_id} is not authorized for this session")]
    NotAuthorized {
        /// Verified user identifier of the caller
        user_id: String,
    },

    /// Sender is not a member of the session it addressed
    #[error("not a session member")]
    NotASessionMember,

    /// Control command issued by a participant without the tutor role
    #[error("Control commands require the tutor role")]
    CommandNotPermitted,

    /// Command target user is not in the session
    #[error("Target user {target_user_id} is not in the session")]
    TargetNotInSession {
        /// Stable user identifier the command addressed
        target_user_id: String,
    },

    /// `approve` addressed to a participant that is already a tutor
    #[error("Cannot approve a tutor participant")]
    ApproveTargetIsTutor,

    /// Role directory error
    #[error("Role directory error: {0}")]
    RoleDirectory(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is a rejection of the sender's message, as
    /// opposed to an internal fault. Rejections are reported back to the
    /// originating connection as error events.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InvalidToken(_)
                | Error::NotAuthorized { .. }
                | Error::NotASessionMember
                | Error::CommandNotPermitted
                | Error::TargetNotInSession { .. }
                | Error::ApproveTargetIsTutor
        )
    }
}
