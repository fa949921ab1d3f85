//! Session and participant model
//!
//! In-memory state scoped to one signaling session: who is connected,
//! under which identity and role, and each participant's media-control
//! flags. Session identity itself (the token, and who may use it) comes
//! from the booking system; this module only validates token structure.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length for session tokens
pub const SESSION_TOKEN_MAX_LENGTH: usize = 128;

/// Error type for session token validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token is empty
    Empty,
    /// Token exceeds maximum length
    TooLong {
        /// Actual length
        length: usize,
        /// Allowed maximum
        max: usize,
    },
    /// Token contains a character outside the opaque-token alphabet
    InvalidCharacters {
        /// The offending character
        invalid_char: char,
        /// Byte position of the character
        position: usize,
    },
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Empty => write!(f, "session token cannot be empty"),
            TokenError::TooLong { length, max } => {
                write!(f, "session token too long: {} chars (max {})", length, max)
            }
            TokenError::InvalidCharacters {
                invalid_char,
                position,
            } => {
                write!(
                    f,
                    "session token contains invalid character '{}' at position {}",
                    invalid_char, position
                )
            }
        }
    }
}

impl std::error::Error for TokenError {}

/// Validate a session token string
///
/// Tokens are opaque identifiers minted by the booking system. The relay
/// never interprets them, but it refuses structurally broken values so a
/// garbled frame cannot seed garbage sessions:
/// - not empty
/// - at most [`SESSION_TOKEN_MAX_LENGTH`] characters
/// - alphanumeric, hyphens, and underscores only
pub fn validate_session_token(token: &str) -> Result<(), TokenError> {
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    if token.len() > SESSION_TOKEN_MAX_LENGTH {
        return Err(TokenError::TooLong {
            length: token.len(),
            max: SESSION_TOKEN_MAX_LENGTH,
        });
    }

    for (pos, c) in token.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(TokenError::InvalidCharacters {
                invalid_char: c,
                position: pos,
            });
        }
    }

    Ok(())
}

/// Ephemeral identifier for one live transport connection
///
/// Assigned when the transport accepts the connection and meaningless
/// once it closes. Control commands never address these; they address
/// stable user ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mint a fresh connection id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Role a participant holds within a session, derived server-side from
/// the booking record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The instructor; may issue control commands
    Tutor,
    /// The learner; starts unapproved
    Student,
}

impl Role {
    /// Whether this role may issue control commands
    pub fn is_tutor(&self) -> bool {
        matches!(self, Role::Tutor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Tutor => write!(f, "tutor"),
            Role::Student => write!(f, "student"),
        }
    }
}

/// Per-participant media-control flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaState {
    /// Local audio track disabled by a tutor command
    pub audio_muted: bool,
    /// Local video track disabled by a tutor command
    pub video_muted: bool,
    /// Tutor has admitted this participant; tutors are auto-approved
    pub approved: bool,
}

impl MediaState {
    /// Initial state on join: unmuted, approved only for tutors
    pub fn initial(role: Role) -> Self {
        Self {
            audio_muted: false,
            video_muted: false,
            approved: role.is_tutor(),
        }
    }
}

/// One connected process within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Transport-level identity, ephemeral
    pub connection_id: ConnectionId,
    /// Stable identity from the authenticated caller
    pub user_id: String,
    /// Server-derived role
    pub role: Role,
    /// Media-control flags
    pub media: MediaState,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting joins and relaying
    Active,
    /// Torn down by a tutor end-session command
    Ended,
}

/// One signaling session: an opaque token and its connected participants
///
/// Participants are kept in join order; where the same user id appears
/// under more than one connection (a reconnect race), the most recent
/// join is authoritative for presence and control.
#[derive(Debug)]
pub struct Session {
    /// Booking-derived opaque token
    pub token: String,
    /// Lifecycle state
    pub state: SessionState,
    /// When the first participant joined
    pub created_at: Instant,
    participants: Vec<Participant>,
}

impl Session {
    /// Create an empty session for a token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            state: SessionState::Active,
            created_at: Instant::now(),
            participants: Vec::new(),
        }
    }

    /// All participants, in join order
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Number of connected participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether the session has no participants left
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Roster snapshot excluding one connection (the joiner)
    pub fn roster_excluding(&self, conn: ConnectionId) -> Vec<Participant> {
        self.participants
            .iter()
            .filter(|p| p.connection_id != conn)
            .cloned()
            .collect()
    }

    /// Connection ids of every participant except one
    pub fn connections_except(&self, conn: ConnectionId) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .map(|p| p.connection_id)
            .filter(|c| *c != conn)
            .collect()
    }

    /// Look up a participant by connection id
    pub fn by_connection(&self, conn: ConnectionId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.connection_id == conn)
    }

    /// Whether a connection is a member of this session
    pub fn contains_connection(&self, conn: ConnectionId) -> bool {
        self.by_connection(conn).is_some()
    }

    /// The authoritative participant for a user id (most recent join)
    pub fn authoritative(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().rev().find(|p| p.user_id == user_id)
    }

    /// Mutable access to the authoritative participant for a user id
    pub fn authoritative_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .rev()
            .find(|p| p.user_id == user_id)
    }

    /// Register a new participant
    ///
    /// If the same user id is already present (reconnect race), the new
    /// participant inherits that participant's media flags so mute state
    /// survives a handle change.
    pub fn insert(&mut self, connection_id: ConnectionId, user_id: String, role: Role) {
        let media = self
            .authoritative(&user_id)
            .map(|existing| existing.media)
            .unwrap_or_else(|| MediaState::initial(role));

        self.participants.push(Participant {
            connection_id,
            user_id,
            role,
            media,
        });
    }

    /// Remove a participant by connection id, returning it if present
    pub fn remove(&mut self, conn: ConnectionId) -> Option<Participant> {
        let idx = self
            .participants
            .iter()
            .position(|p| p.connection_id == conn)?;
        Some(self.participants.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_session_token_valid() {
        assert!(validate_session_token("booking-42").is_ok());
        assert!(validate_session_token("a").is_ok());
        assert!(validate_session_token("AbC_123-xyz").is_ok());
        let max = "a".repeat(SESSION_TOKEN_MAX_LENGTH);
        assert!(validate_session_token(&max).is_ok());
    }

    #[test]
    fn test_validate_session_token_empty() {
        assert!(matches!(validate_session_token(""), Err(TokenError::Empty)));
    }

    #[test]
    fn test_validate_session_token_too_long() {
        let long = "a".repeat(SESSION_TOKEN_MAX_LENGTH + 1);
        assert!(matches!(
            validate_session_token(&long),
            Err(TokenError::TooLong { length: 129, max: 128 })
        ));
    }

    #[test]
    fn test_validate_session_token_invalid_chars() {
        assert!(matches!(
            validate_session_token("has space"),
            Err(TokenError::InvalidCharacters {
                invalid_char: ' ',
                position: 3
            })
        ));
        assert!(validate_session_token("tok.en").is_err());
        assert!(validate_session_token("tok/en").is_err());
        assert!(validate_session_token("tok@en").is_err());
    }

    #[test]
    fn test_media_state_initial() {
        let tutor = MediaState::initial(Role::Tutor);
        assert!(tutor.approved);
        assert!(!tutor.audio_muted);
        assert!(!tutor.video_muted);

        let student = MediaState::initial(Role::Student);
        assert!(!student.approved);
    }

    #[test]
    fn test_session_roster_and_remove() {
        let mut session = Session::new("t1");
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        session.insert(a, "alice".into(), Role::Tutor);
        session.insert(b, "bob".into(), Role::Student);

        let roster = session.roster_excluding(b);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_id, "alice");

        assert!(session.remove(a).is_some());
        assert!(session.remove(a).is_none());
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_reconnect_inherits_media_state() {
        let mut session = Session::new("t1");
        let first = ConnectionId::new();
        session.insert(first, "bob".into(), Role::Student);
        session.authoritative_mut("bob").unwrap().media.audio_muted = true;

        let second = ConnectionId::new();
        session.insert(second, "bob".into(), Role::Student);

        let authoritative = session.authoritative("bob").unwrap();
        assert_eq!(authoritative.connection_id, second);
        assert!(authoritative.media.audio_muted);
    }
}
