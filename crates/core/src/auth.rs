//! Server-side role resolution
//!
//! The relay never trusts a role asserted by a joining client. Roles are
//! derived from the booking record behind [`RoleDirectory`]; a join whose
//! (token, user) pair the directory does not know is rejected.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::session::Role;

/// Resolves the role a user holds in a session, if any
///
/// Implemented by whatever fronts the booking system. Lookups are
/// expected to be cheap and synchronous; the relay calls this on every
/// join.
pub trait RoleDirectory: Send + Sync {
    /// The role `user_id` is booked into `token` with, or `None` if the
    /// booking system knows nothing about the pair.
    fn role_for(&self, token: &str, user_id: &str) -> Option<Role>;
}

/// One booking-system entry authorizing a user for a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingEntry {
    /// Opaque session token minted for the booking
    pub session_token: String,
    /// Stable user identifier
    pub user_id: String,
    /// Role the booking grants
    pub role: Role,
}

/// In-memory role directory loaded from a booking-system export
///
/// The web application writes the export at booking time; deployments
/// that embed the relay can instead implement [`RoleDirectory`] against
/// their own store.
#[derive(Debug, Default)]
pub struct StaticRoleDirectory {
    entries: HashMap<(String, String), Role>,
}

impl StaticRoleDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one (token, user) pair
    pub fn insert(
        &mut self,
        token: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
    ) -> &mut Self {
        self.entries.insert((token.into(), user_id.into()), role);
        self
    }

    /// Build a directory from booking entries
    pub fn from_entries(entries: impl IntoIterator<Item = BookingEntry>) -> Self {
        let mut directory = Self::new();
        for entry in entries {
            directory.insert(entry.session_token, entry.user_id, entry.role);
        }
        directory
    }

    /// Load a directory from a JSON export (an array of entries)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<BookingEntry> = serde_json::from_str(&raw)?;
        let directory = Self::from_entries(entries);
        info!(
            path = %path.display(),
            entries = directory.len(),
            "Loaded role directory"
        );
        Ok(directory)
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RoleDirectory for StaticRoleDirectory {
    fn role_for(&self, token: &str, user_id: &str) -> Option<Role> {
        self.entries
            .get(&(token.to_string(), user_id.to_string()))
            .copied()
    }
}
