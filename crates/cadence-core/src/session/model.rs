//! In-memory session snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Snapshot of the authenticated user's profile and liked-song membership.
///
/// Immutable once constructed: a fresh load produces a new `Session` that
/// replaces the process-wide current one as a whole. The counters are the
/// stored aggregates from the profile row; they are not reconciled against
/// `liked_track_ids`, whose only contract is membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub user_name: String,
    /// Stored credential hash, carried for re-authentication flows.
    pub credential_hash: String,
    /// `None` when the profile has no country set; never an empty string.
    pub country: Option<String>,
    pub gender: Option<String>,
    pub avatar_url: Option<String>,
    pub playlist_count: u32,
    pub favorite_song_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub liked_track_ids: HashSet<String>,
}

impl Session {
    /// Membership test against the liked-song set.
    pub fn has_liked(&self, track_id: &str) -> bool {
        self.liked_track_ids.contains(track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        Session {
            user_id: "u1".into(),
            user_name: "alice".into(),
            credential_hash: "pbkdf2$abc".into(),
            country: None,
            gender: Some("f".into()),
            avatar_url: None,
            playlist_count: 3,
            favorite_song_count: 5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            liked_track_ids: ["t1", "t2"].iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_has_liked_is_membership_only() {
        let session = sample_session();
        assert!(session.has_liked("t1"));
        assert!(session.has_liked("t2"));
        assert!(!session.has_liked("t3"));
    }

    #[test]
    fn test_counters_are_independent_of_set_size() {
        // Stored aggregates are trusted, not recomputed
        let session = sample_session();
        assert_eq!(session.favorite_song_count, 5);
        assert_eq!(session.liked_track_ids.len(), 2);
    }
}
