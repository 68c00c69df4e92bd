//! Session loading and publication.
//!
//! `load_session` performs the two store reads off the async thread,
//! assembles the snapshot, and publishes it as the process-wide current
//! session. Publication is generation-guarded: every call takes a
//! generation number at initiation, and a completed load publishes only
//! if no later-initiated load has published first. The most recently
//! initiated call is authoritative; a stale completion is returned to its
//! caller but never becomes current.

use super::model::Session;
use super::store::SessionStore;
use crate::error::{CadenceError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

#[derive(Default)]
struct PublishedSession {
    session: Option<Arc<Session>>,
    generation: u64,
}

/// Owns the process-wide current session.
pub struct SessionManager {
    store: Arc<SessionStore>,
    next_generation: AtomicU64,
    current: RwLock<PublishedSession>,
}

impl SessionManager {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            next_generation: AtomicU64::new(0),
            current: RwLock::new(PublishedSession::default()),
        }
    }

    /// Load a user's session and publish it as current.
    ///
    /// The profile read and the liked-songs read both succeed before
    /// anything is published; a failure in either leaves the prior current
    /// session (or none) in place. A missing profile row is `UserNotFound`;
    /// a query failure is `SessionLoadFailed` carrying the cause.
    pub async fn load_session(&self, user_id: &str) -> Result<Arc<Session>> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Loading session for user {} (generation {})", user_id, generation);

        // Two independent reads of the same snapshot intent; run them on
        // the blocking pool and join before touching any shared state.
        let store = self.store.clone();
        let id = user_id.to_string();
        let profile_task = tokio::task::spawn_blocking(move || store.fetch_profile(&id));

        let store = self.store.clone();
        let id = user_id.to_string();
        let liked_task = tokio::task::spawn_blocking(move || store.fetch_liked_track_ids(&id));

        let (profile_result, liked_result) = tokio::join!(profile_task, liked_task);

        let profile = profile_result
            .map_err(|e| CadenceError::Other(format!("Profile read task failed: {}", e)))?
            .map_err(|e| CadenceError::session_load("profile query failed", e))?
            .ok_or_else(|| CadenceError::UserNotFound {
                user_id: user_id.to_string(),
            })?;

        let liked_track_ids = liked_result
            .map_err(|e| CadenceError::Other(format!("Liked-songs read task failed: {}", e)))?
            .map_err(|e| CadenceError::session_load("liked-songs query failed", e))?;

        let session = Arc::new(Session {
            user_id: profile.user_id,
            user_name: profile.user_name,
            credential_hash: profile.credential_hash,
            country: profile.country,
            gender: profile.gender,
            avatar_url: profile.avatar_url,
            playlist_count: profile.playlist_count,
            favorite_song_count: profile.favorite_song_count,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
            liked_track_ids,
        });

        self.publish(session.clone(), generation)?;

        Ok(session)
    }

    /// Publish a loaded session unless a later-initiated load got there first.
    fn publish(&self, session: Arc<Session>, generation: u64) -> Result<()> {
        let mut current = self.current.write().map_err(|_| {
            CadenceError::Other("current-session lock poisoned".to_string())
        })?;

        if generation > current.generation {
            info!(
                "Session for user {} is now current ({} liked songs)",
                session.user_id,
                session.liked_track_ids.len()
            );
            current.session = Some(session);
            current.generation = generation;
        } else {
            debug!(
                "Discarding stale session load (generation {} <= {})",
                generation, current.generation
            );
        }

        Ok(())
    }

    /// The current session, or `None` before the first successful load.
    ///
    /// Always a fully formed snapshot or the prior one; never a partial.
    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.current
            .read()
            .ok()
            .and_then(|current| current.session.clone())
    }

    /// Drop the current session (logout).
    pub fn clear_session(&self) {
        if let Ok(mut current) = self.current.write() {
            current.session = None;
        }
    }
}
