//! Relational store access for session loading.
//!
//! The narrow contract this core needs from the store: execute a
//! parameterized query, iterate rows, read typed columns by name, detect
//! NULL. Thread-safe via internal mutex on the connection; WAL mode for
//! concurrent access.

use crate::error::{CadenceError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Profile columns as read from the `users` relation.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub user_id: String,
    pub user_name: String,
    pub credential_hash: String,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub avatar_url: Option<String>,
    pub playlist_count: u32,
    pub favorite_song_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for profile writes (registration and profile-edit flows).
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub user_id: String,
    pub user_name: String,
    pub credential_hash: String,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub avatar_url: Option<String>,
    pub playlist_count: u32,
    pub favorite_song_count: u32,
}

/// SQLite-backed session store.
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    /// Open the store at the given database path.
    ///
    /// Creates the database, parent directories, and schema if absent;
    /// pointing at an existing database reuses it as-is.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CadenceError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| CadenceError::Database {
            message: format!("Failed to open session database: {}", e),
            source: Some(e),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CadenceError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_schema()?;

        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                password TEXT NOT NULL,
                country TEXT,
                gender TEXT,
                user_image_url TEXT,
                playlist_count INTEGER NOT NULL DEFAULT 0,
                favorite_songs_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_favorite_songs (
                user_id TEXT NOT NULL,
                track_id TEXT NOT NULL,
                PRIMARY KEY (user_id, track_id)
            );",
        )
        .map_err(|e| CadenceError::Database {
            message: format!("Failed to initialize session schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CadenceError::Database {
            message: "Failed to acquire session database lock".to_string(),
            source: None,
        })
    }

    fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CadenceError::Validation {
                field: column.to_string(),
                message: format!("Invalid timestamp '{}': {}", value, e),
            })
    }

    /// Fetch the profile row for a user, or `None` if no row matches.
    ///
    /// NULL columns come back as `None`; the distinction between "no
    /// country set" and an empty string is preserved.
    pub fn fetch_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        let conn = self.lock_conn()?;

        let row: Option<(
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            u32,
            u32,
            String,
            String,
        )> = conn
            .query_row(
                "SELECT user_id, username, password, country, gender, user_image_url,
                        playlist_count, favorite_songs_count, created_at, updated_at
                 FROM users WHERE user_id = :user_id",
                named_params! { ":user_id": user_id },
                |row| {
                    Ok((
                        row.get("user_id")?,
                        row.get("username")?,
                        row.get("password")?,
                        row.get("country")?,
                        row.get("gender")?,
                        row.get("user_image_url")?,
                        row.get("playlist_count")?,
                        row.get("favorite_songs_count")?,
                        row.get("created_at")?,
                        row.get("updated_at")?,
                    ))
                },
            )
            .optional()
            .map_err(|e| CadenceError::Database {
                message: format!("Failed to query profile: {}", e),
                source: Some(e),
            })?;

        let Some((
            user_id,
            user_name,
            credential_hash,
            country,
            gender,
            avatar_url,
            playlist_count,
            favorite_song_count,
            created_at,
            updated_at,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(ProfileRow {
            user_id,
            user_name,
            credential_hash,
            country,
            gender,
            avatar_url,
            playlist_count,
            favorite_song_count,
            created_at: Self::parse_timestamp("created_at", &created_at)?,
            updated_at: Self::parse_timestamp("updated_at", &updated_at)?,
        }))
    }

    /// Fetch the liked-song ids for a user as a set.
    ///
    /// An empty result is an empty set, not an error; duplicates collapse.
    pub fn fetch_liked_track_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        let conn = self.lock_conn()?;

        let mut stmt = conn
            .prepare("SELECT track_id FROM user_favorite_songs WHERE user_id = :user_id")
            .map_err(|e| CadenceError::Database {
                message: format!("Failed to prepare liked-songs query: {}", e),
                source: Some(e),
            })?;

        let ids = stmt
            .query_map(named_params! { ":user_id": user_id }, |row| {
                row.get::<_, String>("track_id")
            })
            .map_err(|e| CadenceError::Database {
                message: format!("Failed to query liked songs: {}", e),
                source: Some(e),
            })?
            .collect::<std::result::Result<HashSet<String>, _>>()
            .map_err(|e| CadenceError::Database {
                message: format!("Failed to read liked-song row: {}", e),
                source: Some(e),
            })?;

        Ok(ids)
    }

    /// Insert or replace a profile row.
    pub fn upsert_profile(&self, profile: &NewProfile) -> Result<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO users (user_id, username, password, country, gender, user_image_url,
                                playlist_count, favorite_songs_count, created_at, updated_at)
             VALUES (:user_id, :username, :password, :country, :gender, :user_image_url,
                     :playlist_count, :favorite_songs_count, :now, :now)
             ON CONFLICT(user_id) DO UPDATE SET
                 username = excluded.username,
                 password = excluded.password,
                 country = excluded.country,
                 gender = excluded.gender,
                 user_image_url = excluded.user_image_url,
                 playlist_count = excluded.playlist_count,
                 favorite_songs_count = excluded.favorite_songs_count,
                 updated_at = excluded.updated_at",
            named_params! {
                ":user_id": profile.user_id,
                ":username": profile.user_name,
                ":password": profile.credential_hash,
                ":country": profile.country,
                ":gender": profile.gender,
                ":user_image_url": profile.avatar_url,
                ":playlist_count": profile.playlist_count,
                ":favorite_songs_count": profile.favorite_song_count,
                ":now": now,
            },
        )
        .map_err(|e| CadenceError::Database {
            message: format!("Failed to upsert profile: {}", e),
            source: Some(e),
        })?;

        debug!("Upserted profile for user {}", profile.user_id);

        Ok(())
    }

    /// Record a liked song. Idempotent.
    pub fn add_favorite(&self, user_id: &str, track_id: &str) -> Result<()> {
        let conn = self.lock_conn()?;

        conn.execute(
            "INSERT OR IGNORE INTO user_favorite_songs (user_id, track_id)
             VALUES (:user_id, :track_id)",
            named_params! { ":user_id": user_id, ":track_id": track_id },
        )
        .map_err(|e| CadenceError::Database {
            message: format!("Failed to record liked song: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }
}
