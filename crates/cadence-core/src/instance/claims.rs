//! SQLite-backed claim table for single-instance arbitration.
//!
//! One row per instance key. The `INSERT OR IGNORE` on the primary key is
//! the atomic claim: of several concurrent launches, exactly one insert
//! takes effect. Ownership lapses when the recorded PID dies; the next
//! claimant removes the stale row and claims again.
//!
//! Uses WAL mode for safe concurrent access across processes and
//! `Arc<Mutex<Connection>>` for thread safety within a process.

use crate::config::CoordinatorConfig;
use crate::error::{CadenceError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A recorded instance claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRow {
    pub instance_key: String,
    pub pid: u32,
    /// Activation port; 0 until the owner has bound its listener.
    pub port: u16,
    pub launch_id: String,
    pub claimed_at: String,
}

/// Shared claim database.
pub struct ClaimStore {
    conn: Arc<Mutex<Connection>>,
}

impl ClaimStore {
    /// Open the claim store at the default platform location.
    ///
    /// Creates the database and parent directories if they don't exist.
    pub fn open() -> Result<Self> {
        let db_path = crate::platform::claims_db_path()?;
        Self::open_at(&db_path)
    }

    /// Open the claim store at a specific path.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CadenceError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;",
            CoordinatorConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS instance_claims (
                instance_key TEXT PRIMARY KEY,
                pid INTEGER NOT NULL,
                port INTEGER NOT NULL,
                launch_id TEXT NOT NULL,
                claimed_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CadenceError::Database {
            message: "Failed to acquire claims connection lock".to_string(),
            source: None,
        })
    }

    /// Attempt to claim the key. Returns `true` if this call won the claim.
    ///
    /// Atomic across processes: the primary-key insert takes effect for
    /// exactly one of any set of concurrent claimants.
    pub fn try_claim(&self, key: &str, pid: u32, port: u16, launch_id: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();

        let rows = conn.execute(
            "INSERT OR IGNORE INTO instance_claims (instance_key, pid, port, launch_id, claimed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, pid, port, launch_id, now],
        )?;

        if rows > 0 {
            debug!("Claimed instance key '{}' (PID {})", key, pid);
        }

        Ok(rows > 0)
    }

    /// Get the current claim for a key, if any.
    pub fn get(&self, key: &str) -> Result<Option<ClaimRow>> {
        let conn = self.lock_conn()?;

        let result = conn
            .query_row(
                "SELECT instance_key, pid, port, launch_id, claimed_at
                 FROM instance_claims WHERE instance_key = ?1",
                params![key],
                |row| {
                    Ok(ClaimRow {
                        instance_key: row.get(0)?,
                        pid: row.get(1)?,
                        port: row.get(2)?,
                        launch_id: row.get(3)?,
                        claimed_at: row.get(4)?,
                    })
                },
            )
            .optional()?;

        Ok(result)
    }

    /// Record the owner's activation port once its listener is bound.
    pub fn publish_port(&self, key: &str, launch_id: &str, port: u16) -> Result<bool> {
        let conn = self.lock_conn()?;

        let rows = conn.execute(
            "UPDATE instance_claims SET port = ?1
             WHERE instance_key = ?2 AND launch_id = ?3",
            params![port, key, launch_id],
        )?;

        Ok(rows > 0)
    }

    /// Release a claim held by this launch. Returns `true` if a row was removed.
    pub fn release(&self, key: &str, launch_id: &str) -> Result<bool> {
        let conn = self.lock_conn()?;

        let rows = conn.execute(
            "DELETE FROM instance_claims WHERE instance_key = ?1 AND launch_id = ?2",
            params![key, launch_id],
        )?;

        if rows > 0 {
            debug!("Released instance key '{}'", key);
        }

        Ok(rows > 0)
    }

    /// Remove a claim recorded for a specific PID (stale-owner adoption).
    ///
    /// Scoped to the observed PID so a concurrent adopter that already
    /// re-claimed the key is not knocked out by a second deleter.
    pub fn remove_for_pid(&self, key: &str, pid: u32) -> Result<bool> {
        let conn = self.lock_conn()?;

        let rows = conn.execute(
            "DELETE FROM instance_claims WHERE instance_key = ?1 AND pid = ?2",
            params![key, pid],
        )?;

        if rows > 0 {
            debug!("Removed claim on '{}' recorded for PID {}", key, pid);
        }

        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (ClaimStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test-claims.db");
        let store = ClaimStore::open_at(&db_path).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_first_claim_wins() {
        let (store, _temp) = create_test_store();

        assert!(store.try_claim("cadence-main", 100, 0, "launch-a").unwrap());
        assert!(!store.try_claim("cadence-main", 200, 0, "launch-b").unwrap());

        let row = store.get("cadence-main").unwrap().unwrap();
        assert_eq!(row.pid, 100);
        assert_eq!(row.launch_id, "launch-a");
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let (store, _temp) = create_test_store();

        assert!(store.try_claim("key-a", 100, 0, "a").unwrap());
        assert!(store.try_claim("key-b", 200, 0, "b").unwrap());
    }

    #[test]
    fn test_publish_port_updates_row() {
        let (store, _temp) = create_test_store();

        store.try_claim("cadence-main", 100, 0, "launch-a").unwrap();
        assert!(store.publish_port("cadence-main", "launch-a", 43210).unwrap());

        let row = store.get("cadence-main").unwrap().unwrap();
        assert_eq!(row.port, 43210);
    }

    #[test]
    fn test_publish_port_ignores_foreign_launch() {
        let (store, _temp) = create_test_store();

        store.try_claim("cadence-main", 100, 0, "launch-a").unwrap();
        assert!(!store.publish_port("cadence-main", "launch-b", 43210).unwrap());

        let row = store.get("cadence-main").unwrap().unwrap();
        assert_eq!(row.port, 0);
    }

    #[test]
    fn test_release_scoped_to_launch_id() {
        let (store, _temp) = create_test_store();

        store.try_claim("cadence-main", 100, 0, "launch-a").unwrap();

        assert!(!store.release("cadence-main", "launch-b").unwrap());
        assert!(store.get("cadence-main").unwrap().is_some());

        assert!(store.release("cadence-main", "launch-a").unwrap());
        assert!(store.get("cadence-main").unwrap().is_none());
    }

    #[test]
    fn test_stale_claim_can_be_adopted() {
        let (store, _temp) = create_test_store();

        // Claim recorded for a PID that almost certainly doesn't exist
        store
            .try_claim("cadence-main", 999_999_999, 4321, "dead-launch")
            .unwrap();

        assert!(store.remove_for_pid("cadence-main", 999_999_999).unwrap());
        assert!(store.try_claim("cadence-main", 100, 0, "launch-a").unwrap());
    }

    #[test]
    fn test_two_stores_same_db_concurrent_access() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("shared-claims.db");

        let store1 = ClaimStore::open_at(&db_path).unwrap();
        let store2 = ClaimStore::open_at(&db_path).unwrap();

        assert!(store1.try_claim("cadence-main", 100, 0, "a").unwrap());
        assert!(!store2.try_claim("cadence-main", 200, 0, "b").unwrap());

        let seen = store2.get("cadence-main").unwrap().unwrap();
        assert_eq!(seen.pid, 100);
    }
}
