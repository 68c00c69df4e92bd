//! Claim-or-redirect arbitration for concurrent launches.
//!
//! `Unclaimed -> Owner` when the claim insert wins; `Unclaimed ->
//! Redirecting -> Terminated` when another live process already holds the
//! key, in which case the activation payload is forwarded to it and the
//! caller is told to exit. A claim recorded for a dead PID is adopted.

use super::claims::ClaimStore;
use super::client::forward_activation;
use super::protocol::ActivationMessage;
use super::server::{ActivationHandler, ActivationServer, ActivationServerHandle};
use crate::config::CoordinatorConfig;
use crate::error::{CadenceError, Result};
use crate::platform;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Result of the arbitration: proceed as the one running copy, or hand
/// the activation to the owner and terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This process is the sole activation handler.
    Owner,
    /// Another process owns the key; the payload was forwarded to it and
    /// this process should exit before any further initialization.
    Redirected,
}

/// Coordinates exclusive ownership of a well-known instance key.
pub struct InstanceCoordinator {
    key: String,
    launch_id: String,
    claims: Option<ClaimStore>,
    server: Mutex<Option<ActivationServerHandle>>,
    owned: AtomicBool,
}

impl InstanceCoordinator {
    /// Create a coordinator using the shared claim store at the default
    /// platform location.
    ///
    /// If the store cannot be opened the coordinator fails open: the
    /// process will start as `Owner` without arbitration.
    pub fn new(key: impl Into<String>) -> Self {
        Self::from_store(key.into(), ClaimStore::open())
    }

    /// Create a coordinator over a claim store at a specific path.
    pub fn with_store_path(key: impl Into<String>, db_path: &Path) -> Self {
        Self::from_store(key.into(), ClaimStore::open_at(db_path))
    }

    fn from_store(key: String, store: Result<ClaimStore>) -> Self {
        let claims = match store {
            Ok(store) => Some(store),
            Err(e) => {
                // Fail open: logged, not surfaced
                let err = CadenceError::ClaimUnavailable {
                    message: e.to_string(),
                };
                warn!("{}; starting without single-instance arbitration", err);
                None
            }
        };

        Self {
            key,
            launch_id: uuid::Uuid::new_v4().to_string(),
            claims,
            server: Mutex::new(None),
            owned: AtomicBool::new(false),
        }
    }

    /// Launch id identifying this claim attempt.
    pub fn launch_id(&self) -> &str {
        &self.launch_id
    }

    /// True once this coordinator has won the claim.
    pub fn is_owner(&self) -> bool {
        self.owned.load(Ordering::Relaxed)
    }

    /// Decide whether this process proceeds or redirects.
    ///
    /// Exactly one of any set of concurrent claimants becomes `Owner`; it
    /// binds the activation listener, publishes its port, and dispatches
    /// every later-forwarded activation to `handler`. Losers forward
    /// `payload` to the owner and get `Redirected` back.
    ///
    /// A claim recorded for a dead PID is removed and re-contested. An
    /// owner that is alive but unreachable is treated the same way after
    /// bounded retries. If the claim store is unavailable the process
    /// starts degraded as `Owner`.
    pub async fn claim_or_redirect(
        &self,
        payload: serde_json::Value,
        handler: Arc<dyn ActivationHandler>,
    ) -> Result<ClaimOutcome> {
        let Some(claims) = &self.claims else {
            self.owned.store(true, Ordering::Relaxed);
            return Ok(ClaimOutcome::Owner);
        };

        let pid = std::process::id();

        for attempt in 0..CoordinatorConfig::CLAIM_RETRY_ATTEMPTS {
            if claims.try_claim(&self.key, pid, 0, &self.launch_id)? {
                // Owned from here on, so a failed listener start still
                // releases the claim row on drop
                self.owned.store(true, Ordering::Relaxed);

                let server = ActivationServer::start(handler.clone()).await?;
                claims.publish_port(&self.key, &self.launch_id, server.port)?;
                info!(
                    "Owning instance key '{}' (PID {}, activation port {})",
                    self.key, pid, server.port
                );

                *self
                    .server
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(server);
                return Ok(ClaimOutcome::Owner);
            }

            let Some(row) = claims.get(&self.key)? else {
                // Owner released between our insert and read; contest again
                continue;
            };

            if row.pid != pid && !platform::is_process_alive(row.pid) {
                debug!(
                    "Adopting stale claim on '{}' (dead PID {})",
                    self.key, row.pid
                );
                claims.remove_for_pid(&self.key, row.pid)?;
                continue;
            }

            if row.port == 0 {
                // Owner has claimed but not yet published its listener
                debug!(
                    "Owner of '{}' not ready (attempt {}); waiting",
                    self.key, attempt
                );
                tokio::time::sleep(CoordinatorConfig::OWNER_PUBLISH_GRACE).await;
                continue;
            }

            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, row.port));
            let message = ActivationMessage {
                launch_id: self.launch_id.clone(),
                payload: payload.clone(),
            };
            match forward_activation(addr, row.pid, &message).await {
                Ok(()) => {
                    info!(
                        "Redirected activation for '{}' to PID {} on port {}",
                        self.key, row.pid, row.port
                    );
                    return Ok(ClaimOutcome::Redirected);
                }
                Err(e) => {
                    // Live-looking owner with a dead channel: clear the row
                    // and contest the claim again
                    warn!(
                        "Owner of '{}' unreachable ({}); re-contesting claim",
                        self.key, e
                    );
                    claims.remove_for_pid(&self.key, row.pid)?;
                    continue;
                }
            }
        }

        warn!(
            "Claim arbitration for '{}' did not settle after {} attempts; starting degraded as owner",
            self.key,
            CoordinatorConfig::CLAIM_RETRY_ATTEMPTS
        );
        self.owned.store(true, Ordering::Relaxed);
        Ok(ClaimOutcome::Owner)
    }

    /// Release the claim and stop the activation listener.
    ///
    /// Best-effort; also runs on drop.
    pub fn release(&self) {
        if let Some(handle) = self
            .server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            drop(handle);
        }

        if self.owned.swap(false, Ordering::Relaxed) {
            if let Some(claims) = &self.claims {
                let _ = claims.release(&self.key, &self.launch_id);
            }
        }
    }
}

impl Drop for InstanceCoordinator {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingHandler {
        seen: StdMutex<Vec<ActivationMessage>>,
    }

    #[async_trait::async_trait]
    impl ActivationHandler for RecordingHandler {
        async fn on_activated(&self, message: ActivationMessage) {
            self.seen.lock().unwrap().push(message);
        }
    }

    fn claims_path(temp: &TempDir) -> std::path::PathBuf {
        temp.path().join("claims.db")
    }

    #[tokio::test]
    async fn test_first_launch_becomes_owner() {
        let temp = TempDir::new().unwrap();
        let coordinator = InstanceCoordinator::with_store_path("test-key", &claims_path(&temp));

        let outcome = coordinator
            .claim_or_redirect(
                serde_json::json!({}),
                Arc::new(RecordingHandler::default()),
            )
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::Owner);
        assert!(coordinator.is_owner());
    }

    #[tokio::test]
    async fn test_second_launch_redirects_and_owner_sees_payload() {
        let temp = TempDir::new().unwrap();
        let path = claims_path(&temp);

        let owner_handler = Arc::new(RecordingHandler::default());
        let owner = InstanceCoordinator::with_store_path("test-key", &path);
        let outcome = owner
            .claim_or_redirect(serde_json::json!({}), owner_handler.clone())
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Owner);

        let second = InstanceCoordinator::with_store_path("test-key", &path);
        let outcome = second
            .claim_or_redirect(
                serde_json::json!({"uri": "cadence://track/7"}),
                Arc::new(RecordingHandler::default()),
            )
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Redirected);
        assert!(!second.is_owner());

        let seen = owner_handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload["uri"], "cadence://track/7");
        assert_eq!(seen[0].launch_id, second.launch_id());
    }

    #[tokio::test]
    async fn test_stale_claim_is_adopted() {
        let temp = TempDir::new().unwrap();
        let path = claims_path(&temp);

        // Simulate a crashed owner: claim row for a dead PID
        let store = ClaimStore::open_at(&path).unwrap();
        store
            .try_claim("test-key", 999_999_999, 4321, "crashed-launch")
            .unwrap();

        let coordinator = InstanceCoordinator::with_store_path("test-key", &path);
        let outcome = coordinator
            .claim_or_redirect(
                serde_json::json!({}),
                Arc::new(RecordingHandler::default()),
            )
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::Owner);
    }

    #[tokio::test]
    async fn test_claim_store_unavailable_fails_open() {
        // Parent of the db path is a file, so the store cannot be created
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"occupied").unwrap();
        let bad_path = blocker.join("claims.db");

        let coordinator = InstanceCoordinator::with_store_path("test-key", &bad_path);
        let outcome = coordinator
            .claim_or_redirect(
                serde_json::json!({}),
                Arc::new(RecordingHandler::default()),
            )
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::Owner);
    }

    #[tokio::test]
    async fn test_release_lets_next_launch_claim() {
        let temp = TempDir::new().unwrap();
        let path = claims_path(&temp);

        let first = InstanceCoordinator::with_store_path("test-key", &path);
        first
            .claim_or_redirect(
                serde_json::json!({}),
                Arc::new(RecordingHandler::default()),
            )
            .await
            .unwrap();
        first.release();

        let second = InstanceCoordinator::with_store_path("test-key", &path);
        let outcome = second
            .claim_or_redirect(
                serde_json::json!({}),
                Arc::new(RecordingHandler::default()),
            )
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::Owner);
    }
}
