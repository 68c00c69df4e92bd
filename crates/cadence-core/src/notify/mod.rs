//! Notification capability.
//!
//! The core calls `initialize` once at bootstrap and `show` whenever a
//! user-visible notice is due; delivery mechanics (toasts, dialogs) belong
//! to the hosting presentation layer, which supplies its own implementation.

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Contract for the notification collaborator.
pub trait NotificationService: Send + Sync {
    /// One-time channel setup. Idempotent.
    fn initialize(&self) -> Result<()>;

    /// Present a user-visible notice.
    fn show(&self, message: &str) -> Result<()>;
}

/// Shared handle to the registered notification capability.
pub type Notifier = Arc<dyn NotificationService>;

/// Notification backend that writes notices to the log.
///
/// Used headless and in tests; desktop hosts register their own backend.
#[derive(Default)]
pub struct TracingNotifier {
    initialized: AtomicBool,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }
}

impl NotificationService for TracingNotifier {
    fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::Relaxed) {
            debug!("notification channel already initialized");
        } else {
            debug!("notification channel initialized");
        }
        Ok(())
    }

    fn show(&self, message: &str) -> Result<()> {
        info!(target: "cadence::notify", "{}", message);
        Ok(())
    }
}
