//! Process-wide failure boundary.
//!
//! Installed once at bootstrap: panics and otherwise-unanticipated errors
//! are recorded with their backtrace and surfaced as a user-visible notice
//! through the notification capability instead of taking the process down
//! silently. Failures while presenting the notice are logged and dropped;
//! the boundary itself never propagates.

use crate::config::AppConfig;
use crate::notify::Notifier;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use tracing::{error, warn};

static HOOK_INSTALLED: Once = Once::new();

/// Backstop for errors nothing else handled.
pub struct FailureBoundary {
    notifier: Notifier,
}

impl FailureBoundary {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }

    /// Install the process panic hook.
    ///
    /// Effective once per process; later calls are no-ops. Panics raised in
    /// spawned tasks and threads are recorded and surfaced while the
    /// process keeps running. The hook only logs notice-delivery failures;
    /// it must not raise.
    pub fn install(&self) {
        let notifier = self.notifier.clone();
        let mut installed = false;

        HOOK_INSTALLED.call_once(|| {
            installed = true;
            std::panic::set_hook(Box::new(move |info| {
                let message = panic_message(info);
                let location = info
                    .location()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unknown location".to_string());
                let backtrace = Backtrace::force_capture();

                error!(
                    "Unhandled panic at {}: {}\n{}",
                    location, message, backtrace
                );

                if let Err(e) = notifier.show(&format!(
                    "{} hit an unexpected error: {}",
                    AppConfig::APP_NAME,
                    message
                )) {
                    error!("Failed to present crash notice: {}", e);
                }
            }));
        });

        if !installed {
            warn!("Failure boundary already installed; ignoring");
        }
    }

    /// Record and surface an error that reached the top level.
    ///
    /// The diagnostic record keeps the full error chain; the notice shows
    /// the headline message. Never propagates, even if the notifier fails
    /// or panics.
    pub fn report(&self, error: anyhow::Error) {
        error!("Unhandled error: {:#}", error);

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.notifier.show(&format!(
                "{} hit an unexpected error: {}",
                AppConfig::APP_NAME,
                error
            ))
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to present error notice: {}", e),
            Err(_) => error!("Error notice presentation panicked; suppressed"),
        }
    }
}

fn panic_message(info: &std::panic::PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CadenceError, Result};
    use crate::notify::NotificationService;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingNotifier {
        shown: Mutex<Vec<String>>,
    }

    impl NotificationService for RecordingNotifier {
        fn initialize(&self) -> Result<()> {
            Ok(())
        }

        fn show(&self, message: &str) -> Result<()> {
            self.shown.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct FailingNotifier {
        attempts: AtomicUsize,
    }

    impl NotificationService for FailingNotifier {
        fn initialize(&self) -> Result<()> {
            Ok(())
        }

        fn show(&self, _message: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(CadenceError::Other("toast channel closed".to_string()))
        }
    }

    struct PanickingNotifier;

    impl NotificationService for PanickingNotifier {
        fn initialize(&self) -> Result<()> {
            Ok(())
        }

        fn show(&self, _message: &str) -> Result<()> {
            panic!("presentation layer exploded");
        }
    }

    #[test]
    fn test_report_surfaces_notice() {
        let notifier = Arc::new(RecordingNotifier::default());
        let boundary = FailureBoundary::new(notifier.clone());

        boundary.report(anyhow::anyhow!("query planner ate the index"));

        let shown = notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert!(shown[0].contains("query planner ate the index"));
    }

    #[test]
    fn test_report_swallows_notifier_error() {
        let notifier = Arc::new(FailingNotifier {
            attempts: AtomicUsize::new(0),
        });
        let boundary = FailureBoundary::new(notifier.clone());

        // Must not propagate
        boundary.report(anyhow::anyhow!("boom"));

        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_report_swallows_notifier_panic() {
        let boundary = FailureBoundary::new(Arc::new(PanickingNotifier));

        // Must not propagate the notifier's panic
        boundary.report(anyhow::anyhow!("boom"));
    }

    #[test]
    fn test_panic_hook_records_and_continues() {
        let notifier = Arc::new(RecordingNotifier::default());
        let boundary = FailureBoundary::new(notifier.clone());
        boundary.install();
        // Second install is a no-op, not an error
        boundary.install();

        let handle = std::thread::spawn(|| {
            panic!("worker thread fell over");
        });
        assert!(handle.join().is_err());

        let shown = notifier.shown.lock().unwrap();
        assert!(shown.iter().any(|m| m.contains("worker thread fell over")));
    }
}
