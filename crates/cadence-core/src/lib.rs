//! Cadence Core - Bootstrap and session layer for the Cadence desktop app.
//!
//! This crate wires the long-lived services of the application together:
//! it arbitrates which of several concurrently launched copies becomes the
//! active instance, owns the capability registry the presentation layer
//! resolves services from, loads the authenticated user's session from the
//! relational store, and installs the process-wide failure boundary.
//! Rendering, navigation, and theming live in the hosting application.
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence_core::{BootstrapOptions, BootstrapOutcome, CadenceApp};
//!
//! #[tokio::main]
//! async fn main() -> cadence_core::Result<()> {
//!     let options = BootstrapOptions::new("./data/cadence.sqlite");
//!     let app = match CadenceApp::bootstrap(options).await? {
//!         BootstrapOutcome::Launched(app) => app,
//!         // Another copy is already running and received our activation
//!         BootstrapOutcome::Redirected => return Ok(()),
//!     };
//!
//!     app.set_activation_callback(|_activation| {
//!         // bring the main window to the foreground
//!     });
//!     app.on_launched().await?;
//!
//!     // after authentication:
//!     let session = app.load_session("u1").await?;
//!     println!("hello {}", session.user_name);
//!
//!     Ok(())
//! }
//! ```

pub mod boundary;
pub mod config;
pub mod error;
pub mod instance;
pub mod notify;
pub mod platform;
pub mod services;
pub mod session;

// Re-export commonly used types
pub use boundary::FailureBoundary;
pub use config::AppConfig;
pub use error::{CadenceError, Result};
pub use instance::{ActivationMessage, ClaimOutcome, InstanceCoordinator};
pub use notify::{NotificationService, Notifier, TracingNotifier};
pub use services::{Lifetime, ServiceContainer};
pub use session::{Session, SessionManager, SessionStore};

use instance::ActivationHandler;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Callback invoked for every activation redirected to this instance.
///
/// The presentation collaborator registers its bring-to-front hook here.
pub type ActivationCallback = Box<dyn Fn(ActivationMessage) + Send + Sync>;

/// Routes received activations to the registered callback.
///
/// The activation listener starts before the presentation layer exists, so
/// the callback slot is filled later; activations arriving before that are
/// logged and dropped.
#[derive(Default)]
struct ActivationRelay {
    callback: RwLock<Option<ActivationCallback>>,
}

impl ActivationRelay {
    fn set_callback(&self, callback: ActivationCallback) {
        if let Ok(mut slot) = self.callback.write() {
            *slot = Some(callback);
        }
    }
}

#[async_trait::async_trait]
impl ActivationHandler for ActivationRelay {
    async fn on_activated(&self, message: ActivationMessage) {
        match self.callback.read() {
            Ok(slot) => match slot.as_ref() {
                Some(callback) => callback(message),
                None => debug!(
                    "Activation from launch {} received before a callback was registered",
                    message.launch_id
                ),
            },
            Err(_) => debug!("Activation callback slot poisoned; dropping activation"),
        }
    }
}

/// Bootstrap inputs.
pub struct BootstrapOptions {
    /// Coordination key identifying "the one running copy".
    pub instance_key: String,
    /// Path of the session database.
    pub session_db_path: PathBuf,
    /// Claim database override; defaults to the shared platform location.
    pub claims_db_path: Option<PathBuf>,
    /// Host-supplied activation arguments for this launch, forwarded to
    /// the owner if this launch redirects.
    pub activation_payload: serde_json::Value,
    /// Notification backend; defaults to [`TracingNotifier`].
    pub notifier: Option<Notifier>,
}

impl BootstrapOptions {
    pub fn new(session_db_path: impl Into<PathBuf>) -> Self {
        Self {
            instance_key: AppConfig::INSTANCE_KEY.to_string(),
            session_db_path: session_db_path.into(),
            claims_db_path: None,
            activation_payload: serde_json::Value::Null,
            notifier: None,
        }
    }

    /// Options with the session database at its default platform location.
    pub fn with_default_paths() -> Result<Self> {
        Ok(Self::new(platform::default_session_db_path()?))
    }
}

/// How the bootstrap ended.
pub enum BootstrapOutcome {
    /// This process owns the instance key and is fully initialized.
    Launched(CadenceApp),
    /// Another process owns the key; the activation payload was forwarded
    /// to it and this process should exit now.
    Redirected,
}

/// The bootstrapped application core.
///
/// Owns the capability registry, the instance claim, and the failure
/// boundary. The presentation layer resolves services through
/// [`container`](Self::container) and drives sessions through
/// [`load_session`](Self::load_session).
pub struct CadenceApp {
    container: Arc<ServiceContainer>,
    coordinator: InstanceCoordinator,
    relay: Arc<ActivationRelay>,
    boundary: FailureBoundary,
}

impl CadenceApp {
    /// Run the bootstrap sequence.
    ///
    /// Order matters: the redirect decision comes first, so a redirected
    /// process exits before registry construction has any externally
    /// visible effect. Owners then build the registry, register the core
    /// capabilities, initialize the notification channel, and install the
    /// failure boundary.
    pub async fn bootstrap(options: BootstrapOptions) -> Result<BootstrapOutcome> {
        debug!(
            "Bootstrapping {} on {} (instance key '{}')",
            AppConfig::APP_NAME,
            platform::current_platform(),
            options.instance_key
        );

        let coordinator = match &options.claims_db_path {
            Some(path) => InstanceCoordinator::with_store_path(options.instance_key.clone(), path),
            None => InstanceCoordinator::new(options.instance_key.clone()),
        };

        let relay = Arc::new(ActivationRelay::default());
        let outcome = coordinator
            .claim_or_redirect(options.activation_payload.clone(), relay.clone())
            .await?;
        if outcome == ClaimOutcome::Redirected {
            return Ok(BootstrapOutcome::Redirected);
        }

        let container = Arc::new(ServiceContainer::new());

        let notifier: Notifier = options
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier::new()));
        container.register::<Notifier, _>(Lifetime::Singleton, move |_| Ok(notifier.clone()))?;

        let db_path = options.session_db_path.clone();
        container.register::<SessionStore, _>(Lifetime::Singleton, move |_| {
            SessionStore::open(&db_path).map_err(Into::into)
        })?;

        // First resolution opens the database connection once for the
        // process; the manager shares that instance.
        let store = container.resolve::<SessionStore>().await?;
        container.register::<SessionManager, _>(Lifetime::Singleton, move |_| {
            Ok(SessionManager::new(store.clone()))
        })?;

        let notifier = container.resolve::<Notifier>().await?;
        notifier.initialize()?;

        let boundary = FailureBoundary::new((*notifier).clone());
        boundary.install();

        Ok(BootstrapOutcome::Launched(CadenceApp {
            container,
            coordinator,
            relay,
            boundary,
        }))
    }

    /// The capability registry.
    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    /// True if this process holds the instance claim.
    pub fn is_owner(&self) -> bool {
        self.coordinator.is_owner()
    }

    /// Register the hook invoked when another launch redirects to us.
    pub fn set_activation_callback<F>(&self, callback: F)
    where
        F: Fn(ActivationMessage) + Send + Sync + 'static,
    {
        self.relay.set_callback(Box::new(callback));
    }

    /// Launch-time hook: present the pending startup notice.
    pub async fn on_launched(&self) -> Result<()> {
        let notifier = self.container.resolve::<Notifier>().await?;
        notifier.show(AppConfig::LAUNCH_NOTICE)?;
        Ok(())
    }

    /// Load a user's session and make it current.
    pub async fn load_session(&self, user_id: &str) -> Result<Arc<Session>> {
        let manager = self.container.resolve::<SessionManager>().await?;
        manager.load_session(user_id).await
    }

    /// The current session, if a load has completed.
    pub async fn current_session(&self) -> Result<Option<Arc<Session>>> {
        let manager = self.container.resolve::<SessionManager>().await?;
        Ok(manager.current_session())
    }

    /// Route an error nothing else handled through the failure boundary.
    pub fn report_failure(&self, error: anyhow::Error) {
        self.boundary.report(error);
    }

    /// Release the instance claim and stop the activation listener.
    ///
    /// Also runs on drop.
    pub fn shutdown(&self) {
        self.coordinator.release();
    }
}
