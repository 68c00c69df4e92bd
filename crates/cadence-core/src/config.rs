//! Centralized configuration for Cadence Core.
//!
//! Configuration constants for the application identity, single-instance
//! coordination, the session database, and shared paths.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Cadence";
    /// Well-known coordination key identifying "the one running copy".
    pub const INSTANCE_KEY: &'static str = "cadence-main";
    /// Notice shown through the notification capability on launch.
    pub const LAUNCH_NOTICE: &'static str = "Cadence is up and running";
}

/// Single-instance coordination configuration.
pub struct CoordinatorConfig;

impl CoordinatorConfig {
    /// SQLite busy timeout for the shared claim database.
    pub const BUSY_TIMEOUT_MS: u64 = 5_000;
    /// Attempts of the claim/adopt/redirect loop before failing open.
    pub const CLAIM_RETRY_ATTEMPTS: u32 = 5;
    /// Grace period for an owner that has claimed but not yet published
    /// its activation port.
    pub const OWNER_PUBLISH_GRACE: Duration = Duration::from_millis(100);
    /// Timeout for connecting to the owner's activation listener.
    pub const ACTIVATION_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
    /// Timeout for the owner's acknowledgment of a forwarded activation.
    pub const ACTIVATION_ACK_TIMEOUT: Duration = Duration::from_secs(3);
    /// Upper bound on a single activation frame.
    pub const MAX_ACTIVATION_MESSAGE_SIZE: usize = 64 * 1024;
    /// Upper bound on concurrently served activation connections.
    pub const MAX_ACTIVATION_CONNECTIONS: usize = 8;
}

/// Session database configuration.
pub struct DatabaseConfig;

impl DatabaseConfig {
    pub const SESSION_DB_FILENAME: &'static str = "cadence.sqlite";
}

/// Shared directory and file name configuration.
pub struct PathsConfig;

impl PathsConfig {
    /// Directory name under the platform config dir for cross-process state.
    pub const APP_CONFIG_DIR_NAME: &'static str = "cadence";
    /// File name of the shared instance-claim database.
    pub const CLAIMS_DB_FILENAME: &'static str = "instances.db";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(CoordinatorConfig::ACTIVATION_CONNECT_TIMEOUT > Duration::ZERO);
        assert!(CoordinatorConfig::ACTIVATION_ACK_TIMEOUT > Duration::ZERO);
        assert!(CoordinatorConfig::CLAIM_RETRY_ATTEMPTS >= 1);
    }

    #[test]
    fn test_frame_bound_is_nonzero() {
        assert!(CoordinatorConfig::MAX_ACTIVATION_MESSAGE_SIZE > 0);
    }
}
