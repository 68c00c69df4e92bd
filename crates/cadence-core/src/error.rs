//! Error types for Cadence Core.
//!
//! One enum covers the whole crate: capability registry failures,
//! single-instance coordination, session loading, and the ambient
//! database/IO/serialization errors underneath them.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Cadence core.
#[derive(Debug, Error)]
pub enum CadenceError {
    // Capability registry errors
    #[error("Capability already registered: {capability}")]
    DuplicateRegistration { capability: &'static str },

    #[error("Capability not registered: {capability}")]
    UnregisteredCapability { capability: String },

    #[error("Capability mismatch: registered value does not satisfy {expected}")]
    CapabilityMismatch { expected: &'static str },

    #[error("Capability construction failed for {capability}: {message}")]
    ConstructionFailed {
        capability: &'static str,
        message: String,
    },

    // Single-instance coordination errors
    #[error("Instance claim store unavailable: {message}")]
    ClaimUnavailable { message: String },

    #[error("Owner instance unreachable (PID {pid} on port {port})")]
    OwnerUnreachable { pid: u32, port: u16 },

    // Session loading errors
    #[error("No profile found for user: {user_id}")]
    UserNotFound { user_id: String },

    #[error("Session load failed: {message}")]
    SessionLoadFailed {
        message: String,
        #[source]
        source: Option<Box<CadenceError>>,
    },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;

// Conversion implementations for common error types

impl From<std::io::Error> for CadenceError {
    fn from(err: std::io::Error) -> Self {
        CadenceError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CadenceError {
    fn from(err: serde_json::Error) -> Self {
        CadenceError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for CadenceError {
    fn from(err: rusqlite::Error) -> Self {
        CadenceError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl CadenceError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CadenceError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Wrap an underlying failure as a session-load failure.
    pub fn session_load(message: impl Into<String>, source: CadenceError) -> Self {
        CadenceError::SessionLoadFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True for errors the caller can surface to the user and retry
    /// (as opposed to programming errors like a duplicate registration).
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            CadenceError::UserNotFound { .. } | CadenceError::SessionLoadFailed { .. }
        )
    }
}
