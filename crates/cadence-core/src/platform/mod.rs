//! Platform abstraction layer for cross-platform compatibility.
//!
//! Centralizes the OS-specific code this crate needs: the well-known
//! location of the shared claim database and process liveness checks.
//! All `#[cfg]` blocks for OS-specific behavior live here rather than
//! scattered throughout the codebase.

pub mod paths;
pub mod process;

pub use paths::{cadence_config_dir, claims_db_path, default_session_db_path};
pub use process::is_process_alive;

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_platform() {
        let platform = current_platform();
        assert!(["linux", "windows", "macos", "unknown"].contains(&platform));
    }
}
