//! Error types for the sysload engine.
//!
//! Startup failures (`StartupIo`, `Config`) are fatal and abort the process
//! before the sampling loop begins. `SourceRead` is the steady-state variant:
//! it is reported per tick and never stops the loop.

use std::path::PathBuf;

/// Errors produced while discovering topology or sampling counters.
#[derive(Debug, thiserror::Error)]
pub enum SysloadError {
    /// A required counter source could not be read during discovery or priming.
    #[error("failed to read {}: {source}", path.display())]
    StartupIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A counter source could not be read during a regular tick.
    #[error("failed to read {} during tick: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid configuration (refresh interval, threshold, device lists, patterns).
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SysloadError {
    /// Path of the counter source involved, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            SysloadError::StartupIo { path, .. } | SysloadError::SourceRead { path, .. } => {
                Some(path.as_path())
            }
            SysloadError::Config(_) => None,
        }
    }

    /// Converts a steady-state read error into its fatal startup form.
    pub fn into_startup(self) -> Self {
        match self {
            SysloadError::SourceRead { path, source } => SysloadError::StartupIo { path, source },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_startup_keeps_path() {
        let err = SysloadError::SourceRead {
            path: PathBuf::from("/proc/stat"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let startup = err.into_startup();
        assert!(matches!(startup, SysloadError::StartupIo { .. }));
        assert_eq!(startup.path(), Some(std::path::Path::new("/proc/stat")));
    }

    #[test]
    fn test_config_error_message() {
        let err = SysloadError::Config("refresh_interval must be 1..=30".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: refresh_interval must be 1..=30"
        );
        assert!(err.path().is_none());
    }
}
