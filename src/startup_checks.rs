//! Startup requirement validation for sysload-exporter.
//!
//! Verifies that every counter source can be read below the configured
//! proc root before discovery runs.

use std::path::{Path, PathBuf};
use sysload_exporter::source::ProcSource;
use tracing::{error, info};

/// Result of probing one counter source.
#[derive(Debug)]
pub struct SourceCheck {
    pub source: ProcSource,
    pub path: PathBuf,
    /// Number of lines read, or the reason the source is unusable.
    pub result: Result<usize, String>,
}

impl SourceCheck {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Reads every source once and reports the outcome per source.
pub fn check_sources(proc_root: &Path) -> Vec<SourceCheck> {
    ProcSource::ALL
        .iter()
        .map(|&source| {
            let result = match source.read(proc_root) {
                Ok(text) if text.trim().is_empty() => Err("source is empty".to_string()),
                Ok(text) => Ok(text.lines().count()),
                Err(e) => Err(e.to_string()),
            };
            SourceCheck {
                source,
                path: source.path(proc_root),
                result,
            }
        })
        .collect()
}

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    if !proc_root.is_dir() {
        error!("❌ Proc root {} is not a directory", proc_root.display());
        return Err(ValidationError::ProcRootMissing(proc_root.to_path_buf()));
    }

    for check in check_sources(proc_root) {
        match check.result {
            Ok(lines) => info!("✅ {} readable ({} lines)", check.path.display(), lines),
            Err(reason) => {
                error!("❌ Cannot use {}: {}", check.path.display(), reason);
                return Err(ValidationError::SourceUnusable {
                    path: check.path,
                    reason,
                });
            }
        }
    }

    info!("✅ All runtime requirements validated");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Proc root not found: {0}")]
    ProcRootMissing(PathBuf),

    #[error("Counter source {path} unusable: {reason}")]
    SourceUnusable { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_validate_requirements_reports_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        for source in ["diskstats", "cpuinfo", "interrupts"] {
            fs::write(dir.path().join(source), "x\n").unwrap();
        }

        let err = validate_requirements(dir.path()).unwrap_err();
        assert!(matches!(err, ValidationError::SourceUnusable { ref path, .. } if path.ends_with("stat")));

        fs::write(dir.path().join("stat"), "cpu 1 2 3 4 5 6 7\n").unwrap();
        assert!(validate_requirements(dir.path()).is_ok());
    }

    #[test]
    fn test_empty_source_is_unusable() {
        let dir = tempfile::tempdir().unwrap();
        for source in ["diskstats", "cpuinfo", "interrupts", "stat"] {
            fs::write(dir.path().join(source), "").unwrap();
        }
        let checks = check_sources(dir.path());
        assert_eq!(checks.len(), 4);
        assert!(checks.iter().all(|c| !c.is_ok()));
    }

    #[test]
    fn test_missing_root() {
        let result = validate_requirements(Path::new("/nonexistent/proc/root"));
        assert!(matches!(result, Err(ValidationError::ProcRootMissing(_))));
    }
}
