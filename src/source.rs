//! Procfs counter sources, resolved relative to a configurable root.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SysloadError;

/// Default procfs mount point.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// The four counter sources the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcSource {
    DiskStats,
    CpuInfo,
    Interrupts,
    Stat,
}

impl ProcSource {
    pub const ALL: [ProcSource; 4] = [
        ProcSource::DiskStats,
        ProcSource::CpuInfo,
        ProcSource::Interrupts,
        ProcSource::Stat,
    ];

    /// File name below the proc root.
    pub fn file_name(self) -> &'static str {
        match self {
            ProcSource::DiskStats => "diskstats",
            ProcSource::CpuInfo => "cpuinfo",
            ProcSource::Interrupts => "interrupts",
            ProcSource::Stat => "stat",
        }
    }

    pub fn path(self, root: &Path) -> PathBuf {
        root.join(self.file_name())
    }

    /// Reads the whole source. Files are opened fresh on every call.
    pub fn read(self, root: &Path) -> Result<String, SysloadError> {
        let path = self.path(root);
        fs::read_to_string(&path).map_err(|source| SysloadError::SourceRead { path, source })
    }
}

impl fmt::Display for ProcSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}
