use std::path::{Path, PathBuf};

use crate::hasher::Checksum;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Source directory {} is not accessible: {reason}", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Destination directory {} is not accessible: {reason}", .path.display())]
    DestinationUnavailable { path: PathBuf, reason: String },

    #[error("Source {} and destination {} overlap", .source_root.display(), .destination.display())]
    OverlappingRoots {
        source_root: PathBuf,
        destination: PathBuf,
    },

    #[error("Index file {} could not be written: {error}", .path.display())]
    Index {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Per-file problem met during a run. Reported, never fatal.
#[derive(Error, Debug)]
pub enum SyncIssue {
    #[error("Did not copy \"{}\": checksum could not be computed", .path.display())]
    ChecksumUnavailable { path: PathBuf },

    #[error("Did not copy \"{}\": its name cannot be stored in the index", .path.display())]
    UnsupportedName { path: PathBuf },

    #[error("Unable to copy file {}: {error}", .path.display())]
    CopyFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("CRC MISMATCH for file {}: expected {expected}, found {}", .path.display(), describe(.actual))]
    CrcMismatch {
        path: PathBuf,
        expected: Checksum,
        actual: Option<Checksum>,
    },

    #[error("Unable to archive file {}: {error}", .path.display())]
    ArchiveFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("CRC MISMATCH archiving file {}: original {}, archived copy {}", .path.display(), describe(.original), describe(.archived))]
    ArchiveMismatch {
        path: PathBuf,
        original: Option<Checksum>,
        archived: Option<Checksum>,
    },

    #[error("Unable to remove archived file {}: {error}", .path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

impl SyncIssue {
    pub fn path(&self) -> &Path {
        match self {
            SyncIssue::ChecksumUnavailable { path }
            | SyncIssue::UnsupportedName { path }
            | SyncIssue::CopyFailed { path, .. }
            | SyncIssue::CrcMismatch { path, .. }
            | SyncIssue::ArchiveFailed { path, .. }
            | SyncIssue::ArchiveMismatch { path, .. }
            | SyncIssue::DeleteFailed { path, .. } => path,
        }
    }

    /// Integrity problems: the content could not be verified.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            SyncIssue::ChecksumUnavailable { .. }
                | SyncIssue::CrcMismatch { .. }
                | SyncIssue::ArchiveMismatch { .. }
        )
    }
}

fn describe(checksum: &Option<Checksum>) -> String {
    checksum
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unreadable".to_string())
}
