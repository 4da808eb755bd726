//! Building the two sides of a sync.
//!
//! The source is always walked and hashed. The destination is rebuilt from its
//! persisted index when one is present and readable, otherwise walked and hashed
//! the same way as the source.

pub mod walk;

use glob::Pattern;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audit::AUDIT_FILE_NAME;
use crate::config::DEFAULT_LEFTOVER_FOLDER;
use crate::error::Error;
use crate::index::DestinationIndex;
use crate::index_file::{self, INDEX_FILE_NAME};
use crate::progress::ProgressReporter;
pub use walk::{scan_tree, TreeScan};

/// Which strategy produced the destination index. Resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    Persisted { path: PathBuf, skipped_lines: usize },
    FreshScan,
}

impl fmt::Display for IndexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexSource::Persisted { path, .. } => write!(f, "index file {}", path.display()),
            IndexSource::FreshScan => write!(f, "fresh scan"),
        }
    }
}

/// What a tree walk leaves out.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    ignore_patterns: Vec<Pattern>,
    reserved_names: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new(&[], DEFAULT_LEFTOVER_FOLDER)
    }
}

impl ScanOptions {
    /// Invalid glob patterns are logged and dropped.
    pub fn new(ignore_globs: &[String], leftover_folder: &str) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            ignore_patterns,
            reserved_names: vec![
                INDEX_FILE_NAME.to_string(),
                AUDIT_FILE_NAME.to_string(),
                leftover_folder.to_string(),
            ],
        }
    }

    /// Reserved names only apply directly below the root; the root itself is never excluded.
    pub fn is_excluded(&self, depth: usize, path: &Path) -> bool {
        if depth == 0 {
            return false;
        }

        if depth == 1 {
            let reserved = path
                .file_name()
                .map(|name| {
                    self.reserved_names.iter().any(|r| name == r.as_str())
                        || name.to_str().map_or(false, index_file::is_temp_file_name)
                })
                .unwrap_or(false);
            if reserved {
                return true;
            }
        }

        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}

/// Walk and hash the source tree. Names that cannot be indexed come back in
/// `rejected` for the caller to report.
pub fn scan_source(
    root: &Path,
    options: &ScanOptions,
    reporter: &dyn ProgressReporter,
) -> Result<TreeScan, Error> {
    let start = Instant::now();
    let scan = walk::scan_tree(root, options, reporter).map_err(|e| Error::SourceUnavailable {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(
        "Source scan completed in {:.2}s: {} files in {} directories",
        start.elapsed().as_secs_f64(),
        scan.files.len(),
        scan.directories.len(),
    );
    Ok(scan)
}

/// Build the destination index, preferring the persisted index file.
pub fn build_destination_index(
    root: &Path,
    options: &ScanOptions,
    reporter: &dyn ProgressReporter,
) -> Result<(DestinationIndex, IndexSource), Error> {
    let path = index_file::index_path(root);

    match load_persisted(&path) {
        Some((index, skipped_lines)) => {
            info!(
                "Loaded {} directories, {} files from {}",
                index.len(),
                index.file_count(),
                path.display()
            );
            Ok((index, IndexSource::Persisted { path, skipped_lines }))
        }
        None => {
            info!("No usable index in {}, scanning destination", root.display());
            let index = scan_destination(root, options, reporter)?;
            Ok((index, IndexSource::FreshScan))
        }
    }
}

fn load_persisted(path: &Path) -> Option<(DestinationIndex, usize)> {
    if !path.is_file() {
        return None;
    }

    match index_file::read_index(path) {
        Ok(persisted) if persisted.is_usable() => {
            if let Some(header) = &persisted.header {
                debug!("Index written by {} {} for {}", header.tool, header.version, header.root);
            }
            if persisted.skipped_lines > 0 {
                debug!("Skipped {} malformed index lines", persisted.skipped_lines);
            }
            Some((persisted.index, persisted.skipped_lines))
        }
        Ok(_) => {
            warn!("Index file {} holds no entries, ignoring it", path.display());
            None
        }
        Err(e) => {
            warn!("Unable to read index file {}: {}", path.display(), e);
            None
        }
    }
}

/// Destination index from a walk: every directory becomes an entry and every
/// readable file a `NotFound` identifier.
pub fn scan_destination(
    root: &Path,
    options: &ScanOptions,
    reporter: &dyn ProgressReporter,
) -> Result<DestinationIndex, Error> {
    let scan = walk::scan_tree(root, options, reporter).map_err(|e| {
        Error::DestinationUnavailable {
            path: root.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    Ok(index_from_scan(scan))
}

pub fn index_from_scan(scan: TreeScan) -> DestinationIndex {
    let mut index = DestinationIndex::new();

    for path in &scan.rejected {
        warn!(
            "Destination entry {} cannot be indexed and will be left alone",
            path.display()
        );
    }

    for key in scan.directories {
        index.entry_or_insert(key);
    }

    for file in scan.files {
        match file.unique_id() {
            Some(id) => index.entry_or_insert(file.dir_key.clone()).insert(id),
            None => warn!(
                "Destination file {} is unreadable and will not be indexed",
                file.path.display()
            ),
        }
    }

    index
}
