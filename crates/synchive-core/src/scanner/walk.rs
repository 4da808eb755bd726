use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::ScanOptions;
use crate::hasher::{self, DirKey, IdentityParseError};
use crate::model::FileRecord;
use crate::progress::ProgressReporter;

/// Result of walking one tree: files in walk order plus every directory seen.
#[derive(Debug, Default)]
pub struct TreeScan {
    pub files: Vec<FileRecord>,
    pub directories: Vec<DirKey>,
    /// Files and directories whose names cannot be stored in the index. A
    /// rejected directory is not descended into.
    pub rejected: Vec<PathBuf>,
}

struct PendingFile {
    path: PathBuf,
    relative_path: PathBuf,
    file_name: String,
    dir_key: DirKey,
}

/// Walk `root` and checksum every regular file.
///
/// Entries are visited sorted by name and symlinks are not followed, so the
/// order is stable between runs and a link cycle cannot recurse. Hashing runs
/// on the rayon pool; results keep the walk order. A file that cannot be read
/// is still returned, with no checksum.
pub fn scan_tree(
    root: &Path,
    options: &ScanOptions,
    reporter: &dyn ProgressReporter,
) -> io::Result<TreeScan> {
    let mut directories = Vec::new();
    let mut pending = Vec::new();
    let mut rejected = Vec::new();

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !options.is_excluded(entry.depth(), entry.path()));

    while let Some(entry_result) = walker.next() {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(io::Error::new(
                    err.io_error().map(io::Error::kind).unwrap_or(io::ErrorKind::Other),
                    format!("Error reading directory {}: {}", root.display(), err),
                ));
            }
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            match DirKey::from_relative(relative_to(root, entry.path())) {
                Ok(key) => directories.push(key),
                Err(e) => {
                    warn!("Skipping directory {}: {}", entry.path().display(), e);
                    rejected.push(entry.path().to_path_buf());
                    walker.skip_current_dir();
                }
            }
        } else if file_type.is_file() {
            match pending_file(root, &entry) {
                Ok(file) => pending.push(file),
                Err(e) => {
                    warn!("Skipping file {}: {}", entry.path().display(), e);
                    rejected.push(entry.path().to_path_buf());
                }
            }
        } else {
            debug!("Skipping non-regular file {}", entry.path().display());
        }
    }

    let files = hash_files(pending, reporter);
    Ok(TreeScan {
        files,
        directories,
        rejected,
    })
}

fn pending_file(root: &Path, entry: &DirEntry) -> Result<PendingFile, IdentityParseError> {
    let path = entry.path().to_path_buf();
    let relative_path = relative_to(root, &path).to_path_buf();
    let dir_key = DirKey::from_relative(relative_path.parent().unwrap_or(Path::new("")))?;
    let file_name = hasher::storable_file_name(entry.file_name())?.to_string();
    Ok(PendingFile {
        path,
        relative_path,
        file_name,
        dir_key,
    })
}

fn relative_to<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(Path::new(""))
}

fn hash_files(pending: Vec<PendingFile>, reporter: &dyn ProgressReporter) -> Vec<FileRecord> {
    let total = pending.len();
    let hashed = AtomicUsize::new(0);
    let start = Instant::now();
    reporter.on_hash_start(total);

    let files: Vec<FileRecord> = pending
        .into_par_iter()
        .map(|file| {
            let checksum = match hasher::checksum_file(&file.path) {
                Ok(checksum) => Some(checksum),
                Err(e) => {
                    warn!("Unable to determine checksum for {}: {}", file.path.display(), e);
                    None
                }
            };
            let done = hashed.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_hash_progress(done, total);

            FileRecord {
                parent_dir: file
                    .path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
                path: file.path,
                relative_path: file.relative_path,
                file_name: file.file_name,
                dir_key: file.dir_key,
                checksum,
            }
        })
        .collect();

    let duration = start.elapsed();
    debug!("Hashed {} files in {:.2}s", total, duration.as_secs_f64());
    reporter.on_hash_complete(total, duration.as_secs_f64());
    files
}
