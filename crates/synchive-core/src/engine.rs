use crate::audit::AUDIT_FILE_NAME;
use crate::config::{self, AppConfig, DEFAULT_LEFTOVER_FOLDER};
use crate::error::{Error, SyncIssue};
use crate::hasher::{self, Checksum, DirKey, UniqueId};
use crate::index::{DestinationIndex, DirectoryEntry};
use crate::index_file::{self, INDEX_FILE_NAME};
use crate::model::FileRecord;
use crate::progress::ProgressReporter;
use crate::scanner::{self, IndexSource, ScanOptions};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct SyncEngine {
    source: PathBuf,
    destination: PathBuf,
    ignore_patterns: Vec<String>,
    leftover_folder: String,
}

#[derive(Debug)]
pub struct SyncResult {
    pub index_source: IndexSource,
    pub index_path: PathBuf,
    pub index_duration: Duration,
    pub source_scan_duration: Duration,
    pub compare_duration: Duration,
    pub archive_duration: Duration,
    pub files_scanned: usize,
    pub files_added: usize,
    pub files_unchanged: usize,
    pub files_archived: usize,
    pub directories_created: usize,
    pub directories_pruned: usize,
    pub errors: usize,
}

impl SyncResult {
    pub fn total_duration(&self) -> Duration {
        self.index_duration + self.source_scan_duration + self.compare_duration + self.archive_duration
    }

    /// Copies plus archives: zero on a run that found nothing to do.
    pub fn actions(&self) -> usize {
        self.files_added + self.files_archived
    }
}

#[derive(Debug, Default)]
struct SyncStats {
    added: usize,
    unchanged: usize,
    archived: usize,
    directories_created: usize,
    directories_pruned: usize,
    errors: usize,
}

impl SyncEngine {
    /// Both roots must be existing directories that do not contain each other.
    pub fn new(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<Self, Error> {
        let source = canonical_dir(source.as_ref()).map_err(|reason| Error::SourceUnavailable {
            path: source.as_ref().to_path_buf(),
            reason,
        })?;
        let destination =
            canonical_dir(destination.as_ref()).map_err(|reason| Error::DestinationUnavailable {
                path: destination.as_ref().to_path_buf(),
                reason,
            })?;

        if config::roots_overlap(&source, &destination) {
            return Err(Error::OverlappingRoots {
                source_root: source,
                destination,
            });
        }

        Ok(Self {
            source,
            destination,
            ignore_patterns: Vec::new(),
            leftover_folder: DEFAULT_LEFTOVER_FOLDER.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let source = config
            .source
            .as_deref()
            .ok_or_else(|| Error::Other("No source directory configured".to_string()))?;
        let destination = config
            .destination
            .as_deref()
            .ok_or_else(|| Error::Other("No destination directory configured".to_string()))?;

        Self::new(source, destination)?
            .with_ignore_patterns(config.ignore_patterns.clone())
            .with_leftover_folder(&config.leftover_folder)
    }

    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// The leftover folder must be a single plain name at the destination root.
    pub fn with_leftover_folder(mut self, name: &str) -> Result<Self, Error> {
        let single_component = Path::new(name).components().count() == 1
            && Path::new(name).file_name().map(|n| n == name).unwrap_or(false);
        if !single_component || name == INDEX_FILE_NAME || name == AUDIT_FILE_NAME {
            return Err(Error::Other(format!("Invalid leftover folder name '{}'", name)));
        }
        self.leftover_folder = name.to_string();
        Ok(self)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn leftover_folder(&self) -> &str {
        &self.leftover_folder
    }

    /// Run one sync:
    /// 1. Destination index (persisted index file, else scan + hash)
    /// 2. Source scan + hash
    /// 3. Copy new files, mark known ones
    /// 4. Archive destination files the source no longer has
    /// 5. Rewrite the index file
    ///
    /// Failures in 1 and 2 abort before anything is touched. Per-file failures
    /// in 3 and 4 are reported and the run goes on.
    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<SyncResult, Error> {
        let options = ScanOptions::new(&self.ignore_patterns, &self.leftover_folder);
        info!(
            "Syncing {} -> {}",
            self.source.display(),
            self.destination.display()
        );

        // Phase 1: Destination index
        reporter.on_status("Reading destination...");
        let index_start = Instant::now();
        let (index, index_source) =
            scanner::build_destination_index(&self.destination, &options, reporter)?;
        let index_duration = index_start.elapsed();
        debug!(
            "Destination index from {} in {:.2}s: {} directories, {} files",
            index_source,
            index_duration.as_secs_f64(),
            index.len(),
            index.file_count(),
        );

        // Phase 2: Source scan
        reporter.on_status("Scanning source...");
        let scan_start = Instant::now();
        let scan = scanner::scan_source(&self.source, &options, reporter)?;
        let source_scan_duration = scan_start.elapsed();

        // Phase 3: Compare and copy
        reporter.on_status("Comparing differences...");
        let compare_start = Instant::now();
        let mut run = SyncRun::new(self, reporter, index);
        for path in scan.rejected {
            run.report(SyncIssue::UnsupportedName { path });
        }
        for record in &scan.files {
            run.process_record(record);
        }
        let compare_duration = compare_start.elapsed();

        // Phase 4: Archive leftovers
        reporter.on_status("Moving files not found in source...");
        let archive_start = Instant::now();
        run.archive_leftovers();
        let archive_duration = archive_start.elapsed();

        // Phase 5: Persist
        reporter.on_status("Rewriting index file...");
        let index_path = index_file::write_index(&self.destination, &run.index)?;

        reporter.on_status("Operation completed");
        let stats = run.stats;
        info!(
            "{} added, {} unchanged, {} archived, {} errors",
            stats.added, stats.unchanged, stats.archived, stats.errors
        );

        Ok(SyncResult {
            index_source,
            index_path,
            index_duration,
            source_scan_duration,
            compare_duration,
            archive_duration,
            files_scanned: scan.files.len(),
            files_added: stats.added,
            files_unchanged: stats.unchanged,
            files_archived: stats.archived,
            directories_created: stats.directories_created,
            directories_pruned: stats.directories_pruned,
            errors: stats.errors,
        })
    }
}

fn canonical_dir(path: &Path) -> Result<PathBuf, String> {
    let metadata = fs::metadata(path).map_err(|e| e.to_string())?;
    if !metadata.is_dir() {
        return Err("not a directory".to_string());
    }
    fs::canonicalize(path).map_err(|e| e.to_string())
}

/// State of one run. Holds the destination index exclusively.
struct SyncRun<'a> {
    source: &'a Path,
    destination: &'a Path,
    leftover_folder: &'a str,
    reporter: &'a dyn ProgressReporter,
    index: DestinationIndex,
    /// Destination paths written (or attempted) by the source pass.
    claimed: HashSet<PathBuf>,
    stats: SyncStats,
}

impl<'a> SyncRun<'a> {
    fn new(
        engine: &'a SyncEngine,
        reporter: &'a dyn ProgressReporter,
        index: DestinationIndex,
    ) -> Self {
        Self {
            source: &engine.source,
            destination: &engine.destination,
            leftover_folder: &engine.leftover_folder,
            reporter,
            index,
            claimed: HashSet::new(),
            stats: SyncStats::default(),
        }
    }

    fn report(&mut self, issue: SyncIssue) {
        warn!(path = %issue.path().display(), integrity = issue.is_integrity(), "{}", issue);
        self.stats.errors += 1;
        self.reporter.on_error(&issue);
    }

    fn process_record(&mut self, record: &FileRecord) {
        let id = match record.unique_id() {
            Some(id) if record.copy_allowed() => id,
            _ => {
                self.report(SyncIssue::ChecksumUnavailable {
                    path: record.path.clone(),
                });
                return;
            }
        };
        let checksum = id.checksum();

        let key = record.dir_key.clone();
        let dest_path = self.destination.join(&record.relative_path);
        let dest_dir = dest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.destination.to_path_buf());

        match self.index.get_mut(&key) {
            None => {
                if let Err(error) = self.create_directory(&dest_dir, key.depth()) {
                    self.claimed.insert(dest_path);
                    self.report(SyncIssue::CopyFailed {
                        path: record.path.clone(),
                        error,
                    });
                    return;
                }
                self.index.insert(DirectoryEntry::new(key.clone()));
                self.copy_verified(record, checksum, id, &key, &dest_path);
            }
            Some(entry) if entry.contains(&id) && dest_path.is_file() => {
                entry.mark_found(id);
                self.claimed.insert(dest_path);
                self.stats.unchanged += 1;
                debug!("Unchanged: {}", record.path.display());
            }
            Some(entry) => {
                if entry.contains(&id) {
                    warn!(
                        "{} is indexed but missing from the destination, copying again",
                        dest_path.display()
                    );
                }
                self.copy_verified(record, checksum, id, &key, &dest_path);
            }
        }
    }

    /// Create `dir` and any missing parents below the destination root.
    fn create_directory(&mut self, dir: &Path, depth: usize) -> io::Result<()> {
        let mut missing = Vec::new();
        let mut current = dir;
        for _ in 0..depth {
            if current.is_dir() {
                break;
            }
            missing.push(current.to_path_buf());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        for created in missing.iter().rev() {
            match fs::create_dir(created) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && created.is_dir() => continue,
                Err(e) => return Err(e),
            }
            self.stats.directories_created += 1;
            let name = created
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.reporter
                .on_processing_file(&format!("Directory \"{}\" Created", name));
        }
        Ok(())
    }

    /// Copy a source file over its destination path and verify the written bytes.
    /// Only a verified copy is recorded as `Found`, so anything else is retried
    /// next run.
    fn copy_verified(
        &mut self,
        record: &FileRecord,
        checksum: Checksum,
        id: UniqueId,
        key: &DirKey,
        dest_path: &Path,
    ) {
        self.claimed.insert(dest_path.to_path_buf());

        let copied = dest_path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::copy(&record.path, dest_path));
        if let Err(error) = copied {
            self.report(SyncIssue::CopyFailed {
                path: record.path.clone(),
                error,
            });
            return;
        }

        let written = hasher::checksum_file(dest_path).ok();
        if written != Some(checksum) {
            self.report(SyncIssue::CrcMismatch {
                path: dest_path.to_path_buf(),
                expected: checksum,
                actual: written,
            });
            return;
        }

        let folder_name = match self.index.get_mut(key) {
            Some(entry) => {
                entry.mark_found(id);
                entry.folder_name().to_string()
            }
            None => key.folder_name().to_string(),
        };
        self.stats.added += 1;
        debug!(
            "Copied {} -> {}",
            record.path.strip_prefix(self.source).unwrap_or(&record.path).display(),
            dest_path.display()
        );
        self.reporter.on_processing_file(&format!(
            "Added \"{}\" to \"{}\"",
            record.file_name, folder_name
        ));
    }

    /// Move every identifier still `NotFound` into the leftover folder.
    fn archive_leftovers(&mut self) {
        let pending: Vec<(DirKey, Vec<UniqueId>)> = self
            .index
            .iter()
            .map(|entry| (entry.key().clone(), entry.not_found()))
            .filter(|(_, ids)| !ids.is_empty())
            .collect();

        for (key, ids) in pending {
            for id in ids {
                self.archive_file(&key, &id);
            }
        }

        let destination = self.destination;
        self.index.retain(|key, entry| {
            key.is_root() || !entry.is_empty() || destination.join(key.to_relative_path()).is_dir()
        });
    }

    fn archive_file(&mut self, key: &DirKey, id: &UniqueId) {
        let relative = key.to_relative_path();
        let live_path = self.destination.join(&relative).join(id.file_name());

        if self.claimed.contains(&live_path) {
            // Overwritten by the source pass: the stale identifier just goes away.
            debug!("Replaced: {} ({})", live_path.display(), id);
            self.forget(key, id);
            return;
        }

        if fs::symlink_metadata(&live_path).is_err() {
            warn!(
                "{} is indexed but no longer exists, dropping it from the index",
                live_path.display()
            );
            self.forget(key, id);
            return;
        }

        let leftover_dir = self.destination.join(self.leftover_folder).join(&relative);
        let leftover_path = leftover_dir.join(id.file_name());

        let copied = fs::create_dir_all(&leftover_dir)
            .and_then(|_| fs::copy(&live_path, &leftover_path));
        if let Err(error) = copied {
            self.retain_for_retry(key, id);
            self.report(SyncIssue::ArchiveFailed {
                path: live_path,
                error,
            });
            return;
        }

        // Compare fresh reads: the indexed checksum may be stale.
        let original = hasher::checksum_file(&live_path).ok();
        let archived = hasher::checksum_file(&leftover_path).ok();
        if original.is_none() || original != archived {
            self.retain_for_retry(key, id);
            self.report(SyncIssue::ArchiveMismatch {
                path: live_path,
                original,
                archived,
            });
            return;
        }

        if let Err(error) = fs::remove_file(&live_path) {
            self.retain_for_retry(key, id);
            self.report(SyncIssue::DeleteFailed {
                path: live_path,
                error,
            });
            return;
        }

        self.forget(key, id);
        self.stats.archived += 1;
        self.reporter.on_processing_file(&format!(
            "File \"{}\" in \"{}\" not found in source. Moved to \"{}\"",
            id.file_name(),
            key.relative_display(),
            self.leftover_folder
        ));

        if let Some(parent) = live_path.parent() {
            self.prune_empty_directories(parent, key.depth());
        }
    }

    fn forget(&mut self, key: &DirKey, id: &UniqueId) {
        if let Some(entry) = self.index.get_mut(key) {
            entry.remove(id);
        }
    }

    /// Keep a file that could not be archived in the written index, so the
    /// next run tries again.
    fn retain_for_retry(&mut self, key: &DirKey, id: &UniqueId) {
        if let Some(entry) = self.index.get_mut(key) {
            entry.mark_found(id.clone());
        }
    }

    /// Remove `start` and its parents while they are empty. Never climbs more
    /// than `depth` levels and never removes the destination root.
    fn prune_empty_directories(&mut self, start: &Path, depth: usize) {
        let mut current = start.to_path_buf();
        for _ in 0..depth {
            if current == self.destination || !current.starts_with(self.destination) {
                break;
            }
            let is_empty = match fs::read_dir(&current) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => false,
            };
            if !is_empty {
                break;
            }
            if let Err(e) = fs::remove_dir(&current) {
                warn!("Unable to remove empty directory {}: {}", current.display(), e);
                break;
            }

            self.stats.directories_pruned += 1;
            let name = current
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.reporter
                .on_processing_file(&format!("Deleted empty directory \"{}\"", name));

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
    }
}
