use crate::error::SyncIssue;

/// Trait for reporting sync progress.
///
/// The engine receives a reporter per run instead of posting to a global event
/// center. CLI implements it with indicatif, the audit trail with a log file,
/// tests with a recording fake. All methods have default no-op implementations.
///
/// Notifications are fire-and-forget. `on_hash_progress` is called from hashing
/// worker threads, hence `Send + Sync`.
pub trait ProgressReporter: Send + Sync {
    /// Coarse phase change ("Comparing differences...", "Operation completed").
    fn on_status(&self, _message: &str) {}
    /// Action taken for one file or directory.
    fn on_processing_file(&self, _message: &str) {}
    /// Integrity or I/O failure for one item.
    fn on_error(&self, _issue: &SyncIssue) {}
    fn on_hash_start(&self, _total_files: usize) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_hash_complete(&self, _total_files: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

impl<T: ProgressReporter + ?Sized> ProgressReporter for &T {
    fn on_status(&self, message: &str) {
        (**self).on_status(message)
    }

    fn on_processing_file(&self, message: &str) {
        (**self).on_processing_file(message)
    }

    fn on_error(&self, issue: &SyncIssue) {
        (**self).on_error(issue)
    }

    fn on_hash_start(&self, total_files: usize) {
        (**self).on_hash_start(total_files)
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        (**self).on_hash_progress(files_hashed, total_files)
    }

    fn on_hash_complete(&self, total_files: usize, duration_secs: f64) {
        (**self).on_hash_complete(total_files, duration_secs)
    }
}

/// Forwards every notification to both reporters, first `A` then `B`.
pub struct Tee<A, B>(pub A, pub B);

impl<A: ProgressReporter, B: ProgressReporter> ProgressReporter for Tee<A, B> {
    fn on_status(&self, message: &str) {
        self.0.on_status(message);
        self.1.on_status(message);
    }

    fn on_processing_file(&self, message: &str) {
        self.0.on_processing_file(message);
        self.1.on_processing_file(message);
    }

    fn on_error(&self, issue: &SyncIssue) {
        self.0.on_error(issue);
        self.1.on_error(issue);
    }

    fn on_hash_start(&self, total_files: usize) {
        self.0.on_hash_start(total_files);
        self.1.on_hash_start(total_files);
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        self.0.on_hash_progress(files_hashed, total_files);
        self.1.on_hash_progress(files_hashed, total_files);
    }

    fn on_hash_complete(&self, total_files: usize, duration_secs: f64) {
        self.0.on_hash_complete(total_files, duration_secs);
        self.1.on_hash_complete(total_files, duration_secs);
    }
}
