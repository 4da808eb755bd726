use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::error::SyncIssue;
use crate::progress::ProgressReporter;

pub const AUDIT_FILE_NAME: &str = "~auditTrail.txt";

/// Appends every notification of a run to `~auditTrail.txt` at the destination root.
pub struct AuditTrail {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditTrail {
    pub fn open(destination: &Path) -> io::Result<Self> {
        let path = destination.join(AUDIT_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, level: &str, message: &str) {
        let line = format!(
            "{} [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            message
        );
        let result = match self.file.lock() {
            Ok(mut file) => file.write_all(line.as_bytes()),
            Err(_) => return,
        };
        if let Err(e) = result {
            warn!("Unable to write audit trail {}: {}", self.path.display(), e);
        }
    }
}

impl ProgressReporter for AuditTrail {
    fn on_status(&self, message: &str) {
        self.append("STATUS", message);
    }

    fn on_processing_file(&self, message: &str) {
        self.append("ACTION", message);
    }

    fn on_error(&self, issue: &SyncIssue) {
        self.append("ERROR", &issue.to_string());
    }
}
