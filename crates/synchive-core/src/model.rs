use std::path::PathBuf;

use crate::hasher::{Checksum, DirKey, UniqueId};

/// One file observed by a tree scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Path below the scanned root, as found on disk. Copy targets are built from this.
    pub relative_path: PathBuf,
    pub file_name: String,
    pub parent_dir: PathBuf,
    /// Key of the containing directory, relative to the scanned root.
    pub dir_key: DirKey,
    /// `None` when the file could not be read while hashing.
    pub checksum: Option<Checksum>,
}

impl FileRecord {
    /// Number of directories between the tree root and this file's directory.
    pub fn depth(&self) -> usize {
        self.dir_key.depth()
    }

    /// Only files with a known checksum may be copied.
    pub fn copy_allowed(&self) -> bool {
        self.checksum.is_some()
    }

    pub fn unique_id(&self) -> Option<UniqueId> {
        self.checksum
            .map(|checksum| UniqueId::new(checksum, self.file_name.clone()))
    }
}
