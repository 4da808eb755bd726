//! Persisted destination index (`~listOfFilesInCRC.txt`).
//!
//! ```text
//! Synchive 0.1.0 - root=/backups/photos
//! ~0:
//! 00000000 "file1"
//! ~1: \Test
//! 70C4251B "HIHI"
//! ```
//!
//! Reading is tolerant: a malformed line is skipped rather than failing the
//! whole file. Writing goes through a temp file and a rename so an interrupted
//! run never leaves a truncated index behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::hasher::{DirKey, UniqueId};
use crate::index::{DestinationIndex, DirectoryEntry};

pub const INDEX_FILE_NAME: &str = "~listOfFilesInCRC.txt";
pub const TOOL_NAME: &str = "Synchive";

const ROOT_MARKER: &str = " - root=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub tool: String,
    pub version: String,
    pub root: String,
}

impl IndexHeader {
    pub fn current(root: &Path) -> Self {
        Self {
            tool: TOOL_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            root: root.display().to_string(),
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let (label, root) = line.split_once(ROOT_MARKER)?;
        let mut words = label.split_whitespace();
        let tool = words.next()?.to_string();
        let version = words.next().unwrap_or_default().to_string();
        Some(Self {
            tool,
            version,
            root: root.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PersistedIndex {
    pub header: Option<IndexHeader>,
    pub index: DestinationIndex,
    pub skipped_lines: usize,
}

impl PersistedIndex {
    /// A file with neither a header nor a single directory is not an index.
    pub fn is_usable(&self) -> bool {
        self.header.is_some() || !self.index.is_empty()
    }
}

pub fn index_path(destination: &Path) -> PathBuf {
    destination.join(INDEX_FILE_NAME)
}

pub fn read_index(path: &Path) -> io::Result<PersistedIndex> {
    let file = File::open(path)?;
    parse_index(BufReader::new(file))
}

/// Parse the line format. Only I/O failures are errors; bad lines are counted
/// in `skipped_lines`.
pub fn parse_index<R: BufRead>(reader: R) -> io::Result<PersistedIndex> {
    let mut header = None;
    let mut index = DestinationIndex::new();
    let mut current: Option<DirKey> = None;
    let mut skipped_lines = 0usize;

    for (line_number, raw) in reader.split(b'\n').enumerate() {
        let raw = raw?;
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(_) => {
                debug!("Index line {} is not valid UTF-8, skipping", line_number + 1);
                skipped_lines += 1;
                continue;
            }
        };
        let line = line.strip_suffix('\r').unwrap_or(&line);

        if line.trim().is_empty() {
            continue;
        }

        if line_number == 0 {
            if let Some(parsed) = IndexHeader::parse(line) {
                trace!("Index header: {:?}", parsed);
                header = Some(parsed);
                continue;
            }
        }

        if line.starts_with('~') {
            match line.parse::<DirKey>() {
                Ok(key) => {
                    index.entry_or_insert(key.clone());
                    current = Some(key);
                }
                Err(e) => {
                    debug!("Index line {}: {}", line_number + 1, e);
                    skipped_lines += 1;
                    // Identifiers below a broken key must not land in the previous directory.
                    current = None;
                }
            }
            continue;
        }

        match (line.parse::<UniqueId>(), current.as_ref()) {
            (Ok(id), Some(key)) => index.entry_or_insert(key.clone()).insert(id),
            (Ok(id), None) => {
                debug!(
                    "Index line {}: identifier {} outside of any directory",
                    line_number + 1,
                    id
                );
                skipped_lines += 1;
            }
            (Err(e), _) => {
                debug!("Index line {}: {}", line_number + 1, e);
                skipped_lines += 1;
            }
        }
    }

    Ok(PersistedIndex {
        header,
        index,
        skipped_lines,
    })
}

/// Render the index: every directory key, followed by its `Found` identifiers.
pub fn render_index(header: &IndexHeader, index: &DestinationIndex) -> String {
    let mut out = format!("{} {}{}{}\n", header.tool, header.version, ROOT_MARKER, header.root);
    for entry in index.iter() {
        render_entry(&mut out, entry);
    }
    out
}

/// Keys and identifiers that would not read back unchanged are left out.
fn render_entry(out: &mut String, entry: &DirectoryEntry) {
    if !entry.key().is_storable() {
        warn!("Directory key {:?} cannot be stored, leaving it out", entry.key());
        return;
    }
    out.push_str(&entry.key().to_string());
    out.push('\n');
    for id in entry.found() {
        if !id.is_storable() {
            warn!("Identifier {:?} cannot be stored, leaving it out", id);
            continue;
        }
        out.push_str(&id.to_string());
        out.push('\n');
    }
}

/// Rewrite the index file at the destination root. Returns the file path.
pub fn write_index(destination: &Path, index: &DestinationIndex) -> Result<PathBuf, Error> {
    let path = index_path(destination);
    let content = render_index(&IndexHeader::current(destination), index);

    write_atomic(&path, content.as_bytes()).map_err(|error| Error::Index {
        path: path.clone(),
        error,
    })?;

    debug!(
        "Wrote {} directories, {} files to {}",
        index.len(),
        index.found_count(),
        path.display()
    );
    Ok(path)
}

/// `.~listOfFilesInCRC.txt.<pid>.tmp`, left behind only by an interrupted write.
pub fn is_temp_file_name(name: &str) -> bool {
    name.strip_prefix('.')
        .and_then(|rest| rest.strip_prefix(INDEX_FILE_NAME))
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".tmp"))
        .map_or(false, |pid| !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()))
}

fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let result = (|| -> io::Result<()> {
        let mut temp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        temp_file.write_all(content)?;
        temp_file.sync_all()?;
        drop(temp_file);

        #[cfg(windows)]
        {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
