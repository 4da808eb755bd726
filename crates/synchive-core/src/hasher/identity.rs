use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use super::crc::Checksum;

/// Separator used for relative paths inside directory keys, on every platform.
const KEY_SEPARATOR: char = '\\';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityParseError {
    #[error("invalid checksum '{0}'")]
    Checksum(String),

    #[error("invalid file identifier '{0}'")]
    UniqueId(String),

    #[error("invalid directory key '{0}'")]
    DirKey(String),

    #[error("name '{0}' cannot be stored in the index")]
    UnsupportedName(String),
}

/// File names end up inside a single index line.
fn is_storable_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(|c: char| matches!(c, '\r' | '\n'))
}

/// Directory names additionally must not contain the key separator.
fn is_storable_segment(name: &str) -> bool {
    is_storable_file_name(name) && !name.contains(KEY_SEPARATOR)
}

/// The name as it is written to the index, or an error when it would not read
/// back as the same name (not UTF-8, or contains a line break).
pub fn storable_file_name(name: &OsStr) -> Result<&str, IdentityParseError> {
    match name.to_str() {
        Some(name) if is_storable_file_name(name) => Ok(name),
        _ => Err(IdentityParseError::UnsupportedName(
            name.to_string_lossy().into_owned(),
        )),
    }
}

/// Checksum plus file name: `<CHECKSUM> "<filename>"`.
///
/// This text is the diff key and is persisted as-is, so the rendering must not
/// change between versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueId {
    checksum: Checksum,
    file_name: String,
}

impl UniqueId {
    pub fn new(checksum: Checksum, file_name: impl Into<String>) -> Self {
        Self {
            checksum,
            file_name: file_name.into(),
        }
    }

    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Whether the rendered line parses back to this identifier.
    pub fn is_storable(&self) -> bool {
        is_storable_file_name(&self.file_name)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.checksum, self.file_name)
    }
}

impl FromStr for UniqueId {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || IdentityParseError::UniqueId(s.to_string());

        let (checksum, quoted) = s.split_once(' ').ok_or_else(malformed)?;
        let checksum = checksum.parse::<Checksum>().map_err(|_| malformed())?;
        let file_name = quoted
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .ok_or_else(malformed)?;

        if file_name.is_empty() {
            return Err(malformed());
        }

        Ok(Self::new(checksum, file_name))
    }
}

/// Identity of one directory relative to its tree root: `~<depth>: <relative path>`.
///
/// The relative path carries a leading `\` before every component, so the root
/// is `~0: ` and `root/sub/deeper` is `~2: \sub\deeper`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DirKey {
    segments: Vec<String>,
}

impl DirKey {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a key from a path relative to the tree root. Only normal components
    /// count; `.` and prefixes are ignored. Fails when a component cannot be
    /// written to the index unchanged.
    pub fn from_relative(path: &Path) -> Result<Self, IdentityParseError> {
        let mut segments = Vec::new();
        for component in path.components() {
            if let Component::Normal(name) = component {
                match name.to_str() {
                    Some(segment) if is_storable_segment(segment) => {
                        segments.push(segment.to_string())
                    }
                    _ => {
                        return Err(IdentityParseError::UnsupportedName(
                            path.to_string_lossy().into_owned(),
                        ))
                    }
                }
            }
        }
        Ok(Self { segments })
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the rendered key parses back to this key.
    pub fn is_storable(&self) -> bool {
        self.segments.iter().all(|segment| is_storable_segment(segment))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn to_relative_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// Display name used in notifications: the last component, or `root`.
    pub fn folder_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("root")
    }

    /// The relative part as written in the index (`\sub\deeper`).
    pub fn relative_display(&self) -> String {
        self.segments
            .iter()
            .map(|segment| format!("{}{}", KEY_SEPARATOR, segment))
            .collect()
    }
}

impl Ord for DirKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.depth()
            .cmp(&other.depth())
            .then_with(|| self.segments.cmp(&other.segments))
    }
}

impl PartialOrd for DirKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DirKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "~{}: {}", self.depth(), self.relative_display())
    }
}

impl FromStr for DirKey {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || IdentityParseError::DirKey(s.to_string());

        let rest = s.strip_prefix('~').ok_or_else(malformed)?;
        let (depth, relative) = rest.split_once(':').ok_or_else(malformed)?;
        let depth = depth.parse::<usize>().map_err(|_| malformed())?;
        // Editors may strip the trailing space of the root key.
        let relative = relative.strip_prefix(' ').unwrap_or(relative);

        let segments: Vec<String> = if relative.is_empty() {
            Vec::new()
        } else {
            let tail = relative.strip_prefix(KEY_SEPARATOR).ok_or_else(malformed)?;
            tail.split(KEY_SEPARATOR).map(str::to_string).collect()
        };

        if segments.iter().any(String::is_empty) || segments.len() != depth {
            return Err(malformed());
        }

        Ok(Self { segments })
    }
}
