use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use super::identity::IdentityParseError;

const READ_BUFFER_LENGTH: usize = 64 * 1024; // 64KB

/// CRC-32 (IEEE) of a file's content.
///
/// Rendered as exactly eight uppercase hex digits, which is the form stored in
/// the index file. Parsing accepts lowercase and unpadded digits written by
/// older versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum(u32);

impl Checksum {
    pub fn from_value(value: u32) -> Self {
        Self(value)
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        Self(crc32fast::hash(data))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IdentityParseError::Checksum(s.to_string()));
        }
        u32::from_str_radix(s, 16)
            .map(Checksum)
            .map_err(|_| IdentityParseError::Checksum(s.to_string()))
    }
}

/// Stream a reader through the CRC-32 accumulator.
pub fn checksum_reader<R: Read>(mut reader: R) -> io::Result<Checksum> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_LENGTH];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Checksum(hasher.finalize()))
}

/// Checksum of a file on disk. Callers treat an error as "checksum unavailable".
pub fn checksum_file(path: &Path) -> io::Result<Checksum> {
    let file = File::open(path)?;
    checksum_reader(file)
}
