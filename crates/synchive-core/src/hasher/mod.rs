pub mod crc;
pub mod identity;

pub use crc::{checksum_file, checksum_reader, Checksum};
pub use identity::{storable_file_name, DirKey, IdentityParseError, UniqueId};
