pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod index;
pub mod index_file;
pub mod model;
pub mod progress;
pub mod scanner;

pub use audit::AuditTrail;
pub use config::AppConfig;
pub use engine::{SyncEngine, SyncResult};
pub use error::{Error, SyncIssue};
pub use index::{DestinationIndex, DirectoryEntry, Presence};
pub use model::FileRecord;
pub use progress::{ProgressReporter, SilentReporter, Tee};
pub use scanner::IndexSource;
