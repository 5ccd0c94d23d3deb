pub mod checksum;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod repository;
pub mod storage;
pub mod validation;

mod types;

pub use config::VaultConfig;
pub use error::{RepositoryError, Result, StorageError, StorageResult, ValidationError, Violation};
pub use repository::{FileRepository, ProjectStatsSink, VersionHistory};
pub use types::*;
