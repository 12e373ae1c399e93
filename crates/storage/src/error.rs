use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("cannot create schema bookkeeping table: {0}")]
    Bootstrap(#[source] rusqlite::Error),

    #[error("pre-upgrade backup to {} failed: {reason}", .path.display())]
    Backup { path: PathBuf, reason: String },

    #[error("migration {version} ({description}) failed: {source}")]
    Migration {
        version: u32,
        description: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("invalid migration list: {0}")]
    MigrationSequence(String),

    #[error("schema version {requested} is beyond the highest known version {highest}")]
    UnknownSchemaVersion { requested: u32, highest: u32 },

    #[error("store is at schema version {current}, this build expects {expected}")]
    SchemaOutdated { current: u32, expected: u32 },

    #[error("core error: {0}")]
    Core(#[from] formledger_core::CoreError),
}

impl StorageError {
    pub(crate) fn serialization(e: impl std::fmt::Display) -> Self {
        Self::Serialization(e.to_string())
    }
}
