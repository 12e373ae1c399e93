use std::path::{Path, PathBuf};
use std::sync::Arc;

use formledger_core::{Content, FieldValue, FormRegistry, ResolverConfig, TypeResolver};
use formledger_engine::{EngineConfig, EngineError, FormEngine};
use formledger_storage::SqliteStorage;
use tempfile::TempDir;

/// A store file in its own temporary directory, removed on drop.
pub struct TestWorkspace {
    dir: TempDir,
    db_path: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Result<Self, std::io::Error> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("forms.db");
        Ok(Self { dir, db_path })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Where upgrades of this store put their backups by default.
    pub fn backup_dir(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    pub fn backups(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        let dir = self.backup_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        files.sort();
        Ok(files)
    }

    pub fn resolver(config: ResolverConfig) -> Result<TypeResolver, Box<dyn std::error::Error>> {
        Ok(TypeResolver::new(Arc::new(FormRegistry::builtin()?), config))
    }

    /// Opens the store, migrating it to the latest schema.
    pub fn storage(&self) -> Result<SqliteStorage, Box<dyn std::error::Error>> {
        let resolver = Self::resolver(ResolverConfig::default())?;
        Ok(SqliteStorage::open(&self.db_path, resolver)?)
    }

    /// Opens a second handle on an already migrated store.
    pub fn attach(&self) -> Result<SqliteStorage, Box<dyn std::error::Error>> {
        let resolver = Self::resolver(ResolverConfig::default())?;
        Ok(SqliteStorage::attach(&self.db_path, resolver)?)
    }

    pub fn engine(&self, config: EngineConfig) -> Result<FormEngine, EngineError> {
        FormEngine::open(&self.db_path, config)
    }
}

impl std::fmt::Debug for TestWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestWorkspace")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// Content of a filled-in general message.
pub fn message_content(to: &str, from: &str, subject: &str, message: &str) -> Content {
    [
        ("to", to),
        ("from", from),
        ("subject", subject),
        ("message", message),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), FieldValue::from(v)))
    .collect()
}

