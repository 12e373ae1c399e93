pub mod config;
pub mod error;
pub mod tracker;

pub use config::EngineConfig;
pub use error::EngineError;
pub use tracker::{ChangeEvent, ChangeOrigin, ChangeRecord, ChangeTracker, ListenerId};

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use formledger_core::{CoreError, Document, DocumentId, FormRegistry, TypeResolver};
use formledger_storage::{
    DocumentFilter, DocumentRecord, DocumentStore, DocumentVersion, NewDocument, SqliteStorage,
    VersionInfo,
};

/// The surface the editor talks to: create, load, save and delete documents
/// and hand out change trackers for editing sessions.
pub struct FormEngine {
    storage: SqliteStorage,
    config: EngineConfig,
}

impl FormEngine {
    pub fn new(storage: SqliteStorage, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    /// Opens the store at `path` with the built-in form registry, running
    /// any pending migrations first.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let resolver = Self::builtin_resolver(&config)?;
        let storage = match &config.backup_dir {
            Some(dir) => SqliteStorage::open_with_backup_dir(path, dir, resolver)?,
            None => SqliteStorage::open(path, resolver)?,
        };
        let upgrade = storage.last_upgrade();
        if !upgrade.applied.is_empty() {
            info!(from = upgrade.from, to = upgrade.to, "store migrated on open");
        }
        Ok(Self::new(storage, config))
    }

    pub fn open_in_memory(config: EngineConfig) -> Result<Self, EngineError> {
        let resolver = Self::builtin_resolver(&config)?;
        Ok(Self::new(SqliteStorage::open_in_memory(resolver)?, config))
    }

    fn builtin_resolver(config: &EngineConfig) -> Result<TypeResolver, EngineError> {
        let registry = Arc::new(FormRegistry::builtin()?);
        Ok(TypeResolver::new(registry, config.resolver.clone()))
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A blank, unsaved document of a registered form type. Aliases such as
    /// `ICS-213` are accepted and normalized to the registry id.
    pub fn create(&self, form_type: &str) -> Result<Document, EngineError> {
        let definition = self
            .storage
            .resolver()
            .registry()
            .lookup(form_type)
            .ok_or_else(|| CoreError::UnknownFormType(form_type.to_string()))?;
        Ok(Document::new(&definition.id, &self.config.owner_ref))
    }

    /// Current state, or the exact snapshot when `version` is given.
    pub fn load(&self, id: &DocumentId, version: Option<u32>) -> Result<Option<Document>, EngineError> {
        let Some(stored) = self.storage.find_with_content(id, version)? else {
            return Ok(None);
        };
        let record = stored.record;
        Ok(Some(Document {
            id: record.id,
            form_type: record.form_type,
            status: record.status,
            fields: stored.content,
            owner_ref: record.owner_ref,
            created_at: record.created_at,
            updated_at: record.updated_at,
            version: stored.version_number,
        }))
    }

    /// Persists `document`. A document not yet in the store is created as
    /// version 1. Otherwise `create_version` appends a new version, and
    /// without it the current state is overwritten in place. Legacy rows that
    /// were never versioned start their history on the first versioned save.
    pub fn save(&mut self, document: &mut Document, create_version: bool) -> Result<DocumentId, EngineError> {
        let info = VersionInfo {
            author_ref: self.config.author_ref.clone(),
            comment: None,
            status: Some(document.status),
        };

        if !self.storage.exists(&document.id)? {
            let new = NewDocument::new(&document.form_type, &document.owner_ref)
                .with_id(document.id.clone())
                .with_status(document.status);
            self.storage
                .create_with_content(&new, &document.fields, &info)?;
            document.version = Some(1);
        } else if create_version {
            let number = self
                .storage
                .update_with_content(&document.id, &document.fields, &info)?;
            document.version = Some(number);
        } else {
            self.storage
                .update_current(&document.id, &document.fields, document.status)?;
        }

        document.updated_at = Utc::now();
        debug!(document = %document.id, version = ?document.version, create_version, "saved document");
        Ok(document.id.clone())
    }

    /// Saves the tracked document and drops its undo history.
    pub fn save_tracked(
        &mut self,
        tracker: &mut ChangeTracker,
        create_version: bool,
    ) -> Result<DocumentId, EngineError> {
        let id = self.save(tracker.document_mut(), create_version)?;
        tracker.clear_history();
        Ok(id)
    }

    pub fn delete(&mut self, id: &DocumentId) -> Result<bool, EngineError> {
        Ok(self.storage.delete_cascade(id)?)
    }

    pub fn attach_change_tracker(&self, document: Document) -> ChangeTracker {
        ChangeTracker::with_max_depth(document, self.config.undo_depth)
    }

    pub fn history(&self, id: &DocumentId) -> Result<Vec<DocumentVersion>, EngineError> {
        Ok(self.storage.find_versions(id)?)
    }

    pub fn search(&self, filter: &DocumentFilter) -> Result<Vec<DocumentRecord>, EngineError> {
        Ok(self.storage.find_by(filter)?)
    }
}
