use std::path::PathBuf;

use formledger_core::ResolverConfig;

pub const DEFAULT_UNDO_DEPTH: usize = 100;
pub const DEFAULT_OWNER: &str = "local";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Recorded as the author of every version this engine writes.
    pub author_ref: Option<String>,
    /// Owner assigned to documents created through this engine.
    pub owner_ref: String,
    pub resolver: ResolverConfig,
    pub undo_depth: usize,
    /// Overrides `<db dir>/backups` for pre-upgrade backups.
    pub backup_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            author_ref: None,
            owner_ref: DEFAULT_OWNER.to_string(),
            resolver: ResolverConfig::default(),
            undo_depth: DEFAULT_UNDO_DEPTH,
            backup_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn with_author(mut self, author_ref: &str) -> Self {
        self.author_ref = Some(author_ref.to_string());
        self
    }

    pub fn with_owner(mut self, owner_ref: &str) -> Self {
        self.owner_ref = owner_ref.to_string();
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_undo_depth(mut self, depth: usize) -> Self {
        self.undo_depth = depth;
        self
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }
}
