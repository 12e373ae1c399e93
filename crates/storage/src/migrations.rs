//! The compiled-in, ordered list of schema migrations.
//!
//! Version 0 is the bookkeeping table created by
//! [`MigrationEngine::initialize`](crate::migrator::MigrationEngine::initialize).
//! Versions start at 1 and must stay contiguous. Never edit a shipped
//! migration; append a new one.

use formledger_core::DocumentStatus;
use rusqlite::Connection;

use crate::error::StorageError;

/// Rust-side step run inside a migration's transaction.
pub type MigrationHook = fn(&Connection) -> Result<(), StorageError>;

#[derive(Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub statements: &'static [&'static str],
    pub pre_hook: Option<MigrationHook>,
    pub post_hook: Option<MigrationHook>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("statements", &self.statements.len())
            .field("pre_hook", &self.pre_hook.is_some())
            .field("post_hook", &self.post_hook.is_some())
            .finish()
    }
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "documents and version history",
        statements: &[
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY NOT NULL,
                type TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'draft',
                payload BLOB,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                owner_ref TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS document_versions (
                version_id TEXT PRIMARY KEY NOT NULL,
                document_id TEXT NOT NULL REFERENCES documents(id),
                version_number INTEGER NOT NULL CHECK (version_number >= 1),
                content BLOB NOT NULL,
                created_at TEXT NOT NULL,
                author_ref TEXT,
                comment TEXT,
                UNIQUE (document_id, version_number)
            )",
            "CREATE INDEX IF NOT EXISTS idx_versions_document
                ON document_versions (document_id, version_number)",
        ],
        pre_hook: None,
        post_hook: None,
    },
    Migration {
        version: 2,
        description: "attachments",
        statements: &[
            "CREATE TABLE IF NOT EXISTS attachments (
                id TEXT PRIMARY KEY NOT NULL,
                document_id TEXT NOT NULL REFERENCES documents(id),
                filename TEXT NOT NULL,
                path TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                mime_type TEXT,
                uploaded_at TEXT NOT NULL,
                uploader_ref TEXT,
                description TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_attachments_document ON attachments (document_id)",
        ],
        pre_hook: None,
        post_hook: None,
    },
    Migration {
        version: 3,
        description: "version content hashes",
        statements: &["ALTER TABLE document_versions ADD COLUMN content_hash TEXT"],
        pre_hook: None,
        post_hook: Some(backfill_content_hashes),
    },
    Migration {
        version: 4,
        description: "document filter index and canonical statuses",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_documents_filter ON documents (owner_ref, type, status)",
        ],
        pre_hook: None,
        post_hook: Some(canonicalize_statuses),
    },
];

pub fn highest_version(migrations: &[Migration]) -> u32 {
    migrations.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Versions must run 1..=n with no gaps or repeats.
pub fn check_sequence(migrations: &[Migration]) -> Result<(), StorageError> {
    let mut versions: Vec<u32> = migrations.iter().map(|m| m.version).collect();
    versions.sort_unstable();
    for (i, v) in versions.iter().enumerate() {
        let expected = i as u32 + 1;
        if *v != expected {
            return Err(StorageError::MigrationSequence(format!(
                "expected version {expected}, found {v}"
            )));
        }
    }
    Ok(())
}

fn backfill_content_hashes(conn: &Connection) -> Result<(), StorageError> {
    let rows: Vec<(String, Vec<u8>)> = {
        let mut stmt = conn
            .prepare("SELECT version_id, content FROM document_versions WHERE content_hash IS NULL")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        rows
    };
    let mut update =
        conn.prepare("UPDATE document_versions SET content_hash = ?1 WHERE version_id = ?2")?;
    for (version_id, content) in &rows {
        let hash = blake3::hash(content).to_hex();
        update.execute(rusqlite::params![hash.as_str(), version_id])?;
    }
    tracing::debug!(rows = rows.len(), "backfilled version content hashes");
    Ok(())
}

/// Rewrites legacy status aliases (`approved`, `final`, `sent`) to their
/// canonical names. Unrecognized values are left for the read path.
fn canonicalize_statuses(conn: &Connection) -> Result<(), StorageError> {
    let stored: Vec<String> = {
        let mut stmt = conn.prepare("SELECT DISTINCT status FROM documents")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        rows
    };
    for status in stored {
        let Some(canonical) = DocumentStatus::recognize(&status) else {
            continue;
        };
        if canonical.as_str() == status {
            continue;
        }
        let changed = conn.execute(
            "UPDATE documents SET status = ?1 WHERE status = ?2",
            rusqlite::params![canonical.as_str(), status],
        )?;
        tracing::info!(from = %status, to = canonical.as_str(), changed, "canonicalized status");
    }
    Ok(())
}
