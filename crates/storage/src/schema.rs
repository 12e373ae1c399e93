use rusqlite::Connection;

use crate::error::StorageError;

/// Connection pragmas applied to every store handle before use.
pub fn configure(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    Ok(())
}

/// Version 0 bookkeeping. Exists before any migration runs.
pub(crate) const BOOTSTRAP_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);
";

pub struct ExpectedTable {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Tables and columns a fully migrated store must have.
pub const EXPECTED_SCHEMA: &[ExpectedTable] = &[
    ExpectedTable {
        name: "schema_version",
        columns: &["version", "applied_at", "description"],
    },
    ExpectedTable {
        name: "documents",
        columns: &[
            "id",
            "type",
            "status",
            "payload",
            "created_at",
            "updated_at",
            "owner_ref",
        ],
    },
    ExpectedTable {
        name: "document_versions",
        columns: &[
            "version_id",
            "document_id",
            "version_number",
            "content",
            "content_hash",
            "created_at",
            "author_ref",
            "comment",
        ],
    },
    ExpectedTable {
        name: "attachments",
        columns: &[
            "id",
            "document_id",
            "filename",
            "path",
            "size",
            "mime_type",
            "uploaded_at",
            "uploader_ref",
            "description",
        ],
    },
];
