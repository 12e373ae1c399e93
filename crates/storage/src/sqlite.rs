use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, warn};

use formledger_core::field_value::{content_from_msgpack, content_to_msgpack};
use formledger_core::{
    AttachmentId, Content, DocumentId, DocumentStatus, ResolutionInput, TypeResolver, VersionId,
};

use crate::error::StorageError;
use crate::migrations::{highest_version, MIGRATIONS};
use crate::migrator::{current_version, MigrationEngine, UpgradeReport, UpgradeTarget};
use crate::traits::{
    AttachmentRecord, DocumentFilter, DocumentRecord, DocumentStore, DocumentVersion,
    NewAttachment, NewDocument, StoredDocument, VersionInfo,
};

const DOCUMENT_COLUMNS: &str = "id, type, status, payload, created_at, updated_at, owner_ref";

pub struct SqliteStorage {
    conn: Connection,
    resolver: TypeResolver,
    upgrade: UpgradeReport,
}

impl SqliteStorage {
    /// Opens (or creates) a store and migrates it to the latest schema.
    pub fn open(path: impl AsRef<Path>, resolver: TypeResolver) -> Result<Self, StorageError> {
        Self::open_migrated(Connection::open(path)?, None, resolver)
    }

    pub fn open_with_backup_dir(
        path: impl AsRef<Path>,
        backup_dir: impl AsRef<Path>,
        resolver: TypeResolver,
    ) -> Result<Self, StorageError> {
        Self::open_migrated(
            Connection::open(path)?,
            Some(backup_dir.as_ref()),
            resolver,
        )
    }

    pub fn open_in_memory(resolver: TypeResolver) -> Result<Self, StorageError> {
        Self::open_migrated(Connection::open_in_memory()?, None, resolver)
    }

    /// Opens a store some other handle already migrated. Fails instead of
    /// migrating when the schema version does not match this build.
    pub fn attach(path: impl AsRef<Path>, resolver: TypeResolver) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::configure(&conn)?;
        let current = current_version(&conn)?;
        let expected = highest_version(MIGRATIONS);
        if current != expected {
            return Err(StorageError::SchemaOutdated { current, expected });
        }
        Ok(Self {
            conn,
            resolver,
            upgrade: UpgradeReport {
                from: current,
                to: current,
                applied: Vec::new(),
                backup: None,
            },
        })
    }

    fn open_migrated(
        mut conn: Connection,
        backup_dir: Option<&Path>,
        resolver: TypeResolver,
    ) -> Result<Self, StorageError> {
        crate::schema::configure(&conn)?;
        let mut engine = MigrationEngine::new(&mut conn);
        if let Some(dir) = backup_dir {
            engine = engine.with_backup_dir(dir);
        }
        let upgrade = engine.upgrade(UpgradeTarget::Latest)?;
        Ok(Self {
            conn,
            resolver,
            upgrade,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    /// What the open-time migration did.
    pub fn last_upgrade(&self) -> &UpgradeReport {
        &self.upgrade
    }

    pub fn schema_version(&self) -> Result<u32, StorageError> {
        current_version(&self.conn)
    }

    /// Fills in a missing form type from the content. Read path only; the
    /// stored row is left alone.
    fn ensure_typed(&self, record: &mut DocumentRecord, content: &Content) {
        if !record.form_type.trim().is_empty() {
            return;
        }
        let resolution = self
            .resolver
            .resolve(&ResolutionInput::new(content).with_identifier(record.id.as_str()));
        debug!(
            document = %record.id,
            form_type = %resolution.form_type,
            tier = resolution.tier.as_str(),
            "resolved missing form type"
        );
        record.form_type = resolution.form_type;
    }

    fn document_exists(conn: &Connection, id: &DocumentId) -> Result<bool, StorageError> {
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
            [id.as_str()],
            |row| row.get(0),
        )?)
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}

fn encode(content: &Content) -> Result<(Vec<u8>, String), StorageError> {
    let bytes = content_to_msgpack(content).map_err(StorageError::serialization)?;
    let hash = blake3::hash(&bytes).to_hex().to_string();
    Ok((bytes, hash))
}

fn map_constraint(e: rusqlite::Error, what: impl FnOnce() -> String) -> StorageError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(what())
        }
        e => StorageError::Sqlite(e),
    }
}

/// Raw bytes of a content column. Legacy rows may hold text or nothing.
fn blob_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Vec<u8>>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Blob(b) => Some(b.to_vec()),
        ValueRef::Text(t) => Some(t.to_vec()),
        _ => None,
    })
}

fn read_document(row: &Row) -> rusqlite::Result<(DocumentRecord, Option<Vec<u8>>)> {
    let id: String = row.get(0)?;
    let form_type: Option<String> = row.get(1)?;
    let status: Option<String> = row.get(2)?;
    let owner_ref: Option<String> = row.get(6)?;
    let record = DocumentRecord {
        id: DocumentId::from(id),
        form_type: form_type.unwrap_or_default(),
        status: DocumentStatus::from_stored(status.as_deref().unwrap_or_default()),
        owner_ref: owner_ref.unwrap_or_default(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    };
    Ok((record, blob_column(row, 3)?))
}

fn decode_current(id: &DocumentId, payload: Option<&[u8]>) -> Content {
    let Some(bytes) = payload else {
        return Content::new();
    };
    content_from_msgpack(bytes).unwrap_or_else(|e| {
        warn!(document = %id, error = %e, "undecodable current content, treating as empty");
        Content::new()
    })
}

fn decode_snapshot(
    id: &DocumentId,
    version: u32,
    bytes: &[u8],
    expected_hash: Option<&str>,
) -> Content {
    if let Some(expected) = expected_hash {
        let actual = blake3::hash(bytes).to_hex();
        if actual.as_str() != expected {
            warn!(document = %id, version, "content hash mismatch, treating as empty");
            return Content::new();
        }
    }
    content_from_msgpack(bytes).unwrap_or_else(|e| {
        warn!(document = %id, version, error = %e, "undecodable version content, treating as empty");
        Content::new()
    })
}

fn insert_version(
    tx: &rusqlite::Transaction,
    id: &DocumentId,
    number: u32,
    bytes: &[u8],
    hash: &str,
    at: DateTime<Utc>,
    info: &VersionInfo,
) -> Result<(), StorageError> {
    let version_id = VersionId::generate();
    tx.execute(
        "INSERT INTO document_versions (version_id, document_id, version_number, content, content_hash, created_at, author_ref, comment)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            version_id.as_str(),
            id.as_str(),
            number,
            bytes,
            hash,
            at,
            info.author_ref,
            info.comment,
        ],
    )
    .map_err(|e| map_constraint(e, || format!("version {number} of {id} already exists")))?;
    Ok(())
}

impl DocumentStore for SqliteStorage {
    fn exists(&self, id: &DocumentId) -> Result<bool, StorageError> {
        Self::document_exists(&self.conn, id)
    }

    fn create_with_content(
        &mut self,
        document: &NewDocument,
        content: &Content,
        info: &VersionInfo,
    ) -> Result<DocumentId, StorageError> {
        if document.owner_ref.trim().is_empty() {
            return Err(StorageError::ConstraintViolation(
                "owner_ref is required".into(),
            ));
        }
        let id = match &document.id {
            Some(id) if id.is_empty() => {
                return Err(StorageError::ConstraintViolation(
                    "document id must not be blank".into(),
                ));
            }
            Some(id) => id.clone(),
            None => DocumentId::generate(),
        };
        let (bytes, hash) = encode(content)?;
        let now = Utc::now();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO documents (id, type, status, payload, created_at, updated_at, owner_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
            rusqlite::params![
                id.as_str(),
                document.form_type,
                document.status.as_str(),
                bytes,
                now,
                document.owner_ref,
            ],
        )
        .map_err(|e| map_constraint(e, || format!("document {id} already exists")))?;
        insert_version(&tx, &id, 1, &bytes, &hash, now, info)?;
        tx.commit()?;

        debug!(document = %id, form_type = %document.form_type, "created document");
        Ok(id)
    }

    fn update_with_content(
        &mut self,
        id: &DocumentId,
        content: &Content,
        info: &VersionInfo,
    ) -> Result<u32, StorageError> {
        let (bytes, hash) = encode(content)?;
        let now = Utc::now();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !Self::document_exists(&tx, id)? {
            return Err(StorageError::NotFound(format!("document {id}")));
        }
        let next: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM document_versions WHERE document_id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )?;
        match info.status {
            Some(status) => tx.execute(
                "UPDATE documents SET payload = ?2, updated_at = ?3, status = ?4 WHERE id = ?1",
                rusqlite::params![id.as_str(), bytes, now, status.as_str()],
            )?,
            None => tx.execute(
                "UPDATE documents SET payload = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id.as_str(), bytes, now],
            )?,
        };
        insert_version(&tx, id, next, &bytes, &hash, now, info)?;
        tx.commit()?;

        debug!(document = %id, version = next, "appended version");
        Ok(next)
    }

    fn update_current(
        &mut self,
        id: &DocumentId,
        content: &Content,
        status: DocumentStatus,
    ) -> Result<(), StorageError> {
        let (bytes, _) = encode(content)?;
        let changed = self.conn.execute(
            "UPDATE documents SET payload = ?2, status = ?3, updated_at = ?4 WHERE id = ?1",
            rusqlite::params![id.as_str(), bytes, status.as_str(), Utc::now()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("document {id}")));
        }
        Ok(())
    }

    fn set_status(&mut self, id: &DocumentId, status: DocumentStatus) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id.as_str(), status.as_str(), Utc::now()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("document {id}")));
        }
        Ok(())
    }

    fn find_with_content(
        &self,
        id: &DocumentId,
        version: Option<u32>,
    ) -> Result<Option<StoredDocument>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                [id.as_str()],
                read_document,
            )
            .optional()?;
        let Some((mut record, payload)) = row else {
            return Ok(None);
        };

        let (content, version_number) = match version {
            Some(number) => {
                let snapshot = self
                    .conn
                    .query_row(
                        "SELECT content, content_hash FROM document_versions WHERE document_id = ?1 AND version_number = ?2",
                        rusqlite::params![id.as_str(), number],
                        |row| Ok((blob_column(row, 0)?, row.get::<_, Option<String>>(1)?)),
                    )
                    .optional()?;
                let Some((bytes, hash)) = snapshot else {
                    return Ok(None);
                };
                let content =
                    decode_snapshot(id, number, &bytes.unwrap_or_default(), hash.as_deref());
                (content, Some(number))
            }
            None => {
                let latest: Option<u32> = self.conn.query_row(
                    "SELECT MAX(version_number) FROM document_versions WHERE document_id = ?1",
                    [id.as_str()],
                    |row| row.get(0),
                )?;
                (decode_current(id, payload.as_deref()), latest)
            }
        };

        self.ensure_typed(&mut record, &content);
        Ok(Some(StoredDocument {
            record,
            content,
            version_number,
        }))
    }

    fn find_versions(&self, id: &DocumentId) -> Result<Vec<DocumentVersion>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT version_id, version_number, content, content_hash, created_at, author_ref, comment
             FROM document_versions WHERE document_id = ?1 ORDER BY version_number ASC",
        )?;
        let rows = stmt.query_map([id.as_str()], |row| {
            let version_id: String = row.get(0)?;
            let number: u32 = row.get(1)?;
            let content = blob_column(row, 2)?;
            let hash: Option<String> = row.get(3)?;
            let created_at: DateTime<Utc> = row.get(4)?;
            let author_ref: Option<String> = row.get(5)?;
            let comment: Option<String> = row.get(6)?;
            Ok((version_id, number, content, hash, created_at, author_ref, comment))
        })?;

        let mut versions = Vec::new();
        for row in rows {
            let (version_id, number, content, hash, created_at, author_ref, comment) = row?;
            versions.push(DocumentVersion {
                version_id: VersionId::from(version_id),
                document_id: id.clone(),
                version_number: number,
                content: decode_snapshot(id, number, &content.unwrap_or_default(), hash.as_deref()),
                created_at,
                author_ref,
                comment,
            });
        }
        Ok(versions)
    }

    fn delete_cascade(&mut self, id: &DocumentId) -> Result<bool, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let attachments = tx.execute("DELETE FROM attachments WHERE document_id = ?1", [id.as_str()])?;
        let versions = tx.execute(
            "DELETE FROM document_versions WHERE document_id = ?1",
            [id.as_str()],
        )?;
        let documents = tx.execute("DELETE FROM documents WHERE id = ?1", [id.as_str()])?;
        tx.commit()?;

        debug!(document = %id, attachments, versions, "deleted document");
        Ok(documents > 0)
    }

    fn find_by(&self, filter: &DocumentFilter) -> Result<Vec<DocumentRecord>, StorageError> {
        let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE 1 = 1");
        let mut params: Vec<String> = Vec::new();
        if let Some(owner) = &filter.owner_ref {
            params.push(owner.clone());
            sql.push_str(&format!(" AND owner_ref = ?{}", params.len()));
        }
        if let Some(form_type) = &filter.form_type {
            // Untyped rows are resolved below and kept if they match.
            params.push(form_type.clone());
            sql.push_str(&format!(
                " AND (type = ?{} OR type = '' OR type IS NULL)",
                params.len()
            ));
        }
        if let Some(status) = filter.status {
            params.push(status.as_str().to_string());
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY updated_at DESC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), read_document)?;

        let mut records = Vec::new();
        for row in rows {
            let (mut record, payload) = row?;
            if record.form_type.trim().is_empty() {
                let content = decode_current(&record.id, payload.as_deref());
                self.ensure_typed(&mut record, &content);
            }
            if filter
                .form_type
                .as_ref()
                .is_some_and(|wanted| *wanted != record.form_type)
            {
                continue;
            }
            records.push(record);
            if filter.limit.is_some_and(|limit| records.len() >= limit) {
                break;
            }
        }
        Ok(records)
    }

    fn add_attachment(
        &mut self,
        id: &DocumentId,
        attachment: &NewAttachment,
    ) -> Result<AttachmentId, StorageError> {
        if !Self::document_exists(&self.conn, id)? {
            return Err(StorageError::NotFound(format!("document {id}")));
        }
        let size = i64::try_from(attachment.size).map_err(|_| {
            StorageError::ConstraintViolation(format!(
                "attachment size {} out of range",
                attachment.size
            ))
        })?;
        let attachment_id = AttachmentId::generate();
        self.conn.execute(
            "INSERT INTO attachments (id, document_id, filename, path, size, mime_type, uploaded_at, uploader_ref, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                attachment_id.as_str(),
                id.as_str(),
                attachment.filename,
                attachment.path,
                size,
                attachment.mime_type,
                Utc::now(),
                attachment.uploader_ref,
                attachment.description,
            ],
        )?;
        Ok(attachment_id)
    }

    fn attachments(&self, id: &DocumentId) -> Result<Vec<AttachmentRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, filename, path, size, mime_type, uploaded_at, uploader_ref, description
             FROM attachments WHERE document_id = ?1 ORDER BY uploaded_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([id.as_str()], |row| {
            let attachment_id: String = row.get(0)?;
            let size: i64 = row.get(3)?;
            Ok(AttachmentRecord {
                id: AttachmentId::from(attachment_id),
                document_id: id.clone(),
                filename: row.get(1)?,
                path: row.get(2)?,
                size: u64::try_from(size).unwrap_or_default(),
                mime_type: row.get(4)?,
                uploaded_at: row.get(5)?,
                uploader_ref: row.get(6)?,
                description: row.get(7)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
