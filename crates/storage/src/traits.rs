use chrono::{DateTime, Utc};

use formledger_core::{AttachmentId, Content, DocumentId, DocumentStatus, VersionId};

use crate::error::StorageError;

/// Header row of a document, without content.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub form_type: String,
    pub status: DocumentStatus,
    pub owner_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A document header together with one decoded content snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub record: DocumentRecord,
    pub content: Content,
    /// Version the content was read from. `None` for legacy rows that were
    /// never versioned.
    pub version_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVersion {
    pub version_id: VersionId,
    pub document_id: DocumentId,
    pub version_number: u32,
    pub content: Content,
    pub created_at: DateTime<Utc>,
    pub author_ref: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Caller-supplied id; generated when absent.
    pub id: Option<DocumentId>,
    pub form_type: String,
    pub status: DocumentStatus,
    pub owner_ref: String,
}

impl NewDocument {
    pub fn new(form_type: &str, owner_ref: &str) -> Self {
        Self {
            id: None,
            form_type: form_type.to_string(),
            status: DocumentStatus::Draft,
            owner_ref: owner_ref.to_string(),
        }
    }

    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }
}

/// Provenance recorded on a new version.
#[derive(Debug, Clone, Default)]
pub struct VersionInfo {
    pub author_ref: Option<String>,
    pub comment: Option<String>,
    /// Status written together with the version by `update_with_content`.
    /// `None` leaves the stored status alone.
    pub status: Option<DocumentStatus>,
}

impl VersionInfo {
    pub fn by(author_ref: &str) -> Self {
        Self {
            author_ref: Some(author_ref.to_string()),
            ..Self::default()
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRecord {
    pub id: AttachmentId,
    pub document_id: DocumentId,
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub uploader_ref: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAttachment {
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub uploader_ref: Option<String>,
    pub description: Option<String>,
}

/// Metadata filter for [`DocumentStore::find_by`]. Empty matches everything.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub owner_ref: Option<String>,
    pub form_type: Option<String>,
    pub status: Option<DocumentStatus>,
    pub limit: Option<usize>,
}

impl DocumentFilter {
    pub fn owner(mut self, owner_ref: &str) -> Self {
        self.owner_ref = Some(owner_ref.to_string());
        self
    }

    pub fn form_type(mut self, form_type: &str) -> Self {
        self.form_type = Some(form_type.to_string());
        self
    }

    pub fn status(mut self, status: DocumentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Versioned document persistence.
///
/// Every content write through `create_with_content` or
/// `update_with_content` appends an immutable version; existing versions are
/// never modified. Lookups of absent documents return `Ok(None)` or an empty
/// list rather than an error.
pub trait DocumentStore {
    fn exists(&self, id: &DocumentId) -> Result<bool, StorageError>;

    /// Inserts the document row and version 1 atomically.
    fn create_with_content(
        &mut self,
        document: &NewDocument,
        content: &Content,
        info: &VersionInfo,
    ) -> Result<DocumentId, StorageError>;

    /// Appends version `max + 1` and refreshes the current state (and the
    /// status, when `info` carries one) in one transaction. A row with no
    /// versions yet starts its history at 1. Returns the new version number.
    fn update_with_content(
        &mut self,
        id: &DocumentId,
        content: &Content,
        info: &VersionInfo,
    ) -> Result<u32, StorageError>;

    /// Overwrites the current state without recording a version.
    fn update_current(
        &mut self,
        id: &DocumentId,
        content: &Content,
        status: DocumentStatus,
    ) -> Result<(), StorageError>;

    fn set_status(&mut self, id: &DocumentId, status: DocumentStatus) -> Result<(), StorageError>;

    /// Current state when `version` is `None`, otherwise that exact snapshot.
    fn find_with_content(
        &self,
        id: &DocumentId,
        version: Option<u32>,
    ) -> Result<Option<StoredDocument>, StorageError>;

    /// All versions, ascending.
    fn find_versions(&self, id: &DocumentId) -> Result<Vec<DocumentVersion>, StorageError>;

    /// Removes attachments, versions and the document in one transaction.
    /// Returns whether a document was removed.
    fn delete_cascade(&mut self, id: &DocumentId) -> Result<bool, StorageError>;

    /// Most recently updated first.
    fn find_by(&self, filter: &DocumentFilter) -> Result<Vec<DocumentRecord>, StorageError>;

    fn add_attachment(
        &mut self,
        id: &DocumentId,
        attachment: &NewAttachment,
    ) -> Result<AttachmentId, StorageError>;

    fn attachments(&self, id: &DocumentId) -> Result<Vec<AttachmentRecord>, StorageError>;
}
