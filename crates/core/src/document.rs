use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::field_value::{Content, FieldValue};
use crate::ids::DocumentId;
use crate::payload::FormPayload;
use crate::status::DocumentStatus;

/// The in-memory, editable copy of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub form_type: String,
    pub status: DocumentStatus,
    pub fields: Content,
    pub owner_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Version number the content was loaded from; `None` until first saved.
    pub version: Option<u32>,
}

/// Something on a document that an edit can change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Property {
    Field(String),
    Status,
    FormType,
}

impl Property {
    pub fn field(name: &str) -> Self {
        Self::Field(name.to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Field(name) => name,
            Self::Status => "status",
            Self::FormType => "form_type",
        }
    }
}

impl Document {
    pub fn new(form_type: &str, owner_ref: &str) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::generate(),
            form_type: form_type.to_string(),
            status: DocumentStatus::Draft,
            fields: Content::new(),
            owner_ref: owner_ref.to_string(),
            created_at: now,
            updated_at: now,
            version: None,
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Current value of a property. Status and form type read as text.
    pub fn get(&self, property: &Property) -> Option<FieldValue> {
        match property {
            Property::Field(key) => self.fields.get(key).cloned(),
            Property::Status => Some(FieldValue::Text(self.status.as_str().to_string())),
            Property::FormType => Some(FieldValue::Text(self.form_type.clone())),
        }
    }

    /// Write a property directly, returning the previous value.
    ///
    /// `None` removes a field. Status and form type cannot be removed and
    /// only accept text; status text goes through the strict codec.
    pub fn set(
        &mut self,
        property: &Property,
        value: Option<FieldValue>,
    ) -> Result<Option<FieldValue>, CoreError> {
        let previous = self.get(property);
        match (property, value) {
            (Property::Field(key), Some(v)) => {
                self.fields.insert(key.clone(), v);
            }
            (Property::Field(key), None) => {
                self.fields.remove(key);
            }
            (Property::Status, Some(FieldValue::Text(s))) => {
                self.status = DocumentStatus::parse(&s)?;
            }
            (Property::FormType, Some(FieldValue::Text(s))) => {
                self.form_type = s;
            }
            (other, _) => {
                return Err(CoreError::InvalidData(format!(
                    "{} only accepts a text value",
                    other.name()
                )));
            }
        }
        Ok(previous)
    }

    /// Typed view of the content for this document's form type.
    pub fn payload(&self) -> Result<FormPayload, CoreError> {
        FormPayload::from_content(&self.form_type, &self.fields)
    }
}
