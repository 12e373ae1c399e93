use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown document status: {0:?}")]
    UnknownStatus(String),

    #[error("unknown form type: {0}")]
    UnknownFormType(String),

    #[error("field {field} of {form_type} expects {expected}")]
    FieldType {
        form_type: String,
        field: String,
        expected: &'static str,
    },

    #[error("invalid pattern for {form_type}: {source}")]
    InvalidPattern {
        form_type: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid data: {0}")]
    InvalidData(String),
}
