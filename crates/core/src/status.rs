use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Draft,
    /// Signed off by the approving officer. Older releases wrote `approved`.
    Finalized,
    Transmitted,
    Received,
    Replied,
    Reviewed,
    Archived,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 7] = [
        Self::Draft,
        Self::Finalized,
        Self::Transmitted,
        Self::Received,
        Self::Replied,
        Self::Reviewed,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Finalized => "finalized",
            Self::Transmitted => "transmitted",
            Self::Received => "received",
            Self::Replied => "replied",
            Self::Reviewed => "reviewed",
            Self::Archived => "archived",
        }
    }

    /// Strict codec: anything that is not a status name is an error.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "finalized" | "approved" => Ok(Self::Finalized),
            "transmitted" => Ok(Self::Transmitted),
            "received" => Ok(Self::Received),
            "replied" => Ok(Self::Replied),
            "reviewed" => Ok(Self::Reviewed),
            "archived" => Ok(Self::Archived),
            _ => Err(CoreError::UnknownStatus(s.to_string())),
        }
    }

    /// Canonical status for a known name or a legacy alias (`final`, `sent`)
    /// written by older releases.
    pub fn recognize(s: &str) -> Option<Self> {
        if let Ok(status) = Self::parse(s) {
            return Some(status);
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "final" => Some(Self::Finalized),
            "sent" => Some(Self::Transmitted),
            _ => None,
        }
    }

    /// Codec for values read back from storage.
    ///
    /// Legacy aliases map to their canonical status. Empty values and values
    /// no release ever defined fall back to `Draft` so the document stays
    /// loadable. This is the only lenient path; `parse` stays strict.
    pub fn from_stored(s: &str) -> Self {
        Self::recognize(s).unwrap_or_else(|| {
            if !s.trim().is_empty() {
                tracing::warn!(status = s, "unrecognized stored status, treating as draft");
            }
            Self::Draft
        })
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_round_trip() {
        for status in DocumentStatus::ALL {
            assert_eq!(DocumentStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn strict_parse_rejects_unknown() {
        assert!(matches!(
            DocumentStatus::parse("pending"),
            Err(CoreError::UnknownStatus(s)) if s == "pending"
        ));
        assert!(DocumentStatus::parse("sent").is_err());
    }

    #[test]
    fn approved_is_an_accepted_name_for_finalized() {
        assert_eq!(DocumentStatus::parse("APPROVED").unwrap(), DocumentStatus::Finalized);
    }

    #[test]
    fn recognize_knows_legacy_aliases_only() {
        assert_eq!(DocumentStatus::recognize("Sent"), Some(DocumentStatus::Transmitted));
        assert_eq!(DocumentStatus::recognize("approved"), Some(DocumentStatus::Finalized));
        assert_eq!(DocumentStatus::recognize("weird"), None);
    }

    #[test]
    fn stored_values_fall_back_to_draft() {
        assert_eq!(DocumentStatus::from_stored("sent"), DocumentStatus::Transmitted);
        assert_eq!(DocumentStatus::from_stored("final"), DocumentStatus::Finalized);
        assert_eq!(DocumentStatus::from_stored(""), DocumentStatus::Draft);
        assert_eq!(DocumentStatus::from_stored("weird"), DocumentStatus::Draft);
        assert_eq!(DocumentStatus::from_stored("archived"), DocumentStatus::Archived);
    }
}
