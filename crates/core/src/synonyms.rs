//! Field-name normalization.
//!
//! Payloads written by older releases, or imported from other tools, use
//! their own vocabulary for the same form fields. Keys are folded to
//! lowercase snake_case and then mapped through a fixed synonym table before
//! any matching happens.

use crate::field_value::Content;

const SYNONYMS: &[(&str, &str)] = &[
    // ICS-213
    ("sender", "from"),
    ("originator", "from"),
    ("from_name", "from"),
    ("recipient", "to"),
    ("addressee", "to"),
    ("to_name", "to"),
    ("subj", "subject"),
    ("re", "subject"),
    ("body", "message"),
    ("msg", "message"),
    ("message_text", "message"),
    ("response", "reply"),
    ("reply_text", "reply"),
    ("approver", "approved_by"),
    // ICS-214 / ICS-205
    ("incident", "incident_name"),
    ("incident_title", "incident_name"),
    ("op_period", "operational_period"),
    ("period", "operational_period"),
    ("activities", "activity_log"),
    ("log_entries", "activity_log"),
    ("personnel", "personnel_list"),
    ("resources_assigned", "personnel_list"),
    ("unit", "unit_name"),
    ("leader", "unit_leader"),
    ("frequencies", "channels"),
    ("channel_list", "channels"),
    // type hints
    ("formtype", "form_type"),
    ("document_type", "form_type"),
    ("doc_type", "form_type"),
];

/// Fold a key to lowercase snake_case without applying synonyms.
pub fn fold_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Canonical name for a field key.
pub fn canonical_key(key: &str) -> String {
    let folded = fold_key(key);
    SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == folded)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(folded)
}

/// Rewrite every top-level key to its canonical name.
///
/// When both an alias and its canonical key are present, the canonical
/// key's value is kept.
pub fn normalize_keys(content: &Content) -> Content {
    let mut out = Content::new();
    let mut from_alias = Vec::new();
    for (key, value) in content {
        let canonical = canonical_key(key);
        if canonical == fold_key(key) {
            out.insert(canonical, value.clone());
        } else {
            from_alias.push((canonical, value.clone()));
        }
    }
    for (canonical, value) in from_alias {
        out.entry(canonical).or_insert(value);
    }
    out
}
