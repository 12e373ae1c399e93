use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A document's key→value content.
pub type Content = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(i64),
    List(Vec<FieldValue>),
    Record(BTreeMap<String, FieldValue>),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b).is_eq(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl FieldValue {
    /// Null, blank text and empty collections count as "not filled in".
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Record(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Visit every text value, descending into lists and records.
    pub fn for_each_text<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            FieldValue::Text(s) => f(s),
            FieldValue::List(items) => items.iter().for_each(|v| v.for_each_text(f)),
            FieldValue::Record(map) => map.values().for_each(|v| v.for_each_text(f)),
            _ => {}
        }
    }
}

pub fn content_to_msgpack(content: &Content) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec(content)
}

pub fn content_from_msgpack(bytes: &[u8]) -> Result<Content, rmp_serde::decode::Error> {
    rmp_serde::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emptiness_covers_blank_text_and_collections() {
        assert!(FieldValue::Null.is_empty());
        assert!(FieldValue::Text("   ".into()).is_empty());
        assert!(FieldValue::List(vec![]).is_empty());
        assert!(!FieldValue::Text("x".into()).is_empty());
        assert!(!FieldValue::Integer(0).is_empty());
    }

    #[test]
    fn nested_content_survives_msgpack() {
        let mut row = BTreeMap::new();
        row.insert("time".to_string(), FieldValue::Text("0800".into()));
        row.insert("activity".to_string(), FieldValue::Text("Briefing".into()));
        let mut content = Content::new();
        content.insert("activity_log".into(), FieldValue::List(vec![FieldValue::Record(row)]));
        content.insert("ratio".into(), FieldValue::Float(0.5));

        let bytes = content_to_msgpack(&content).unwrap();
        assert_eq!(content_from_msgpack(&bytes).unwrap(), content);
    }

    #[test]
    fn for_each_text_descends_into_rows() {
        let value = FieldValue::List(vec![
            FieldValue::Text("a".into()),
            FieldValue::Record(BTreeMap::from([("k".to_string(), FieldValue::Text("b".into()))])),
            FieldValue::Integer(3),
        ]);
        let mut seen = Vec::new();
        value.for_each_text(&mut |s| seen.push(s));
        assert_eq!(seen, vec!["a", "b"]);
    }
}
