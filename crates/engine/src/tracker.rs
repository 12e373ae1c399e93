//! Undo/redo for one document in one editing session.
//!
//! The tracker owns the document while it is being edited. Edits go through
//! [`ChangeTracker::set`] and are recorded; undo and redo write the recorded
//! values straight into the document so they are never recorded again.
//! Listeners are plain callbacks and hold no handle back to the tracker, so
//! they cannot trigger a nested edit while a notification is in flight.
//!
//! Not `Send`: a tracker belongs to the thread that drives the editor.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use formledger_core::{Document, DocumentStatus, FieldValue, Property};

use crate::config::DEFAULT_UNDO_DEPTH;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub property: Property,
    pub old_value: Option<FieldValue>,
    pub new_value: Option<FieldValue>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Edit,
    Undo,
    Redo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub record: ChangeRecord,
    pub origin: ChangeOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ChangeEvent)>;

pub struct ChangeTracker {
    document: Document,
    undo_stack: VecDeque<ChangeRecord>,
    redo_stack: Vec<ChangeRecord>,
    max_depth: usize,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl ChangeTracker {
    pub fn new(document: Document) -> Self {
        Self::with_max_depth(document, DEFAULT_UNDO_DEPTH)
    }

    pub fn with_max_depth(document: Document, max_depth: usize) -> Self {
        Self {
            document,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Write access that bypasses recording. Used by the engine to stamp
    /// save results (version, timestamps) onto the document.
    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ChangeEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Records and applies an edit. Returns `false` when the property already
    /// held `value`, in which case nothing is recorded. Status text is
    /// recorded in its canonical spelling.
    pub fn set(&mut self, property: Property, value: Option<FieldValue>) -> Result<bool, EngineError> {
        let value = match (&property, value) {
            (Property::Status, Some(FieldValue::Text(s))) => {
                Some(FieldValue::from(DocumentStatus::parse(&s)?.as_str()))
            }
            (_, value) => value,
        };
        if self.document.get(&property) == value {
            return Ok(false);
        }
        let old_value = self.document.set(&property, value.clone())?;
        let record = ChangeRecord {
            property,
            old_value,
            new_value: value,
            timestamp: Utc::now(),
        };

        self.push_undo(record.clone());
        self.redo_stack.clear();
        self.notify(record, ChangeOrigin::Edit);
        Ok(true)
    }

    pub fn set_field(&mut self, key: &str, value: impl Into<FieldValue>) -> Result<bool, EngineError> {
        self.set(Property::field(key), Some(value.into()))
    }

    pub fn remove_field(&mut self, key: &str) -> Result<bool, EngineError> {
        self.set(Property::field(key), None)
    }

    /// Reverts the most recent edit. Returns `false` if there was none.
    pub fn undo(&mut self) -> Result<bool, EngineError> {
        let Some(record) = self.undo_stack.pop_back() else {
            return Ok(false);
        };
        if let Err(e) = self.document.set(&record.property, record.old_value.clone()) {
            self.undo_stack.push_back(record);
            return Err(e.into());
        }
        self.redo_stack.push(record.clone());
        self.notify(record, ChangeOrigin::Undo);
        Ok(true)
    }

    /// Re-applies the most recently undone edit. Returns `false` if there
    /// was none.
    pub fn redo(&mut self) -> Result<bool, EngineError> {
        let Some(record) = self.redo_stack.pop() else {
            return Ok(false);
        };
        if let Err(e) = self.document.set(&record.property, record.new_value.clone()) {
            self.redo_stack.push(record);
            return Err(e.into());
        }
        self.push_undo(record.clone());
        self.notify(record, ChangeOrigin::Redo);
        Ok(true)
    }

    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    fn push_undo(&mut self, record: ChangeRecord) {
        self.undo_stack.push_back(record);
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
    }

    fn notify(&mut self, record: ChangeRecord, origin: ChangeOrigin) {
        if self.listeners.is_empty() {
            return;
        }
        let event = ChangeEvent { record, origin };
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("document", &self.document.id)
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn tracker() -> ChangeTracker {
        ChangeTracker::new(Document::new("ics213", "ops"))
    }

    fn subject(t: &ChangeTracker) -> Option<&str> {
        t.document().field("subject").and_then(FieldValue::as_text)
    }

    #[test]
    fn undo_walks_back_through_edits() {
        let mut t = tracker();
        t.set_field("subject", "V0").unwrap();
        t.clear_history();
        t.set_field("subject", "V1").unwrap();
        t.set_field("subject", "V2").unwrap();

        assert!(t.undo().unwrap());
        assert_eq!(subject(&t), Some("V1"));
        assert!(t.undo().unwrap());
        assert_eq!(subject(&t), Some("V0"));
        assert!(!t.undo().unwrap());

        assert!(t.redo().unwrap());
        assert!(t.redo().unwrap());
        assert_eq!(subject(&t), Some("V2"));
        assert!(!t.redo().unwrap());
    }

    #[test]
    fn fresh_edit_clears_redo() {
        let mut t = tracker();
        t.set_field("subject", "V1").unwrap();
        t.set_field("subject", "V2").unwrap();
        t.undo().unwrap();
        assert!(t.can_redo());

        t.set_field("subject", "V3").unwrap();
        assert!(!t.can_redo());
        assert!(!t.redo().unwrap());
        assert_eq!(subject(&t), Some("V3"));
    }

    #[test]
    fn undo_and_redo_do_not_record() {
        let mut t = tracker();
        t.set_field("subject", "V1").unwrap();
        t.undo().unwrap();
        assert_eq!(t.undo_depth(), 0);
        assert_eq!(t.redo_depth(), 1);
        t.redo().unwrap();
        assert_eq!(t.undo_depth(), 1);
        assert_eq!(t.redo_depth(), 0);
    }

    #[test]
    fn oldest_edit_is_evicted_at_capacity() {
        let mut t = tracker();
        for i in 0..(DEFAULT_UNDO_DEPTH + 5) {
            t.set_field("count", FieldValue::Integer(i as i64)).unwrap();
        }
        assert_eq!(t.undo_depth(), DEFAULT_UNDO_DEPTH);
        while t.undo().unwrap() {}
        assert_eq!(t.document().field("count"), Some(&FieldValue::Integer(4)));
    }

    #[test]
    fn same_value_is_not_recorded() {
        let mut t = tracker();
        t.set_field("subject", "Water").unwrap();
        assert!(!t.set_field("subject", "Water").unwrap());
        assert_eq!(t.undo_depth(), 1);
    }

    #[test]
    fn removed_field_comes_back_on_undo() {
        let mut t = tracker();
        t.set_field("subject", "Water").unwrap();
        t.remove_field("subject").unwrap();
        assert_eq!(subject(&t), None);
        t.undo().unwrap();
        assert_eq!(subject(&t), Some("Water"));
    }

    #[test]
    fn status_edits_are_tracked() {
        let mut t = tracker();
        t.set(Property::Status, Some("finalized".into())).unwrap();
        assert_eq!(t.document().status, DocumentStatus::Finalized);
        t.undo().unwrap();
        assert_eq!(t.document().status, DocumentStatus::Draft);
    }

    #[test]
    fn status_aliases_compare_canonically() {
        let mut t = tracker();
        t.set(Property::Status, Some("finalized".into())).unwrap();
        assert!(!t.set(Property::Status, Some("APPROVED".into())).unwrap());
        assert_eq!(t.undo_depth(), 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        t.subscribe(move |event| sink.borrow_mut().push(event.record.new_value.clone()));
        t.set(Property::Status, Some(" Transmitted ".into())).unwrap();
        assert_eq!(*seen.borrow(), vec![Some(FieldValue::from("transmitted"))]);
    }

    #[test]
    fn rejected_status_leaves_history_alone() {
        let mut t = tracker();
        assert!(t.set(Property::Status, Some("bogus".into())).is_err());
        assert!(!t.can_undo());
    }

    #[test]
    fn listeners_see_every_origin() {
        let mut t = tracker();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = t.subscribe(move |event| sink.borrow_mut().push(event.origin));

        t.set_field("subject", "V1").unwrap();
        t.undo().unwrap();
        t.redo().unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![ChangeOrigin::Edit, ChangeOrigin::Undo, ChangeOrigin::Redo]
        );

        assert!(t.unsubscribe(id));
        t.set_field("subject", "V2").unwrap();
        assert_eq!(seen.borrow().len(), 3);
    }
}
