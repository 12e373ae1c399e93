use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;

use formledger_core::field_value::content_to_msgpack;
use formledger_core::{Content, DocumentId, DocumentStatus, FieldValue};
use formledger_harness::{message_content, TestWorkspace, TestWriters};
use formledger_storage::{
    DocumentFilter, DocumentStore, NewAttachment, NewDocument, StorageError, VersionInfo,
};

fn revision(n: usize) -> Content {
    message_content(
        "Logistics",
        "Planning",
        &format!("Water resupply r{n}"),
        &format!("Revision {n} of the request"),
    )
}

// ============================================================================
// Append-only history
// ============================================================================

#[test]
fn round_trip_returns_the_stored_content() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let mut content = revision(0);
    content.insert("priority".into(), FieldValue::Integer(2));
    content.insert(
        "copies".into(),
        FieldValue::List(vec!["Finance".into(), "Command".into()]),
    );

    let id = store.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &content,
        &VersionInfo::by("radio-1").with_comment("initial"),
    )?;
    let found = store.find_with_content(&id, None)?.ok_or("document missing")?;
    assert_eq!(found.content, content);
    assert_eq!(found.version_number, Some(1));
    assert_eq!(found.record.form_type, "ics213");
    assert_eq!(found.record.owner_ref, "ops");
    assert_eq!(found.record.status, DocumentStatus::Draft);

    let versions = store.find_versions(&id)?;
    assert_eq!(versions[0].author_ref.as_deref(), Some("radio-1"));
    assert_eq!(versions[0].comment.as_deref(), Some("initial"));
    Ok(())
}

#[test]
fn every_update_appends_exactly_one_version() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let id = store.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &revision(0),
        &VersionInfo::default(),
    )?;

    const UPDATES: usize = 6;
    for n in 1..=UPDATES {
        let number = store.update_with_content(&id, &revision(n), &VersionInfo::default())?;
        assert_eq!(number as usize, n + 1);
    }

    let versions = store.find_versions(&id)?;
    let numbers: Vec<u32> = versions.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, (1..=UPDATES as u32 + 1).collect::<Vec<_>>());

    for (k, version) in versions.iter().enumerate() {
        assert_eq!(version.content, revision(k));
        let snapshot = store
            .find_with_content(&id, Some(version.version_number))?
            .ok_or("snapshot missing")?;
        assert_eq!(snapshot.content, revision(k));
    }

    let current = store.find_with_content(&id, None)?.ok_or("document missing")?;
    assert_eq!(current.content, revision(UPDATES));
    assert_eq!(current.version_number, Some(UPDATES as u32 + 1));
    Ok(())
}

#[test]
fn unknown_document_or_version_is_none() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    assert!(store.find_with_content(&DocumentId::from("ghost"), None)?.is_none());
    assert!(store.find_versions(&DocumentId::from("ghost"))?.is_empty());

    let id = store.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &revision(0),
        &VersionInfo::default(),
    )?;
    assert!(store.find_with_content(&id, Some(2))?.is_none());
    Ok(())
}

#[test]
fn caller_supplied_ids_are_kept() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let legacy = DocumentId::from("ics213-0042");
    let id = store.create_with_content(
        &NewDocument::new("ics213", "ops").with_id(legacy.clone()),
        &revision(0),
        &VersionInfo::default(),
    )?;
    assert_eq!(id, legacy);
    assert!(store.find_with_content(&legacy, None)?.is_some());
    Ok(())
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn cascade_delete_removes_every_version_and_attachment() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let id = store.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &revision(0),
        &VersionInfo::default(),
    )?;
    store.update_with_content(&id, &revision(1), &VersionInfo::default())?;
    store.add_attachment(
        &id,
        &NewAttachment {
            filename: "map.pdf".into(),
            path: "attachments/map.pdf".into(),
            size: 52_000,
            mime_type: Some("application/pdf".into()),
            ..Default::default()
        },
    )?;
    assert_eq!(store.attachments(&id)?.len(), 1);

    assert!(store.delete_cascade(&id)?);
    for version in [None, Some(1), Some(2)] {
        assert!(store.find_with_content(&id, version)?.is_none());
    }
    assert!(store.find_versions(&id)?.is_empty());
    assert!(store.attachments(&id)?.is_empty());

    assert!(!store.delete_cascade(&id)?);
    Ok(())
}

#[test]
fn attachments_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let id = store.create_with_content(
        &NewDocument::new("ics205", "comms"),
        &Content::new(),
        &VersionInfo::default(),
    )?;
    let attachment_id = store.add_attachment(
        &id,
        &NewAttachment {
            filename: "repeaters.csv".into(),
            path: "attachments/repeaters.csv".into(),
            size: 812,
            mime_type: Some("text/csv".into()),
            uploader_ref: Some("comms-l".into()),
            description: Some("Repeater inventory".into()),
        },
    )?;

    let attachments = store.attachments(&id)?;
    assert_eq!(attachments.len(), 1);
    let stored = &attachments[0];
    assert_eq!(stored.id, attachment_id);
    assert_eq!(stored.filename, "repeaters.csv");
    assert_eq!(stored.size, 812);
    assert_eq!(stored.uploader_ref.as_deref(), Some("comms-l"));
    Ok(())
}

#[test]
fn oversized_attachment_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let id = store.create_with_content(
        &NewDocument::new("ics205", "comms"),
        &Content::new(),
        &VersionInfo::default(),
    )?;
    let err = store
        .add_attachment(
            &id,
            &NewAttachment {
                filename: "huge.bin".into(),
                path: "attachments/huge.bin".into(),
                size: u64::MAX,
                ..NewAttachment::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)));
    assert!(store.attachments(&id)?.is_empty());
    Ok(())
}

// ============================================================================
// Legacy rows
// ============================================================================

#[test]
fn legacy_text_version_ids_are_listed() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let body = revision(0);
    let bytes = content_to_msgpack(&body)?;
    let now = Utc::now();
    store.conn().execute(
        "INSERT INTO documents (id, type, status, payload, created_at, updated_at, owner_ref)
         VALUES ('ics213-0042', 'ics213', 'draft', ?1, ?2, ?2, 'ops')",
        rusqlite::params![bytes, now],
    )?;
    store.conn().execute(
        "INSERT INTO document_versions (version_id, document_id, version_number, content, created_at)
         VALUES ('legacy-v1', 'ics213-0042', 1, ?1, ?2)",
        rusqlite::params![bytes, now],
    )?;

    let id = DocumentId::from("ics213-0042");
    let versions = store.find_versions(&id)?;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_id.as_str(), "legacy-v1");
    assert_eq!(versions[0].content, body);

    assert_eq!(store.update_with_content(&id, &revision(1), &VersionInfo::default())?, 2);
    assert_eq!(store.find_versions(&id)?.len(), 2);
    Ok(())
}

// ============================================================================
// Status and listing
// ============================================================================

#[test]
fn versioned_update_can_carry_a_status() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let id = store.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &revision(0),
        &VersionInfo::default(),
    )?;
    let info = VersionInfo::by("radio-1").with_status(DocumentStatus::Finalized);
    assert_eq!(store.update_with_content(&id, &revision(1), &info)?, 2);

    let found = store.find_with_content(&id, None)?.ok_or("document missing")?;
    assert_eq!(found.record.status, DocumentStatus::Finalized);

    // A failed append leaves the status untouched.
    store.conn().execute_batch(
        "CREATE TRIGGER reject_versions BEFORE INSERT ON document_versions
         BEGIN SELECT RAISE(ABORT, 'history is read-only'); END",
    )?;
    let archive = VersionInfo::default().with_status(DocumentStatus::Archived);
    assert!(store.update_with_content(&id, &revision(2), &archive).is_err());
    let found = store.find_with_content(&id, None)?.ok_or("document missing")?;
    assert_eq!(found.record.status, DocumentStatus::Finalized);
    assert_eq!(found.content, revision(1));
    Ok(())
}

#[test]
fn status_changes_do_not_add_versions() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let id = store.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &revision(0),
        &VersionInfo::default(),
    )?;
    store.set_status(&id, DocumentStatus::Transmitted)?;

    let found = store.find_with_content(&id, None)?.ok_or("document missing")?;
    assert_eq!(found.record.status, DocumentStatus::Transmitted);
    assert_eq!(store.find_versions(&id)?.len(), 1);

    let err = store
        .set_status(&DocumentId::from("ghost"), DocumentStatus::Archived)
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
    Ok(())
}

#[test]
fn unknown_stored_status_reads_as_draft() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let id = store.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &revision(0),
        &VersionInfo::default(),
    )?;
    store.conn().execute(
        "UPDATE documents SET status = 'pending-review' WHERE id = ?1",
        [id.as_str()],
    )?;
    let found = store.find_with_content(&id, None)?.ok_or("document missing")?;
    assert_eq!(found.record.status, DocumentStatus::Draft);
    Ok(())
}

#[test]
fn corrupt_snapshot_decodes_to_empty_content() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let id = store.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &revision(0),
        &VersionInfo::default(),
    )?;
    store.update_with_content(&id, &revision(1), &VersionInfo::default())?;
    store.conn().execute(
        "UPDATE document_versions SET content = x'c1c1c1', content_hash = NULL
         WHERE document_id = ?1 AND version_number = 1",
        [id.as_str()],
    )?;

    let broken = store.find_with_content(&id, Some(1))?.ok_or("v1 missing")?;
    assert!(broken.content.is_empty());
    let newer = store.find_with_content(&id, Some(2))?.ok_or("v2 missing")?;
    assert_eq!(newer.content, revision(1));
    Ok(())
}

#[test]
fn find_by_filters_on_owner_type_and_status() -> Result<(), Box<dyn std::error::Error>> {
    let ws = TestWorkspace::new()?;
    let mut store = ws.storage()?;
    let log_body: Content = [
        ("incident_name", FieldValue::from("Ridge Fire")),
        ("operational_period", FieldValue::from("0600-1800")),
        ("activity_log", FieldValue::List(vec!["0630 briefing".into()])),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let msg = store.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &revision(0),
        &VersionInfo::default(),
    )?;
    let log = store.create_with_content(
        &NewDocument::new("ics214", "ops"),
        &log_body,
        &VersionInfo::default(),
    )?;
    let untyped = store.create_with_content(
        &NewDocument::new("", "ops"),
        &log_body,
        &VersionInfo::default(),
    )?;
    let other = store.create_with_content(
        &NewDocument::new("ics213", "plans").with_status(DocumentStatus::Finalized),
        &revision(1),
        &VersionInfo::default(),
    )?;

    let all = store.find_by(&DocumentFilter::default())?;
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|r| !r.form_type.is_empty()));

    let ops: Vec<DocumentId> = store
        .find_by(&DocumentFilter::default().owner("ops"))?
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ops.len(), 3);
    assert!(!ops.contains(&other));

    let mut logs: Vec<DocumentId> = store
        .find_by(&DocumentFilter::default().form_type("ics214"))?
        .into_iter()
        .map(|r| r.id)
        .collect();
    logs.sort();
    let mut expected = vec![log, untyped];
    expected.sort();
    assert_eq!(logs, expected);

    let finalized = store.find_by(&DocumentFilter::default().status(DocumentStatus::Finalized))?;
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].id, other);

    let limited = store.find_by(&DocumentFilter::default().owner("ops").limit(2))?;
    assert_eq!(limited.len(), 2);
    assert!(store
        .find_by(&DocumentFilter::default().owner("ops").form_type("ics213"))?
        .iter()
        .any(|r| r.id == msg));
    Ok(())
}

// ============================================================================
// Concurrent writers
// ============================================================================

#[test]
fn concurrent_updates_never_share_a_version_number() -> Result<(), Box<dyn std::error::Error>> {
    const WRITERS: usize = 2;
    const UPDATES_EACH: usize = 15;

    let ws = TestWorkspace::new()?;
    let mut primary = ws.storage()?;
    let id = primary.create_with_content(
        &NewDocument::new("ics213", "ops"),
        &revision(0),
        &VersionInfo::default(),
    )?;

    let writers = TestWriters::open(&ws, WRITERS)?.into_inner();
    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = writers
        .into_iter()
        .enumerate()
        .map(|(w, mut store)| {
            let id = id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<Vec<u32>, StorageError> {
                barrier.wait();
                let author = format!("writer-{w}");
                let mut numbers = Vec::with_capacity(UPDATES_EACH);
                for n in 0..UPDATES_EACH {
                    let number = store.update_with_content(
                        &id,
                        &revision(100 * (w + 1) + n),
                        &VersionInfo::by(&author),
                    )?;
                    numbers.push(number);
                }
                Ok(numbers)
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        let numbers = handle.join().map_err(|_| "writer thread panicked")??;
        all.extend(numbers);
    }
    all.sort_unstable();
    let expected: Vec<u32> = (2..=(WRITERS * UPDATES_EACH) as u32 + 1).collect();
    assert_eq!(all, expected);

    let versions = primary.find_versions(&id)?;
    assert_eq!(versions.len(), WRITERS * UPDATES_EACH + 1);
    for (i, version) in versions.iter().enumerate() {
        assert_eq!(version.version_number as usize, i + 1);
    }
    Ok(())
}
