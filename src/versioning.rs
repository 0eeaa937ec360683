//! Version store — append-only log of document snapshots.
//!
//! Version numbers are assigned here, inside a SQLite transaction, never
//! by callers. Concurrency policy: the service facade serializes commits
//! behind its connection mutex, so a second concurrent commit on the
//! same document blocks until the first completes; combined with the
//! transaction, version numbers are gapless and unique with no silent
//! double-increment.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::external::{BlobError, BlobStore, Event, JobKind};
use crate::lifecycle::{processing, SideEffect};
use crate::locks::{self, LockError};
use crate::models::enums::{VersionEvent, VirusScanStatus};
use crate::models::Version;

#[derive(Error, Debug)]
pub enum VersionError {
    #[error("document {0} not found")]
    DocumentNotFound(Uuid),

    #[error("document {0} is archived and read-only")]
    Archived(Uuid),

    #[error("document is locked by {holder}")]
    Locked { holder: String },

    #[error("version {number} not found for document {document_id}")]
    NotFound { document_id: Uuid, number: i64 },

    #[error("content size {size} exceeds limit {limit}")]
    ContentTooLarge { size: usize, limit: usize },

    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Read-only comparison of two versions of one document.
#[derive(Debug, Clone, Serialize)]
pub struct DiffResult {
    pub document_id: Uuid,
    pub from_version: i64,
    pub to_version: i64,
    pub from_event: VersionEvent,
    pub to_event: VersionEvent,
    pub same_content: bool,
    pub from_size: usize,
    pub to_size: usize,
}

/// Commit new content as the next version. Atomically (one transaction):
/// replace the content pointer, append the version row, bump the counter,
/// reset processing state, and re-arm the virus scan. Returns the version
/// and the side effects to execute (reprocessing jobs, notification).
pub fn commit(
    conn: &mut Connection,
    blobs: &dyn BlobStore,
    id: &Uuid,
    actor: &str,
    bytes: &[u8],
    comment: Option<&str>,
    max_bytes: usize,
) -> Result<(Version, Vec<SideEffect>), VersionError> {
    commit_with_event(conn, blobs, id, actor, bytes, comment, VersionEvent::Update, max_bytes)
}

/// Re-materialize the content of `target` as a new version. Restores are
/// never silent rewrites: they append a Restore version and trigger the
/// same reprocessing path as an update.
pub fn restore(
    conn: &mut Connection,
    blobs: &dyn BlobStore,
    id: &Uuid,
    actor: &str,
    target: i64,
    max_bytes: usize,
) -> Result<(Version, Vec<SideEffect>), VersionError> {
    if repository::get_document(conn, id)?.is_none() {
        return Err(VersionError::DocumentNotFound(*id));
    }
    let version =
        repository::get_version(conn, id, target)?.ok_or(VersionError::NotFound {
            document_id: *id,
            number: target,
        })?;

    let bytes = blobs.read(&version.content_ref)?;
    let comment = format!("Restored from version {target}");

    commit_with_event(
        conn,
        blobs,
        id,
        actor,
        &bytes,
        Some(&comment),
        VersionEvent::Restore,
        max_bytes,
    )
}

#[allow(clippy::too_many_arguments)]
fn commit_with_event(
    conn: &mut Connection,
    blobs: &dyn BlobStore,
    id: &Uuid,
    actor: &str,
    bytes: &[u8],
    comment: Option<&str>,
    event: VersionEvent,
    max_bytes: usize,
) -> Result<(Version, Vec<SideEffect>), VersionError> {
    let doc = repository::get_document(conn, id)?
        .ok_or(VersionError::DocumentNotFound(*id))?;
    if doc.is_archived() {
        return Err(VersionError::Archived(*id));
    }
    locks::ensure_can_edit(&doc, actor).map_err(|e| match e {
        LockError::Conflict { holder } => VersionError::Locked { holder },
        other => VersionError::Database(DatabaseError::ConstraintViolation(other.to_string())),
    })?;
    if bytes.len() > max_bytes {
        return Err(VersionError::ContentTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    // Purge-and-replace the stored content. Purge failure is logged, not
    // fatal: prior version snapshots stay readable by their own refs.
    if doc.content_ref.is_some() {
        if let Err(e) = blobs.purge(*id) {
            tracing::warn!(doc = %id, error = %e, "Purge of previous attachment failed");
        }
    }
    let content_ref = blobs.attach(*id, bytes)?;

    let tx = conn.transaction().map_err(DatabaseError::from)?;

    // Number assignment happens inside the transaction; the store, never
    // the caller, picks current + 1.
    let current: i64 = tx
        .query_row(
            "SELECT current_version FROM documents WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .map_err(DatabaseError::from)?;
    let number = current + 1;

    let version = Version {
        id: Uuid::new_v4(),
        document_id: *id,
        version_number: number,
        event,
        comment: comment.map(str::to_string),
        created_by: actor.to_string(),
        created_at: Utc::now().naive_utc(),
        content_ref: content_ref.clone(),
    };

    repository::insert_version(&tx, &version)?;
    repository::set_current_version(&tx, id, number)?;
    repository::set_content_ref(&tx, id, &content_ref)?;
    processing::reset_for_new_version(&tx, id).map_err(|e| match e {
        crate::lifecycle::LifecycleError::Database(db) => VersionError::Database(db),
        other => VersionError::Database(DatabaseError::ConstraintViolation(other.to_string())),
    })?;
    repository::update_scan_status(&tx, id, VirusScanStatus::ScanPending, None)?;

    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(doc = %id, version = number, event = event.as_str(), "Version committed");

    let effects = vec![
        SideEffect::Enqueue {
            job: JobKind::ExtractContent,
            document_id: *id,
            delay: None,
        },
        SideEffect::Enqueue {
            job: JobKind::VirusScan,
            document_id: *id,
            delay: None,
        },
        SideEffect::Notify(Event::VersionCreated {
            document_id: *id,
            version_number: number,
            event,
        }),
    ];

    Ok((version, effects))
}

/// Pure, read-only comparison of two versions.
pub fn diff(
    conn: &Connection,
    blobs: &dyn BlobStore,
    id: &Uuid,
    from: i64,
    to: i64,
) -> Result<DiffResult, VersionError> {
    if repository::get_document(conn, id)?.is_none() {
        return Err(VersionError::DocumentNotFound(*id));
    }
    let a = repository::get_version(conn, id, from)?.ok_or(VersionError::NotFound {
        document_id: *id,
        number: from,
    })?;
    let b = repository::get_version(conn, id, to)?.ok_or(VersionError::NotFound {
        document_id: *id,
        number: to,
    })?;

    let bytes_a = blobs.read(&a.content_ref)?;
    let bytes_b = blobs.read(&b.content_ref)?;

    Ok(DiffResult {
        document_id: *id,
        from_version: from,
        to_version: to,
        from_event: a.event,
        to_event: b.event,
        same_content: a.content_ref == b.content_ref,
        from_size: bytes_a.len(),
        to_size: bytes_b.len(),
    })
}

/// Full version history, newest first.
pub fn history(conn: &Connection, id: &Uuid) -> Result<Vec<Version>, VersionError> {
    if repository::get_document(conn, id)?.is_none() {
        return Err(VersionError::DocumentNotFound(*id));
    }
    Ok(repository::list_versions(conn, id)?)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::MAX_CONTENT_BYTES;
    use crate::db::repository::{get_document, insert_document};
    use crate::db::sqlite::open_memory_database;
    use crate::external::MemoryBlobStore;
    use crate::lifecycle::processing::{complete_processing, start_processing};
    use crate::models::enums::{ContentKind, ProcessingStatus};
    use crate::models::Document;

    fn make_doc(conn: &Connection, owner: &str) -> Uuid {
        let id = Uuid::new_v4();
        insert_document(
            conn,
            &Document {
                id,
                title: "doc".into(),
                owner: owner.into(),
                content_kind: ContentKind::Pdf,
                content_ref: None,
                processing_status: ProcessingStatus::Pending,
                processing_error: None,
                extracted_text: None,
                extraction_metadata: None,
                virus_scan_status: VirusScanStatus::ScanPending,
                scan_details: None,
                lock: None,
                current_version: 0,
                ai_category: None,
                ai_confidence: None,
                ai_entities: vec![],
                folder: None,
                tags: vec![],
                validation_requested: false,
                archived_at: None,
                created_at: Utc::now().naive_utc(),
            },
        )
        .unwrap();
        id
    }

    #[test]
    fn sequential_commits_number_gaplessly() {
        let mut conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let id = make_doc(&conn, "user-a");

        for n in 1..=5i64 {
            let (version, _) = commit(
                &mut conn,
                &blobs,
                &id,
                "user-a",
                format!("content {n}").as_bytes(),
                Some("edit"),
                MAX_CONTENT_BYTES,
            )
            .unwrap();
            assert_eq!(version.version_number, n);
        }

        let doc = get_document(&conn, &id).unwrap().unwrap();
        assert_eq!(doc.current_version, 5);

        let versions = history(&conn, &id).unwrap();
        let numbers: Vec<i64> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn commit_resets_processing_and_scan_state() {
        let mut conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let id = make_doc(&conn, "user-a");

        commit(&mut conn, &blobs, &id, "user-a", b"v1", None, MAX_CONTENT_BYTES).unwrap();
        start_processing(&conn, &id).unwrap();
        complete_processing(&conn, &id, "text", None, std::time::Duration::from_secs(30))
            .unwrap();
        crate::lifecycle::scan::mark_clean(&conn, &id).unwrap();
        crate::db::repository::record_ai_results(&conn, &id, "invoice", 0.9, &[]).unwrap();

        let (_, effects) =
            commit(&mut conn, &blobs, &id, "user-a", b"v2", None, MAX_CONTENT_BYTES).unwrap();

        let doc = get_document(&conn, &id).unwrap().unwrap();
        assert_eq!(doc.processing_status, ProcessingStatus::Pending);
        assert!(doc.ai_category.is_none());
        assert!(doc.ai_confidence.is_none());
        assert_eq!(doc.virus_scan_status, VirusScanStatus::ScanPending);
        assert!(!doc.is_safe_to_download());

        // Reprocessing and rescan are both enqueued, plus a notification
        let jobs: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                SideEffect::Enqueue { job, .. } => Some(*job),
                _ => None,
            })
            .collect();
        assert_eq!(jobs, vec![JobKind::ExtractContent, JobKind::VirusScan]);
    }

    #[test]
    fn commit_blocked_by_foreign_lock() {
        let mut conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let id = make_doc(&conn, "owner");

        locks::acquire(&conn, &id, "user-a", None, None).unwrap();

        let err = commit(&mut conn, &blobs, &id, "user-b", b"x", None, MAX_CONTENT_BYTES)
            .unwrap_err();
        assert!(matches!(err, VersionError::Locked { holder } if holder == "user-a"));

        // The holder can commit
        commit(&mut conn, &blobs, &id, "user-a", b"x", None, MAX_CONTENT_BYTES).unwrap();
    }

    #[test]
    fn archived_document_rejects_commit() {
        let mut conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let id = make_doc(&conn, "user-a");
        crate::db::repository::set_archived(&conn, &id, Utc::now().naive_utc()).unwrap();

        assert!(matches!(
            commit(&mut conn, &blobs, &id, "user-a", b"x", None, MAX_CONTENT_BYTES).unwrap_err(),
            VersionError::Archived(_)
        ));
    }

    #[test]
    fn oversized_content_rejected() {
        let mut conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let id = make_doc(&conn, "user-a");

        let err = commit(&mut conn, &blobs, &id, "user-a", b"too big", None, 3).unwrap_err();
        assert!(matches!(err, VersionError::ContentTooLarge { size: 7, limit: 3 }));
    }

    #[test]
    fn restore_appends_a_new_version() {
        let mut conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let id = make_doc(&conn, "user-a");

        commit(&mut conn, &blobs, &id, "user-a", b"first", None, MAX_CONTENT_BYTES).unwrap();
        commit(&mut conn, &blobs, &id, "user-a", b"second", None, MAX_CONTENT_BYTES).unwrap();

        let (restored, _) = restore(&mut conn, &blobs, &id, "user-b", 1, MAX_CONTENT_BYTES).unwrap();
        assert_eq!(restored.version_number, 3);
        assert_eq!(restored.event, VersionEvent::Restore);
        assert_eq!(restored.comment.as_deref(), Some("Restored from version 1"));

        // The counter never rewinds; content matches version 1
        let doc = get_document(&conn, &id).unwrap().unwrap();
        assert_eq!(doc.current_version, 3);
        let v1 = repository::get_version(&conn, &id, 1).unwrap().unwrap();
        assert_eq!(doc.content_ref.as_deref(), Some(v1.content_ref.as_str()));
        // Restore also resets reprocessing
        assert_eq!(doc.processing_status, ProcessingStatus::Pending);
    }

    #[test]
    fn restore_and_diff_name_the_missing_document() {
        let mut conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let unknown = Uuid::new_v4();

        assert!(matches!(
            restore(&mut conn, &blobs, &unknown, "user-a", 1, MAX_CONTENT_BYTES).unwrap_err(),
            VersionError::DocumentNotFound(id) if id == unknown
        ));
        assert!(matches!(
            diff(&conn, &blobs, &unknown, 1, 2).unwrap_err(),
            VersionError::DocumentNotFound(id) if id == unknown
        ));
    }

    #[test]
    fn restore_of_missing_version_errors() {
        let mut conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let id = make_doc(&conn, "user-a");
        commit(&mut conn, &blobs, &id, "user-a", b"v1", None, MAX_CONTENT_BYTES).unwrap();

        let err = restore(&mut conn, &blobs, &id, "user-a", 9, MAX_CONTENT_BYTES).unwrap_err();
        assert!(matches!(err, VersionError::NotFound { number: 9, .. }));
    }

    #[test]
    fn diff_compares_without_mutating() {
        let mut conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let id = make_doc(&conn, "user-a");

        commit(&mut conn, &blobs, &id, "user-a", b"short", None, MAX_CONTENT_BYTES).unwrap();
        commit(&mut conn, &blobs, &id, "user-a", b"much longer body", None, MAX_CONTENT_BYTES)
            .unwrap();

        let result = diff(&conn, &blobs, &id, 1, 2).unwrap();
        assert!(!result.same_content);
        assert_eq!(result.from_size, 5);
        assert_eq!(result.to_size, 16);

        let doc = get_document(&conn, &id).unwrap().unwrap();
        assert_eq!(doc.current_version, 2);
    }

    #[test]
    fn history_of_unknown_document_errors() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            history(&conn, &Uuid::new_v4()).unwrap_err(),
            VersionError::DocumentNotFound(_)
        ));
    }
}
