//! Lock manager — mutual exclusion per document.
//!
//! One active lock per document. Edits and version commits on a locked
//! document are permitted only to the holder. Release is allowed to the
//! holder or the document owner; any other actor must go through the
//! explicit `force_release` entry point, which consults the external
//! authorizer for a force-unlock capability. Stale locks are released
//! actor-less by `expire_stale`, driven by the background sweeper.

pub mod sweeper;

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::external::{AccessAction, Authorizer};
use crate::models::{Document, LockState};

#[derive(Error, Debug)]
pub enum LockError {
    #[error("document {0} not found")]
    DocumentNotFound(Uuid),

    #[error("document {0} is archived and read-only")]
    Archived(Uuid),

    #[error("document is locked by {holder}")]
    Conflict { holder: String },

    #[error("document is not locked")]
    NotLocked,

    #[error("actor {actor} is not allowed to release this lock")]
    Unauthorized { actor: String },

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Acquire a lock, or refresh it if `actor` already holds it (the reason
/// and scheduled unlock time are updated in place; no new lock is
/// created). A lock held by anyone else is a conflict.
pub fn acquire(
    conn: &Connection,
    id: &Uuid,
    actor: &str,
    reason: Option<&str>,
    scheduled_unlock_at: Option<NaiveDateTime>,
) -> Result<LockState, LockError> {
    let doc = load(conn, id)?;
    if doc.is_archived() {
        return Err(LockError::Archived(*id));
    }

    if let Some(existing) = &doc.lock {
        if existing.holder != actor {
            return Err(LockError::Conflict {
                holder: existing.holder.clone(),
            });
        }
    }

    let lock = LockState {
        holder: actor.to_string(),
        reason: reason.map(str::to_string),
        acquired_at: doc
            .lock
            .as_ref()
            .map(|l| l.acquired_at)
            .unwrap_or_else(|| Utc::now().naive_utc()),
        scheduled_unlock_at,
    };
    repository::set_lock(conn, id, &lock)?;
    tracing::info!(doc = %id, holder = actor, "Lock acquired");
    Ok(lock)
}

/// Release a lock as the holder or the document owner.
pub fn release(conn: &Connection, id: &Uuid, actor: &str) -> Result<(), LockError> {
    let doc = load(conn, id)?;
    let lock = doc.lock.as_ref().ok_or(LockError::NotLocked)?;

    if lock.holder != actor && doc.owner != actor {
        return Err(LockError::Unauthorized {
            actor: actor.to_string(),
        });
    }

    repository::clear_lock(conn, id)?;
    tracing::info!(doc = %id, actor, "Lock released");
    Ok(())
}

/// Release any actor's lock, given a force-unlock capability from the
/// external authorizer. The only non-holder, non-owner release path.
pub fn force_release(
    conn: &Connection,
    authorizer: &dyn Authorizer,
    id: &Uuid,
    actor: &str,
) -> Result<(), LockError> {
    let doc = load(conn, id)?;
    if doc.lock.is_none() {
        return Err(LockError::NotLocked);
    }

    if !authorizer.authorize(actor, AccessAction::ForceUnlock, &doc) {
        return Err(LockError::Unauthorized {
            actor: actor.to_string(),
        });
    }

    repository::clear_lock(conn, id)?;
    tracing::warn!(doc = %id, actor, "Lock force-released");
    Ok(())
}

/// Release all locks whose scheduled unlock time has passed, returning
/// the affected document ids. Idempotent; the only actor-less release.
pub fn expire_stale(conn: &Connection, now: NaiveDateTime) -> Result<Vec<Uuid>, LockError> {
    let expired = repository::list_expired_locks(conn, now)?;
    for id in &expired {
        repository::clear_lock(conn, id)?;
        tracing::info!(doc = %id, "Stale lock expired");
    }
    Ok(expired)
}

/// Guard for edit/commit paths: a locked document may only be written by
/// its lock holder.
pub(crate) fn ensure_can_edit(doc: &Document, actor: &str) -> Result<(), LockError> {
    if let Some(lock) = &doc.lock {
        if lock.holder != actor {
            return Err(LockError::Conflict {
                holder: lock.holder.clone(),
            });
        }
    }
    Ok(())
}

fn load(conn: &Connection, id: &Uuid) -> Result<Document, LockError> {
    repository::get_document(conn, id)?.ok_or(LockError::DocumentNotFound(*id))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::repository::{get_document, insert_document, set_archived};
    use crate::db::sqlite::open_memory_database;
    use crate::external::AllowAllAuthorizer;
    use crate::models::enums::{ContentKind, ProcessingStatus, VirusScanStatus};

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

    struct DenyAll;

    impl Authorizer for DenyAll {
        fn authorize(&self, _: &str, _: AccessAction, _: &Document) -> bool {
            false
        }
    }

    #[test]
    fn lock_is_exclusive() {
        let conn = open_memory_database().unwrap();
        let id = make_doc(&conn, "owner");

        acquire(&conn, &id, "user-a", Some("editing"), None).unwrap();
        let err = acquire(&conn, &id, "user-b", None, None).unwrap_err();
        assert!(matches!(err, LockError::Conflict { holder } if holder == "user-a"));
    }

    #[test]
    fn reacquire_refreshes_in_place() {
        let conn = open_memory_database().unwrap();
        let id = make_doc(&conn, "owner");
        let now = Utc::now().naive_utc();

        let first = acquire(&conn, &id, "user-a", Some("draft"), None).unwrap();
        let second = acquire(
            &conn,
            &id,
            "user-a",
            Some("final pass"),
            Some(now + Duration::hours(2)),
        )
        .unwrap();

        assert_eq!(second.holder, "user-a");
        assert_eq!(second.reason.as_deref(), Some("final pass"));
        assert_eq!(second.acquired_at, first.acquired_at);

        let doc = get_document(&conn, &id).unwrap().unwrap();
        assert_eq!(doc.lock.unwrap().reason.as_deref(), Some("final pass"));
    }

    #[test]
    fn holder_and_owner_can_release() {
        let conn = open_memory_database().unwrap();
        let id = make_doc(&conn, "owner");

        acquire(&conn, &id, "user-a", None, None).unwrap();
        release(&conn, &id, "user-a").unwrap();

        acquire(&conn, &id, "user-a", None, None).unwrap();
        release(&conn, &id, "owner").unwrap();

        assert!(get_document(&conn, &id).unwrap().unwrap().lock.is_none());
    }

    #[test]
    fn third_party_release_is_unauthorized() {
        let conn = open_memory_database().unwrap();
        let id = make_doc(&conn, "owner");
        acquire(&conn, &id, "user-a", None, None).unwrap();

        let err = release(&conn, &id, "user-b").unwrap_err();
        assert!(matches!(err, LockError::Unauthorized { .. }));
        // Release never silently force-unlocks
        assert!(get_document(&conn, &id).unwrap().unwrap().lock.is_some());
    }

    #[test]
    fn force_release_consults_authorizer() {
        let conn = open_memory_database().unwrap();
        let id = make_doc(&conn, "owner");
        acquire(&conn, &id, "user-a", None, None).unwrap();

        let err = force_release(&conn, &DenyAll, &id, "admin").unwrap_err();
        assert!(matches!(err, LockError::Unauthorized { .. }));

        force_release(&conn, &AllowAllAuthorizer, &id, "admin").unwrap();
        assert!(get_document(&conn, &id).unwrap().unwrap().lock.is_none());
    }

    #[test]
    fn release_without_lock_errors() {
        let conn = open_memory_database().unwrap();
        let id = make_doc(&conn, "owner");
        assert!(matches!(
            release(&conn, &id, "owner").unwrap_err(),
            LockError::NotLocked
        ));
    }

    #[test]
    fn archived_document_rejects_acquire() {
        let conn = open_memory_database().unwrap();
        let id = make_doc(&conn, "owner");
        set_archived(&conn, &id, Utc::now().naive_utc()).unwrap();

        assert!(matches!(
            acquire(&conn, &id, "user-a", None, None).unwrap_err(),
            LockError::Archived(_)
        ));
    }

    #[test]
    fn expiry_releases_only_past_due_locks() {
        let conn = open_memory_database().unwrap();
        let stale = make_doc(&conn, "owner");
        let fresh = make_doc(&conn, "owner");
        let now = Utc::now().naive_utc();

        acquire(&conn, &stale, "user-a", None, Some(now - Duration::minutes(5))).unwrap();
        acquire(&conn, &fresh, "user-a", None, Some(now + Duration::minutes(5))).unwrap();

        let released = expire_stale(&conn, now).unwrap();
        assert_eq!(released, vec![stale]);
        assert!(get_document(&conn, &stale).unwrap().unwrap().lock.is_none());
        assert!(get_document(&conn, &fresh).unwrap().unwrap().lock.is_some());

        // Idempotent: a second sweep with nothing expired is a no-op
        assert!(expire_stale(&conn, now).unwrap().is_empty());
    }

    #[test]
    fn edit_guard_allows_holder_only() {
        let conn = open_memory_database().unwrap();
        let id = make_doc(&conn, "owner");
        acquire(&conn, &id, "user-a", None, None).unwrap();

        let doc = get_document(&conn, &id).unwrap().unwrap();
        assert!(ensure_can_edit(&doc, "user-a").is_ok());
        assert!(matches!(
            ensure_can_edit(&doc, "user-b").unwrap_err(),
            LockError::Conflict { .. }
        ));
    }
}
