//! Bulk operation coordinator.
//!
//! Applies one action to many documents with per-item authorization and
//! failure isolation. Nothing is atomic across the batch: a failure on
//! one item never rolls back the others, and the aggregated result says
//! exactly which ids succeeded.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::external::AccessAction;
use crate::service::{DocumentService, ScanVerdict};

/// One action applied to every document in the batch. Parameters travel
/// with the action, so illegal combinations are unrepresentable.
#[derive(Debug, Clone)]
pub enum BulkAction {
    Delete,
    Move { folder: String },
    Tag { tags: Vec<String> },
    Lock { reason: Option<String> },
    Unlock,
    Archive,
    RequestValidation,
    Classify,
    /// Validates the download gate (clean scan, readable content) per
    /// document. The result carries ids only; the transport layer
    /// re-reads each succeeded id to stream the actual bytes.
    Download,
}

impl BulkAction {
    fn access_action(&self) -> AccessAction {
        match self {
            Self::Delete => AccessAction::Delete,
            Self::Move { .. } => AccessAction::Move,
            Self::Tag { .. } => AccessAction::Tag,
            Self::Lock { .. } => AccessAction::Lock,
            Self::Unlock => AccessAction::Unlock,
            Self::Archive => AccessAction::Archive,
            Self::RequestValidation => AccessAction::RequestValidation,
            Self::Classify => AccessAction::Classify,
            Self::Download => AccessAction::Download,
        }
    }

    /// Actions that stream bytes back to the caller are capped per batch.
    fn streams_bytes(&self) -> bool {
        matches!(self, Self::Download)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkOperationResult {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BulkFailure>,
    /// True iff at least one item succeeded. Callers must still inspect
    /// `failed`.
    pub overall_success: bool,
}

#[derive(Error, Debug)]
pub enum BulkError {
    #[error("bulk download limited to {limit} documents per request, got {requested}")]
    TooManyItems { limit: usize, requested: usize },
}

/// Apply `action` to every id independently. Authorization denial or any
/// per-item error becomes a `failed` entry; the batch always runs to the
/// end. Only the over-cap download request fails fast as a whole.
pub fn apply(
    service: &DocumentService,
    action: &BulkAction,
    ids: &[Uuid],
    actor: &str,
) -> Result<BulkOperationResult, BulkError> {
    let limit = service.config().bulk_download_limit;
    if action.streams_bytes() && ids.len() > limit {
        return Err(BulkError::TooManyItems {
            limit,
            requested: ids.len(),
        });
    }

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();

    for id in ids {
        match apply_one(service, action, id, actor) {
            Ok(()) => succeeded.push(*id),
            Err(reason) => failed.push(BulkFailure { id: *id, reason }),
        }
    }

    tracing::info!(
        action = action.access_action().as_str(),
        total = ids.len(),
        ok = succeeded.len(),
        failed = failed.len(),
        "Bulk operation finished"
    );

    let overall_success = !succeeded.is_empty();
    Ok(BulkOperationResult {
        succeeded,
        failed,
        overall_success,
    })
}

fn apply_one(
    service: &DocumentService,
    action: &BulkAction,
    id: &Uuid,
    actor: &str,
) -> Result<(), String> {
    let doc = service
        .get_document(id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "document not found".to_string())?;

    if !service.authorize(actor, action.access_action(), &doc) {
        return Err("permission denied".to_string());
    }

    match action {
        BulkAction::Delete => service.delete_document(id).map_err(|e| e.to_string()),
        BulkAction::Move { folder } => service
            .move_document(id, folder)
            .map_err(|e| e.to_string()),
        BulkAction::Tag { tags } => service.tag_document(id, tags).map_err(|e| e.to_string()),
        BulkAction::Lock { reason } => service
            .acquire_lock(id, actor, reason.as_deref())
            .map(|_| ())
            .map_err(|e| e.to_string()),
        BulkAction::Unlock => service.release_lock(id, actor).map_err(|e| e.to_string()),
        BulkAction::Archive => service.archive_document(id).map_err(|e| e.to_string()),
        BulkAction::RequestValidation => {
            service.request_validation(id).map_err(|e| e.to_string())
        }
        BulkAction::Classify => service.classify_document(id).map_err(|e| e.to_string()),
        BulkAction::Download => service.download(id).map(|_| ()).map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::db::sqlite::open_memory_database;
    use crate::external::{
        Authorizer, CollectingNotifier, MemoryBlobStore, QueueJobRunner,
    };
    use crate::models::enums::ContentKind;
    use crate::models::Document;

    /// Denies the actors listed, grants everyone else.
    struct DenyListed(Vec<String>);

    impl Authorizer for DenyListed {
        fn authorize(&self, actor: &str, _: AccessAction, _: &Document) -> bool {
            !self.0.contains(&actor.to_string())
        }
    }

    /// Denies actions on documents whose title is listed.
    struct DenyTitles(Vec<&'static str>);

    impl Authorizer for DenyTitles {
        fn authorize(&self, _: &str, _: AccessAction, doc: &Document) -> bool {
            !self.0.contains(&doc.title.as_str())
        }
    }

    fn service_with(authorizer: Arc<dyn Authorizer>) -> DocumentService {
        crate::config::init_test_logging();
        DocumentService::new(
            open_memory_database().unwrap(),
            CoordinatorConfig::default(),
            authorizer,
            Arc::new(MemoryBlobStore::new()),
            Arc::new(QueueJobRunner::new()),
            Arc::new(CollectingNotifier::new()),
        )
    }

    fn seed(service: &DocumentService, titles: &[&str]) -> Vec<Uuid> {
        titles
            .iter()
            .map(|t| {
                service
                    .create_document("owner", t, ContentKind::Pdf)
                    .unwrap()
                    .id
            })
            .collect()
    }

    #[test]
    fn partial_failure_is_isolated() {
        let service = service_with(Arc::new(DenyTitles(vec!["b", "d"])));
        let ids = seed(&service, &["a", "b", "c", "d", "e"]);

        let result = apply(&service, &BulkAction::Archive, &ids, "user-a").unwrap();

        assert_eq!(result.succeeded.len(), 3);
        assert_eq!(result.failed.len(), 2);
        assert!(result.overall_success);
        assert!(result
            .failed
            .iter()
            .all(|f| f.reason == "permission denied"));

        // Denied documents were untouched
        let denied = service.get_document(&ids[1]).unwrap().unwrap();
        assert!(!denied.is_archived());
        let granted = service.get_document(&ids[0]).unwrap().unwrap();
        assert!(granted.is_archived());
    }

    #[test]
    fn missing_documents_are_reported_not_fatal() {
        let service = service_with(Arc::new(DenyListed(vec![])));
        let mut ids = seed(&service, &["a"]);
        ids.push(Uuid::new_v4());

        let result = apply(&service, &BulkAction::Tag { tags: vec!["x".into()] }, &ids, "u")
            .unwrap();
        assert_eq!(result.succeeded, vec![ids[0]]);
        assert_eq!(result.failed[0].reason, "document not found");
    }

    #[test]
    fn all_denied_means_no_overall_success() {
        let service = service_with(Arc::new(DenyListed(vec!["intruder".into()])));
        let ids = seed(&service, &["a", "b"]);

        let result = apply(&service, &BulkAction::Delete, &ids, "intruder").unwrap();
        assert!(result.succeeded.is_empty());
        assert!(!result.overall_success);
        assert_eq!(result.failed.len(), 2);
    }

    #[test]
    fn bulk_lock_and_unlock() {
        let service = service_with(Arc::new(DenyListed(vec![])));
        let ids = seed(&service, &["a", "b"]);

        let result = apply(
            &service,
            &BulkAction::Lock {
                reason: Some("review".into()),
            },
            &ids,
            "user-a",
        )
        .unwrap();
        assert_eq!(result.succeeded.len(), 2);

        // A foreign lock makes unlock fail for that item only
        let result = apply(&service, &BulkAction::Unlock, &ids, "user-b").unwrap();
        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed.len(), 2);

        let result = apply(&service, &BulkAction::Unlock, &ids, "user-a").unwrap();
        assert_eq!(result.succeeded.len(), 2);
    }

    #[test]
    fn download_cap_fails_fast() {
        let service = service_with(Arc::new(DenyListed(vec![])));
        let ids: Vec<Uuid> = (0..21).map(|_| Uuid::new_v4()).collect();

        let err = apply(&service, &BulkAction::Download, &ids, "u").unwrap_err();
        assert!(matches!(
            err,
            BulkError::TooManyItems {
                limit: 20,
                requested: 21
            }
        ));

        // Other actions carry no hard cap
        assert!(apply(&service, &BulkAction::Archive, &ids, "u").is_ok());
    }

    #[test]
    fn bulk_download_respects_scan_gate() {
        let service = service_with(Arc::new(DenyListed(vec![])));
        let (clean, _) = service
            .ingest("owner", "clean", ContentKind::Pdf, b"ok", None)
            .unwrap();
        let (dirty, _) = service
            .ingest("owner", "dirty", ContentKind::Pdf, b"bad", None)
            .unwrap();
        service.mark_clean(&clean.id).unwrap();
        service
            .on_scan_done(
                &dirty.id,
                ScanVerdict::Infected {
                    details: "sig".into(),
                },
            )
            .unwrap();

        let result = apply(
            &service,
            &BulkAction::Download,
            &[clean.id, dirty.id],
            "u",
        )
        .unwrap();
        assert_eq!(result.succeeded, vec![clean.id]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].id, dirty.id);
    }
}
