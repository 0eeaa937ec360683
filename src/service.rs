//! Document service — the coordinator's public surface.
//!
//! Owns the database connection behind a mutex and the four external
//! collaborators. Every operation locks the connection, runs the
//! corresponding module function, then executes the side effects the
//! transition returned (jobs to enqueue, notifications to emit).
//!
//! The connection mutex is also the commit-serialization point: two
//! concurrent commits on the same document block rather than race, so
//! version numbers never double-increment.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::db::{repository, DatabaseError};
use crate::external::{
    AccessAction, Authorizer, BlobError, BlobStore, JobRunner, Notifier,
};
use crate::lifecycle::{processing, scan, LifecycleError, SideEffect};
use crate::locks::{self, LockError};
use crate::models::enums::{ContentKind, ProcessingStatus, VirusScanStatus};
use crate::models::{Document, LockState, Version};
use crate::versioning::{self, DiffResult, VersionError};

#[derive(Error, Debug)]
pub enum MutationError {
    #[error("document {0} not found")]
    NotFound(Uuid),

    #[error("document {0} is archived and read-only")]
    Archived(Uuid),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("document {0} not found")]
    NotFound(Uuid),

    #[error("document has no clean virus scan result")]
    NotClean,

    #[error("document has no stored content")]
    NoContent,

    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Outcome reported by the external virus scanner.
#[derive(Debug, Clone)]
pub enum ScanVerdict {
    Clean,
    Infected { details: String },
    Error { message: String },
}

/// Result of quarantining an infected document. `archival_error` is set
/// when the scan status was recorded but archival itself failed.
#[derive(Debug)]
pub struct QuarantineReport {
    pub archival_error: Option<String>,
}

pub struct DocumentService {
    conn: Mutex<Connection>,
    config: CoordinatorConfig,
    authorizer: Arc<dyn Authorizer>,
    blobs: Arc<dyn BlobStore>,
    jobs: Arc<dyn JobRunner>,
    notifier: Arc<dyn Notifier>,
}

impl DocumentService {
    pub fn new(
        conn: Connection,
        config: CoordinatorConfig,
        authorizer: Arc<dyn Authorizer>,
        blobs: Arc<dyn BlobStore>,
        jobs: Arc<dyn JobRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            conn: Mutex::new(conn),
            config,
            authorizer,
            blobs,
            jobs,
            notifier,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("connection mutex poisoned")
    }

    fn run_effects(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::Enqueue {
                    job,
                    document_id,
                    delay,
                } => self.jobs.enqueue(job, document_id, delay),
                SideEffect::Notify(event) => self.notifier.notify(event),
            }
        }
    }

    pub(crate) fn authorize(&self, actor: &str, action: AccessAction, doc: &Document) -> bool {
        self.authorizer.authorize(actor, action, doc)
    }

    // ── Documents ───────────────────────────────────────────

    /// Create a document with no content yet (version 0).
    pub fn create_document(
        &self,
        actor: &str,
        title: &str,
        kind: ContentKind,
    ) -> Result<Document, DatabaseError> {
        let doc = Document {
            id: Uuid::new_v4(),
            title: title.to_string(),
            owner: actor.to_string(),
            content_kind: kind,
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
        };
        repository::insert_document(&self.conn(), &doc)?;
        tracing::info!(doc = %doc.id, title, "Document created");
        Ok(doc)
    }

    /// Create a document and commit its first version in one call.
    pub fn ingest(
        &self,
        actor: &str,
        title: &str,
        kind: ContentKind,
        bytes: &[u8],
        comment: Option<&str>,
    ) -> Result<(Document, Version), VersionError> {
        let doc = self.create_document(actor, title, kind)?;
        let version = self.commit(&doc.id, actor, bytes, comment)?;
        Ok((doc, version))
    }

    pub fn get_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
        repository::get_document(&self.conn(), id)
    }

    /// Delete a document and its versions; the blob association is purged
    /// best-effort.
    pub fn delete_document(&self, id: &Uuid) -> Result<(), MutationError> {
        let conn = self.conn();
        let doc = repository::get_document(&conn, id)?.ok_or(MutationError::NotFound(*id))?;
        if doc.is_archived() {
            return Err(MutationError::Archived(*id));
        }

        repository::delete_document(&conn, id)?;
        drop(conn);

        if let Err(e) = self.blobs.purge(*id) {
            tracing::warn!(doc = %id, error = %e, "Blob purge on delete failed");
        }
        tracing::info!(doc = %id, "Document deleted");
        Ok(())
    }

    pub fn move_document(&self, id: &Uuid, folder: &str) -> Result<(), MutationError> {
        let conn = self.conn();
        self.mutable(&conn, id)?;
        repository::set_folder(&conn, id, folder)?;
        Ok(())
    }

    /// Merge new tags into the document's tag set.
    pub fn tag_document(&self, id: &Uuid, tags: &[String]) -> Result<(), MutationError> {
        let conn = self.conn();
        let doc = self.mutable(&conn, id)?;
        let mut merged = doc.tags;
        for tag in tags {
            if !merged.contains(tag) {
                merged.push(tag.clone());
            }
        }
        repository::set_tags(&conn, id, &merged)?;
        Ok(())
    }

    /// Explicit archival. Idempotent: archiving an archived document is Ok.
    pub fn archive_document(&self, id: &Uuid) -> Result<(), MutationError> {
        let conn = self.conn();
        let doc = repository::get_document(&conn, id)?.ok_or(MutationError::NotFound(*id))?;
        if doc.is_archived() {
            return Ok(());
        }
        repository::set_archived(&conn, id, Utc::now().naive_utc())?;
        tracing::info!(doc = %id, "Document archived");
        Ok(())
    }

    pub fn request_validation(&self, id: &Uuid) -> Result<(), MutationError> {
        let conn = self.conn();
        self.mutable(&conn, id)?;
        repository::set_validation_requested(&conn, id, true)?;
        Ok(())
    }

    /// Schedule AI classification for an already-extracted document.
    pub fn classify_document(&self, id: &Uuid) -> Result<(), LifecycleError> {
        let conn = self.conn();
        let doc = repository::get_document(&conn, id)?
            .ok_or(LifecycleError::DocumentNotFound(*id))?;
        if doc.is_archived() {
            return Err(LifecycleError::Archived(*id));
        }
        if doc.processing_status != ProcessingStatus::Completed {
            return Err(LifecycleError::InvalidTransition {
                from: doc.processing_status.as_str(),
                to: ProcessingStatus::AiProcessing.as_str(),
            });
        }
        drop(conn);

        self.jobs
            .enqueue(crate::external::JobKind::ClassifyAi, *id, None);
        Ok(())
    }

    /// Read document bytes, gated on an explicit clean scan result.
    pub fn download(&self, id: &Uuid) -> Result<Vec<u8>, DownloadError> {
        let doc = self
            .get_document(id)?
            .ok_or(DownloadError::NotFound(*id))?;
        if !doc.is_safe_to_download() {
            return Err(DownloadError::NotClean);
        }
        let content_ref = doc.content_ref.ok_or(DownloadError::NoContent)?;
        Ok(self.blobs.read(&content_ref)?)
    }

    fn mutable(&self, conn: &Connection, id: &Uuid) -> Result<Document, MutationError> {
        let doc = repository::get_document(conn, id)?.ok_or(MutationError::NotFound(*id))?;
        if doc.is_archived() {
            return Err(MutationError::Archived(*id));
        }
        Ok(doc)
    }

    // ── Locks ───────────────────────────────────────────────

    /// Acquire or refresh a lock; expires after the configured TTL.
    pub fn acquire_lock(
        &self,
        id: &Uuid,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<LockState, LockError> {
        let ttl = chrono::Duration::from_std(self.config.lock_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let unlock_at = Utc::now().naive_utc() + ttl;
        locks::acquire(&self.conn(), id, actor, reason, Some(unlock_at))
    }

    pub fn release_lock(&self, id: &Uuid, actor: &str) -> Result<(), LockError> {
        locks::release(&self.conn(), id, actor)
    }

    pub fn force_release_lock(&self, id: &Uuid, actor: &str) -> Result<(), LockError> {
        locks::force_release(&self.conn(), self.authorizer.as_ref(), id, actor)
    }

    pub fn expire_stale_locks(&self, now: NaiveDateTime) -> Result<Vec<Uuid>, LockError> {
        locks::expire_stale(&self.conn(), now)
    }

    // ── Processing ──────────────────────────────────────────

    pub fn start_processing(&self, id: &Uuid) -> Result<(), LifecycleError> {
        let effects = processing::start_processing(&self.conn(), id)?;
        self.run_effects(effects);
        Ok(())
    }

    /// Extraction job completion callback.
    pub fn on_processing_done(
        &self,
        id: &Uuid,
        extracted_text: &str,
        metadata_json: Option<&str>,
    ) -> Result<(), LifecycleError> {
        let effects = processing::complete_processing(
            &self.conn(),
            id,
            extracted_text,
            metadata_json,
            self.config.ai_classify_delay,
        )?;
        self.run_effects(effects);
        Ok(())
    }

    pub fn on_processing_failed(&self, id: &Uuid, message: &str) -> Result<(), LifecycleError> {
        let effects = processing::fail_processing(&self.conn(), id, message)?;
        self.run_effects(effects);
        Ok(())
    }

    pub fn start_ai_processing(&self, id: &Uuid) -> Result<(), LifecycleError> {
        let effects = processing::start_ai_processing(&self.conn(), id)?;
        self.run_effects(effects);
        Ok(())
    }

    /// AI classification job completion callback.
    pub fn on_ai_done(
        &self,
        id: &Uuid,
        category: &str,
        confidence: f32,
        entities: &[String],
    ) -> Result<(), LifecycleError> {
        let effects =
            processing::complete_ai_processing(&self.conn(), id, category, confidence, entities)?;
        self.run_effects(effects);
        Ok(())
    }

    // ── Virus scanning ──────────────────────────────────────

    /// Scan job completion callback.
    pub fn on_scan_done(
        &self,
        id: &Uuid,
        verdict: ScanVerdict,
    ) -> Result<QuarantineReport, LifecycleError> {
        match verdict {
            ScanVerdict::Clean => {
                self.mark_clean(id)?;
                Ok(QuarantineReport {
                    archival_error: None,
                })
            }
            ScanVerdict::Infected { details } => self.mark_infected(id, &details),
            ScanVerdict::Error { message } => {
                self.mark_scan_error(id, &message)?;
                Ok(QuarantineReport {
                    archival_error: None,
                })
            }
        }
    }

    pub fn mark_clean(&self, id: &Uuid) -> Result<(), LifecycleError> {
        let effects = scan::mark_clean(&self.conn(), id)?;
        self.run_effects(effects);
        Ok(())
    }

    pub fn mark_infected(
        &self,
        id: &Uuid,
        details: &str,
    ) -> Result<QuarantineReport, LifecycleError> {
        let outcome = scan::mark_infected(&self.conn(), id, details)?;
        self.run_effects(outcome.effects);
        Ok(QuarantineReport {
            archival_error: outcome.quarantine_error,
        })
    }

    pub fn mark_scan_error(&self, id: &Uuid, message: &str) -> Result<(), LifecycleError> {
        let effects = scan::mark_error(&self.conn(), id, message)?;
        self.run_effects(effects);
        Ok(())
    }

    pub fn is_safe_to_download(&self, id: &Uuid) -> Result<bool, LifecycleError> {
        scan::is_safe_to_download(&self.conn(), id)
    }

    // ── Versioning ──────────────────────────────────────────

    pub fn commit(
        &self,
        id: &Uuid,
        actor: &str,
        bytes: &[u8],
        comment: Option<&str>,
    ) -> Result<Version, VersionError> {
        let (version, effects) = versioning::commit(
            &mut self.conn(),
            self.blobs.as_ref(),
            id,
            actor,
            bytes,
            comment,
            self.config.max_content_bytes,
        )?;
        self.run_effects(effects);
        Ok(version)
    }

    pub fn restore(&self, id: &Uuid, actor: &str, target: i64) -> Result<Version, VersionError> {
        let (version, effects) = versioning::restore(
            &mut self.conn(),
            self.blobs.as_ref(),
            id,
            actor,
            target,
            self.config.max_content_bytes,
        )?;
        self.run_effects(effects);
        Ok(version)
    }

    pub fn diff(&self, id: &Uuid, from: i64, to: i64) -> Result<DiffResult, VersionError> {
        versioning::diff(&self.conn(), self.blobs.as_ref(), id, from, to)
    }

    pub fn history(&self, id: &Uuid) -> Result<Vec<Version>, VersionError> {
        versioning::history(&self.conn(), id)
    }
}
