//! External collaborator boundary.
//!
//! The coordinator consumes identity/permission evaluation, blob byte
//! storage, the asynchronous job runner and the notification sink as
//! opaque traits. Trait-based DI keeps every state machine testable
//! without any of those systems present; in-memory implementations for
//! tests and small deployments live at the bottom of this module.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::models::enums::VersionEvent;
use crate::models::Document;

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Action an actor wants to perform on a document, passed verbatim to the
/// external permission evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessAction {
    Read,
    Edit,
    Delete,
    Move,
    Tag,
    Lock,
    Unlock,
    ForceUnlock,
    Archive,
    RequestValidation,
    Classify,
    Download,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Tag => "tag",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::ForceUnlock => "force_unlock",
            Self::Archive => "archive",
            Self::RequestValidation => "request_validation",
            Self::Classify => "classify",
            Self::Download => "download",
        }
    }
}

/// Opaque permission evaluator. The coordinator never inspects roles or
/// grants; it only asks yes/no.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, actor: &str, action: AccessAction, document: &Document) -> bool;
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob {0} not found")]
    NotFound(String),

    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Opaque storage for file bytes. Version snapshots stay readable after a
/// document's current attachment is purged; only the document association
/// is dropped.
pub trait BlobStore: Send + Sync {
    /// Store bytes for a document and return an opaque content ref.
    fn attach(&self, document_id: Uuid, bytes: &[u8]) -> Result<String, BlobError>;

    /// Drop the document's current attachment association.
    fn purge(&self, document_id: Uuid) -> Result<(), BlobError>;

    /// Read the bytes behind a content ref (current or historical).
    fn read(&self, content_ref: &str) -> Result<Vec<u8>, BlobError>;
}

// ---------------------------------------------------------------------------
// Job runner
// ---------------------------------------------------------------------------

/// Jobs the coordinator hands to the external runner. Completion flows
/// back through the service's `on_processing_done` / `on_ai_done` /
/// `on_scan_done` entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobKind {
    ExtractContent,
    ClassifyAi,
    VirusScan,
}

pub trait JobRunner: Send + Sync {
    fn enqueue(&self, job: JobKind, document_id: Uuid, delay: Option<Duration>);
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Fire-and-forget events. Delivery is a collaborator concern.
#[derive(Debug, Clone, Serialize)]
pub enum Event {
    VirusDetected {
        document_id: Uuid,
        details: String,
    },
    ProcessingFailed {
        document_id: Uuid,
        message: String,
    },
    VersionCreated {
        document_id: Uuid,
        version_number: i64,
        event: VersionEvent,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: Event);
}

// ---------------------------------------------------------------------------
// In-memory implementations (tests, embedded deployments)
// ---------------------------------------------------------------------------

/// Grants everything. Useful where permission evaluation happens upstream.
pub struct AllowAllAuthorizer;

impl Authorizer for AllowAllAuthorizer {
    fn authorize(&self, _actor: &str, _action: AccessAction, _document: &Document) -> bool {
        true
    }
}

/// Content-addressed in-memory blob store. Snapshots are keyed by their
/// SHA-256, so historical version refs survive a purge.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: Mutex<MemoryBlobs>,
}

#[derive(Default)]
struct MemoryBlobs {
    blobs: HashMap<String, Vec<u8>>,
    current: HashMap<Uuid, String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn attach(&self, document_id: Uuid, bytes: &[u8]) -> Result<String, BlobError> {
        let content_ref = format!("sha256:{:x}", Sha256::digest(bytes));
        let mut inner = self.inner.lock().expect("blob store poisoned");
        inner.blobs.insert(content_ref.clone(), bytes.to_vec());
        inner.current.insert(document_id, content_ref.clone());
        Ok(content_ref)
    }

    fn purge(&self, document_id: Uuid) -> Result<(), BlobError> {
        let mut inner = self.inner.lock().expect("blob store poisoned");
        inner.current.remove(&document_id);
        Ok(())
    }

    fn read(&self, content_ref: &str) -> Result<Vec<u8>, BlobError> {
        let inner = self.inner.lock().expect("blob store poisoned");
        inner
            .blobs
            .get(content_ref)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(content_ref.to_string()))
    }
}

/// Records enqueued jobs instead of running them.
#[derive(Default)]
pub struct QueueJobRunner {
    queued: Mutex<Vec<(JobKind, Uuid, Option<Duration>)>>,
}

impl QueueJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<(JobKind, Uuid, Option<Duration>)> {
        std::mem::take(&mut *self.queued.lock().expect("job queue poisoned"))
    }
}

impl JobRunner for QueueJobRunner {
    fn enqueue(&self, job: JobKind, document_id: Uuid, delay: Option<Duration>) {
        self.queued
            .lock()
            .expect("job queue poisoned")
            .push((job, document_id, delay));
    }
}

/// Collects emitted events for inspection.
#[derive(Default)]
pub struct CollectingNotifier {
    events: Mutex<Vec<Event>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().expect("notifier poisoned"))
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, event: Event) {
        self.events.lock().expect("notifier poisoned").push(event);
    }
}
