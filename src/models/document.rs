use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ContentKind, ProcessingStatus, VirusScanStatus};

/// The document aggregate root. Lock, processing, scan and version-counter
/// fields are the only shared mutable state in the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    /// Actor id of the document owner. The owner may always release a lock
    /// on their own document, even when another actor holds it.
    pub owner: String,
    pub content_kind: ContentKind,
    /// Opaque pointer into the blob store. `None` until the first commit.
    pub content_ref: Option<String>,

    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub extracted_text: Option<String>,
    /// Extraction metadata as a JSON object (page count, language, ...).
    pub extraction_metadata: Option<String>,

    pub virus_scan_status: VirusScanStatus,
    pub scan_details: Option<String>,

    pub lock: Option<LockState>,

    /// Monotonically increasing; 0 before the first commit.
    pub current_version: i64,

    pub ai_category: Option<String>,
    pub ai_confidence: Option<f32>,
    pub ai_entities: Vec<String>,

    pub folder: Option<String>,
    pub tags: Vec<String>,
    pub validation_requested: bool,

    /// Set by quarantine or explicit archival. Once set, the document is
    /// read-only.
    pub archived_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl Document {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Downloads are blocked until an explicit clean scan result exists;
    /// a never-scanned document is not safe.
    pub fn is_safe_to_download(&self) -> bool {
        self.virus_scan_status == VirusScanStatus::ScanClean
    }
}

/// Mutual-exclusion marker on a document. At most one per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockState {
    pub holder: String,
    pub reason: Option<String>,
    pub acquired_at: NaiveDateTime,
    /// When the stale-lock sweeper may release this lock without an actor.
    pub scheduled_unlock_at: Option<NaiveDateTime>,
}
