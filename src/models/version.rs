use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::VersionEvent;

/// An immutable, numbered snapshot of a document's content and metadata.
/// Created only through the version store's commit path; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Unique per document, assigned by the store at commit time.
    pub version_number: i64,
    pub event: VersionEvent,
    pub comment: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    /// Pointer to the stored snapshot in the blob store.
    pub content_ref: String,
}
