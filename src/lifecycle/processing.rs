//! Processing state machine: Pending → Processing → {AiProcessing →
//! Completed, Completed, Failed}.
//!
//! Transitions are driven by job-completion callbacks, never polled.
//! Failed and Completed are terminal until a new version resets the
//! machine; the one exception is `start_ai_processing`, which re-opens
//! Completed for the deferred classification pass.

use std::time::Duration;

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository;
use crate::external::{Event, JobKind};
use crate::models::enums::ProcessingStatus;
use crate::models::Document;

use super::{LifecycleError, SideEffect};

/// Pending → Processing.
pub fn start_processing(conn: &Connection, id: &Uuid) -> Result<Vec<SideEffect>, LifecycleError> {
    let doc = load_mutable(conn, id)?;
    expect_status(&doc, ProcessingStatus::Pending, ProcessingStatus::Processing)?;

    repository::update_processing_status(conn, id, ProcessingStatus::Processing)?;
    tracing::info!(doc = %id, "Processing started");
    Ok(vec![])
}

/// Processing → Completed. Stores extraction output; AI-eligible content
/// kinds get a deferred classification job instead of an immediate
/// transition.
pub fn complete_processing(
    conn: &Connection,
    id: &Uuid,
    extracted_text: &str,
    metadata_json: Option<&str>,
    ai_delay: Duration,
) -> Result<Vec<SideEffect>, LifecycleError> {
    let doc = load_mutable(conn, id)?;
    expect_status(&doc, ProcessingStatus::Processing, ProcessingStatus::Completed)?;

    repository::record_extraction(conn, id, extracted_text, metadata_json)?;
    tracing::info!(doc = %id, chars = extracted_text.len(), "Extraction completed");

    if doc.content_kind.ai_eligible() {
        Ok(vec![SideEffect::Enqueue {
            job: JobKind::ClassifyAi,
            document_id: *id,
            delay: Some(ai_delay),
        }])
    } else {
        Ok(vec![])
    }
}

/// Completed → AiProcessing.
pub fn start_ai_processing(
    conn: &Connection,
    id: &Uuid,
) -> Result<Vec<SideEffect>, LifecycleError> {
    let doc = load_mutable(conn, id)?;
    expect_status(&doc, ProcessingStatus::Completed, ProcessingStatus::AiProcessing)?;

    repository::update_processing_status(conn, id, ProcessingStatus::AiProcessing)?;
    tracing::info!(doc = %id, "AI classification started");
    Ok(vec![])
}

/// AiProcessing → Completed with classification results.
pub fn complete_ai_processing(
    conn: &Connection,
    id: &Uuid,
    category: &str,
    confidence: f32,
    entities: &[String],
) -> Result<Vec<SideEffect>, LifecycleError> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(LifecycleError::InvalidConfidence(confidence));
    }

    let doc = load_mutable(conn, id)?;
    expect_status(&doc, ProcessingStatus::AiProcessing, ProcessingStatus::Completed)?;

    repository::record_ai_results(conn, id, category, confidence, entities)?;
    tracing::info!(doc = %id, category, confidence, "AI classification completed");
    Ok(vec![])
}

/// Processing | AiProcessing → Failed. Not retried automatically; a new
/// version is the reprocessing trigger.
pub fn fail_processing(
    conn: &Connection,
    id: &Uuid,
    message: &str,
) -> Result<Vec<SideEffect>, LifecycleError> {
    let doc = load_mutable(conn, id)?;
    match doc.processing_status {
        ProcessingStatus::Processing | ProcessingStatus::AiProcessing => {}
        other => {
            return Err(LifecycleError::InvalidTransition {
                from: other.as_str(),
                to: ProcessingStatus::Failed.as_str(),
            })
        }
    }

    repository::record_processing_failure(conn, id, message)?;
    tracing::warn!(doc = %id, message, "Processing failed");

    Ok(vec![SideEffect::Notify(Event::ProcessingFailed {
        document_id: *id,
        message: message.to_string(),
    })])
}

/// Force any state back to Pending and clear derived fields. A new
/// version invalidates all prior extraction and classification output,
/// so this transition is deliberately not graph-constrained. Called only
/// from the version store's commit.
pub(crate) fn reset_for_new_version(conn: &Connection, id: &Uuid) -> Result<(), LifecycleError> {
    repository::clear_derived_state(conn, id)?;
    tracing::debug!(doc = %id, "Processing state reset for new version");
    Ok(())
}

fn load_mutable(conn: &Connection, id: &Uuid) -> Result<Document, LifecycleError> {
    let doc = repository::get_document(conn, id)?
        .ok_or(LifecycleError::DocumentNotFound(*id))?;
    if doc.is_archived() {
        return Err(LifecycleError::Archived(*id));
    }
    Ok(doc)
}

fn expect_status(
    doc: &Document,
    expected: ProcessingStatus,
    target: ProcessingStatus,
) -> Result<(), LifecycleError> {
    if doc.processing_status != expected {
        return Err(LifecycleError::InvalidTransition {
            from: doc.processing_status.as_str(),
            to: target.as_str(),
        });
    }
    Ok(())
}
