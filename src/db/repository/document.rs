use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::{Document, LockState};

use super::{format_ts, parse_opt_ts, parse_ts};

const DOCUMENT_COLUMNS: &str = "id, title, owner, content_kind, content_ref,
     processing_status, processing_error, extracted_text, extraction_metadata,
     virus_scan_status, scan_details,
     lock_holder, lock_reason, lock_acquired_at, lock_scheduled_unlock_at,
     current_version, ai_category, ai_confidence, ai_entities,
     folder, tags, validation_requested, archived_at, created_at";

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, title, owner, content_kind, content_ref,
         processing_status, processing_error, extracted_text, extraction_metadata,
         virus_scan_status, scan_details,
         lock_holder, lock_reason, lock_acquired_at, lock_scheduled_unlock_at,
         current_version, ai_category, ai_confidence, ai_entities,
         folder, tags, validation_requested, archived_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                 ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
        params![
            doc.id.to_string(),
            doc.title,
            doc.owner,
            doc.content_kind.as_str(),
            doc.content_ref,
            doc.processing_status.as_str(),
            doc.processing_error,
            doc.extracted_text,
            doc.extraction_metadata,
            doc.virus_scan_status.as_str(),
            doc.scan_details,
            doc.lock.as_ref().map(|l| l.holder.clone()),
            doc.lock.as_ref().and_then(|l| l.reason.clone()),
            doc.lock.as_ref().map(|l| format_ts(l.acquired_at)),
            doc.lock
                .as_ref()
                .and_then(|l| l.scheduled_unlock_at.map(format_ts)),
            doc.current_version,
            doc.ai_category,
            doc.ai_confidence,
            serde_json::to_string(&doc.ai_entities)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            doc.folder,
            serde_json::to_string(&doc.tags)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            doc.validation_requested as i32,
            doc.archived_at.map(format_ts),
            format_ts(doc.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], row_to_raw);

    match result {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Get a document or a typed NotFound error. Most coordinator paths need
/// the document to exist before doing anything else.
pub fn require_document(conn: &Connection, id: &Uuid) -> Result<Document, DatabaseError> {
    get_document(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Document".into(),
        id: id.to_string(),
    })
}

/// Delete a document. Versions cascade via the FK.
pub fn delete_document(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM documents WHERE id = ?1",
        params![id.to_string()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Update only the processing_status of a document.
pub fn update_processing_status(
    conn: &Connection,
    id: &Uuid,
    status: ProcessingStatus,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET processing_status = ?2 WHERE id = ?1",
        params![id.to_string(), status.as_str()],
    )?;
    ensure_updated(rows, id)
}

/// Record extraction output and mark processing completed.
pub fn record_extraction(
    conn: &Connection,
    id: &Uuid,
    extracted_text: &str,
    metadata_json: Option<&str>,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET processing_status = ?2, extracted_text = ?3,
         extraction_metadata = ?4, processing_error = NULL
         WHERE id = ?1",
        params![
            id.to_string(),
            ProcessingStatus::Completed.as_str(),
            extracted_text,
            metadata_json,
        ],
    )?;
    ensure_updated(rows, id)
}

/// Record a processing failure and its message.
pub fn record_processing_failure(
    conn: &Connection,
    id: &Uuid,
    message: &str,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET processing_status = ?2, processing_error = ?3 WHERE id = ?1",
        params![id.to_string(), ProcessingStatus::Failed.as_str(), message],
    )?;
    ensure_updated(rows, id)
}

/// Store AI classification results and mark processing completed.
pub fn record_ai_results(
    conn: &Connection,
    id: &Uuid,
    category: &str,
    confidence: f32,
    entities: &[String],
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET processing_status = ?2, ai_category = ?3,
         ai_confidence = ?4, ai_entities = ?5
         WHERE id = ?1",
        params![
            id.to_string(),
            ProcessingStatus::Completed.as_str(),
            category,
            confidence,
            serde_json::to_string(entities)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        ],
    )?;
    ensure_updated(rows, id)
}

/// Reset all derived state for a new version: processing back to pending,
/// AI fields, extraction output and error cleared.
pub fn clear_derived_state(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET processing_status = ?2, processing_error = NULL,
         extracted_text = NULL, extraction_metadata = NULL,
         ai_category = NULL, ai_confidence = NULL, ai_entities = '[]'
         WHERE id = ?1",
        params![id.to_string(), ProcessingStatus::Pending.as_str()],
    )?;
    ensure_updated(rows, id)
}

/// Update the virus scan status and optional details.
pub fn update_scan_status(
    conn: &Connection,
    id: &Uuid,
    status: VirusScanStatus,
    details: Option<&str>,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET virus_scan_status = ?2, scan_details = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), details],
    )?;
    ensure_updated(rows, id)
}

pub fn set_archived(
    conn: &Connection,
    id: &Uuid,
    when: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET archived_at = ?2 WHERE id = ?1",
        params![id.to_string(), format_ts(when)],
    )?;
    ensure_updated(rows, id)
}

pub fn set_content_ref(
    conn: &Connection,
    id: &Uuid,
    content_ref: &str,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET content_ref = ?2 WHERE id = ?1",
        params![id.to_string(), content_ref],
    )?;
    ensure_updated(rows, id)
}

pub fn set_current_version(conn: &Connection, id: &Uuid, number: i64) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET current_version = ?2 WHERE id = ?1",
        params![id.to_string(), number],
    )?;
    ensure_updated(rows, id)
}

pub fn set_folder(conn: &Connection, id: &Uuid, folder: &str) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET folder = ?2 WHERE id = ?1",
        params![id.to_string(), folder],
    )?;
    ensure_updated(rows, id)
}

pub fn set_tags(conn: &Connection, id: &Uuid, tags: &[String]) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET tags = ?2 WHERE id = ?1",
        params![
            id.to_string(),
            serde_json::to_string(tags)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        ],
    )?;
    ensure_updated(rows, id)
}

pub fn set_validation_requested(
    conn: &Connection,
    id: &Uuid,
    requested: bool,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET validation_requested = ?2 WHERE id = ?1",
        params![id.to_string(), requested as i32],
    )?;
    ensure_updated(rows, id)
}

fn ensure_updated(rows: usize, id: &Uuid) -> Result<(), DatabaseError> {
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

pub(crate) struct DocumentRow {
    id: String,
    title: String,
    owner: String,
    content_kind: String,
    content_ref: Option<String>,
    processing_status: String,
    processing_error: Option<String>,
    extracted_text: Option<String>,
    extraction_metadata: Option<String>,
    virus_scan_status: String,
    scan_details: Option<String>,
    lock_holder: Option<String>,
    lock_reason: Option<String>,
    lock_acquired_at: Option<String>,
    lock_scheduled_unlock_at: Option<String>,
    current_version: i64,
    ai_category: Option<String>,
    ai_confidence: Option<f32>,
    ai_entities: Option<String>,
    folder: Option<String>,
    tags: Option<String>,
    validation_requested: i32,
    archived_at: Option<String>,
    created_at: String,
}

pub(crate) fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        title: row.get(1)?,
        owner: row.get(2)?,
        content_kind: row.get(3)?,
        content_ref: row.get(4)?,
        processing_status: row.get(5)?,
        processing_error: row.get(6)?,
        extracted_text: row.get(7)?,
        extraction_metadata: row.get(8)?,
        virus_scan_status: row.get(9)?,
        scan_details: row.get(10)?,
        lock_holder: row.get(11)?,
        lock_reason: row.get(12)?,
        lock_acquired_at: row.get(13)?,
        lock_scheduled_unlock_at: row.get(14)?,
        current_version: row.get(15)?,
        ai_category: row.get(16)?,
        ai_confidence: row.get(17)?,
        ai_entities: row.get(18)?,
        folder: row.get(19)?,
        tags: row.get(20)?,
        validation_requested: row.get(21)?,
        archived_at: row.get(22)?,
        created_at: row.get(23)?,
    })
}

pub(crate) fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    let lock = match row.lock_holder {
        Some(holder) => Some(LockState {
            holder,
            reason: row.lock_reason,
            acquired_at: row
                .lock_acquired_at
                .as_deref()
                .map(parse_ts)
                .transpose()?
                .unwrap_or_default(),
            scheduled_unlock_at: parse_opt_ts(row.lock_scheduled_unlock_at.as_deref())?,
        }),
        None => None,
    };

    Ok(Document {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        title: row.title,
        owner: row.owner,
        content_kind: ContentKind::from_str(&row.content_kind)?,
        content_ref: row.content_ref,
        processing_status: ProcessingStatus::from_str(&row.processing_status)?,
        processing_error: row.processing_error,
        extracted_text: row.extracted_text,
        extraction_metadata: row.extraction_metadata,
        virus_scan_status: VirusScanStatus::from_str(&row.virus_scan_status)?,
        scan_details: row.scan_details,
        lock,
        current_version: row.current_version,
        ai_category: row.ai_category,
        ai_confidence: row.ai_confidence,
        ai_entities: row
            .ai_entities
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?
            .unwrap_or_default(),
        folder: row.folder,
        tags: row
            .tags
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?
            .unwrap_or_default(),
        validation_requested: row.validation_requested != 0,
        archived_at: parse_opt_ts(row.archived_at.as_deref())?,
        created_at: parse_ts(&row.created_at)?,
    })
}
