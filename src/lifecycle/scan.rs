//! Virus scan state machine: ScanPending → {ScanClean, ScanInfected,
//! ScanError}, independent of the processing machine.
//!
//! Infection is irreversible: it quarantines the document (sets
//! `archived_at`) and nothing in this crate un-quarantines it.

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository;
use crate::external::Event;
use crate::models::enums::VirusScanStatus;

use super::{LifecycleError, SideEffect};

/// Result of `mark_infected`. The scan status is always recorded before
/// archival is attempted; if archival fails, the failure is surfaced here
/// rather than silently dropped — a known-infected, non-archived document
/// must never go unnoticed.
#[derive(Debug)]
pub struct ScanOutcome {
    pub effects: Vec<SideEffect>,
    pub quarantine_error: Option<String>,
}

/// Any non-infected state → ScanClean.
pub fn mark_clean(conn: &Connection, id: &Uuid) -> Result<Vec<SideEffect>, LifecycleError> {
    let doc = repository::get_document(conn, id)?
        .ok_or(LifecycleError::DocumentNotFound(*id))?;

    if doc.virus_scan_status == VirusScanStatus::ScanInfected {
        return Err(LifecycleError::InvalidTransition {
            from: VirusScanStatus::ScanInfected.as_str(),
            to: VirusScanStatus::ScanClean.as_str(),
        });
    }
    if doc.is_archived() {
        return Err(LifecycleError::Archived(*id));
    }

    repository::update_scan_status(conn, id, VirusScanStatus::ScanClean, None)?;
    tracing::info!(doc = %id, "Virus scan clean");
    Ok(vec![])
}

/// Any state → ScanInfected. Quarantines the document and emits a
/// VirusDetected event. Idempotent on an already-infected document.
pub fn mark_infected(
    conn: &Connection,
    id: &Uuid,
    details: &str,
) -> Result<ScanOutcome, LifecycleError> {
    let doc = repository::get_document(conn, id)?
        .ok_or(LifecycleError::DocumentNotFound(*id))?;

    if doc.virus_scan_status == VirusScanStatus::ScanInfected {
        return Ok(ScanOutcome {
            effects: vec![],
            quarantine_error: None,
        });
    }

    // Record the scan result first; archival failure must not lose it.
    repository::update_scan_status(conn, id, VirusScanStatus::ScanInfected, Some(details))?;
    tracing::error!(doc = %id, details, "Virus detected, quarantining");

    let quarantine_error = if doc.archived_at.is_none() {
        match repository::set_archived(conn, id, Utc::now().naive_utc()) {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(doc = %id, error = %e, "Quarantine archival failed");
                Some(e.to_string())
            }
        }
    } else {
        None
    };

    Ok(ScanOutcome {
        effects: vec![SideEffect::Notify(Event::VirusDetected {
            document_id: *id,
            details: details.to_string(),
        })],
        quarantine_error,
    })
}

/// Any non-infected state → ScanError. Non-fatal: downloads stay blocked
/// but the document is not archived.
pub fn mark_error(
    conn: &Connection,
    id: &Uuid,
    message: &str,
) -> Result<Vec<SideEffect>, LifecycleError> {
    let doc = repository::get_document(conn, id)?
        .ok_or(LifecycleError::DocumentNotFound(*id))?;

    if doc.virus_scan_status == VirusScanStatus::ScanInfected {
        return Err(LifecycleError::InvalidTransition {
            from: VirusScanStatus::ScanInfected.as_str(),
            to: VirusScanStatus::ScanError.as_str(),
        });
    }
    if doc.is_archived() {
        return Err(LifecycleError::Archived(*id));
    }

    repository::update_scan_status(conn, id, VirusScanStatus::ScanError, Some(message))?;
    tracing::warn!(doc = %id, message, "Virus scan error");
    Ok(vec![])
}

/// The safe-to-download gate: only an explicit clean result passes. A
/// never-scanned document is not safe.
pub fn is_safe_to_download(conn: &Connection, id: &Uuid) -> Result<bool, LifecycleError> {
    let doc = repository::get_document(conn, id)?
        .ok_or(LifecycleError::DocumentNotFound(*id))?;
    Ok(doc.is_safe_to_download())
}
