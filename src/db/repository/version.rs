use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::VersionEvent;
use crate::models::Version;

use super::{format_ts, parse_ts};

pub fn insert_version(conn: &Connection, version: &Version) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO versions (id, document_id, version_number, event, comment,
         created_by, created_at, content_ref)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            version.id.to_string(),
            version.document_id.to_string(),
            version.version_number,
            version.event.as_str(),
            version.comment,
            version.created_by,
            format_ts(version.created_at),
            version.content_ref,
        ],
    )?;
    Ok(())
}

pub fn get_version(
    conn: &Connection,
    document_id: &Uuid,
    number: i64,
) -> Result<Option<Version>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, document_id, version_number, event, comment, created_by, created_at, content_ref
         FROM versions WHERE document_id = ?1 AND version_number = ?2",
    )?;

    let result = stmt.query_row(params![document_id.to_string(), number], row_to_raw);

    match result {
        Ok(row) => Ok(Some(version_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All versions of a document, newest first.
pub fn list_versions(conn: &Connection, document_id: &Uuid) -> Result<Vec<Version>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, document_id, version_number, event, comment, created_by, created_at, content_ref
         FROM versions WHERE document_id = ?1 ORDER BY version_number DESC",
    )?;

    let rows = stmt.query_map(params![document_id.to_string()], row_to_raw)?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(version_from_row(row?)?);
    }
    Ok(versions)
}

pub fn count_versions(conn: &Connection, document_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM versions WHERE document_id = ?1",
        params![document_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct VersionRow {
    id: String,
    document_id: String,
    version_number: i64,
    event: String,
    comment: Option<String>,
    created_by: String,
    created_at: String,
    content_ref: String,
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok(VersionRow {
        id: row.get(0)?,
        document_id: row.get(1)?,
        version_number: row.get(2)?,
        event: row.get(3)?,
        comment: row.get(4)?,
        created_by: row.get(5)?,
        created_at: row.get(6)?,
        content_ref: row.get(7)?,
    })
}

fn version_from_row(row: VersionRow) -> Result<Version, DatabaseError> {
    Ok(Version {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        document_id: Uuid::parse_str(&row.document_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        version_number: row.version_number,
        event: VersionEvent::from_str(&row.event)?,
        comment: row.comment,
        created_by: row.created_by,
        created_at: parse_ts(&row.created_at)?,
        content_ref: row.content_ref,
    })
}
