use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::LockState;

use super::{format_ts, parse_ts};

/// Set or refresh a document's lock columns.
pub fn set_lock(conn: &Connection, id: &Uuid, lock: &LockState) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET lock_holder = ?2, lock_reason = ?3,
         lock_acquired_at = ?4, lock_scheduled_unlock_at = ?5
         WHERE id = ?1",
        params![
            id.to_string(),
            lock.holder,
            lock.reason,
            format_ts(lock.acquired_at),
            lock.scheduled_unlock_at.map(format_ts),
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Clear a document's lock columns.
pub fn clear_lock(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET lock_holder = NULL, lock_reason = NULL,
         lock_acquired_at = NULL, lock_scheduled_unlock_at = NULL
         WHERE id = ?1",
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

/// Ids of documents whose lock's scheduled unlock time has passed.
///
/// Scans all held locks and compares in Rust rather than in SQL, so the
/// comparison does not depend on the text encoding of timestamps.
pub fn list_expired_locks(
    conn: &Connection,
    now: NaiveDateTime,
) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, lock_scheduled_unlock_at FROM documents
         WHERE lock_holder IS NOT NULL AND lock_scheduled_unlock_at IS NOT NULL",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut expired = Vec::new();
    for row in rows {
        let (id, unlock_at) = row?;
        if parse_ts(&unlock_at)? <= now {
            expired.push(
                Uuid::parse_str(&id)
                    .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            );
        }
    }
    Ok(expired)
}
