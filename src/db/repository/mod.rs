//! Repository layer — entity-scoped database operations.
//!
//! Free functions over `&Connection`, split into domain sub-modules.
//! All public functions are re-exported here.

mod document;
mod lock;
mod version;

use chrono::NaiveDateTime;

use super::DatabaseError;

pub use document::*;
pub use lock::*;
pub use version::*;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Format a timestamp for TEXT column storage.
pub(crate) fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub(crate) fn parse_ts(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp {s}: {e}")))
}

pub(crate) fn parse_opt_ts(s: Option<&str>) -> Result<Option<NaiveDateTime>, DatabaseError> {
    s.map(parse_ts).transpose()
}
