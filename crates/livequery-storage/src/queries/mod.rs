// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod campaigns;
pub mod inventory;

use chrono::{DateTime, Utc};
use livequery_core::LiveQueryError;
use rusqlite::types::Type;

/// SQLite integer for a numeric ID, or `None` if the ID is above
/// `i64::MAX` and so cannot exist in the database.
pub(crate) fn sql_id(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

/// SQLite integer for an ID about to be written.
pub(crate) fn write_id(kind: &'static str, id: u64) -> Result<i64, LiveQueryError> {
    sql_id(id).ok_or_else(|| {
        LiveQueryError::persistence(format!("{kind} id {id} is outside the SQLite integer range"))
    })
}

/// Numeric ID from a SQLite integer column.
pub(crate) fn column_id(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

/// RFC 3339 timestamp from a TEXT column.
pub(crate) fn column_time(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_time(&raw, idx)
}

pub(crate) fn parse_time(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
