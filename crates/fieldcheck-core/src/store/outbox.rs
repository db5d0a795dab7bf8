//! Outbox queue operations
//!
//! Plain functions over a connection so they compose with the store's
//! transactions: a collection write and its outbox entry commit together.

use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{OutboxEntry, OutboxOp};

/// Append an entry; the caller decides the transaction scope.
pub fn enqueue(
    conn: &Connection,
    op: OutboxOp,
    collection: &str,
    payload: &serde_json::Value,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO outbox (op, collection, payload, enqueued_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            op.as_str(),
            collection,
            payload.to_string(),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Pending entries in enqueue order (FIFO; ascending id).
pub fn list_pending(conn: &Connection) -> Result<Vec<OutboxEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, op, collection, payload, enqueued_at, synced, attempts, last_error
         FROM outbox
         WHERE synced = 0
         ORDER BY id ASC",
    )?;
    let entries = stmt
        .query_map([], parse_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Fetch one entry by id.
pub fn get(conn: &Connection, entry_id: i64) -> Result<Option<OutboxEntry>> {
    let result = conn.query_row(
        "SELECT id, op, collection, payload, enqueued_at, synced, attempts, last_error
         FROM outbox
         WHERE id = ?1",
        params![entry_id],
        parse_entry,
    );
    match result {
        Ok(entry) => Ok(Some(entry)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Flag an entry as confirmed upstream.
pub fn mark_synced(conn: &Connection, entry_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE outbox SET synced = 1, last_error = NULL WHERE id = ?1",
        params![entry_id],
    )?;
    Ok(())
}

/// Record a failed attempt; the entry stays pending.
pub fn record_failure(conn: &Connection, entry_id: i64, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE outbox SET attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
        params![entry_id, error],
    )?;
    Ok(())
}

/// Number of pending entries.
pub fn pending_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM outbox WHERE synced = 0",
        [],
        |row| row.get(0),
    )?;
    Ok(count.unsigned_abs())
}

fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let op: String = row.get(1)?;
    let payload: String = row.get(3)?;
    Ok(OutboxEntry {
        id: row.get(0)?,
        op: OutboxOp::from_str(&op).unwrap_or(OutboxOp::Create),
        collection: row.get(2)?,
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        enqueued_at: row.get(4)?,
        synced: row.get::<_, i32>(5)? != 0,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
    })
}
