//! Transactional local store over typed collections.
//!
//! Every operation locks the shared connection, so interleaved async
//! callers (a sync cycle next to a user edit) never observe partial
//! writes. Records are stored as JSON payloads with indexed columns for
//! the lookups the engine needs without a full scan.

mod outbox;
mod record;

pub use record::Record;

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection};
use tokio::sync::Mutex;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{OutboxEntry, OutboxOp, RemoteCacheEntry, Submission, SubmissionId, TemplateId};

/// Thread-safe handle to the local collections and the outbox.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open(path)?)),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open_in_memory()?)),
        })
    }

    /// Insert or replace a record.
    pub async fn put<T: Record>(&self, record: &T) -> Result<()> {
        let db = self.db.lock().await;
        put_record(db.connection(), record)
    }

    /// Insert or replace a record and enqueue the matching outbox entry
    /// in the same transaction. Returns the outbox entry id.
    ///
    /// This is the only write path for user-authored data: a submission
    /// with `synced = false` always has a pending outbox entry.
    pub async fn put_with_outbox<T: Record>(&self, record: &T, op: OutboxOp) -> Result<i64> {
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction()?;
        put_record(&tx, record)?;
        let payload = serde_json::to_value(record)?;
        let entry_id = outbox::enqueue(&tx, op, T::COLLECTION, &payload)?;
        tx.commit()?;
        Ok(entry_id)
    }

    /// Fetch a record by id.
    pub async fn get_by_id<T: Record>(&self, id: &str) -> Result<Option<T>> {
        let db = self.db.lock().await;
        let sql = format!("SELECT payload FROM {} WHERE id = ?1", T::COLLECTION);
        let result = db
            .connection()
            .query_row(&sql, params![id], |row| row.get::<_, String>(0));
        match result {
            Ok(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All records of a collection, newest first.
    pub async fn get_all<T: Record>(&self) -> Result<Vec<T>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT payload FROM {} ORDER BY created_at DESC",
            T::COLLECTION
        );
        collect_payloads(db.connection(), &sql, [])
    }

    /// Records matching an equality filter on a secondary-index column.
    pub async fn get_all_where<T: Record>(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Vec<T>> {
        ensure_index_column::<T>(column)?;
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT payload FROM {} WHERE {column} = ?1 ORDER BY created_at DESC",
            T::COLLECTION
        );
        collect_payloads(db.connection(), &sql, params![value])
    }

    /// Delete one record by id. Returns whether a row was removed.
    pub async fn delete_by_id<T: Record>(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let sql = format!("DELETE FROM {} WHERE id = ?1", T::COLLECTION);
        let rows = db.connection().execute(&sql, params![id])?;
        Ok(rows > 0)
    }

    /// Delete all records matching an equality filter on an index column.
    pub async fn delete_where<T: Record>(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<usize> {
        ensure_index_column::<T>(column)?;
        let db = self.db.lock().await;
        let sql = format!("DELETE FROM {} WHERE {column} = ?1", T::COLLECTION);
        Ok(db.connection().execute(&sql, params![value])?)
    }

    /// Replace the whole collection in one transaction (reference-data
    /// refresh and remote-cache rebuilds).
    pub async fn replace_all<T: Record>(&self, records: &[T]) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction()?;
        tx.execute(&format!("DELETE FROM {}", T::COLLECTION), [])?;
        for record in records {
            put_record(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a template together with its submissions and their photos.
    pub async fn delete_template_cascade(&self, template_id: &TemplateId) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction()?;
        {
            let mut stmt =
                tx.prepare("SELECT id FROM submissions WHERE template_id = ?1")?;
            let submission_ids = stmt
                .query_map(params![template_id.as_str()], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for submission_id in submission_ids {
                tx.execute(
                    "DELETE FROM photos WHERE submission_id = ?1",
                    params![submission_id],
                )?;
            }
        }
        tx.execute(
            "DELETE FROM submissions WHERE template_id = ?1",
            params![template_id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM templates WHERE id = ?1",
            params![template_id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Flip a submission's `synced` flag after a confirmed upsert.
    pub async fn mark_submission_synced(&self, id: &SubmissionId) -> Result<()> {
        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "UPDATE submissions SET payload = json_set(payload, '$.synced', json('true'))
             WHERE id = ?1",
            params![id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Newest local submission for the duplicate-window key, created at or
    /// after `since`.
    pub async fn find_recent_submission(
        &self,
        equipment_code: &str,
        category: &str,
        since: i64,
    ) -> Result<Option<Submission>> {
        let db = self.db.lock().await;
        let result = db.connection().query_row(
            "SELECT payload FROM submissions
             WHERE equipment_code = ?1 AND category = ?2 AND created_at >= ?3
             ORDER BY created_at DESC
             LIMIT 1",
            params![equipment_code, category, since],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the remote cache holds a confirmed submission for the
    /// duplicate-window key at or after `since`.
    pub async fn remote_cache_has_recent(
        &self,
        equipment_code: &str,
        category: &str,
        since: i64,
    ) -> Result<bool> {
        let entries: Vec<RemoteCacheEntry> = {
            let db = self.db.lock().await;
            collect_payloads(
                db.connection(),
                "SELECT payload FROM remote_cache WHERE created_at >= ?1",
                params![since],
            )?
        };
        Ok(entries.iter().any(|entry| {
            let payload = &entry.payload;
            payload.get("equipment_code").and_then(serde_json::Value::as_str)
                == Some(equipment_code)
                && payload.get("category").and_then(serde_json::Value::as_str) == Some(category)
        }))
    }

    /// Merge one gateway-confirmed entry into the remote cache, keeping
    /// the fresher payload per key.
    pub async fn merge_remote_cache_entry(&self, entry: RemoteCacheEntry) -> Result<()> {
        let existing: Option<RemoteCacheEntry> =
            self.get_by_id(&entry.submission_id.as_str()).await?;
        let winner = match existing {
            Some(current) => current.fresher(entry),
            None => entry,
        };
        self.put(&winner).await
    }

    /// Rebuild the remote cache from a full gateway listing, merged with
    /// the current cache by client id (larger `created_at` wins).
    pub async fn merge_remote_cache(&self, incoming: Vec<RemoteCacheEntry>) -> Result<()> {
        let mut merged: std::collections::HashMap<SubmissionId, RemoteCacheEntry> = self
            .get_all::<RemoteCacheEntry>()
            .await?
            .into_iter()
            .map(|entry| (entry.submission_id, entry))
            .collect();
        for entry in incoming {
            let winner = match merged.remove(&entry.submission_id) {
                Some(current) => current.fresher(entry),
                None => entry,
            };
            merged.insert(winner.submission_id, winner);
        }
        let records: Vec<RemoteCacheEntry> = merged.into_values().collect();
        self.replace_all(&records).await
    }

    // Outbox operations.

    /// Enqueue a standalone mutation (no collection write attached).
    pub async fn enqueue(
        &self,
        op: OutboxOp,
        collection: &str,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        outbox::enqueue(db.connection(), op, collection, payload)
    }

    /// Pending outbox entries, FIFO.
    pub async fn list_pending(&self) -> Result<Vec<OutboxEntry>> {
        let db = self.db.lock().await;
        outbox::list_pending(db.connection())
    }

    /// Fetch a single outbox entry.
    pub async fn get_outbox_entry(&self, entry_id: i64) -> Result<Option<OutboxEntry>> {
        let db = self.db.lock().await;
        outbox::get(db.connection(), entry_id)
    }

    /// Flag an outbox entry as confirmed.
    pub async fn mark_outbox_synced(&self, entry_id: i64) -> Result<()> {
        let db = self.db.lock().await;
        outbox::mark_synced(db.connection(), entry_id)
    }

    /// Record a failed attempt for an entry.
    pub async fn record_outbox_failure(&self, entry_id: i64, error: &str) -> Result<()> {
        let db = self.db.lock().await;
        outbox::record_failure(db.connection(), entry_id, error)
    }

    /// Number of pending outbox entries.
    pub async fn pending_count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        outbox::pending_count(db.connection())
    }
}

fn ensure_index_column<T: Record>(column: &str) -> Result<()> {
    if T::INDEX_COLUMNS.contains(&column) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} is not an indexed column of {}",
            column,
            T::COLLECTION
        )))
    }
}

fn put_record<T: Record>(conn: &Connection, record: &T) -> Result<()> {
    let payload = serde_json::to_string(record)?;
    let mut sql = format!(
        "INSERT OR REPLACE INTO {} (id, payload, created_at",
        T::COLLECTION
    );
    for column in T::INDEX_COLUMNS {
        sql.push_str(", ");
        sql.push_str(column);
    }
    sql.push_str(") VALUES (?1, ?2, ?3");
    for position in 0..T::INDEX_COLUMNS.len() {
        sql.push_str(&format!(", ?{}", position + 4));
    }
    sql.push(')');

    let mut values = vec![
        SqlValue::Text(record.id()),
        SqlValue::Text(payload),
        SqlValue::Integer(record.created_at()),
    ];
    values.extend(record.index_values().into_iter().map(SqlValue::Text));
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn collect_payloads<T: Record, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let payloads = stmt
        .query_map(params, |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    payloads
        .iter()
        .map(|payload| serde_json::from_str(payload).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Photo, Template};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn submission(equipment_code: &str, category: &str) -> Submission {
        Submission::new(
            TemplateId::new(),
            equipment_code,
            category,
            "tech-1",
            Vec::new(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_and_get_by_id() {
        let store = LocalStore::open_in_memory().unwrap();
        let record = submission("PUMP-1", "hydraulic");
        store.put(&record).await.unwrap();

        let fetched: Submission = store
            .get_by_id(&record.id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_all_where_uses_index_columns_only() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(&submission("PUMP-1", "hydraulic")).await.unwrap();
        store.put(&submission("PUMP-2", "hydraulic")).await.unwrap();

        let matching: Vec<Submission> = store
            .get_all_where("equipment_code", "PUMP-1")
            .await
            .unwrap();
        assert_eq!(matching.len(), 1);

        let err = store
            .get_all_where::<Submission>("payload", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_with_outbox_is_atomic_and_fifo() {
        let store = LocalStore::open_in_memory().unwrap();
        let first = submission("PUMP-1", "hydraulic");
        let second = submission("PUMP-2", "electrical");

        let first_entry = store
            .put_with_outbox(&first, OutboxOp::Create)
            .await
            .unwrap();
        let second_entry = store
            .put_with_outbox(&second, OutboxOp::Create)
            .await
            .unwrap();
        assert!(second_entry > first_entry);

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first_entry);
        assert_eq!(pending[0].collection, "submissions");
        assert_eq!(
            pending[0].payload.get("id").and_then(serde_json::Value::as_str),
            Some(first.id.as_str().as_str())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_outbox_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fieldcheck.db");

        {
            let store = LocalStore::open(&path).unwrap();
            store
                .put_with_outbox(&submission("PUMP-1", "hydraulic"), OutboxOp::Create)
                .await
                .unwrap();
        }

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.pending_count().await.unwrap(), 1);
        let pending = reopened.list_pending().await.unwrap();
        assert_eq!(pending[0].attempts, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_outbox_synced_clears_pending() {
        let store = LocalStore::open_in_memory().unwrap();
        let entry_id = store
            .put_with_outbox(&submission("PUMP-1", "hydraulic"), OutboxOp::Create)
            .await
            .unwrap();

        store.mark_outbox_synced(entry_id).await.unwrap();
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_outbox_failure_keeps_entry_pending() {
        let store = LocalStore::open_in_memory().unwrap();
        let entry_id = store
            .put_with_outbox(&submission("PUMP-1", "hydraulic"), OutboxOp::Create)
            .await
            .unwrap();

        store
            .record_outbox_failure(entry_id, "gateway rejected (400)")
            .await
            .unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(
            pending[0].last_error.as_deref(),
            Some("gateway rejected (400)")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_submission_synced_updates_payload() {
        let store = LocalStore::open_in_memory().unwrap();
        let record = submission("PUMP-1", "hydraulic");
        store.put(&record).await.unwrap();

        store.mark_submission_synced(&record.id).await.unwrap();
        let fetched: Submission = store
            .get_by_id(&record.id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert!(fetched.synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replace_all_swaps_collection() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .put(&Template::new("eq-1", "hydraulic", Vec::new()))
            .await
            .unwrap();

        let fresh = vec![
            Template::new("eq-2", "electrical", Vec::new()),
            Template::new("eq-3", "mechanical", Vec::new()),
        ];
        store.replace_all(&fresh).await.unwrap();

        let templates: Vec<Template> = store.get_all().await.unwrap();
        assert_eq!(templates.len(), 2);
        assert!(templates.iter().all(|t| t.equipment_id != "eq-1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_merge_remote_cache_keeps_fresher_entry() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = SubmissionId::new();

        store
            .put(&RemoteCacheEntry {
                submission_id: id,
                payload: serde_json::json!({"v": "local"}),
                created_at: 200,
            })
            .await
            .unwrap();

        // Older incoming payload loses; newer one wins.
        store
            .merge_remote_cache(vec![RemoteCacheEntry {
                submission_id: id,
                payload: serde_json::json!({"v": "stale"}),
                created_at: 100,
            }])
            .await
            .unwrap();
        let kept: RemoteCacheEntry = store.get_by_id(&id.as_str()).await.unwrap().unwrap();
        assert_eq!(kept.payload["v"], "local");

        store
            .merge_remote_cache(vec![RemoteCacheEntry {
                submission_id: id,
                payload: serde_json::json!({"v": "remote"}),
                created_at: 300,
            }])
            .await
            .unwrap();
        let kept: RemoteCacheEntry = store.get_by_id(&id.as_str()).await.unwrap().unwrap();
        assert_eq!(kept.payload["v"], "remote");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_template_cascade_removes_owned_records() {
        let store = LocalStore::open_in_memory().unwrap();
        let template = Template::new("eq-1", "hydraulic", Vec::new());
        store.put(&template).await.unwrap();

        let mut record = submission("PUMP-1", "hydraulic");
        record.template_id = template.id;
        store.put(&record).await.unwrap();
        store
            .put(&Photo::new(record.id, "photos/abc.jpg"))
            .await
            .unwrap();

        store.delete_template_cascade(&template.id).await.unwrap();

        assert!(store
            .get_by_id::<Template>(&template.id.as_str())
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_by_id::<Submission>(&record.id.as_str())
            .await
            .unwrap()
            .is_none());
        let photos: Vec<Photo> = store
            .get_all_where("submission_id", &record.id.as_str())
            .await
            .unwrap();
        assert!(photos.is_empty());
    }
}
