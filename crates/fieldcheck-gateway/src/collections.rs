//! Table-agnostic collection persistence.
//!
//! Records are schemaless JSON objects with three bookkeeping fields the
//! store owns: `id`, `created_at`, and `updated_at`. Two backends share
//! the same semantics: `SqliteCollectionStore` (the default) and
//! `FileCollectionStore`, a degraded single-file fallback.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::registry::{self, CollectionSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDir {
    Asc,
    #[default]
    Desc,
}

impl OrderDir {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(AppError::bad_request(format!(
                "orderDir must be `asc` or `desc`, got `{other}`"
            ))),
        }
    }

    const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A parsed list query: equality filters plus ordering and a limit.
#[derive(Debug, Default)]
pub struct ListQuery {
    pub filters: Vec<(String, String)>,
    pub order_by: Option<String>,
    pub order_dir: OrderDir,
    pub limit: Option<u32>,
}

/// Storage seam shared by both backends.
pub trait CollectionStore: Send + Sync {
    fn list(&self, spec: &CollectionSpec, query: &ListQuery) -> Result<Vec<Value>, AppError>;
    fn get_by_id(&self, spec: &CollectionSpec, id: &str) -> Result<Option<Value>, AppError>;
    fn insert(&self, spec: &CollectionSpec, records: Vec<Value>) -> Result<Vec<Value>, AppError>;
    fn upsert(
        &self,
        spec: &CollectionSpec,
        records: Vec<Value>,
        on_conflict: &str,
    ) -> Result<Vec<Value>, AppError>;
    fn delete_by_id(&self, spec: &CollectionSpec, id: &str) -> Result<bool, AppError>;
}

fn validate_query(spec: &CollectionSpec, query: &ListQuery) -> Result<(), AppError> {
    for (field, _) in &query.filters {
        if !spec.allows_field(field) {
            return Err(AppError::bad_request(format!(
                "collection `{}` has no filterable field `{field}`",
                spec.name
            )));
        }
    }
    if let Some(order_by) = &query.order_by {
        if !spec.allows_field(order_by) {
            return Err(AppError::bad_request(format!(
                "collection `{}` cannot be ordered by `{order_by}`",
                spec.name
            )));
        }
    }
    Ok(())
}

fn validate_conflict_key(spec: &CollectionSpec, on_conflict: &str) -> Result<(), AppError> {
    if on_conflict == "id" || spec.filterable.contains(&on_conflict) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "collection `{}` has no conflict key `{on_conflict}`",
            spec.name
        )))
    }
}

/// Fill in the bookkeeping fields on a fresh record.
fn normalize_new(record: Value) -> Result<Map<String, Value>, AppError> {
    let Value::Object(mut object) = record else {
        return Err(AppError::bad_request("records must be JSON objects"));
    };
    let now = chrono::Utc::now().timestamp_millis();
    object
        .entry("id")
        .or_insert_with(|| Value::String(Uuid::now_v7().to_string()));
    object.entry("created_at").or_insert_with(|| now.into());
    object.insert("updated_at".to_string(), now.into());
    Ok(object)
}

fn record_id(object: &Map<String, Value>) -> Result<String, AppError> {
    object
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::bad_request("record `id` must be a string"))
}

fn record_created_at(object: &Map<String, Value>) -> i64 {
    object
        .get("created_at")
        .and_then(Value::as_i64)
        .unwrap_or_default()
}

/// Text rendering used for equality filters, so query-string values can
/// match string, number, and boolean payload fields alike.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// SQLite backend

pub struct SqliteCollectionStore {
    conn: Mutex<Connection>,
}

impl SqliteCollectionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AppError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // Table names come from the compile-time registry only.
        for spec in registry::COLLECTIONS {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                spec.name
            ))?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::internal("collection store lock poisoned"))
    }
}

impl CollectionStore for SqliteCollectionStore {
    fn list(&self, spec: &CollectionSpec, query: &ListQuery) -> Result<Vec<Value>, AppError> {
        validate_query(spec, query)?;
        let conn = self.lock()?;

        let mut sql = format!("SELECT payload FROM {}", spec.name);
        let mut params: Vec<SqlValue> = Vec::new();
        for (index, (field, value)) in query.filters.iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!(
                "CAST(json_extract(payload, ?{}) AS TEXT) = ?{}",
                params.len() + 1,
                params.len() + 2
            ));
            params.push(SqlValue::Text(format!("$.{field}")));
            params.push(SqlValue::Text(value.clone()));
        }
        if let Some(order_by) = &query.order_by {
            sql.push_str(&format!(
                " ORDER BY json_extract(payload, ?{}) {}",
                params.len() + 1,
                query.order_dir.sql()
            ));
            params.push(SqlValue::Text(format!("$.{order_by}")));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT ?{}", params.len() + 1));
            params.push(SqlValue::Integer(i64::from(limit)));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    fn get_by_id(&self, spec: &CollectionSpec, id: &str) -> Result<Option<Value>, AppError> {
        let conn = self.lock()?;
        let sql = format!("SELECT payload FROM {} WHERE id = ?1", spec.name);
        let payload = conn
            .query_row(&sql, params![id], |row| row.get::<_, String>(0))
            .map(Some)
            .or_else(|error| match error {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        payload
            .map(|text| serde_json::from_str(&text).map_err(AppError::from))
            .transpose()
    }

    fn insert(&self, spec: &CollectionSpec, records: Vec<Value>) -> Result<Vec<Value>, AppError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let sql = format!(
            "INSERT INTO {} (id, payload, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            spec.name
        );
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            let object = normalize_new(record)?;
            let id = record_id(&object)?;
            let payload = Value::Object(object);
            let created_at = payload.get("created_at").and_then(Value::as_i64).unwrap_or(0);
            let updated_at = payload.get("updated_at").and_then(Value::as_i64).unwrap_or(0);
            tx.execute(
                &sql,
                params![id, serde_json::to_string(&payload)?, created_at, updated_at],
            )
            .map_err(|error| match error {
                rusqlite::Error::SqliteFailure(inner, _)
                    if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    AppError::bad_request(format!("record `{id}` already exists"))
                }
                other => AppError::from(other),
            })?;
            inserted.push(payload);
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn upsert(
        &self,
        spec: &CollectionSpec,
        records: Vec<Value>,
        on_conflict: &str,
    ) -> Result<Vec<Value>, AppError> {
        validate_conflict_key(spec, on_conflict)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut upserted = Vec::with_capacity(records.len());

        for record in records {
            let mut object = normalize_new(record)?;
            if on_conflict == "id" {
                // Native conflict resolution keyed by the primary key;
                // created_at of an existing row is preserved.
                let id = record_id(&object)?;
                let sql = format!(
                    "INSERT INTO {table} (id, payload, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        payload = json_set(
                            excluded.payload,
                            '$.created_at', json_extract({table}.payload, '$.created_at')
                        ),
                        updated_at = excluded.updated_at",
                    table = spec.name
                );
                let payload = Value::Object(object);
                let created_at = payload.get("created_at").and_then(Value::as_i64).unwrap_or(0);
                let updated_at = payload.get("updated_at").and_then(Value::as_i64).unwrap_or(0);
                tx.execute(
                    &sql,
                    params![id, serde_json::to_string(&payload)?, created_at, updated_at],
                )?;
                let final_payload: String = tx.query_row(
                    &format!("SELECT payload FROM {} WHERE id = ?1", spec.name),
                    params![id],
                    |row| row.get(0),
                )?;
                upserted.push(serde_json::from_str(&final_payload)?);
            } else {
                // Read-then-write inside the immediate transaction; the
                // existing row keeps its id and created_at.
                let conflict_value = object.get(on_conflict).map(value_text).ok_or_else(|| {
                    AppError::bad_request(format!("record is missing conflict key `{on_conflict}`"))
                })?;
                let existing: Option<(String, String)> = tx
                    .query_row(
                        &format!(
                            "SELECT id, payload FROM {}
                             WHERE CAST(json_extract(payload, ?1) AS TEXT) = ?2",
                            spec.name
                        ),
                        params![format!("$.{on_conflict}"), conflict_value],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .map(Some)
                    .or_else(|error| match error {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                if let Some((existing_id, existing_payload)) = existing {
                    let existing: Map<String, Value> = serde_json::from_str(&existing_payload)?;
                    object.insert("id".to_string(), Value::String(existing_id.clone()));
                    object.insert(
                        "created_at".to_string(),
                        record_created_at(&existing).into(),
                    );
                    let payload = Value::Object(object);
                    let updated_at =
                        payload.get("updated_at").and_then(Value::as_i64).unwrap_or(0);
                    tx.execute(
                        &format!(
                            "UPDATE {} SET payload = ?2, updated_at = ?3 WHERE id = ?1",
                            spec.name
                        ),
                        params![existing_id, serde_json::to_string(&payload)?, updated_at],
                    )?;
                    upserted.push(payload);
                } else {
                    let id = record_id(&object)?;
                    let payload = Value::Object(object);
                    let created_at =
                        payload.get("created_at").and_then(Value::as_i64).unwrap_or(0);
                    let updated_at =
                        payload.get("updated_at").and_then(Value::as_i64).unwrap_or(0);
                    tx.execute(
                        &format!(
                            "INSERT INTO {} (id, payload, created_at, updated_at)
                             VALUES (?1, ?2, ?3, ?4)",
                            spec.name
                        ),
                        params![id, serde_json::to_string(&payload)?, created_at, updated_at],
                    )?;
                    upserted.push(payload);
                }
            }
        }

        tx.commit()?;
        Ok(upserted)
    }

    fn delete_by_id(&self, spec: &CollectionSpec, id: &str) -> Result<bool, AppError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", spec.name),
            params![id],
        )?;
        Ok(rows > 0)
    }
}

// ---------------------------------------------------------------------------
// File backend

/// Degraded fallback keeping every collection in one JSON file, guarded by
/// an in-process mutex only.
pub struct FileCollectionStore {
    path: PathBuf,
    state: Mutex<HashMap<String, Vec<Value>>>,
}

impl FileCollectionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let mut state: HashMap<String, Vec<Value>> = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|error| AppError::internal(format!("cannot read store file: {error}")))?;
            serde_json::from_str(&text)?
        } else {
            HashMap::new()
        };
        for spec in registry::COLLECTIONS {
            state.entry(spec.name.to_string()).or_default();
        }
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<Value>>>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::internal("collection store lock poisoned"))
    }

    fn persist(&self, state: &HashMap<String, Vec<Value>>) -> Result<(), AppError> {
        let text = serde_json::to_string(state)?;
        std::fs::write(&self.path, text)
            .map_err(|error| AppError::internal(format!("cannot write store file: {error}")))
    }
}

fn compare_by_field(a: &Value, b: &Value, field: &str) -> Ordering {
    let left = a.get(field);
    let right = b.get(field);
    match (
        left.and_then(Value::as_f64),
        right.and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => {
            let left = left.map(value_text).unwrap_or_default();
            let right = right.map(value_text).unwrap_or_default();
            left.cmp(&right)
        }
    }
}

impl CollectionStore for FileCollectionStore {
    fn list(&self, spec: &CollectionSpec, query: &ListQuery) -> Result<Vec<Value>, AppError> {
        validate_query(spec, query)?;
        let state = self.lock()?;
        let records = state.get(spec.name).cloned().unwrap_or_default();

        let mut matched: Vec<Value> = records
            .into_iter()
            .filter(|record| {
                query.filters.iter().all(|(field, value)| {
                    record.get(field).map(|v| value_text(v)) == Some(value.clone())
                })
            })
            .collect();

        if let Some(order_by) = &query.order_by {
            matched.sort_by(|a, b| compare_by_field(a, b, order_by));
            if query.order_dir == OrderDir::Desc {
                matched.reverse();
            }
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    fn get_by_id(&self, spec: &CollectionSpec, id: &str) -> Result<Option<Value>, AppError> {
        let state = self.lock()?;
        Ok(state.get(spec.name).and_then(|records| {
            records
                .iter()
                .find(|record| record.get("id").and_then(Value::as_str) == Some(id))
                .cloned()
        }))
    }

    fn insert(&self, spec: &CollectionSpec, records: Vec<Value>) -> Result<Vec<Value>, AppError> {
        let mut state = self.lock()?;
        let collection = state.entry(spec.name.to_string()).or_default();
        // Stage the whole batch; a failure must leave the collection
        // untouched, like the SQLite backend's transaction rollback.
        let mut staged = collection.clone();
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            let object = normalize_new(record)?;
            let id = record_id(&object)?;
            if staged
                .iter()
                .any(|existing| existing.get("id").and_then(Value::as_str) == Some(id.as_str()))
            {
                return Err(AppError::bad_request(format!("record `{id}` already exists")));
            }
            let payload = Value::Object(object);
            staged.push(payload.clone());
            inserted.push(payload);
        }
        *collection = staged;
        self.persist(&state)?;
        Ok(inserted)
    }

    fn upsert(
        &self,
        spec: &CollectionSpec,
        records: Vec<Value>,
        on_conflict: &str,
    ) -> Result<Vec<Value>, AppError> {
        validate_conflict_key(spec, on_conflict)?;
        let mut state = self.lock()?;
        let collection = state.entry(spec.name.to_string()).or_default();
        // Same staging rule as `insert`: all or nothing per batch.
        let mut staged = collection.clone();
        let mut upserted = Vec::with_capacity(records.len());

        for record in records {
            let mut object = normalize_new(record)?;
            let conflict_value = object.get(on_conflict).map(value_text).ok_or_else(|| {
                AppError::bad_request(format!("record is missing conflict key `{on_conflict}`"))
            })?;

            let existing = staged.iter_mut().find(|candidate| {
                candidate.get(on_conflict).map(|v| value_text(v)) == Some(conflict_value.clone())
            });
            if let Some(existing) = existing {
                if let Some(existing_object) = existing.as_object() {
                    if let Some(id) = existing_object.get("id").cloned() {
                        object.insert("id".to_string(), id);
                    }
                    object.insert(
                        "created_at".to_string(),
                        record_created_at(existing_object).into(),
                    );
                }
                *existing = Value::Object(object);
                upserted.push(existing.clone());
            } else {
                let payload = Value::Object(object);
                staged.push(payload.clone());
                upserted.push(payload);
            }
        }

        *collection = staged;
        self.persist(&state)?;
        Ok(upserted)
    }

    fn delete_by_id(&self, spec: &CollectionSpec, id: &str) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        let collection = state.entry(spec.name.to_string()).or_default();
        let before = collection.len();
        collection.retain(|record| record.get("id").and_then(Value::as_str) != Some(id));
        let removed = collection.len() < before;
        if removed {
            self.persist(&state)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn backends() -> Vec<(&'static str, Box<dyn CollectionStore>, tempfile::TempDir)> {
        let dir = tempdir().unwrap();
        let file_dir = tempdir().unwrap();
        let sqlite = SqliteCollectionStore::open(dir.path().join("gw.db")).unwrap();
        let file = FileCollectionStore::open(file_dir.path().join("gw.json")).unwrap();
        vec![
            ("sqlite", Box::new(sqlite) as Box<dyn CollectionStore>, dir),
            ("file", Box::new(file) as Box<dyn CollectionStore>, file_dir),
        ]
    }

    fn submissions() -> &'static CollectionSpec {
        registry::lookup("submissions").unwrap()
    }

    fn equipment() -> &'static CollectionSpec {
        registry::lookup("equipment").unwrap()
    }

    #[test]
    fn test_insert_assigns_bookkeeping_fields() {
        for (name, store, _dir) in backends() {
            let inserted = store
                .insert(submissions(), vec![json!({ "equipment_code": "PUMP-1" })])
                .unwrap();
            let record = &inserted[0];
            assert!(record.get("id").and_then(Value::as_str).is_some(), "{name}");
            assert!(record.get("created_at").and_then(Value::as_i64).is_some());
            assert!(record.get("updated_at").and_then(Value::as_i64).is_some());
        }
    }

    #[test]
    fn test_unknown_filter_field_is_rejected() {
        for (name, store, _dir) in backends() {
            let query = ListQuery {
                filters: vec![("password_hash".to_string(), "x".to_string())],
                ..ListQuery::default()
            };
            let err = store.list(submissions(), &query).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{name}");
        }
    }

    #[test]
    fn test_list_filter_order_limit() {
        for (name, store, _dir) in backends() {
            store
                .insert(
                    submissions(),
                    vec![
                        json!({ "id": "s1", "equipment_code": "PUMP-1", "category": "hydraulic", "created_at": 100 }),
                        json!({ "id": "s2", "equipment_code": "PUMP-1", "category": "hydraulic", "created_at": 300 }),
                        json!({ "id": "s3", "equipment_code": "PUMP-2", "category": "hydraulic", "created_at": 200 }),
                    ],
                )
                .unwrap();

            let query = ListQuery {
                filters: vec![("equipment_code".to_string(), "PUMP-1".to_string())],
                order_by: Some("created_at".to_string()),
                order_dir: OrderDir::Desc,
                limit: Some(1),
            };
            let records = store.list(submissions(), &query).unwrap();
            assert_eq!(records.len(), 1, "{name}");
            assert_eq!(records[0]["id"], "s2", "{name}");
        }
    }

    #[test]
    fn test_upsert_by_id_is_idempotent_and_preserves_created_at() {
        for (name, store, _dir) in backends() {
            let first = store
                .upsert(
                    submissions(),
                    vec![json!({ "id": "s1", "equipment_code": "PUMP-1", "percentage": 50 })],
                    "id",
                )
                .unwrap();
            let original_created = first[0]["created_at"].as_i64().unwrap();

            let second = store
                .upsert(
                    submissions(),
                    vec![json!({ "id": "s1", "equipment_code": "PUMP-1", "percentage": 67 })],
                    "id",
                )
                .unwrap();
            assert_eq!(second[0]["percentage"], 67, "{name}");
            assert_eq!(
                second[0]["created_at"].as_i64().unwrap(),
                original_created,
                "{name}"
            );

            let all = store.list(submissions(), &ListQuery::default()).unwrap();
            assert_eq!(all.len(), 1, "{name}");
        }
    }

    #[test]
    fn test_upsert_by_secondary_key_keeps_existing_id() {
        for (name, store, _dir) in backends() {
            store
                .insert(
                    equipment(),
                    vec![json!({ "id": "e1", "code": "PUMP-1", "category": "hydraulic" })],
                )
                .unwrap();

            let upserted = store
                .upsert(
                    equipment(),
                    vec![json!({ "code": "PUMP-1", "category": "electrical" })],
                    "code",
                )
                .unwrap();
            assert_eq!(upserted[0]["id"], "e1", "{name}");
            assert_eq!(upserted[0]["category"], "electrical", "{name}");

            let all = store.list(equipment(), &ListQuery::default()).unwrap();
            assert_eq!(all.len(), 1, "{name}");
        }
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        for (name, store, _dir) in backends() {
            store
                .insert(equipment(), vec![json!({ "id": "e1", "code": "PUMP-1" })])
                .unwrap();
            let err = store
                .insert(equipment(), vec![json!({ "id": "e1", "code": "PUMP-1" })])
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{name}");
        }
    }

    #[test]
    fn test_delete_by_id() {
        for (name, store, _dir) in backends() {
            store
                .insert(equipment(), vec![json!({ "id": "e1", "code": "PUMP-1" })])
                .unwrap();
            assert!(store.delete_by_id(equipment(), "e1").unwrap(), "{name}");
            assert!(!store.delete_by_id(equipment(), "e1").unwrap(), "{name}");
            assert!(store.get_by_id(equipment(), "e1").unwrap().is_none());
        }
    }

    #[test]
    fn test_failed_batch_leaves_no_partial_records() {
        for (name, store, _dir) in backends() {
            // Second record collides with the first; the whole batch must
            // be discarded.
            let err = store
                .insert(
                    equipment(),
                    vec![
                        json!({ "id": "e1", "code": "PUMP-1" }),
                        json!({ "id": "e1", "code": "PUMP-2" }),
                    ],
                )
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{name}");
            let records = store.list(equipment(), &ListQuery::default()).unwrap();
            assert_eq!(records.len(), 0, "{name}");

            let err = store
                .upsert(
                    equipment(),
                    vec![
                        json!({ "code": "PUMP-1" }),
                        json!({ "description": "no conflict key" }),
                    ],
                    "code",
                )
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{name}");
            let records = store.list(equipment(), &ListQuery::default()).unwrap();
            assert_eq!(records.len(), 0, "{name}");
        }
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gw.json");
        {
            let store = FileCollectionStore::open(&path).unwrap();
            store
                .insert(equipment(), vec![json!({ "id": "e1", "code": "PUMP-1" })])
                .unwrap();
        }
        let store = FileCollectionStore::open(&path).unwrap();
        assert!(store.get_by_id(equipment(), "e1").unwrap().is_some());
    }
}
