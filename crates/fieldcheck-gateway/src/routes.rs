use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::{authorize, require_auth, Access, AuthenticatedUser};
use crate::collections::{
    CollectionStore, FileCollectionStore, ListQuery, OrderDir, SqliteCollectionStore,
};
use crate::config::{Backend, GatewayConfig};
use crate::error::AppError;
use crate::registry::{self, CollectionSpec};
use crate::storage::BlobStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn CollectionStore>,
    pub blobs: Arc<BlobStore>,
}

impl AppState {
    pub fn from_config(config: Arc<GatewayConfig>) -> Result<Self, AppError> {
        let store: Arc<dyn CollectionStore> = match config.backend {
            Backend::Sqlite => Arc::new(SqliteCollectionStore::open(&config.db_path)?),
            Backend::File => Arc::new(FileCollectionStore::open(&config.file_store_path)?),
        };
        let blobs = Arc::new(BlobStore::new(&config.storage_root)?);
        Ok(Self {
            config,
            store,
            blobs,
        })
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/collection/{name}", get(list_collection))
        .route("/collection/{name}/insert", post(insert_collection))
        .route("/collection/{name}/upsert", post(upsert_collection))
        .route("/collection/{name}/{id}", delete(delete_record))
        .route("/auth/session", get(session))
        .route("/auth/signout", post(signout))
        .route("/storage/upload", post(upload_blob))
        .route("/storage/file/{bucket}/{*path}", get(download_blob))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/signup", post(signup))
        .route("/auth/signin", post(signin))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

fn spec(name: &str) -> Result<&'static CollectionSpec, AppError> {
    registry::lookup(name)
        .ok_or_else(|| AppError::not_found(format!("unknown collection `{name}`")))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

// ---------------------------------------------------------------------------
// Auth

#[derive(Debug, Deserialize)]
struct SignupBody {
    email: String,
    password: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct SigninBody {
    email: String,
    password: String,
}

fn public_user(mut user: Value) -> Value {
    if let Some(object) = user.as_object_mut() {
        object.remove("password_hash");
    }
    user
}

/// Credentials never leave the gateway, not even for admins.
fn strip_credentials(spec: &CollectionSpec, records: Vec<Value>) -> Vec<Value> {
    if spec.name == "users" {
        records.into_iter().map(public_user).collect()
    } else {
        records
    }
}

fn find_user_by_email(state: &AppState, email: &str) -> Result<Option<Value>, AppError> {
    let users = spec("users")?;
    let query = ListQuery {
        filters: vec![("email".to_string(), email.to_string())],
        ..ListQuery::default()
    };
    Ok(state.store.list(users, &query)?.into_iter().next())
}

fn open_session(state: &AppState, user_id: &str) -> Result<String, AppError> {
    let sessions = spec("sessions")?;
    let token = Uuid::now_v7().to_string();
    state.store.insert(
        sessions,
        vec![json!({ "id": token, "user_id": user_id })],
    )?;
    Ok(token)
}

async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupBody>,
) -> Result<Json<Value>, AppError> {
    let email = body.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::bad_request("email address is not valid"));
    }
    if body.password.len() < 8 {
        return Err(AppError::bad_request(
            "password must be at least 8 characters",
        ));
    }
    if find_user_by_email(&state, &email)?.is_some() {
        return Err(AppError::bad_request("an account with this email exists"));
    }

    let users = spec("users")?;
    // The first account bootstraps administration.
    let role = if state.store.list(users, &ListQuery::default())?.is_empty() {
        "admin"
    } else {
        "inspector"
    };
    let password_hash = crate::auth::hash_password(&body.password)?;
    let inserted = state
        .store
        .insert(
            users,
            vec![json!({
                "email": email,
                "password_hash": password_hash,
                "name": body.name,
                "role": role,
            })],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::internal("user insert returned no record"))?;

    let user_id = inserted
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::internal("user record has no id"))?;
    let token = open_session(&state, user_id)?;
    tracing::info!(role, "Account created");
    Ok(Json(json!({ "token": token, "user": public_user(inserted) })))
}

async fn signin(
    State(state): State<AppState>,
    Json(body): Json<SigninBody>,
) -> Result<Json<Value>, AppError> {
    let email = body.email.trim().to_lowercase();
    let user = find_user_by_email(&state, &email)?
        .ok_or_else(|| AppError::unauthorized("Invalid email or password"))?;
    let hash = user
        .get("password_hash")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::internal("user record has no password hash"))?;
    if !crate::auth::verify_password(hash, &body.password) {
        return Err(AppError::unauthorized("Invalid email or password"));
    }

    let user_id = user
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::internal("user record has no id"))?;
    let token = open_session(&state, user_id)?;
    Ok(Json(json!({ "token": token, "user": public_user(user) })))
}

async fn session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, AppError> {
    let users = spec("users")?;
    let record = state
        .store
        .get_by_id(users, &user.user_id)?
        .ok_or_else(|| AppError::unauthorized("Session user no longer exists"))?;
    Ok(Json(public_user(record)))
}

async fn signout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, AppError> {
    let sessions = spec("sessions")?;
    state.store.delete_by_id(sessions, &user.session_token)?;
    Ok(Json(json!({ "status": "signed_out" })))
}

// ---------------------------------------------------------------------------
// Collections

fn parse_list_query(raw: Vec<(String, String)>) -> Result<ListQuery, AppError> {
    let mut query = ListQuery::default();
    for (key, value) in raw {
        match key.as_str() {
            "orderBy" => query.order_by = Some(value),
            "orderDir" => query.order_dir = OrderDir::parse(&value)?,
            "limit" => {
                query.limit = Some(value.parse().map_err(|_| {
                    AppError::bad_request("limit must be a non-negative integer")
                })?);
            }
            _ => query.filters.push((key, value)),
        }
    }
    Ok(query)
}

/// Accept either one object or an array of objects as the `data` field.
fn as_records(data: Value) -> Result<Vec<Value>, AppError> {
    match data {
        Value::Array(records) => Ok(records),
        object @ Value::Object(_) => Ok(vec![object]),
        _ => Err(AppError::bad_request(
            "`data` must be an object or an array of objects",
        )),
    }
}

#[derive(Debug, Deserialize)]
struct InsertBody {
    data: Value,
}

#[derive(Debug, Deserialize)]
struct UpsertBody {
    data: Value,
    #[serde(rename = "onConflict", default = "default_conflict_key")]
    on_conflict: String,
}

fn default_conflict_key() -> String {
    "id".to_string()
}

async fn list_collection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(name): Path<String>,
    Query(raw): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Value>>, AppError> {
    let spec = spec(&name)?;
    let query = parse_list_query(raw)?;
    authorize(&user, spec, Access::Read, &query.filters)?;
    let records = state.store.list(spec, &query)?;
    Ok(Json(strip_credentials(spec, records)))
}

async fn insert_collection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(name): Path<String>,
    Json(body): Json<InsertBody>,
) -> Result<Json<Vec<Value>>, AppError> {
    let spec = spec(&name)?;
    authorize(&user, spec, Access::Write, &[])?;
    let records = as_records(body.data)?;
    let inserted = state.store.insert(spec, records)?;
    Ok(Json(strip_credentials(spec, inserted)))
}

async fn upsert_collection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(name): Path<String>,
    Json(body): Json<UpsertBody>,
) -> Result<Json<Vec<Value>>, AppError> {
    let spec = spec(&name)?;
    authorize(&user, spec, Access::Write, &[])?;
    let records = as_records(body.data)?;
    let upserted = state.store.upsert(spec, records, &body.on_conflict)?;
    Ok(Json(strip_credentials(spec, upserted)))
}

async fn delete_record(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let spec = spec(&name)?;
    authorize(&user, spec, Access::Write, &[])?;
    if state.store.delete_by_id(spec, &id)? {
        Ok(Json(json!({ "deleted": id })))
    } else {
        Err(AppError::not_found(format!("record `{id}` in `{name}`")))
    }
}

// ---------------------------------------------------------------------------
// Blob storage

#[derive(Debug, Deserialize)]
struct UploadQuery {
    bucket: String,
    path: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    key: String,
}

async fn upload_blob(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    let key = state.blobs.store(&query.bucket, &query.path, &body)?;
    Ok(Json(UploadResponse { key }))
}

async fn download_blob(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
    Path((bucket, path)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let bytes = state.blobs.retrieve(&bucket, &path)?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_records_accepts_object_and_array() {
        assert_eq!(as_records(json!({ "a": 1 })).unwrap().len(), 1);
        assert_eq!(as_records(json!([{ "a": 1 }, { "b": 2 }])).unwrap().len(), 2);
        assert!(as_records(json!("scalar")).is_err());
    }

    #[test]
    fn test_parse_list_query_splits_control_keys() {
        let query = parse_list_query(vec![
            ("equipment_code".to_string(), "PUMP-1".to_string()),
            ("orderBy".to_string(), "created_at".to_string()),
            ("orderDir".to_string(), "desc".to_string()),
            ("limit".to_string(), "5".to_string()),
        ])
        .unwrap();
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.order_by.as_deref(), Some("created_at"));
        assert_eq!(query.order_dir, OrderDir::Desc);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_parse_list_query_rejects_bad_limit() {
        assert!(parse_list_query(vec![("limit".to_string(), "-1".to_string())]).is_err());
        assert!(parse_list_query(vec![("orderDir".to_string(), "up".to_string())]).is_err());
    }
}
