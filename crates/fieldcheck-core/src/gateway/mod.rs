//! HTTP client for the dynamic collection gateway.
//!
//! Wire contract: JSON over HTTP with bearer-token auth. List queries are
//! built with an explicit [`ListRequest`] resolved by a terminal
//! [`ListRequest::execute`] call; transport failures surface as
//! [`Error::NetworkUnavailable`] and error statuses as
//! [`Error::GatewayRejected`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{Equipment, Template};

/// Typed seam between the sync engine and the gateway, so engine logic is
/// testable against an in-memory fake.
#[allow(async_fn_in_trait)]
pub trait GatewayApi {
    /// Most recent confirmed submissions for a duplicate-window key.
    async fn recent_submissions(&self, equipment_code: &str, category: &str)
        -> Result<Vec<Value>>;

    /// Idempotent upsert keyed by the submission's client id.
    async fn upsert_submission(&self, payload: &Value) -> Result<Value>;

    /// Delete a submission by client id.
    async fn delete_submission(&self, id: &str) -> Result<()>;

    /// Upload photo bytes to blob storage; returns the storage key.
    async fn upload_photo(&self, path: &str, bytes: Vec<u8>) -> Result<String>;

    /// Upsert a photo record keyed by its client id.
    async fn upsert_photo(&self, payload: &Value) -> Result<Value>;

    /// Full reference-data listings for resync.
    async fn fetch_templates(&self) -> Result<Vec<Template>>;
    async fn fetch_equipment(&self) -> Result<Vec<Equipment>>;
    async fn fetch_submissions(&self) -> Result<Vec<Value>>;
}

/// Sort direction for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDir {
    Asc,
    #[default]
    Desc,
}

impl OrderDir {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Reqwest-backed gateway client.
#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    client: reqwest::Client,
    token: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: Value,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    key: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidInput(
                "gateway URL must include http:// or https://".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| Error::NetworkUnavailable(error.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Use a previously issued session token.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    /// Sign in and remember the issued session token.
    pub async fn signin(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let response = self
            .request(reqwest::Method::POST, "/auth/signin")
            .await
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(transport)?;
        let auth: AuthResponse = Self::check(response).await?.json().await.map_err(decode)?;
        self.set_token(auth.token.clone()).await;
        Ok(auth)
    }

    /// Create an account and remember the issued session token.
    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<AuthResponse> {
        let response = self
            .request(reqwest::Method::POST, "/auth/signup")
            .await
            .json(&serde_json::json!({ "email": email, "password": password, "name": name }))
            .send()
            .await
            .map_err(transport)?;
        let auth: AuthResponse = Self::check(response).await?.json().await.map_err(decode)?;
        self.set_token(auth.token.clone()).await;
        Ok(auth)
    }

    /// Resolve the current session to its user record.
    pub async fn session(&self) -> Result<Value> {
        let response = self
            .request(reqwest::Method::GET, "/auth/session")
            .await
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(decode)
    }

    /// Invalidate the current session token.
    pub async fn signout(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, "/auth/signout")
            .await
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        *self.token.write().await = None;
        Ok(())
    }

    /// Start a list query against a collection.
    pub fn list(&self, collection: impl Into<String>) -> ListRequest<'_> {
        ListRequest {
            client: self,
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            order_dir: OrderDir::default(),
            limit: None,
        }
    }

    /// Insert records into a collection.
    pub async fn insert(&self, collection: &str, records: Vec<Value>) -> Result<Vec<Value>> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collection/{collection}/insert"),
            )
            .await
            .json(&serde_json::json!({ "data": records }))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(decode)
    }

    /// Insert-or-update records by equality on `on_conflict`.
    pub async fn upsert(
        &self,
        collection: &str,
        records: Vec<Value>,
        on_conflict: &str,
    ) -> Result<Vec<Value>> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collection/{collection}/upsert"),
            )
            .await
            .json(&serde_json::json!({ "data": records, "onConflict": on_conflict }))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(decode)
    }

    /// Delete one record by id.
    pub async fn delete_by_id(&self, collection: &str, id: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/collection/{collection}/{id}"),
            )
            .await
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }

    /// Upload raw bytes to blob storage.
    pub async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<String> {
        let response = self
            .request(reqwest::Method::POST, "/storage/upload")
            .await
            .query(&[("bucket", bucket), ("path", path)])
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        let upload: UploadResponse = Self::check(response).await?.json().await.map_err(decode)?;
        Ok(upload.key)
    }

    /// Retrieve raw bytes by bucket and path.
    pub async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/storage/file/{bucket}/{path}"),
            )
            .await
            .send()
            .await
            .map_err(transport)?;
        let bytes = Self::check(response)
            .await?
            .bytes()
            .await
            .map_err(transport)?;
        Ok(bytes.to_vec())
    }

    async fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(token) = self.token.read().await.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.error)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    body.trim().to_string()
                }
            });
        Err(Error::GatewayRejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Lazy, chainable list query resolved by a terminal [`execute`] call.
///
/// [`execute`]: ListRequest::execute
pub struct ListRequest<'a> {
    client: &'a GatewayClient,
    collection: String,
    filters: Vec<(String, String)>,
    order_by: Option<String>,
    order_dir: OrderDir,
    limit: Option<u32>,
}

impl ListRequest<'_> {
    /// Add an equality filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Sort by a field.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, dir: OrderDir) -> Self {
        self.order_by = Some(field.into());
        self.order_dir = dir;
        self
    }

    /// Cap the number of returned records.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Run the query.
    pub async fn execute(self) -> Result<Vec<Value>> {
        let mut query: Vec<(String, String)> = self.filters;
        if let Some(order_by) = self.order_by {
            query.push(("orderBy".to_string(), order_by));
            query.push(("orderDir".to_string(), self.order_dir.as_str().to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }

        let response = self
            .client
            .request(
                reqwest::Method::GET,
                &format!("/collection/{}", self.collection),
            )
            .await
            .query(&query)
            .send()
            .await
            .map_err(transport)?;
        GatewayClient::check(response)
            .await?
            .json()
            .await
            .map_err(decode)
    }
}

impl GatewayApi for GatewayClient {
    async fn recent_submissions(
        &self,
        equipment_code: &str,
        category: &str,
    ) -> Result<Vec<Value>> {
        self.list("submissions")
            .filter("equipment_code", equipment_code)
            .filter("category", category)
            .order_by("created_at", OrderDir::Desc)
            .limit(5)
            .execute()
            .await
    }

    async fn upsert_submission(&self, payload: &Value) -> Result<Value> {
        let mut records = self.upsert("submissions", vec![payload.clone()], "id").await?;
        records
            .pop()
            .ok_or_else(|| Error::InvalidInput("gateway returned no upserted record".to_string()))
    }

    async fn delete_submission(&self, id: &str) -> Result<()> {
        self.delete_by_id("submissions", id).await
    }

    async fn upload_photo(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        self.upload("photos", path, bytes).await
    }

    async fn upsert_photo(&self, payload: &Value) -> Result<Value> {
        let mut records = self.upsert("photos", vec![payload.clone()], "id").await?;
        records
            .pop()
            .ok_or_else(|| Error::InvalidInput("gateway returned no upserted record".to_string()))
    }

    async fn fetch_templates(&self) -> Result<Vec<Template>> {
        let records = self.list("templates").execute().await?;
        records
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(Error::from))
            .collect()
    }

    async fn fetch_equipment(&self) -> Result<Vec<Equipment>> {
        let records = self.list("equipment").execute().await?;
        records
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(Error::from))
            .collect()
    }

    async fn fetch_submissions(&self) -> Result<Vec<Value>> {
        self.list("submissions").execute().await
    }
}

fn transport(error: reqwest::Error) -> Error {
    Error::NetworkUnavailable(error.to_string())
}

fn decode(error: reqwest::Error) -> Error {
    Error::InvalidInput(format!("unexpected gateway payload: {error}"))
}
