//! Synchronization engine.
//!
//! Drains the outbox FIFO, pushes canonical payloads to the gateway with
//! bounded retries, and reconciles the local cache with server state.
//! Per pending submission the state machine is
//! `PENDING -> SYNCING -> SYNCED`, falling back to `PENDING` on transient
//! failure. A submission rejected by the gateway stays pending with its
//! `last_error` recorded for manual retry.

mod scheduler;

pub use scheduler::SyncScheduler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::canonical::canonical_payload;
use crate::error::{Error, Result};
use crate::gateway::GatewayApi;
use crate::media::PhotoStore;
use crate::models::{
    OutboxEntry, OutboxOp, Photo, RemoteCacheEntry, Submission, SubmissionId, Template,
};
use crate::store::LocalStore;

/// Business rule: no re-submission for the same equipment and category
/// within this window.
pub const DUPLICATE_WINDOW_MINUTES: i64 = 30;

/// Retry policy for gateway calls inside one sync cycle
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per entry per cycle
    pub max_attempts: u32,
    /// Backoff is `base_delay * 2^attempt`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Outcome of one sync cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Another cycle was already in flight; nothing was done
    pub skipped: bool,
    /// Entries confirmed upstream
    pub synced: usize,
    /// Entries that failed transiently and stay pending
    pub failed: usize,
    /// Entries the gateway rejected; pending for manual inspection
    pub rejected: usize,
}

/// The synchronization engine, constructed once per process with its
/// dependencies injected.
#[derive(Clone)]
pub struct SyncService<G> {
    store: LocalStore,
    media: PhotoStore,
    gateway: G,
    syncing: Arc<AtomicBool>,
    retry: RetryPolicy,
}

impl<G: GatewayApi> SyncService<G> {
    /// Create an engine over the given store, media store, and gateway.
    pub fn new(store: LocalStore, media: PhotoStore, gateway: G) -> Self {
        Self {
            store,
            media,
            gateway,
            syncing: Arc::new(AtomicBool::new(false)),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy (tests use short delays).
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The local store this engine writes through.
    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Number of pending outbox entries.
    pub async fn pending_count(&self) -> Result<u64> {
        self.store.pending_count().await
    }

    /// Validate, guard, and persist a new submission, enqueueing it
    /// atomically. Never touches the network except for the best-effort
    /// duplicate-window check.
    pub async fn create_submission(&self, mut submission: Submission) -> Result<Submission> {
        let template: Template = self
            .store
            .get_by_id(&submission.template_id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(submission.template_id.to_string()))?;

        // Category is part of the duplicate-window key; the template owns it.
        submission.category.clone_from(&template.category);
        validate_required(&template, &submission)?;
        self.guard_duplicate(&submission).await?;

        self.store
            .put_with_outbox(&submission, OutboxOp::Create)
            .await?;
        tracing::info!(id = %submission.id, "Queued submission");
        Ok(submission)
    }

    /// Store photo bytes locally and enqueue the photo for upload.
    pub async fn attach_photo(
        &self,
        submission_id: &SubmissionId,
        bytes: &[u8],
    ) -> Result<Photo> {
        let exists: Option<Submission> = self.store.get_by_id(&submission_id.as_str()).await?;
        if exists.is_none() {
            return Err(Error::NotFound(submission_id.to_string()));
        }
        let locator = self.media.store(&submission_id.as_str(), bytes)?;
        let photo = Photo::new(*submission_id, locator);
        self.store.put_with_outbox(&photo, OutboxOp::Create).await?;
        Ok(photo)
    }

    /// Run one sync cycle unless another is already in flight.
    pub async fn sync_cycle(&self) -> Result<SyncReport> {
        if self.syncing.swap(true, Ordering::SeqCst) {
            tracing::debug!("Sync cycle already in flight; skipping trigger");
            return Ok(SyncReport {
                skipped: true,
                ..SyncReport::default()
            });
        }
        let result = self.drain_and_resync().await;
        self.syncing.store(false, Ordering::SeqCst);
        result
    }

    /// Manually retry a single pending entry.
    pub async fn retry_one(&self, entry_id: i64) -> Result<()> {
        let entry = self
            .store
            .get_outbox_entry(entry_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("outbox entry {entry_id}")))?;
        if entry.synced {
            return Ok(());
        }
        match self.process_entry(&entry).await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.store
                    .record_outbox_failure(entry.id, &error.to_string())
                    .await?;
                Err(error)
            }
        }
    }

    async fn drain_and_resync(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let pending = self.store.list_pending().await?;
        tracing::debug!(pending = pending.len(), "Starting sync cycle");

        for entry in pending {
            match self.process_entry(&entry).await {
                Ok(()) => report.synced += 1,
                Err(error) => {
                    self.store
                        .record_outbox_failure(entry.id, &error.to_string())
                        .await?;
                    if error.is_retryable() {
                        report.failed += 1;
                        tracing::warn!(entry = entry.id, "Sync attempt failed: {error}");
                    } else {
                        report.rejected += 1;
                        tracing::warn!(
                            entry = entry.id,
                            "Entry needs attention, left pending: {error}"
                        );
                    }
                }
            }
        }

        // Reference data and the remote cache refresh only once the queue
        // is fully drained, so the merge sees the server's view of our
        // own writes.
        if self.store.pending_count().await? == 0 {
            if let Err(error) = self.full_resync().await {
                tracing::warn!("Full resync failed: {error}");
            }
        }

        Ok(report)
    }

    async fn process_entry(&self, entry: &OutboxEntry) -> Result<()> {
        match entry.collection.as_str() {
            "submissions" => self.process_submission_entry(entry).await,
            "photos" => self.process_photo_entry(entry).await,
            other => Err(Error::InvalidInput(format!(
                "outbox entry {} targets unknown collection {other}",
                entry.id
            ))),
        }
    }

    async fn process_submission_entry(&self, entry: &OutboxEntry) -> Result<()> {
        let id = entry
            .payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::InvalidInput(format!("outbox entry {} has no record id", entry.id))
            })?
            .to_string();

        if entry.op == OutboxOp::Delete {
            self.delete_with_retries(&id).await?;
            return self.store.mark_outbox_synced(entry.id).await;
        }

        // The store is the source of truth; the queued payload only
        // identifies the record.
        let submission: Submission = match self.store.get_by_id(&id).await? {
            Some(current) => current,
            None => serde_json::from_value(entry.payload.clone())?,
        };
        let template: Template = self
            .store
            .get_by_id(&submission.template_id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(submission.template_id.to_string()))?;
        let photos: Vec<Photo> = self
            .store
            .get_all_where("submission_id", &submission.id.as_str())
            .await?;

        let payload = canonical_payload(&submission, &template, &photos);
        let confirmed = self.upsert_with_retries(&payload).await?;

        match self.store.mark_submission_synced(&submission.id).await {
            // The record may have been deleted locally while queued; the
            // upsert itself is already confirmed.
            Ok(()) | Err(Error::NotFound(_)) => {}
            Err(error) => return Err(error),
        }
        self.store.mark_outbox_synced(entry.id).await?;
        if let Some(cache_entry) = RemoteCacheEntry::from_payload(confirmed) {
            self.store.merge_remote_cache_entry(cache_entry).await?;
        }
        tracing::info!(id = %submission.id, "Submission confirmed upstream");
        Ok(())
    }

    async fn process_photo_entry(&self, entry: &OutboxEntry) -> Result<()> {
        let mut photo: Photo = serde_json::from_value(entry.payload.clone())?;
        let local_locator = photo.locator.clone();
        let bytes = self.media.read(&local_locator)?;
        let key = self.upload_with_retries(&local_locator, bytes).await?;

        photo.locator = key;
        let payload = serde_json::to_value(&photo)?;
        self.upsert_photo_with_retries(&payload).await?;
        self.store.put(&photo).await?;
        self.store.mark_outbox_synced(entry.id).await?;
        // The gateway holds the bytes now; the local payload is done.
        if let Err(error) = self.media.remove(&local_locator) {
            tracing::warn!(id = %photo.id, "Could not remove local photo payload: {error}");
        }
        tracing::info!(id = %photo.id, "Photo confirmed upstream");
        Ok(())
    }

    /// Best-effort duplicate-window guard: prefer the gateway's view when
    /// reachable, fall back to local data offline. Runs once at creation
    /// time, never on retries.
    async fn guard_duplicate(&self, submission: &Submission) -> Result<()> {
        let since = submission.created_at - DUPLICATE_WINDOW_MINUTES * 60_000;
        let duplicate = match self
            .gateway
            .recent_submissions(&submission.equipment_code, &submission.category)
            .await
        {
            Ok(records) => records.iter().any(|record| {
                record
                    .get("created_at")
                    .and_then(Value::as_i64)
                    .is_some_and(|created_at| created_at >= since)
            }),
            Err(error) => {
                tracing::debug!("Duplicate check falling back to local data: {error}");
                self.store
                    .find_recent_submission(
                        &submission.equipment_code,
                        &submission.category,
                        since,
                    )
                    .await?
                    .is_some()
                    || self
                        .store
                        .remote_cache_has_recent(
                            &submission.equipment_code,
                            &submission.category,
                            since,
                        )
                        .await?
            }
        };

        if duplicate {
            return Err(Error::DuplicateSubmission {
                equipment_code: submission.equipment_code.clone(),
                category: submission.category.clone(),
                window_minutes: DUPLICATE_WINDOW_MINUTES,
            });
        }
        Ok(())
    }

    /// Reload reference data and rebuild the remote cache from the
    /// gateway's submission list.
    pub async fn full_resync(&self) -> Result<()> {
        let templates = self.gateway.fetch_templates().await?;
        self.store.replace_all(&templates).await?;
        let equipment = self.gateway.fetch_equipment().await?;
        self.store.replace_all(&equipment).await?;

        let remote = self.gateway.fetch_submissions().await?;
        let entries: Vec<RemoteCacheEntry> = remote
            .into_iter()
            .filter_map(RemoteCacheEntry::from_payload)
            .collect();
        self.store.merge_remote_cache(entries).await?;
        tracing::debug!("Full resync complete");
        Ok(())
    }

    async fn upsert_with_retries(&self, payload: &Value) -> Result<Value> {
        let mut attempt = 0;
        loop {
            match self.gateway.upsert_submission(payload).await {
                Ok(confirmed) => return Ok(confirmed),
                Err(error) if error.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    tracing::debug!(attempt, ?delay, "Retrying submission upsert: {error}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn upsert_photo_with_retries(&self, payload: &Value) -> Result<Value> {
        let mut attempt = 0;
        loop {
            match self.gateway.upsert_photo(payload).await {
                Ok(confirmed) => return Ok(confirmed),
                Err(error) if error.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn upload_with_retries(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.gateway.upload_photo(path, bytes.clone()).await {
                Ok(key) => return Ok(key),
                Err(error) if error.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn delete_with_retries(&self, id: &str) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.gateway.delete_submission(id).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn validate_required(template: &Template, submission: &Submission) -> Result<()> {
    for field in &template.fields {
        if field.required && submission.answer(&field.id).is_none() {
            return Err(Error::InvalidInput(format!(
                "required field {} is not answered",
                field.id
            )));
        }
    }
    Ok(())
}
