//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the offline-first client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path of the local `SQLite` database
    pub db_path: PathBuf,
    /// Root directory for locally captured photo payloads
    pub media_dir: PathBuf,
    /// Base URL of the collection gateway
    pub gateway_url: String,
    /// Periodic sync interval while entries are pending
    pub sync_interval: Duration,
}

impl ClientConfig {
    /// Default periodic sync interval
    pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a configuration with the default sync interval.
    pub fn new(
        db_path: impl Into<PathBuf>,
        media_dir: impl Into<PathBuf>,
        gateway_url: impl Into<String>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            media_dir: media_dir.into(),
            gateway_url: gateway_url.into(),
            sync_interval: Self::DEFAULT_SYNC_INTERVAL,
        }
    }

    /// Set the periodic sync interval.
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}
