//! Photo attachment model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::SubmissionId;

/// A unique identifier for a photo, using UUID v7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoId(Uuid);

impl PhotoId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for PhotoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhotoId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A photo owned by exactly one submission.
///
/// `locator` starts out as a local content-addressed path and is replaced
/// with the gateway storage key once the upload is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    pub submission_id: SubmissionId,
    pub locator: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Photo {
    #[must_use]
    pub fn new(submission_id: SubmissionId, locator: impl Into<String>) -> Self {
        Self {
            id: PhotoId::new(),
            submission_id,
            locator: locator.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
