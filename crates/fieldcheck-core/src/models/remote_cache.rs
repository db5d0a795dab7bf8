//! Remote cache entry model

use serde::{Deserialize, Serialize};

use super::SubmissionId;

/// Denormalized projection of a submission as last confirmed by the
/// gateway, keyed by the submission's client id.
///
/// Entirely derived state: rebuilt from gateway responses, never authored
/// locally. An entry is only replaced by a payload whose `created_at` is
/// not older than the one it replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCacheEntry {
    pub submission_id: SubmissionId,
    pub payload: serde_json::Value,
    /// `created_at` of the confirmed payload (Unix ms)
    pub created_at: i64,
}

impl RemoteCacheEntry {
    /// Build a cache entry from a gateway-confirmed payload.
    ///
    /// Returns `None` when the payload has no parseable id.
    #[must_use]
    pub fn from_payload(payload: serde_json::Value) -> Option<Self> {
        let submission_id = payload
            .get("id")
            .and_then(serde_json::Value::as_str)?
            .parse()
            .ok()?;
        let created_at = payload
            .get("created_at")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_default();
        Some(Self {
            submission_id,
            payload,
            created_at,
        })
    }

    /// Freshness rule: keep the entry with the larger `created_at`.
    #[must_use]
    pub fn fresher(self, other: Self) -> Self {
        if other.created_at > self.created_at {
            other
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_payload_requires_valid_id() {
        assert!(RemoteCacheEntry::from_payload(json!({"name": "x"})).is_none());
        assert!(RemoteCacheEntry::from_payload(json!({"id": "not-a-uuid"})).is_none());

        let id = SubmissionId::new();
        let entry =
            RemoteCacheEntry::from_payload(json!({"id": id.as_str(), "created_at": 42})).unwrap();
        assert_eq!(entry.submission_id, id);
        assert_eq!(entry.created_at, 42);
    }

    #[test]
    fn test_fresher_keeps_newer_created_at() {
        let id = SubmissionId::new();
        let older = RemoteCacheEntry {
            submission_id: id,
            payload: json!({"v": 1}),
            created_at: 100,
        };
        let newer = RemoteCacheEntry {
            submission_id: id,
            payload: json!({"v": 2}),
            created_at: 200,
        };
        assert_eq!(older.clone().fresher(newer.clone()).created_at, 200);
        assert_eq!(newer.fresher(older).created_at, 200);
    }
}
