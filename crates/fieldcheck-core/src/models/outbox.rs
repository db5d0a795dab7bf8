//! Outbox entry model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// The kind of mutation an outbox entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxOp {
    Create,
    Update,
    Delete,
}

impl OutboxOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for OutboxOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "unknown outbox operation: {other}"
            ))),
        }
    }
}

/// One not-yet-confirmed mutation, durable until the sync engine
/// confirms persistence upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Auto-increment id; drain order is ascending id (FIFO)
    pub id: i64,
    pub op: OutboxOp,
    /// Target collection name
    pub collection: String,
    /// Opaque payload, serialized record or delete key
    pub payload: serde_json::Value,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    pub synced: bool,
    /// Failed sync attempts so far
    pub attempts: u32,
    /// Last failure, surfaced as the "needs attention" state
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_roundtrip() {
        for op in [OutboxOp::Create, OutboxOp::Update, OutboxOp::Delete] {
            assert_eq!(op.as_str().parse::<OutboxOp>().unwrap(), op);
        }
    }

    #[test]
    fn test_op_rejects_unknown() {
        assert!("merge".parse::<OutboxOp>().is_err());
    }
}
