//! Equipment reference data

use serde::{Deserialize, Serialize};

/// A piece of inspectable equipment.
///
/// Reference data owned by the gateway and refreshed wholesale on resync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    pub code: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub active: bool,
}
