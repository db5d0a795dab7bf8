//! Filled checklist submission model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::TemplateId;

/// A globally unique, client-generated submission identifier (UUID v7).
///
/// This is the conflict key for gateway upserts, which makes retried
/// pushes idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    /// Create a new unique submission ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubmissionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The value of one answered field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl AnswerValue {
    /// Render the value the way the canonicalizer normalizes it
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Boolean(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }
}

/// One answered field of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub field_id: String,
    pub value: AnswerValue,
    #[serde(default)]
    pub note: Option<String>,
}

/// A filled checklist instance.
///
/// Write-once from the client's perspective; only the synchronization
/// engine mutates it, flipping `synced` after a confirmed upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Client-generated, globally unique identifier
    pub id: SubmissionId,
    /// Template this submission was filled from
    pub template_id: TemplateId,
    /// Equipment code (part of the duplicate-window key)
    pub equipment_code: String,
    /// Inspection category, denormalized from the template at creation
    pub category: String,
    /// Identifier of the submitting technician
    pub submitted_by: String,
    /// Ordered answers
    pub answers: Vec<Answer>,
    /// Free-text notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Signature string
    #[serde(default)]
    pub signature: Option<String>,
    /// When the inspection was executed (Unix ms)
    pub executed_at: i64,
    /// Whether the gateway has confirmed persistence
    pub synced: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Submission {
    /// Create a new unsynced submission
    #[must_use]
    pub fn new(
        template_id: TemplateId,
        equipment_code: impl Into<String>,
        category: impl Into<String>,
        submitted_by: impl Into<String>,
        answers: Vec<Answer>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: SubmissionId::new(),
            template_id,
            equipment_code: equipment_code.into(),
            category: category.into(),
            submitted_by: submitted_by.into(),
            answers,
            notes: None,
            signature: None,
            executed_at: now,
            synced: false,
            created_at: now,
        }
    }

    /// Look up the answer for a given field id
    #[must_use]
    pub fn answer(&self, field_id: &str) -> Option<&Answer> {
        self.answers.iter().find(|answer| answer.field_id == field_id)
    }
}
