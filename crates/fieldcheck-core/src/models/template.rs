//! Checklist template model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a template, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(Uuid);

impl TemplateId {
    /// Create a new unique template ID using UUID v7
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

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TemplateId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of value a checklist field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Photo,
    Signature,
    Choice,
}

impl FieldKind {
    /// Whether answers of this kind count toward the inspection score
    #[must_use]
    pub const fn is_scorable(self) -> bool {
        matches!(self, Self::Boolean | Self::Choice)
    }
}

/// One field of a checklist definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default)]
    pub choices: Vec<String>,
    pub order: u32,
}

/// A checklist definition.
///
/// Immutable once referenced by a submission; deleted only explicitly,
/// cascading to its submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Unique identifier
    pub id: TemplateId,
    /// Equipment this checklist applies to
    pub equipment_id: String,
    /// Inspection category (part of the duplicate-window key)
    pub category: String,
    /// Ordered field definitions
    pub fields: Vec<Field>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Template {
    /// Create a new template with the given fields
    #[must_use]
    pub fn new(
        equipment_id: impl Into<String>,
        category: impl Into<String>,
        fields: Vec<Field>,
    ) -> Self {
        Self {
            id: TemplateId::new(),
            equipment_id: equipment_id.into(),
            category: category.into(),
            fields,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Fields sorted by their declared order
    #[must_use]
    pub fn ordered_fields(&self) -> Vec<&Field> {
        let mut fields: Vec<&Field> = self.fields.iter().collect();
        fields.sort_by_key(|field| field.order);
        fields
    }

    /// Look up a field definition by id
    #[must_use]
    pub fn field(&self, field_id: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.id == field_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boolean_field(id: &str, order: u32) -> Field {
        Field {
            id: id.to_string(),
            label: id.to_string(),
            kind: FieldKind::Boolean,
            required: true,
            choices: Vec::new(),
            order,
        }
    }

    #[test]
    fn test_template_id_unique() {
        assert_ne!(TemplateId::new(), TemplateId::new());
    }

    #[test]
    fn test_template_id_parse() {
        let id = TemplateId::new();
        let parsed: TemplateId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ordered_fields() {
        let template = Template::new(
            "eq-1",
            "hydraulic",
            vec![boolean_field("b", 2), boolean_field("a", 1)],
        );
        let ordered = template.ordered_fields();
        assert_eq!(ordered[0].id, "a");
        assert_eq!(ordered[1].id, "b");
    }

    #[test]
    fn test_scorable_kinds() {
        assert!(FieldKind::Boolean.is_scorable());
        assert!(FieldKind::Choice.is_scorable());
        assert!(!FieldKind::Number.is_scorable());
        assert!(!FieldKind::Text.is_scorable());
        assert!(!FieldKind::Photo.is_scorable());
        assert!(!FieldKind::Signature.is_scorable());
    }
}
