//! Mapping between typed models and their collection tables

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{Equipment, Photo, RemoteCacheEntry, Submission, Template};

/// A typed record stored in one of the local collections.
///
/// `COLLECTION` and `INDEX_COLUMNS` are compile-time constants matching the
/// tables created by the v1 migration, so SQL built from them never embeds
/// untrusted identifiers. `index_values` must line up with `INDEX_COLUMNS`.
pub trait Record: Serialize + DeserializeOwned {
    /// Table name of the collection
    const COLLECTION: &'static str;
    /// Secondary-index columns persisted next to the JSON payload
    const INDEX_COLUMNS: &'static [&'static str] = &[];

    /// Primary key
    fn id(&self) -> String;

    /// Creation timestamp (Unix ms); 0 for records without one
    fn created_at(&self) -> i64 {
        0
    }

    /// Values for `INDEX_COLUMNS`, in the same order
    fn index_values(&self) -> Vec<String> {
        Vec::new()
    }
}

impl Record for Template {
    const COLLECTION: &'static str = "templates";
    const INDEX_COLUMNS: &'static [&'static str] = &["category"];

    fn id(&self) -> String {
        self.id.as_str()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn index_values(&self) -> Vec<String> {
        vec![self.category.clone()]
    }
}

impl Record for Equipment {
    const COLLECTION: &'static str = "equipment";
    const INDEX_COLUMNS: &'static [&'static str] = &["code"];

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index_values(&self) -> Vec<String> {
        vec![self.code.clone()]
    }
}

impl Record for Submission {
    const COLLECTION: &'static str = "submissions";
    const INDEX_COLUMNS: &'static [&'static str] =
        &["template_id", "equipment_code", "category"];

    fn id(&self) -> String {
        self.id.as_str()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn index_values(&self) -> Vec<String> {
        vec![
            self.template_id.as_str(),
            self.equipment_code.clone(),
            self.category.clone(),
        ]
    }
}

impl Record for Photo {
    const COLLECTION: &'static str = "photos";
    const INDEX_COLUMNS: &'static [&'static str] = &["submission_id"];

    fn id(&self) -> String {
        self.id.as_str()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn index_values(&self) -> Vec<String> {
        vec![self.submission_id.as_str()]
    }
}

impl Record for RemoteCacheEntry {
    const COLLECTION: &'static str = "remote_cache";

    fn id(&self) -> String {
        self.submission_id.as_str()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }
}
