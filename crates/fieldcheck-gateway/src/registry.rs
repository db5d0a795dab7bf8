//! Closed registry of collections the gateway serves.
//!
//! Collection and field names only ever reach SQL as identifiers through
//! this registry, so no untrusted identifier is interpolated anywhere.

/// One collection the gateway knows about.
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub name: &'static str,
    /// Payload fields that may appear in equality filters and `orderBy`.
    pub filterable: &'static [&'static str],
    /// Restricted collections require the admin role or an own-record
    /// filter.
    pub restricted: bool,
}

pub const COLLECTIONS: &[CollectionSpec] = &[
    CollectionSpec {
        name: "templates",
        filterable: &["category", "equipment_id"],
        restricted: false,
    },
    CollectionSpec {
        name: "equipment",
        filterable: &["code", "category"],
        restricted: false,
    },
    CollectionSpec {
        name: "submissions",
        filterable: &["equipment_code", "category", "template_id", "submitted_by"],
        restricted: false,
    },
    CollectionSpec {
        name: "photos",
        filterable: &["submission_id"],
        restricted: false,
    },
    CollectionSpec {
        name: "users",
        filterable: &["id", "email"],
        restricted: true,
    },
    CollectionSpec {
        name: "sessions",
        filterable: &["user_id"],
        restricted: true,
    },
];

/// Look up a collection by name.
pub fn lookup(name: &str) -> Option<&'static CollectionSpec> {
    COLLECTIONS.iter().find(|spec| spec.name == name)
}

impl CollectionSpec {
    /// Whether a field may be used in filters or `orderBy`. The bookkeeping
    /// columns are always sortable.
    pub fn allows_field(&self, field: &str) -> bool {
        matches!(field, "id" | "created_at" | "updated_at")
            || self.filterable.contains(&field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_closed() {
        assert!(lookup("submissions").is_some());
        assert!(lookup("pg_catalog; DROP TABLE users").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn restricted_flags() {
        assert!(lookup("users").unwrap().restricted);
        assert!(lookup("sessions").unwrap().restricted);
        assert!(!lookup("submissions").unwrap().restricted);
    }

    #[test]
    fn bookkeeping_fields_always_sortable() {
        let spec = lookup("photos").unwrap();
        assert!(spec.allows_field("created_at"));
        assert!(spec.allows_field("submission_id"));
        assert!(!spec.allows_field("payload"));
    }
}
