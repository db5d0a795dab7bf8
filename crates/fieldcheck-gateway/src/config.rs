use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which collection backend the gateway persists into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    File,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub backend: Backend,
    pub db_path: PathBuf,
    pub file_store_path: PathBuf,
    pub storage_root: PathBuf,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "FIELDCHECK_BIND_ADDR", "127.0.0.1:8080");

        let backend = match value_or_default(&lookup, "FIELDCHECK_BACKEND", "sqlite").as_str() {
            "sqlite" => Backend::Sqlite,
            "file" => Backend::File,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "FIELDCHECK_BACKEND must be `sqlite` or `file`, got `{other}`"
                )))
            }
        };

        let db_path = PathBuf::from(value_or_default(
            &lookup,
            "FIELDCHECK_DB_PATH",
            "fieldcheck-gateway.db",
        ));
        let file_store_path = PathBuf::from(value_or_default(
            &lookup,
            "FIELDCHECK_FILE_STORE",
            "fieldcheck-gateway.json",
        ));
        let storage_root = PathBuf::from(value_or_default(
            &lookup,
            "FIELDCHECK_STORAGE_ROOT",
            "storage",
        ));

        Ok(Self {
            bind_addr,
            backend,
            db_path,
            file_store_path,
            storage_root,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn config_defaults_to_sqlite() {
        let map: HashMap<&str, &str> = HashMap::new();
        let config =
            GatewayConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
                .unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn config_rejects_unknown_backend() {
        let mut map = HashMap::new();
        map.insert("FIELDCHECK_BACKEND", "postgres");
        let err = GatewayConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("FIELDCHECK_BACKEND"));
    }

    #[test]
    fn config_trims_and_ignores_blank_values() {
        let mut map = HashMap::new();
        map.insert("FIELDCHECK_BACKEND", "  file  ");
        map.insert("FIELDCHECK_BIND_ADDR", "   ");
        let config =
            GatewayConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
                .unwrap();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
    }
}
