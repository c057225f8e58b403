//! Runtime configuration from the environment

use crate::persistence::DEFAULT_STORAGE_KEY;
use std::path::PathBuf;

/// Where snapshots are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Sqlite,
    /// Nothing outlives the process
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub storage: StorageKind,
    pub storage_key: String,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unrecognized values fall back to the
    /// default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("ASTRA_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".astra-companion").join("astra.db")
            },
            PathBuf::from,
        );

        let storage = match lookup("ASTRA_STORAGE").as_deref() {
            None | Some("sqlite") => StorageKind::Sqlite,
            Some("memory") => StorageKind::Memory,
            Some(other) => {
                tracing::warn!(value = %other, "Unknown ASTRA_STORAGE, using sqlite");
                StorageKind::Sqlite
            }
        };

        let log_format = match lookup("ASTRA_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                tracing::warn!(value = %other, "Unknown ASTRA_LOG_FORMAT, using pretty");
                LogFormat::Pretty
            }
        };

        let storage_key = lookup("ASTRA_STORAGE_KEY")
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string());

        Self {
            db_path,
            storage,
            storage_key,
            log_format,
        }
    }
}
