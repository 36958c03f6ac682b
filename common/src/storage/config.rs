//! Storage backend configuration.

use serde::{Deserialize, Serialize};

/// Selects and configures a storage backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// Volatile BTreeMap storage, for tests and demos.
    #[default]
    InMemory,
    /// Persistent single-file storage backed by redb.
    Redb(RedbStorageConfig),
}

/// Configuration for the redb backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedbStorageConfig {
    /// Path of the database file. Created if missing; its parent directory
    /// must already exist.
    pub path: String,
}
