//! Turns a [`StorageConfig`] into a live backend.

use std::path::Path;
use std::sync::Arc;

use super::config::{RedbStorageConfig, StorageConfig};
use super::in_memory::InMemoryStorage;
use super::disk::RedbStorage;
use super::{Storage, StorageError, StorageResult};
use crate::clock::{Clock, WallClock};

/// Opens the configured backend with the wall clock.
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    StorageBuilder::new(config.clone()).build().await
}

/// Opens a backend with settings that have no config-file form, such as an
/// injected clock.
pub struct StorageBuilder {
    config: StorageConfig,
    clock: Arc<dyn Clock>,
}

impl StorageBuilder {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            clock: Arc::new(WallClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn build(self) -> StorageResult<Arc<dyn Storage>> {
        match &self.config {
            StorageConfig::InMemory => Ok(Arc::new(InMemoryStorage::new().with_clock(self.clock))),
            StorageConfig::Redb(redb_config) => {
                let storage = create_redb_storage(redb_config, self.clock)?;
                Ok(Arc::new(storage))
            }
        }
    }
}

fn create_redb_storage(
    config: &RedbStorageConfig,
    clock: Arc<dyn Clock>,
) -> StorageResult<RedbStorage> {
    let path = Path::new(&config.path);
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent.filter(|p| !p.is_dir()) {
        return Err(StorageError::Storage(format!(
            "Storage directory '{}' does not exist",
            parent.display()
        )));
    }
    let storage = RedbStorage::open(path)?.with_clock(clock);
    tracing::debug!(path = %config.path, "opened redb storage");
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::Record;

    #[tokio::test]
    async fn should_build_in_memory_storage() {
        // given
        let storage = create_storage(&StorageConfig::InMemory).await.unwrap();

        // when
        storage
            .put(vec![Record::new(Bytes::from("k"), Bytes::from("v")).into()])
            .await
            .unwrap();

        // then
        let record = storage.get(Bytes::from("k")).await.unwrap().unwrap();
        assert_eq!(record.value, Bytes::from("v"));
    }

    #[tokio::test]
    async fn should_build_redb_storage_inside_existing_directory() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::Redb(RedbStorageConfig {
            path: dir.path().join("data.redb").display().to_string(),
        });

        // when
        let storage = create_storage(&config).await;

        // then
        assert!(storage.is_ok());
        assert!(dir.path().join("data.redb").exists());
    }

    #[tokio::test]
    async fn should_refuse_redb_storage_in_missing_directory() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::Redb(RedbStorageConfig {
            path: dir.path().join("missing/data.redb").display().to_string(),
        });

        // when
        let result = create_storage(&config).await;

        // then
        assert!(matches!(result, Err(StorageError::Storage(_))));
    }
}
