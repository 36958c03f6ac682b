//! Handle to the single open ordered store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use common::storage::factory::create_storage;
use common::{PutOptions, PutRecordOp, Record, Storage, Ttl};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::model::{KeyPage, QuerySpec};
use crate::query;

struct OpenStore {
    path: PathBuf,
    storage: Arc<dyn Storage>,
}

/// Handle to at most one open store.
///
/// All methods take `&self`; the handle is meant to be shared behind an
/// `Arc`. Reads and writes clone the storage out of the lock, so a slow
/// query never blocks other requests. `close` releases the backend even
/// while such clones are alive; their later calls fail.
pub struct Store {
    config: StoreConfig,
    state: RwLock<Option<OpenStore>>,
}

impl Store {
    /// Creates a closed handle that opens stores as described by `config`.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    /// Creates a handle that is already open over `storage`.
    #[cfg(test)]
    pub(crate) fn with_storage(storage: Arc<dyn Storage>) -> Self {
        Self {
            config: StoreConfig::default(),
            state: RwLock::new(Some(OpenStore {
                path: PathBuf::from(":memory:"),
                storage,
            })),
        }
    }

    /// Opens the store kept in directory `path`, always read-write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyOpen`] if a store is open, and
    /// [`Error::PathNotFound`] if `path` is not an existing directory.
    pub async fn open(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.state.write().await;
        if state.is_some() {
            return Err(Error::AlreadyOpen);
        }
        if !path.is_dir() {
            return Err(Error::PathNotFound(path.display().to_string()));
        }

        let storage = create_storage(&self.config.storage_config(path)).await?;
        info!(path = %path.display(), backend = ?self.config.backend, "opened store");
        *state = Some(OpenStore {
            path: path.to_path_buf(),
            storage,
        });
        Ok(())
    }

    /// Closes the open store. No-op if nothing is open.
    pub async fn close(&self) -> Result<()> {
        let Some(open) = self.state.write().await.take() else {
            return Ok(());
        };
        open.storage.close().await?;
        info!(path = %open.path.display(), "closed store");
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Directory of the open store, if any.
    pub async fn path(&self) -> Option<PathBuf> {
        self.state.read().await.as_ref().map(|s| s.path.clone())
    }

    pub(crate) async fn storage(&self) -> Result<Arc<dyn Storage>> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| Arc::clone(&s.storage))
            .ok_or(Error::NotOpen)
    }

    /// Returns the full value of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key is absent or expired.
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let storage = self.storage().await?;
        storage
            .get(Bytes::copy_from_slice(key.as_bytes()))
            .await?
            .map(|record| record.value)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Writes `value` under `key`. A `ttl_secs` of 0 or less never expires.
    pub async fn set(&self, key: &str, value: Bytes, ttl_secs: i64) -> Result<()> {
        let storage = self.storage().await?;
        let record = Record::new(Bytes::copy_from_slice(key.as_bytes()), value);
        let op = PutRecordOp::new(record).with_options(PutOptions {
            ttl: Ttl::from_secs(ttl_secs),
        });
        storage.put(vec![op]).await?;
        Ok(())
    }

    /// Deletes `key`. Deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let storage = self.storage().await?;
        storage
            .delete(Bytes::copy_from_slice(key.as_bytes()))
            .await?;
        Ok(())
    }

    /// Runs a keyspace query against the open store.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotOpen`] before any iteration if no store is open.
    pub async fn list_keys(&self, spec: &QuerySpec) -> Result<KeyPage> {
        let storage = self.storage().await?;
        query::execute(storage.as_ref(), spec).await
    }
}
