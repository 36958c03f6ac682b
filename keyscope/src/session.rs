//! Chunked value uploads.
//!
//! Large values arrive as `put_value` (opens a session), any number of
//! `put_chunk` (appends), and `put_commit` (writes the assembled value).
//! Chunks are appended in the order they are received.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::Store;

/// Largest up-front buffer reservation honoured for a declared value size.
pub const MAX_SIZE_HINT: usize = 64 * 1024 * 1024;

/// Registry of in-flight uploads keyed by session id.
///
/// Uploads to distinct sessions proceed independently; the lock is held only
/// to look up and append, never across a store write.
#[derive(Debug, Default)]
pub struct UploadSessions {
    sessions: Mutex<HashMap<String, BytesMut>>,
}

impl UploadSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, BytesMut>>> {
        self.sessions
            .lock()
            .map_err(|_| Error::Internal("upload session lock poisoned".to_string()))
    }

    /// Opens a session with an empty buffer, replacing any existing one with
    /// the same id.
    pub fn init(&self, id: &str, size_hint: u64) -> Result<()> {
        let capacity = usize::try_from(size_hint)
            .unwrap_or(MAX_SIZE_HINT)
            .min(MAX_SIZE_HINT);
        let replaced = self
            .lock()?
            .insert(id.to_string(), BytesMut::with_capacity(capacity))
            .is_some();
        debug!(id, size_hint, replaced, "opened upload session");
        Ok(())
    }

    /// Appends `data` to the session's buffer.
    pub fn append(&self, id: &str, data: &[u8]) -> Result<()> {
        let mut sessions = self.lock()?;
        let buffer = sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        buffer.extend_from_slice(data);
        Ok(())
    }

    /// Removes the session and returns its assembled bytes.
    pub fn take(&self, id: &str) -> Result<Bytes> {
        self.lock()?
            .remove(id)
            .map(BytesMut::freeze)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// Writes the session's bytes to `key`.
    ///
    /// The session is removed before the write is attempted, so it cannot be
    /// committed twice even if the write fails.
    pub async fn commit(&self, id: &str, store: &Store, key: &str, ttl_secs: i64) -> Result<usize> {
        let value = self.take(id)?;
        let len = value.len();
        store.set(key, value, ttl_secs).await?;
        debug!(id, key, len, "committed upload session");
        Ok(len)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().map(|s| s.contains_key(id)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
