use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use super::{RecordOp, ScanOptions, ScanOrder, Storage, is_expired};
use crate::clock::{Clock, WallClock};
use crate::{BytesRange, Record, StorageError, StorageIterator, StorageRead, StorageResult};

type Entries = BTreeMap<Bytes, (Bytes, Option<i64>)>;

/// Non-durable backend over a `BTreeMap`, used for tests and `--in-memory`
/// sessions. Expiry is judged against the configured [`Clock`].
pub struct InMemoryStorage {
    entries: RwLock<Entries>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            clock: Arc::new(WallClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Entries>> {
        self.entries
            .read()
            .map_err(|e| StorageError::Internal(format!("entries lock poisoned: {}", e)))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Entries>> {
        self.entries
            .write()
            .map_err(|e| StorageError::Internal(format!("entries lock poisoned: {}", e)))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageRead for InMemoryStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>> {
        let entries = self.read()?;
        let now = self.clock.now();
        Ok(entries
            .get(&key)
            .filter(|(_, expire_ts)| !is_expired(*expire_ts, now))
            .map(|(value, expire_ts)| Record::new(key, value.clone()).with_expire_ts(*expire_ts)))
    }

    /// Snapshots the live records of `range` up front; later writes are not
    /// visible to the returned iterator.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn scan_iter(
        &self,
        range: BytesRange,
        options: ScanOptions,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>> {
        let entries = self.read()?;
        let now = self.clock.now();
        let mut snapshot: Vec<Record> = entries
            .range::<Bytes, _>(range)
            .filter(|(_, (_, expire_ts))| !is_expired(*expire_ts, now))
            .map(|(key, (value, expire_ts))| {
                Record::new(key.clone(), value.clone()).with_expire_ts(*expire_ts)
            })
            .collect();
        if options.order == ScanOrder::Descending {
            snapshot.reverse();
        }
        Ok(Box::new(Snapshot(snapshot.into_iter())))
    }
}

struct Snapshot(std::vec::IntoIter<Record>);

#[async_trait]
impl StorageIterator for Snapshot {
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        Ok(self.0.next())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn apply(&self, ops: Vec<RecordOp>) -> StorageResult<()> {
        let mut entries = self.write()?;
        let now = self.clock.now();
        for op in ops {
            match op {
                RecordOp::Put(put) => {
                    let expire_ts = put.options.ttl.expire_ts(now);
                    entries.insert(put.record.key, (put.record.value, expire_ts));
                }
                RecordOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
