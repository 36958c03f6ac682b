//! Persistent storage backed by a single redb database file.
//!
//! Values are wrapped in a small envelope that carries their expiration
//! time, since redb itself has no notion of TTL:
//!
//! ```text
//! redb value: | version (u8) | expire_ts (u64 BE, 0 = never) | user_value (bytes) |
//! ```
//!
//! Expired records stay on disk until overwritten or deleted; reads skip them.

use std::collections::VecDeque;
use std::ops::Bound;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use redb::{Database, TableDefinition};

use super::{RecordOp, ScanOptions, ScanOrder, Storage, is_expired};
use crate::clock::{Clock, WallClock};
use crate::{BytesRange, Record, StorageError, StorageIterator, StorageRead, StorageResult};

const KV_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// Value envelope version.
const VALUE_VERSION: u8 = 0x01;

const ENVELOPE_HEADER_LEN: usize = 9;

fn encode_value(value: &[u8], expire_ts: Option<i64>) -> Bytes {
    let mut buf = BytesMut::with_capacity(ENVELOPE_HEADER_LEN + value.len());
    buf.put_u8(VALUE_VERSION);
    buf.put_u64(expire_ts.map(|ts| ts.max(1) as u64).unwrap_or(0));
    buf.extend_from_slice(value);
    buf.freeze()
}

fn decode_value(stored: &[u8]) -> StorageResult<(Bytes, Option<i64>)> {
    if stored.len() < ENVELOPE_HEADER_LEN {
        return Err(StorageError::Internal(format!(
            "value too short: expected at least {} bytes, got {}",
            ENVELOPE_HEADER_LEN,
            stored.len()
        )));
    }
    let mut header = &stored[..ENVELOPE_HEADER_LEN];
    let version = header.get_u8();
    if version != VALUE_VERSION {
        return Err(StorageError::Internal(format!(
            "invalid value version: expected 0x{:02x}, got 0x{:02x}",
            VALUE_VERSION, version
        )));
    }
    let expire_ts = match header.get_u64() {
        0 => None,
        ts => Some(ts as i64),
    };
    Ok((
        Bytes::copy_from_slice(&stored[ENVELOPE_HEADER_LEN..]),
        expire_ts,
    ))
}

fn as_slice_bound(bound: &Bound<Bytes>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(b) => Bound::Included(b.as_ref()),
        Bound::Excluded(b) => Bound::Excluded(b.as_ref()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// The open database, shared with every iterator. `None` once closed.
type SharedDb = Arc<RwLock<Option<Database>>>;

/// Runs `f` against the open database. The read guard is held for the whole
/// call, so `close` waits for in-progress transactions to finish.
fn with_db<T>(db: &SharedDb, f: impl FnOnce(&Database) -> StorageResult<T>) -> StorageResult<T> {
    let guard = db
        .read()
        .map_err(|e| StorageError::Internal(format!("database lock poisoned: {}", e)))?;
    match guard.as_ref() {
        Some(db) => f(db),
        None => Err(StorageError::Storage("storage is closed".to_string())),
    }
}

/// redb implementation of the Storage trait.
///
/// Every write is its own committed transaction, so writes are durable on
/// return. Reads open a fresh read transaction per call (and per iterator
/// batch), so a long scan observes writes committed between batches.
///
/// [`Storage::close`] drops the database and releases its file lock even
/// while clones of the handle or live iterators remain; those then fail
/// with a storage error.
pub struct RedbStorage {
    db: SharedDb,
    clock: Arc<dyn Clock>,
}

impl RedbStorage {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let db = Database::create(path).map_err(|e| {
            StorageError::Storage(format!(
                "Failed to open redb database '{}': {}",
                path.display(),
                e
            ))
        })?;

        // Read transactions cannot create tables, so make sure ours exists.
        let tx = db.begin_write().map_err(StorageError::from_storage)?;
        tx.open_table(KV_TABLE)
            .map_err(StorageError::from_storage)?;
        tx.commit().map_err(StorageError::from_storage)?;

        Ok(Self {
            db: Arc::new(RwLock::new(Some(db))),
            clock: Arc::new(WallClock),
        })
    }

    /// Sets a custom clock for TTL expiration checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl StorageRead for RedbStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>> {
        let found = with_db(&self.db, |db| {
            let tx = db.begin_read().map_err(StorageError::from_storage)?;
            let table = tx
                .open_table(KV_TABLE)
                .map_err(StorageError::from_storage)?;
            let guard = table
                .get(key.as_ref())
                .map_err(StorageError::from_storage)?;
            guard.map(|guard| decode_value(guard.value())).transpose()
        })?;

        Ok(found
            .filter(|(_, expire_ts)| !is_expired(*expire_ts, self.clock.now()))
            .map(|(value, expire_ts)| Record::new(key, value).with_expire_ts(expire_ts)))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn scan_iter(
        &self,
        range: BytesRange,
        options: ScanOptions,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>> {
        Ok(Box::new(RedbIterator {
            db: Arc::clone(&self.db),
            clock: Arc::clone(&self.clock),
            range,
            order: options.order,
            batch_size: options.batch_size.max(1),
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }))
    }
}

/// Iterator that reads the range in batches of `batch_size` entries.
///
/// Each batch resumes strictly after the last key visited by the previous
/// one, so no key is yielded twice even if writes land between batches.
struct RedbIterator {
    db: SharedDb,
    clock: Arc<dyn Clock>,
    range: BytesRange,
    order: ScanOrder,
    batch_size: usize,
    buffer: VecDeque<Record>,
    cursor: Option<Bytes>,
    exhausted: bool,
}

impl RedbIterator {
    /// Returns the range still left to visit.
    fn remaining(&self) -> (Bound<Bytes>, Bound<Bytes>) {
        let start = self.range.start.clone();
        let end = self.range.end.clone();
        match (&self.cursor, self.order) {
            (None, _) => (start, end),
            (Some(cursor), ScanOrder::Ascending) => (Bound::Excluded(cursor.clone()), end),
            (Some(cursor), ScanOrder::Descending) => (start, Bound::Excluded(cursor.clone())),
        }
    }

    fn fill(&mut self) -> StorageResult<()> {
        let db = Arc::clone(&self.db);
        with_db(&db, |db| self.fill_from(db))
    }

    fn fill_from(&mut self, db: &Database) -> StorageResult<()> {
        let (start, end) = self.remaining();
        let tx = db.begin_read().map_err(StorageError::from_storage)?;
        let table = tx
            .open_table(KV_TABLE)
            .map_err(StorageError::from_storage)?;
        let entries = table
            .range::<&[u8]>((as_slice_bound(&start), as_slice_bound(&end)))
            .map_err(StorageError::from_storage)?;
        let entries: Box<dyn Iterator<Item = _> + '_> = match self.order {
            ScanOrder::Ascending => Box::new(entries),
            ScanOrder::Descending => Box::new(entries.rev()),
        };

        let now = self.clock.now();
        let mut visited = 0;
        let mut last_key = None;
        for entry in entries.take(self.batch_size) {
            let (key, value) = entry.map_err(StorageError::from_storage)?;
            let key = Bytes::copy_from_slice(key.value());
            let (value, expire_ts) = decode_value(value.value())?;
            visited += 1;
            if !is_expired(expire_ts, now) {
                self.buffer
                    .push_back(Record::new(key.clone(), value).with_expire_ts(expire_ts));
            }
            last_key = Some(key);
        }

        if visited < self.batch_size {
            self.exhausted = true;
        }
        if last_key.is_some() {
            self.cursor = last_key;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageIterator for RedbIterator {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        // A batch may be entirely expired records, so keep pulling.
        while self.buffer.is_empty() && !self.exhausted {
            self.fill()?;
        }
        Ok(self.buffer.pop_front())
    }
}

#[async_trait]
impl Storage for RedbStorage {
    async fn apply(&self, ops: Vec<RecordOp>) -> StorageResult<()> {
        let now = self.clock.now();
        with_db(&self.db, |db| {
            let tx = db.begin_write().map_err(StorageError::from_storage)?;
            {
                let mut table = tx
                    .open_table(KV_TABLE)
                    .map_err(StorageError::from_storage)?;
                for op in ops {
                    match op {
                        RecordOp::Put(op) => {
                            let expire_ts = op.options.ttl.expire_ts(now);
                            let stored = encode_value(&op.record.value, expire_ts);
                            table
                                .insert(op.record.key.as_ref(), stored.as_ref())
                                .map_err(StorageError::from_storage)?;
                        }
                        RecordOp::Delete(key) => {
                            table
                                .remove(key.as_ref())
                                .map_err(StorageError::from_storage)?;
                        }
                    }
                }
            }
            tx.commit().map_err(StorageError::from_storage)
        })
    }

    /// Drops the database, waiting for in-progress transactions. Closing
    /// twice is a no-op.
    async fn close(&self) -> StorageResult<()> {
        let db = self
            .db
            .write()
            .map_err(|e| StorageError::Internal(format!("database lock poisoned: {}", e)))?
            .take();
        if db.is_some() {
            tracing::debug!("closed redb storage");
        }
        Ok(())
    }
}
