//! Ordered key-value storage behind an async trait seam.
//!
//! Backends keep keys in byte order, can walk a [`BytesRange`] in either
//! direction, and attach an optional expiration time to each value. Expired
//! values are invisible to every read.

pub mod config;
pub mod disk;
pub mod factory;
pub mod in_memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::BytesRange;

/// How long a written value lives.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum Ttl {
    #[default]
    NoExpiry,
    /// Expire this many milliseconds after the write is applied.
    ExpireAfter(u64),
}

impl Ttl {
    /// Converts a caller-facing TTL in seconds; `ttl <= 0` means no expiry.
    pub fn from_secs(ttl: i64) -> Self {
        match u64::try_from(ttl) {
            Ok(secs) if secs > 0 => Ttl::ExpireAfter(secs.saturating_mul(1000)),
            _ => Ttl::NoExpiry,
        }
    }

    /// Absolute expiry in ms for a write applied at `now`.
    pub(crate) fn expire_ts(self, now: i64) -> Option<i64> {
        match self {
            Ttl::NoExpiry => None,
            Ttl::ExpireAfter(ms) => Some(now.saturating_add(i64::try_from(ms).unwrap_or(i64::MAX))),
        }
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct PutOptions {
    pub ttl: Ttl,
}

/// A record to write together with its write options.
#[derive(Clone, Debug)]
pub struct PutRecordOp {
    pub record: Record,
    pub options: PutOptions,
}

impl PutRecordOp {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            options: PutOptions::default(),
        }
    }

    pub fn with_options(self, options: PutOptions) -> Self {
        Self { options, ..self }
    }
}

impl From<Record> for PutRecordOp {
    fn from(record: Record) -> Self {
        Self::new(record)
    }
}

/// A key-value pair as read from (or written to) storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
    /// Absolute expiration time in ms since the Unix epoch, `None` if the
    /// record never expires. Ignored on writes, where [`Ttl`] decides.
    pub expire_ts: Option<i64>,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self {
            key,
            value,
            expire_ts: None,
        }
    }

    pub fn with_expire_ts(mut self, expire_ts: Option<i64>) -> Self {
        self.expire_ts = expire_ts;
        self
    }
}

/// One mutation in an atomic batch.
#[derive(Clone, Debug)]
pub enum RecordOp {
    Put(PutRecordOp),
    Delete(Bytes),
}

/// Direction of a range scan.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ScanOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    pub order: ScanOrder,
    /// Number of records (values included) a backend may prefetch per
    /// round-trip to the engine.
    pub batch_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            order: ScanOrder::Ascending,
            batch_size: 256,
        }
    }
}

/// Error type for storage operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Failures reported by the underlying engine
    Storage(String),
    /// Corrupt data or broken invariants
    Internal(String),
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StorageError {
    pub fn from_storage(e: impl std::fmt::Display) -> Self {
        StorageError::Storage(e.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

pub(crate) fn is_expired(expire_ts: Option<i64>, now: i64) -> bool {
    expire_ts.is_some_and(|ts| now >= ts)
}

/// Pull-based cursor over scanned records.
#[async_trait]
pub trait StorageIterator {
    async fn next(&mut self) -> StorageResult<Option<Record>>;
}

/// Read operations over an ordered keyspace.
#[async_trait]
pub trait StorageRead: Send + Sync {
    /// Returns the live (non-expired) record for `key`, if any.
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>>;

    /// Returns an iterator over the live records in `range`, walking in
    /// `options.order`.
    ///
    /// The iterator owns everything it needs, so it can be held across await
    /// points and outlive the borrow of `self`.
    async fn scan_iter(
        &self,
        range: BytesRange,
        options: ScanOptions,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>>;
}

/// Read-write access to an ordered keyspace.
#[async_trait]
pub trait Storage: StorageRead {
    /// Applies a batch of puts and deletes atomically.
    async fn apply(&self, ops: Vec<RecordOp>) -> StorageResult<()>;

    async fn put(&self, records: Vec<PutRecordOp>) -> StorageResult<()> {
        self.apply(records.into_iter().map(RecordOp::Put).collect())
            .await
    }

    /// Deletes a key. Deleting a missing key succeeds.
    async fn delete(&self, key: Bytes) -> StorageResult<()> {
        self.apply(vec![RecordOp::Delete(key)]).await
    }

    /// Releases the backend. For redb the file lock is released once the
    /// last handle and iterator are dropped.
    async fn close(&self) -> StorageResult<()>;
}
