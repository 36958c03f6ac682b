pub mod bytes;
pub mod clock;
pub mod storage;

pub use bytes::BytesRange;
pub use clock::{Clock, WallClock};
pub use storage::config::{RedbStorageConfig, StorageConfig};
pub use storage::{
    PutOptions, PutRecordOp, Record, RecordOp, ScanOptions, ScanOrder, Storage, StorageError,
    StorageIterator, StorageRead, StorageResult, Ttl,
};
