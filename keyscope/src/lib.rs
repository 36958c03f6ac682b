//! Keyscope - browse, search and edit an embedded ordered key-value store.
//!
//! Keyscope puts a line-delimited JSON protocol in front of a single
//! embedded store so that a separate front end (typically a terminal UI) can
//! page through the keyspace, inspect values and write new ones.
//!
//! # Architecture
//!
//! Keys live in a redb database file inside the directory passed to
//! `open_db`. All access goes through a [`Store`] handle, which holds at most
//! one open store. Queries walk the keyspace in key order (or its reverse),
//! filter keys by prefix, substring or regular expression, and return one
//! page of rows carrying a short preview of each value. Large values are
//! written through upload sessions: the value arrives in base64 chunks and is
//! stored in one write at commit.
//!
//! # Key Concepts
//!
//! - **Store**: the open-store handle; `get`, `set`, `delete`, `list_keys`.
//! - **QuerySpec**: what to match, in which order, and which page to return.
//! - **KeyPage**: one page of [`KeyItem`] rows plus a `has_more` flag.
//! - **UploadSessions**: in-flight chunked writes, keyed by the id of the
//!   request that opened them.
//! - **Server**: reads request lines, runs each on its own task and writes
//!   responses through a single writer.
//!
//! # Example
//!
//! ```ignore
//! use keyscope::{MatchMode, QuerySpec, Store, StoreConfig};
//! use bytes::Bytes;
//!
//! let store = Store::new(StoreConfig::default());
//! store.open("/var/lib/myapp").await?;
//!
//! store.set("user:1", Bytes::from("alice"), 0).await?;
//! store.set("user:2", Bytes::from("bob"), 3600).await?;
//!
//! let page = store
//!     .list_keys(&QuerySpec::new("user:", MatchMode::Prefix, 50))
//!     .await?;
//! for item in &page.keys {
//!     println!("{} = {} ({} bytes)", item.key, item.value_preview, item.size);
//! }
//! ```

pub mod backup;
pub mod config;
mod error;
mod model;
pub mod preview;
mod query;
pub mod rpc;
mod session;
mod store;

pub use config::{BackupConfig, CliArgs, Config, QueryConfig, ServerConfig, StoreConfig};
pub use error::{Error, Result};
pub use model::{DEFAULT_PREVIEW_CHARS, KeyItem, KeyPage, MatchMode, QuerySpec, SortOrder};
pub use session::UploadSessions;
pub use store::Store;
