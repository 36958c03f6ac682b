//! Data types for keyspace queries.

use std::str::FromStr;

use common::ScanOrder;
use serde::{Deserialize, Serialize};

/// Default number of characters shown in a value preview.
pub const DEFAULT_PREVIEW_CHARS: usize = 100;

/// One row of a query result.
///
/// Built from a point-in-time read; `expires_at` may be stale as soon as it
/// is returned if another writer touches the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyItem {
    /// The key, decoded lossily as UTF-8.
    pub key: String,
    /// Truncated text of the value, or `[Binary <n> bytes]`.
    pub value_preview: String,
    /// Exact byte length of the full value.
    pub size: u64,
    /// Expiration time in Unix seconds, 0 if the key never expires.
    pub expires_at: u64,
}

/// A bounded page of query results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPage {
    pub keys: Vec<KeyItem>,
    /// True if at least one more matching key follows this page.
    pub has_more: bool,
}

/// How a query pattern is matched against keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Key starts with the pattern.
    #[default]
    Prefix,
    /// Pattern occurs anywhere in the key.
    Substring,
    /// Pattern is a regular expression matched against the key.
    Regex,
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefix" => Ok(MatchMode::Prefix),
            "substring" => Ok(MatchMode::Substring),
            "regex" => Ok(MatchMode::Regex),
            other => Err(format!("unknown match mode: {}", other)),
        }
    }
}

/// Result ordering, always the store's native key order or its reverse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parses the wire value: `"desc"` is descending, anything else ascending.
    pub fn from_wire(sort: Option<&str>) -> Self {
        match sort {
            Some("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }

    pub(crate) fn scan_order(self) -> ScanOrder {
        match self {
            SortOrder::Asc => ScanOrder::Ascending,
            SortOrder::Desc => ScanOrder::Descending,
        }
    }
}

/// Parameters of a keyspace query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    /// Pattern whose meaning depends on `mode`. Empty matches every key.
    pub pattern: String,
    pub mode: MatchMode,
    pub order: SortOrder,
    /// Maximum number of rows returned. Must be positive.
    pub limit: usize,
    /// Matched rows to skip before collecting. Ignored when `start_key` is set.
    pub offset: usize,
    /// Inclusive resume point; takes precedence over `offset`.
    pub start_key: Option<String>,
    /// Preview length in characters; 0 selects [`DEFAULT_PREVIEW_CHARS`].
    pub preview_chars: usize,
    pub case_sensitive: bool,
}

impl QuerySpec {
    /// A case-sensitive ascending query for the first `limit` keys matching
    /// `pattern`.
    pub fn new(pattern: impl Into<String>, mode: MatchMode, limit: usize) -> Self {
        Self {
            pattern: pattern.into(),
            mode,
            order: SortOrder::Asc,
            limit,
            offset: 0,
            start_key: None,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            case_sensitive: true,
        }
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_start_key(mut self, start_key: impl Into<String>) -> Self {
        self.start_key = Some(start_key.into());
        self
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}
