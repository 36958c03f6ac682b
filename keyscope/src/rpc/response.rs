//! Typed response results.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::model::{KeyItem, KeyPage};

/// Result of `list_keys`.
#[derive(Debug, Serialize)]
pub struct ListKeysResult {
    pub keys: Vec<KeyItem>,
    pub has_more: bool,
}

impl From<KeyPage> for ListKeysResult {
    fn from(page: KeyPage) -> Self {
        Self {
            keys: page.keys,
            has_more: page.has_more,
        }
    }
}

/// Result of `get_value`.
#[derive(Debug, Serialize)]
pub struct GetValueResult {
    /// Base64 of the full value.
    pub value: String,
}

impl GetValueResult {
    pub fn new(value: &[u8]) -> Self {
        Self {
            value: STANDARD.encode(value),
        }
    }
}
