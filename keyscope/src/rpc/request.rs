//! Typed request parameters.
//!
//! Missing fields take their zero value, so `{}` (or absent `params`) is a
//! valid body for every kind; validation happens in the operation itself.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::QueryConfig;
use crate::error::Result;
use crate::model::{MatchMode, QuerySpec, SortOrder};

/// Decodes `params` into `T`, treating an absent body as `{}`.
pub fn decode<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    Ok(serde_json::from_value(params)?)
}

/// Decodes a base64 transport payload.
pub fn decode_payload(data: &str) -> Result<Bytes> {
    Ok(Bytes::from(STANDARD.decode(data)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenDbParams {
    pub path: String,
    /// Accepted for compatibility; stores are always opened read-write.
    pub readonly: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListKeysParams {
    /// Pattern to match; its meaning depends on `mode`.
    pub prefix: String,
    pub mode: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub start_key: Option<String>,
    pub preview_chars: Option<i64>,
    pub case_sensitive: Option<bool>,
}

impl ListKeysParams {
    /// Resolves the request against configured defaults.
    ///
    /// An absent or empty mode takes the configured default; an unknown one
    /// falls back to prefix matching. Non-positive limits and preview lengths
    /// take their configured values, and a negative offset counts as 0.
    pub fn to_query_spec(&self, defaults: &QueryConfig) -> QuerySpec {
        let mode = match self.mode.as_deref() {
            None | Some("") => defaults.default_mode,
            Some(mode) => mode.parse().unwrap_or(MatchMode::Prefix),
        };
        let limit = positive(self.limit).unwrap_or(defaults.page_size.max(1));
        let preview_chars = positive(self.preview_chars).unwrap_or(defaults.preview_chars);

        let mut spec = QuerySpec::new(self.prefix.clone(), mode, limit)
            .with_order(SortOrder::from_wire(self.sort.as_deref()))
            .with_offset(positive(self.offset).unwrap_or(0))
            .with_preview_chars(preview_chars)
            .with_case_sensitive(self.case_sensitive.unwrap_or(defaults.case_sensitive));
        if let Some(start_key) = &self.start_key {
            spec = spec.with_start_key(start_key.clone());
        }
        spec
    }
}

fn positive(n: Option<i64>) -> Option<usize> {
    n.filter(|n| *n > 0).and_then(|n| usize::try_from(n).ok())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GetValueParams {
    pub key: String,
}

/// Opens an upload session under the request's own id.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PutValueParams {
    pub key: String,
    /// Declared size of the value, used only to size the buffer.
    pub value_length: i64,
    pub ttl: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PutChunkParams {
    /// Id of the `put_value` request that opened the session.
    pub id: String,
    /// Informational only; chunks are assembled in arrival order.
    pub chunk_index: i64,
    /// Base64 payload.
    pub data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PutCommitParams {
    pub id: String,
    pub key: String,
    /// Seconds until expiry; 0 or less never expires.
    pub ttl: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeleteKeyParams {
    pub key: String,
}
