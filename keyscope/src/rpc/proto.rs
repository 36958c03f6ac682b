//! Wire envelope of the line protocol.
//!
//! Each line is one JSON object. Requests look like
//! `{"id": "...", "type": "list_keys", "params": {...}}`; a success response
//! echoes the id with type `<request type>_resp` and a `result`, and a failure
//! has type `error` and an `error: {code, message}` body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A store, session, or parameter error for a well-formed request.
pub const CODE_OPERATION_FAILED: i32 = 1000;
/// The request `type` is not one this server knows.
pub const CODE_UNKNOWN_KIND: i32 = 1001;
/// The line is not a JSON object with a string `type`.
pub const CODE_MALFORMED: i32 = 1003;

/// Type of every failure response.
pub const ERROR_TYPE: &str = "error";

/// A decoded request line.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific parameters, decoded once the kind is known.
    #[serde(default)]
    pub params: Value,
}

/// Request kinds understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    OpenDb,
    ListKeys,
    GetValue,
    PutValue,
    PutChunk,
    PutCommit,
    DeleteKey,
    CloseDb,
}

impl RequestKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "open_db" => Some(RequestKind::OpenDb),
            "list_keys" => Some(RequestKind::ListKeys),
            "get_value" => Some(RequestKind::GetValue),
            "put_value" => Some(RequestKind::PutValue),
            "put_chunk" => Some(RequestKind::PutChunk),
            "put_commit" => Some(RequestKind::PutCommit),
            "delete_key" => Some(RequestKind::DeleteKey),
            "close_db" => Some(RequestKind::CloseDb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::OpenDb => "open_db",
            RequestKind::ListKeys => "list_keys",
            RequestKind::GetValue => "get_value",
            RequestKind::PutValue => "put_value",
            RequestKind::PutChunk => "put_chunk",
            RequestKind::PutCommit => "put_commit",
            RequestKind::DeleteKey => "delete_key",
            RequestKind::CloseDb => "close_db",
        }
    }

    /// Type of the success response to this kind.
    pub fn response_type(&self) -> String {
        format!("{}_resp", self.as_str())
    }
}

/// Body of a failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// A success response. Unit results are sent as `null`.
    pub fn success(id: String, kind: RequestKind, result: Value) -> Self {
        Self {
            id,
            kind: kind.response_type(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: String, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            kind: ERROR_TYPE.to_string(),
            result: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
            }),
        }
    }

    /// Encodes the response as one JSON line, newline included.
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = match serde_json::to_vec(self) {
            Ok(line) => line,
            // Only non-string map keys can fail here, and none are produced.
            Err(e) => format!(
                r#"{{"id":{},"type":"error","error":{{"code":{},"message":{}}}}}"#,
                Value::String(self.id.clone()),
                CODE_OPERATION_FAILED,
                Value::String(e.to_string())
            )
            .into_bytes(),
        };
        line.push(b'\n');
        line
    }
}

/// Recovers a string `id` from a line whose envelope failed to decode.
pub fn salvage_id(line: &str) -> String {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}
