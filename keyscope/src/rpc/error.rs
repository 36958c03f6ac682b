//! Mapping of errors onto wire error codes.

use super::proto::{CODE_MALFORMED, CODE_OPERATION_FAILED, CODE_UNKNOWN_KIND, Response};
use crate::Error;

/// Error wrapper for converting keyscope errors to failure responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The line is not a request envelope.
    Malformed,
    /// The envelope names a kind this server does not handle.
    UnknownKind(String),
    /// The operation itself failed.
    Operation(Error),
}

impl RpcError {
    pub fn code(&self) -> i32 {
        match self {
            RpcError::Malformed => CODE_MALFORMED,
            RpcError::UnknownKind(_) => CODE_UNKNOWN_KIND,
            RpcError::Operation(_) => CODE_OPERATION_FAILED,
        }
    }

    pub fn message(&self) -> String {
        match self {
            RpcError::Malformed => "Invalid request format".to_string(),
            RpcError::UnknownKind(kind) => format!("Unknown request type: {}", kind),
            RpcError::Operation(err) => err.to_string(),
        }
    }

    pub fn into_response(self, id: String) -> Response {
        Response::failure(id, self.code(), self.message())
    }
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        RpcError::Operation(err)
    }
}
