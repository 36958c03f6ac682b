//! Request handlers for the line protocol.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::RpcError;
use super::proto::{Request, RequestKind, Response, salvage_id};
use super::request::{
    DeleteKeyParams, GetValueParams, ListKeysParams, OpenDbParams, PutChunkParams,
    PutCommitParams, PutValueParams, decode, decode_payload,
};
use super::response::{GetValueResult, ListKeysResult};
use crate::backup;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::UploadSessions;
use crate::store::Store;

/// Shared state behind every request task.
pub struct Handler {
    store: Arc<Store>,
    sessions: UploadSessions,
    config: Config,
}

fn to_value<T: Serialize>(result: T) -> Result<Value> {
    serde_json::to_value(result).map_err(|e| Error::Internal(e.to_string()))
}

impl Handler {
    pub fn new(store: Arc<Store>, config: Config) -> Self {
        Self {
            store,
            sessions: UploadSessions::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Handles one request line and returns the response to send.
    pub async fn handle_line(&self, line: &str) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "malformed request line");
                return RpcError::Malformed.into_response(salvage_id(line));
            }
        };
        let id = request.id.clone();
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                if let RpcError::Operation(e) = &err {
                    warn!(id = %id, error = %e, "request failed");
                }
                err.into_response(id)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> std::result::Result<Response, RpcError> {
        let Some(kind) = RequestKind::parse(&request.kind) else {
            return Err(RpcError::UnknownKind(request.kind));
        };
        debug!(id = %request.id, kind = kind.as_str(), "handling request");

        let params = request.params;
        let result = match kind {
            RequestKind::OpenDb => self.open_db(decode(params)?).await?,
            RequestKind::ListKeys => self.list_keys(decode(params)?).await?,
            RequestKind::GetValue => self.get_value(decode(params)?).await?,
            RequestKind::PutValue => self.put_value(&request.id, decode(params)?)?,
            RequestKind::PutChunk => self.put_chunk(decode(params)?)?,
            RequestKind::PutCommit => self.put_commit(decode(params)?).await?,
            RequestKind::DeleteKey => self.delete_key(decode(params)?).await?,
            RequestKind::CloseDb => self.close_db().await?,
        };
        Ok(Response::success(request.id, kind, result))
    }

    async fn open_db(&self, params: OpenDbParams) -> Result<Value> {
        if params.readonly {
            debug!(path = %params.path, "readonly flag ignored");
        }
        self.store.open(PathBuf::from(params.path)).await?;
        Ok(Value::Null)
    }

    async fn list_keys(&self, params: ListKeysParams) -> Result<Value> {
        let spec = params.to_query_spec(&self.config.query);
        let page = self.store.list_keys(&spec).await?;
        to_value(ListKeysResult::from(page))
    }

    async fn get_value(&self, params: GetValueParams) -> Result<Value> {
        let value = self.store.get(&params.key).await?;
        to_value(GetValueResult::new(&value))
    }

    /// Opens an upload session keyed by the request id. The key and ttl are
    /// taken from the matching `put_commit`.
    fn put_value(&self, id: &str, params: PutValueParams) -> Result<Value> {
        let size_hint = u64::try_from(params.value_length).unwrap_or(0);
        debug!(id, key = %params.key, size_hint, "starting upload");
        self.sessions.init(id, size_hint)?;
        Ok(Value::Null)
    }

    fn put_chunk(&self, params: PutChunkParams) -> Result<Value> {
        let data = decode_payload(&params.data)?;
        debug!(id = %params.id, chunk_index = params.chunk_index, len = data.len(), "appending chunk");
        self.sessions.append(&params.id, &data)?;
        Ok(Value::Null)
    }

    async fn put_commit(&self, params: PutCommitParams) -> Result<Value> {
        if !self.sessions.contains(&params.id) {
            return Err(Error::SessionNotFound(params.id));
        }
        backup::before_write(&self.store, &params.key, &self.config.backup).await?;
        self.sessions
            .commit(&params.id, &self.store, &params.key, params.ttl)
            .await?;
        Ok(Value::Null)
    }

    async fn delete_key(&self, params: DeleteKeyParams) -> Result<Value> {
        backup::before_write(&self.store, &params.key, &self.config.backup).await?;
        self.store.delete(&params.key).await?;
        Ok(Value::Null)
    }

    async fn close_db(&self) -> Result<Value> {
        self.store.close().await?;
        Ok(Value::Null)
    }
}
