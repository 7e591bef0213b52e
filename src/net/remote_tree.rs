//! A peer's tree, spoken to over the transport.

use crate::error::{Error, NetworkError, Result};
use crate::net::rpc::{Request, Response};
use crate::net::Transport;
use crate::tree::{Entry, SubtreeDigest, SyncTree};
use crate::types::Position;
use async_trait::async_trait;
use std::sync::Arc;

/// [`SyncTree`] implementation that forwards every operation to a peer.
pub struct RemoteTree {
    addr: String,
    transport: Arc<dyn Transport>,
}

impl RemoteTree {
    pub fn new(addr: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            addr: addr.into(),
            transport,
        }
    }
}

fn unexpected(response: Response) -> Error {
    NetworkError::MismatchedResponse(format!("{:?}", response)).into()
}

#[async_trait]
impl SyncTree for RemoteTree {
    async fn sync_subtree(&self, path: &[u8]) -> Result<Option<SubtreeDigest>> {
        let request = Request::TreeSubtree {
            path: path.to_vec(),
        };
        match self.transport.call(&self.addr, request).await? {
            Response::TreeSubtree(digest) => Ok(digest),
            other => Err(unexpected(other)),
        }
    }

    async fn sync_children(&self, path: &[u8]) -> Result<Vec<Option<SubtreeDigest>>> {
        let request = Request::TreeChildren {
            path: path.to_vec(),
        };
        match self.transport.call(&self.addr, request).await? {
            Response::TreeChildren(children) => Ok(children),
            other => Err(unexpected(other)),
        }
    }

    async fn sync_entry(&self, key: Position) -> Result<Option<Entry>> {
        match self.transport.call(&self.addr, Request::TreeEntry { key }).await? {
            Response::TreeEntry(entry) => Ok(entry),
            other => Err(unexpected(other)),
        }
    }

    async fn sync_insert(&self, key: Position, entry: Entry) -> Result<bool> {
        let request = Request::TreeInsert { key, entry };
        match self.transport.call(&self.addr, request).await? {
            Response::TreeInserted(stored) => Ok(stored),
            other => Err(unexpected(other)),
        }
    }

    async fn sync_delete(&self, key: Position) -> Result<bool> {
        match self.transport.call(&self.addr, Request::TreeDelete { key }).await? {
            Response::TreeDeleted(removed) => Ok(removed),
            other => Err(unexpected(other)),
        }
    }
}
