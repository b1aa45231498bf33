//! Namenode client over the fastcp wire protocol.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use fastcp_rpc::{NamenodeFeatures, NamenodeRpc, RpcError};
use fastcp_types::{
    DatanodeInfo, FileAttrs, FilePermission, LocatedBlock, LocatedBlocks, NamespaceId,
};

use crate::message::{NamenodeRequest, NamenodeResponse};
use crate::transport::Connection;

/// A namenode RPC handle over one persistent TCP connection.
///
/// The connection is established eagerly so that unreachable namenodes fail
/// at construction; a broken connection is dropped and re-dialed on the next
/// call.
pub struct IpcNamenode {
    endpoint: String,
    conn: Mutex<Option<Connection>>,
    closed: AtomicBool,
}

impl IpcNamenode {
    /// Dial a namenode at `host:port`.
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self, RpcError> {
        let endpoint = endpoint.into();
        let conn = Connection::connect(&endpoint).await?;
        Ok(Self {
            endpoint,
            conn: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
        })
    }

    /// The `host:port` this handle talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, request: NamenodeRequest) -> Result<NamenodeResponse, RpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Transport("namenode handle is closed".to_string()));
        }

        let mut slot = self.conn.lock().await;
        let conn = match slot.as_mut() {
            Some(conn) => conn,
            None => slot.insert(Connection::connect(&self.endpoint).await?),
        };

        match conn.call::<_, NamenodeResponse>(&request).await {
            Ok(NamenodeResponse::Error { kind, message }) => {
                Err(RpcError::Remote { kind, message })
            }
            Ok(response) => Ok(response),
            Err(e) => {
                // The stream state is unknown after a transport or codec
                // failure; drop it and re-dial on the next call.
                debug!(endpoint = %self.endpoint, error = %e, "dropping broken namenode connection");
                *slot = None;
                Err(e)
            }
        }
    }
}

fn unexpected(response: NamenodeResponse) -> RpcError {
    RpcError::Codec(format!("unexpected namenode response: {response:?}"))
}

#[async_trait]
impl NamenodeRpc for IpcNamenode {
    async fn probe_features(&self) -> Result<NamenodeFeatures, RpcError> {
        match self.call(NamenodeRequest::ProbeFeatures).await? {
            NamenodeResponse::Features(f) => Ok(f),
            other => Err(unexpected(other)),
        }
    }

    async fn get_file_info(&self, path: &str) -> Result<Option<FileAttrs>, RpcError> {
        let request = NamenodeRequest::GetFileInfo {
            path: path.to_string(),
        };
        match self.call(request).await? {
            NamenodeResponse::FileInfo(attrs) => Ok(attrs),
            other => Err(unexpected(other)),
        }
    }

    async fn get_listing(&self, path: &str) -> Result<Vec<FileAttrs>, RpcError> {
        let request = NamenodeRequest::GetListing {
            path: path.to_string(),
        };
        match self.call(request).await? {
            NamenodeResponse::Listing(entries) => Ok(entries),
            other => Err(unexpected(other)),
        }
    }

    async fn get_block_locations(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<LocatedBlocks, RpcError> {
        let request = NamenodeRequest::GetBlockLocations {
            path: path.to_string(),
            offset,
            length,
        };
        match self.call(request).await? {
            NamenodeResponse::Located(blocks) => Ok(blocks),
            other => Err(unexpected(other)),
        }
    }

    async fn open_and_fetch_meta_info(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<(LocatedBlocks, NamespaceId), RpcError> {
        let request = NamenodeRequest::OpenAndFetchMetaInfo {
            path: path.to_string(),
            offset,
            length,
        };
        match self.call(request).await? {
            NamenodeResponse::LocatedWithMeta { blocks, namespace } => Ok((blocks, namespace)),
            other => Err(unexpected(other)),
        }
    }

    async fn create(
        &self,
        path: &str,
        permission: FilePermission,
        client_name: &str,
        overwrite: bool,
        create_parent: bool,
        replication: u16,
        block_size: u64,
    ) -> Result<(), RpcError> {
        let request = NamenodeRequest::Create {
            path: path.to_string(),
            permission: permission.0,
            client_name: client_name.to_string(),
            overwrite,
            create_parent,
            replication,
            block_size,
        };
        match self.call(request).await? {
            NamenodeResponse::Created => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn add_block(
        &self,
        path: &str,
        client_name: &str,
        excluded_nodes: &[DatanodeInfo],
        favored_nodes: &[DatanodeInfo],
    ) -> Result<LocatedBlock, RpcError> {
        let request = NamenodeRequest::AddBlock {
            path: path.to_string(),
            client_name: client_name.to_string(),
            excluded_nodes: excluded_nodes.to_vec(),
            favored_nodes: favored_nodes.to_vec(),
        };
        match self.call(request).await? {
            NamenodeResponse::Block(block) => Ok(block),
            other => Err(unexpected(other)),
        }
    }

    async fn add_block_and_fetch_meta_info(
        &self,
        path: &str,
        client_name: &str,
        excluded_nodes: &[DatanodeInfo],
        favored_nodes: &[DatanodeInfo],
        start_pos: Option<u64>,
    ) -> Result<(LocatedBlock, NamespaceId), RpcError> {
        let request = NamenodeRequest::AddBlockAndFetchMetaInfo {
            path: path.to_string(),
            client_name: client_name.to_string(),
            excluded_nodes: excluded_nodes.to_vec(),
            favored_nodes: favored_nodes.to_vec(),
            start_pos,
        };
        match self.call(request).await? {
            NamenodeResponse::BlockWithMeta { block, namespace } => Ok((block, namespace)),
            other => Err(unexpected(other)),
        }
    }

    async fn complete(&self, path: &str, client_name: &str) -> Result<bool, RpcError> {
        let request = NamenodeRequest::Complete {
            path: path.to_string(),
            client_name: client_name.to_string(),
        };
        match self.call(request).await? {
            NamenodeResponse::Completed(done) => Ok(done),
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<bool, RpcError> {
        let request = NamenodeRequest::Delete {
            path: path.to_string(),
            recursive,
        };
        match self.call(request).await? {
            NamenodeResponse::Deleted(deleted) => Ok(deleted),
            other => Err(unexpected(other)),
        }
    }

    async fn renew_lease(&self, client_name: &str) -> Result<(), RpcError> {
        let request = NamenodeRequest::RenewLease {
            client_name: client_name.to_string(),
        };
        match self.call(request).await? {
            NamenodeResponse::LeaseRenewed => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn close(&self) -> Result<(), RpcError> {
        self.closed.store(true, Ordering::Release);
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.take() {
            debug!(endpoint = conn.endpoint(), "closed namenode connection");
        }
        Ok(())
    }
}
