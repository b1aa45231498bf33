//! The RPC surface consumed by the fastcp copy engine.
//!
//! The engine talks to a cluster exclusively through the traits in this
//! crate — [`NamenodeRpc`] for metadata operations, [`DatanodeRpc`] for the
//! block-copy operation, and [`DatanodeConnector`] for building datanode
//! handles on demand. Tests substitute in-process fakes; the shipped wire
//! implementation lives in `fastcp-ipc`.
//!
//! Namenodes come in several protocol generations. [`NamenodeFeatures`]
//! describes which method shapes a given handle supports; the engine probes
//! it once per handle and caches the result.

mod error;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fastcp_types::{
    BlockId, DatanodeInfo, FileAttrs, FilePermission, LocatedBlock, LocatedBlocks, NamespaceId,
};

pub use error::{RemoteErrorKind, RpcError};

/// Method shapes supported by a namenode handle.
///
/// Three generations of the allocate RPC exist: the richest accepts a start
/// position and returns namespace metadata, the middle form omits the start
/// position, and the legacy form returns no metadata at all. The open RPC
/// has a federation-aware form and a legacy form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamenodeFeatures {
    /// `open_and_fetch_meta_info` is available (federation-aware metadata
    /// reads). A namenode advertising this serves namespace ids.
    pub open_and_fetch_meta_info: bool,
    /// `add_block_and_fetch_meta_info` is available.
    pub add_block_and_fetch_meta_info: bool,
    /// `add_block_and_fetch_meta_info` accepts a start position.
    pub add_block_with_start_pos: bool,
}

impl NamenodeFeatures {
    /// Feature set of a legacy, non-federated namenode.
    pub fn legacy() -> Self {
        Self::default()
    }

    /// Feature set of a current federation-capable namenode.
    pub fn federated() -> Self {
        Self {
            open_and_fetch_meta_info: true,
            add_block_and_fetch_meta_info: true,
            add_block_with_start_pos: true,
        }
    }
}

/// Metadata operations against a namenode.
///
/// All calls are synchronous request/response at the protocol level; the
/// async signatures only reflect the non-blocking transport underneath.
#[async_trait]
pub trait NamenodeRpc: Send + Sync {
    /// Report which method shapes this namenode supports.
    async fn probe_features(&self) -> Result<NamenodeFeatures, RpcError>;

    /// Fetch the attributes of a path, or `None` if it does not exist.
    async fn get_file_info(&self, path: &str) -> Result<Option<FileAttrs>, RpcError>;

    /// List the direct children of a directory.
    async fn get_listing(&self, path: &str) -> Result<Vec<FileAttrs>, RpcError>;

    /// Fetch the block list with replica locations (legacy form).
    async fn get_block_locations(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<LocatedBlocks, RpcError>;

    /// Fetch the block list plus the namespace id (federation form).
    async fn open_and_fetch_meta_info(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<(LocatedBlocks, NamespaceId), RpcError>;

    /// Create a file, with the caller as lease holder.
    #[allow(clippy::too_many_arguments)]
    async fn create(
        &self,
        path: &str,
        permission: FilePermission,
        client_name: &str,
        overwrite: bool,
        create_parent: bool,
        replication: u16,
        block_size: u64,
    ) -> Result<(), RpcError>;

    /// Allocate a new block appended to `path` (legacy form).
    async fn add_block(
        &self,
        path: &str,
        client_name: &str,
        excluded_nodes: &[DatanodeInfo],
        favored_nodes: &[DatanodeInfo],
    ) -> Result<LocatedBlock, RpcError>;

    /// Allocate a new block and return the namespace id (federation form).
    /// `start_pos` is only honored when the handle advertises
    /// [`NamenodeFeatures::add_block_with_start_pos`].
    async fn add_block_and_fetch_meta_info(
        &self,
        path: &str,
        client_name: &str,
        excluded_nodes: &[DatanodeInfo],
        favored_nodes: &[DatanodeInfo],
        start_pos: Option<u64>,
    ) -> Result<(LocatedBlock, NamespaceId), RpcError>;

    /// Commit the file. Returns `false` while blocks are still below the
    /// namenode's minimum replication.
    async fn complete(&self, path: &str, client_name: &str) -> Result<bool, RpcError>;

    /// Delete a path. Returns whether anything was deleted.
    async fn delete(&self, path: &str, recursive: bool) -> Result<bool, RpcError>;

    /// Refresh the caller's write leases.
    async fn renew_lease(&self, client_name: &str) -> Result<(), RpcError>;

    /// Release the underlying transport. Further calls may fail.
    async fn close(&self) -> Result<(), RpcError>;
}

/// Instruction for a datanode to duplicate one of its replicas onto a
/// (usually co-located) target datanode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyBlockRequest {
    /// Namespace of the source block, on federated clusters.
    pub src_namespace: Option<NamespaceId>,
    /// The replica to copy, which the receiving datanode must hold.
    pub src_block: BlockId,
    /// Namespace of the destination block, on federated clusters.
    pub dst_namespace: Option<NamespaceId>,
    /// The freshly allocated destination block.
    pub dst_block: BlockId,
    /// Datanode that must end up holding the new replica.
    pub target: DatanodeInfo,
}

/// Block-level operations against a datanode.
#[async_trait]
pub trait DatanodeRpc: Send + Sync {
    /// Copy a block replica to the target datanode. Synchronous: does not
    /// return until the target holds the replica, which can take minutes.
    async fn copy_block(&self, request: CopyBlockRequest) -> Result<(), RpcError>;

    /// Release the underlying transport.
    async fn close(&self) -> Result<(), RpcError>;
}

/// Builds datanode handles on demand.
///
/// The engine caches handles per datanode; the connector is only consulted
/// on a cache miss.
#[async_trait]
pub trait DatanodeConnector: Send + Sync {
    /// Open a handle to the given datanode.
    async fn connect(&self, node: &DatanodeInfo) -> Result<Arc<dyn DatanodeRpc>, RpcError>;
}
