//! Wire messages for the fastcp client protocol.
//!
//! Every request/response is one length-prefixed postcard-encoded frame.
//! Remote failures travel as the `Error` response variant so the caller can
//! classify them without string matching.

use serde::{Deserialize, Serialize};

use fastcp_rpc::{NamenodeFeatures, RemoteErrorKind};
use fastcp_types::{
    BlockId, DatanodeInfo, FileAttrs, LocatedBlock, LocatedBlocks, NamespaceId,
};

/// Requests understood by a namenode endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NamenodeRequest {
    /// Ask which method shapes the namenode supports.
    ProbeFeatures,

    /// Fetch attributes of a path.
    GetFileInfo {
        /// Absolute path.
        path: String,
    },

    /// List the direct children of a directory.
    GetListing {
        /// Absolute directory path.
        path: String,
    },

    /// Fetch block locations (legacy form).
    GetBlockLocations {
        /// Absolute path.
        path: String,
        /// Byte offset of the first requested block.
        offset: u64,
        /// Number of bytes to cover.
        length: u64,
    },

    /// Fetch block locations plus namespace id (federation form).
    OpenAndFetchMetaInfo {
        /// Absolute path.
        path: String,
        /// Byte offset of the first requested block.
        offset: u64,
        /// Number of bytes to cover.
        length: u64,
    },

    /// Create a file with the caller as lease holder.
    Create {
        /// Absolute path.
        path: String,
        /// Permission bits.
        permission: u16,
        /// Lease holder identity.
        client_name: String,
        /// Replace an existing file.
        overwrite: bool,
        /// Create missing parent directories.
        create_parent: bool,
        /// Replication factor.
        replication: u16,
        /// Block size in bytes.
        block_size: u64,
    },

    /// Allocate a new block (legacy form).
    AddBlock {
        /// Absolute path.
        path: String,
        /// Lease holder identity.
        client_name: String,
        /// Nodes the namenode must not place replicas on.
        excluded_nodes: Vec<DatanodeInfo>,
        /// Placement hints.
        favored_nodes: Vec<DatanodeInfo>,
    },

    /// Allocate a new block (federation form, optional start position).
    AddBlockAndFetchMetaInfo {
        /// Absolute path.
        path: String,
        /// Lease holder identity.
        client_name: String,
        /// Nodes the namenode must not place replicas on.
        excluded_nodes: Vec<DatanodeInfo>,
        /// Placement hints.
        favored_nodes: Vec<DatanodeInfo>,
        /// Byte offset at which this block starts, when supported.
        start_pos: Option<u64>,
    },

    /// Commit a file.
    Complete {
        /// Absolute path.
        path: String,
        /// Lease holder identity.
        client_name: String,
    },

    /// Delete a path.
    Delete {
        /// Absolute path.
        path: String,
        /// Recurse into directories.
        recursive: bool,
    },

    /// Refresh the caller's write leases.
    RenewLease {
        /// Lease holder identity.
        client_name: String,
    },
}

/// Responses from a namenode endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NamenodeResponse {
    /// Reply to [`NamenodeRequest::ProbeFeatures`].
    Features(NamenodeFeatures),
    /// Reply to [`NamenodeRequest::GetFileInfo`].
    FileInfo(Option<FileAttrs>),
    /// Reply to [`NamenodeRequest::GetListing`].
    Listing(Vec<FileAttrs>),
    /// Reply to [`NamenodeRequest::GetBlockLocations`].
    Located(LocatedBlocks),
    /// Reply to [`NamenodeRequest::OpenAndFetchMetaInfo`].
    LocatedWithMeta {
        /// The block list.
        blocks: LocatedBlocks,
        /// Namespace serving the path.
        namespace: NamespaceId,
    },
    /// Reply to [`NamenodeRequest::Create`].
    Created,
    /// Reply to [`NamenodeRequest::AddBlock`].
    Block(LocatedBlock),
    /// Reply to [`NamenodeRequest::AddBlockAndFetchMetaInfo`].
    BlockWithMeta {
        /// The allocated block.
        block: LocatedBlock,
        /// Namespace serving the path.
        namespace: NamespaceId,
    },
    /// Reply to [`NamenodeRequest::Complete`].
    Completed(bool),
    /// Reply to [`NamenodeRequest::Delete`].
    Deleted(bool),
    /// Reply to [`NamenodeRequest::RenewLease`].
    LeaseRenewed,
    /// The namenode processed the request and failed.
    Error {
        /// Failure classification.
        kind: RemoteErrorKind,
        /// Human-readable detail.
        message: String,
    },
}

/// Requests understood by a datanode endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatanodeRequest {
    /// Copy a local block replica to a target datanode. The datanode only
    /// replies once the target holds the replica.
    CopyBlock {
        /// Namespace of the source block, on federated clusters.
        src_namespace: Option<NamespaceId>,
        /// The replica to copy.
        src_block: BlockId,
        /// Namespace of the destination block, on federated clusters.
        dst_namespace: Option<NamespaceId>,
        /// The freshly allocated destination block.
        dst_block: BlockId,
        /// Datanode that must receive the new replica.
        target: DatanodeInfo,
    },
}

/// Responses from a datanode endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatanodeResponse {
    /// The target datanode holds the replica.
    Copied,
    /// The datanode processed the request and failed.
    Error {
        /// Failure classification.
        kind: RemoteErrorKind,
        /// Human-readable detail.
        message: String,
    },
}
