//! Shared types for the fastcp workspace.
//!
//! This crate defines the data structures exchanged between the copy engine,
//! the RPC surface, and the wire transport: block and datanode identifiers
//! ([`BlockId`], [`DatanodeInfo`]), located-block metadata ([`LocatedBlock`],
//! [`LocatedBlocks`]), file attributes ([`FileAttrs`]), copy requests and
//! progress snapshots, and the engine configuration ([`FastCopyConfig`]).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Namespace tag carried on block RPCs when a namenode serves multiple
/// namespaces (federation). Absent on legacy clusters.
pub type NamespaceId = u32;

/// Identifier of a block as assigned by a namenode.
///
/// Identity is the numeric block id alone; the generation stamp and byte
/// length ride along because the datanode copy RPC needs them, but two
/// `BlockId`s with the same id refer to the same block regardless of the
/// metadata snapshot they were read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlockId {
    /// Numeric block id.
    pub id: u64,
    /// Generation stamp at the time the block was located.
    pub generation: u64,
    /// Length of the block in bytes.
    pub num_bytes: u64,
}

impl BlockId {
    /// Create a block identifier.
    pub fn new(id: u64, generation: u64, num_bytes: u64) -> Self {
        Self {
            id,
            generation,
            num_bytes,
        }
    }

    /// The canonical `blk_<id>_<generation>` name used in logs.
    pub fn block_name(&self) -> String {
        format!("blk_{}_{}", self.id, self.generation)
    }
}

impl PartialEq for BlockId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BlockId {}

impl Hash for BlockId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk_{}_{}", self.id, self.generation)
    }
}

/// A datanode's identity and routable addressing info.
///
/// Identity is the `host:port` name; two infos with the same name compare
/// equal even if the auxiliary fields differ. Ordering is by name so that
/// replica location lists can be sorted deterministically before matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatanodeInfo {
    /// Stable `host:port` identity.
    pub name: String,
    /// Resolvable hostname, for logs.
    pub hostname: String,
    /// Storage identifier reported by the datanode.
    pub storage_id: String,
}

impl DatanodeInfo {
    /// Create a datanode ref with `name` doubling as the hostname.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let hostname = name
            .split(':')
            .next()
            .unwrap_or(name.as_str())
            .to_string();
        Self {
            name,
            hostname,
            storage_id: String::new(),
        }
    }
}

impl PartialEq for DatanodeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DatanodeInfo {}

impl Hash for DatanodeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for DatanodeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DatanodeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for DatanodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Block metadata
// ---------------------------------------------------------------------------

/// One block of a file together with its replica locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedBlock {
    /// The block.
    pub block: BlockId,
    /// Byte offset of this block within the file.
    pub offset: u64,
    /// Replica locations, in the order the namenode returned them.
    pub locations: Vec<DatanodeInfo>,
}

/// The complete block list of a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocatedBlocks {
    /// Total file length in bytes.
    pub file_length: u64,
    /// Blocks in file order.
    pub blocks: Vec<LocatedBlock>,
}

// ---------------------------------------------------------------------------
// File metadata
// ---------------------------------------------------------------------------

/// POSIX-style permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePermission(pub u16);

impl Default for FilePermission {
    fn default() -> Self {
        Self(0o644)
    }
}

impl fmt::Display for FilePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

/// File attributes as reported by a namenode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttrs {
    /// Absolute path of the file.
    pub path: String,
    /// File length in bytes (0 for directories).
    pub length: u64,
    /// Whether this entry is a directory.
    pub is_dir: bool,
    /// Replication factor.
    pub replication: u16,
    /// Block size in bytes.
    pub block_size: u64,
    /// Permission bits.
    pub permission: FilePermission,
}

// ---------------------------------------------------------------------------
// Copy requests and progress
// ---------------------------------------------------------------------------

/// A single source → destination copy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Absolute source path.
    pub src: String,
    /// Absolute destination path.
    pub dst: String,
}

impl CopyRequest {
    /// Create a request from source and destination paths.
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Progress snapshot for one destination file being copied.
///
/// `blocks_done` counts blocks whose copy reached the minimum replication;
/// it is bumped exactly once per block and never decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopyStatus {
    /// Destination path this status reports on.
    pub file: String,
    /// Total number of blocks to copy.
    pub total_blocks: usize,
    /// Number of blocks fully copied so far.
    pub blocks_done: usize,
}

impl FileCopyStatus {
    /// Create a fresh status with zero completed blocks.
    pub fn new(file: impl Into<String>, total_blocks: usize) -> Self {
        Self {
            file: file.into(),
            total_blocks,
            blocks_done: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the copy engine.
#[derive(Debug, Clone)]
pub struct FastCopyConfig {
    /// Maximum time to wait for a file's copies to drain and for its commit,
    /// each. Default 30 minutes.
    pub file_wait_time: Duration,
    /// Number of good replicas at which a block counts as copied. Default 1.
    pub min_replication: u16,
    /// Per-datanode error count beyond which no further copy RPCs involve
    /// that node. Default 5.
    pub max_datanode_errors: u64,
    /// Concurrent replica-copy RPCs per file. Default 5.
    pub block_pool_size: usize,
    /// Concurrent files in flight. Default 5.
    pub file_pool_size: usize,
    /// Cadence of write-lease renewal on the destination namenode.
    /// Default 30 seconds.
    pub lease_renew_interval: Duration,
}

impl Default for FastCopyConfig {
    fn default() -> Self {
        Self {
            file_wait_time: Duration::from_secs(30 * 60),
            min_replication: 1,
            max_datanode_errors: 5,
            block_pool_size: 5,
            file_pool_size: 5,
            lease_renew_interval: Duration::from_secs(30),
        }
    }
}
