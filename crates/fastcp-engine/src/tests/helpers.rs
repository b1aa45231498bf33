//! Shared test fakes: an in-memory namenode, recording datanodes, and a
//! connector wiring them together.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fastcp_rpc::{
    CopyBlockRequest, DatanodeConnector, DatanodeRpc, NamenodeFeatures, NamenodeRpc,
    RemoteErrorKind, RpcError,
};
use fastcp_types::{
    BlockId, DatanodeInfo, FastCopyConfig, FileAttrs, FilePermission, LocatedBlock,
    LocatedBlocks, NamespaceId,
};

use crate::FastCopy;

pub fn nodes(names: &[&str]) -> Vec<DatanodeInfo> {
    names.iter().map(|n| DatanodeInfo::new(*n)).collect()
}

/// A config with short lease cadence so tests exercise renewal quickly.
pub fn test_config() -> FastCopyConfig {
    FastCopyConfig {
        lease_renew_interval: Duration::from_millis(20),
        ..FastCopyConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Fake namenode
// ---------------------------------------------------------------------------

/// One recorded `add_block*` call.
#[derive(Debug, Clone)]
pub struct AddBlockCall {
    pub path: String,
    pub favored_nodes: Vec<DatanodeInfo>,
    pub start_pos: Option<u64>,
}

#[derive(Default)]
pub struct NamespaceState {
    pub files: HashMap<String, FakeFile>,
    pub created: Vec<String>,
    pub deleted: Vec<(String, bool)>,
    pub add_block_calls: Vec<AddBlockCall>,
    pub complete_calls: HashMap<String, u32>,
    pub renewed: Vec<String>,
}

pub struct FakeFile {
    pub attrs: FileAttrs,
    pub blocks: Vec<LocatedBlock>,
}

/// In-memory namenode honoring favored-nodes hints on allocation.
pub struct FakeNamenode {
    pub features: NamenodeFeatures,
    pub namespace: NamespaceId,
    pub state: Mutex<NamespaceState>,
    next_block_id: AtomicU64,
    /// Fail this many allocations with not-replicated-yet before succeeding.
    pub not_replicated_failures: Mutex<u32>,
    /// Per-path count of `complete` calls answered `false` before `true`.
    pub complete_defer: Mutex<HashMap<String, u32>>,
    /// Truncate allocated replica lists to this many nodes.
    pub locations_limit: Mutex<Option<usize>>,
    pub close_calls: AtomicUsize,
}

impl FakeNamenode {
    pub fn with_features(features: NamenodeFeatures, namespace: NamespaceId) -> Arc<Self> {
        Arc::new(Self {
            features,
            namespace,
            state: Mutex::new(NamespaceState::default()),
            next_block_id: AtomicU64::new(1000),
            not_replicated_failures: Mutex::new(0),
            complete_defer: Mutex::new(HashMap::new()),
            locations_limit: Mutex::new(None),
            close_calls: AtomicUsize::new(0),
        })
    }

    pub fn federated(namespace: NamespaceId) -> Arc<Self> {
        Self::with_features(NamenodeFeatures::federated(), namespace)
    }

    pub fn legacy() -> Arc<Self> {
        Self::with_features(NamenodeFeatures::legacy(), 0)
    }

    /// Register a source file whose blocks live on the given nodes.
    pub fn add_file(&self, path: &str, block_sizes: &[u64], locations: Vec<Vec<DatanodeInfo>>) {
        assert_eq!(block_sizes.len(), locations.len());
        let mut blocks = Vec::new();
        let mut offset = 0u64;
        for (size, locs) in block_sizes.iter().zip(locations) {
            let id = self.next_block_id.fetch_add(1, Ordering::SeqCst);
            blocks.push(LocatedBlock {
                block: BlockId::new(id, 1, *size),
                offset,
                locations: locs,
            });
            offset += size;
        }

        let mut state = self.state.lock().unwrap();
        state.files.insert(
            path.to_string(),
            FakeFile {
                attrs: FileAttrs {
                    path: path.to_string(),
                    length: offset,
                    is_dir: false,
                    replication: 3,
                    block_size: block_sizes.first().copied().unwrap_or(64),
                    permission: FilePermission(0o644),
                },
                blocks,
            },
        );
    }

    pub fn add_dir(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(
            path.to_string(),
            FakeFile {
                attrs: FileAttrs {
                    path: path.to_string(),
                    length: 0,
                    is_dir: true,
                    replication: 0,
                    block_size: 0,
                    permission: FilePermission(0o755),
                },
                blocks: Vec::new(),
            },
        );
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<(String, bool)> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn add_block_calls(&self) -> Vec<AddBlockCall> {
        self.state.lock().unwrap().add_block_calls.clone()
    }

    pub fn complete_calls(&self, path: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .complete_calls
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn renewed(&self) -> Vec<String> {
        self.state.lock().unwrap().renewed.clone()
    }

    fn allocate(
        &self,
        path: &str,
        favored_nodes: &[DatanodeInfo],
        start_pos: Option<u64>,
    ) -> Result<LocatedBlock, RpcError> {
        {
            let mut failures = self.not_replicated_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(RpcError::remote(
                    RemoteErrorKind::NotReplicatedYet,
                    "previous block below minimum replication",
                ));
            }
        }

        let limit = (*self.locations_limit.lock().unwrap()).unwrap_or(usize::MAX);
        let mut state = self.state.lock().unwrap();
        let Some(file) = state.files.get(path) else {
            return Err(RpcError::remote(RemoteErrorKind::FileNotFound, path));
        };

        let id = self.next_block_id.fetch_add(1, Ordering::SeqCst);
        let block = LocatedBlock {
            block: BlockId::new(id, 1, file.attrs.block_size),
            offset: start_pos.unwrap_or(0),
            locations: favored_nodes.iter().take(limit).cloned().collect(),
        };

        state.add_block_calls.push(AddBlockCall {
            path: path.to_string(),
            favored_nodes: favored_nodes.to_vec(),
            start_pos,
        });
        let file = state.files.get_mut(path).expect("checked above");
        file.blocks.push(block.clone());
        Ok(block)
    }
}

fn parent(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => "/",
        Some((prefix, _)) => prefix,
        None => "/",
    }
}

#[async_trait]
impl NamenodeRpc for FakeNamenode {
    async fn probe_features(&self) -> Result<NamenodeFeatures, RpcError> {
        Ok(self.features)
    }

    async fn get_file_info(&self, path: &str) -> Result<Option<FileAttrs>, RpcError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|f| f.attrs.clone()))
    }

    async fn get_listing(&self, path: &str) -> Result<Vec<FileAttrs>, RpcError> {
        let state = self.state.lock().unwrap();
        let mut children: Vec<FileAttrs> = state
            .files
            .values()
            .filter(|f| parent(&f.attrs.path) == path && f.attrs.path != path)
            .map(|f| f.attrs.clone())
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    async fn get_block_locations(
        &self,
        path: &str,
        _offset: u64,
        _length: u64,
    ) -> Result<LocatedBlocks, RpcError> {
        let state = self.state.lock().unwrap();
        let Some(file) = state.files.get(path) else {
            return Err(RpcError::remote(RemoteErrorKind::FileNotFound, path));
        };
        Ok(LocatedBlocks {
            file_length: file.attrs.length,
            blocks: file.blocks.clone(),
        })
    }

    async fn open_and_fetch_meta_info(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<(LocatedBlocks, NamespaceId), RpcError> {
        if !self.features.open_and_fetch_meta_info {
            return Err(RpcError::Unsupported("open_and_fetch_meta_info"));
        }
        let blocks = self.get_block_locations(path, offset, length).await?;
        Ok((blocks, self.namespace))
    }

    async fn create(
        &self,
        path: &str,
        permission: FilePermission,
        _client_name: &str,
        _overwrite: bool,
        _create_parent: bool,
        replication: u16,
        block_size: u64,
    ) -> Result<(), RpcError> {
        let mut state = self.state.lock().unwrap();
        state.created.push(path.to_string());
        state.files.insert(
            path.to_string(),
            FakeFile {
                attrs: FileAttrs {
                    path: path.to_string(),
                    length: 0,
                    is_dir: false,
                    replication,
                    block_size,
                    permission,
                },
                blocks: Vec::new(),
            },
        );
        Ok(())
    }

    async fn add_block(
        &self,
        path: &str,
        _client_name: &str,
        _excluded_nodes: &[DatanodeInfo],
        favored_nodes: &[DatanodeInfo],
    ) -> Result<LocatedBlock, RpcError> {
        self.allocate(path, favored_nodes, None)
    }

    async fn add_block_and_fetch_meta_info(
        &self,
        path: &str,
        _client_name: &str,
        _excluded_nodes: &[DatanodeInfo],
        favored_nodes: &[DatanodeInfo],
        start_pos: Option<u64>,
    ) -> Result<(LocatedBlock, NamespaceId), RpcError> {
        if !self.features.add_block_and_fetch_meta_info {
            return Err(RpcError::Unsupported("add_block_and_fetch_meta_info"));
        }
        let block = self.allocate(path, favored_nodes, start_pos)?;
        Ok((block, self.namespace))
    }

    async fn complete(&self, path: &str, _client_name: &str) -> Result<bool, RpcError> {
        {
            let mut state = self.state.lock().unwrap();
            *state.complete_calls.entry(path.to_string()).or_insert(0) += 1;
        }
        let mut defer = self.complete_defer.lock().unwrap();
        if let Some(remaining) = defer.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<bool, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push((path.to_string(), recursive));
        Ok(state.files.remove(path).is_some())
    }

    async fn renew_lease(&self, client_name: &str) -> Result<(), RpcError> {
        self.state
            .lock()
            .unwrap()
            .renewed
            .push(client_name.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), RpcError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake datanodes
// ---------------------------------------------------------------------------

/// How a fake datanode answers copy requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Copies succeed.
    None,
    /// The datanode reports a remote failure.
    Remote,
    /// The outbound call fails on the client side.
    Local,
}

pub struct FakeDatanode {
    pub name: String,
    pub failure: Mutex<FailureMode>,
    pub copies: Mutex<Vec<CopyBlockRequest>>,
    pub closed: AtomicBool,
}

impl FakeDatanode {
    pub fn copies(&self) -> Vec<CopyBlockRequest> {
        self.copies.lock().unwrap().clone()
    }

    pub fn set_failure(&self, mode: FailureMode) {
        *self.failure.lock().unwrap() = mode;
    }
}

#[async_trait]
impl DatanodeRpc for FakeDatanode {
    async fn copy_block(&self, request: CopyBlockRequest) -> Result<(), RpcError> {
        self.copies.lock().unwrap().push(request);
        match *self.failure.lock().unwrap() {
            FailureMode::None => Ok(()),
            FailureMode::Remote => Err(RpcError::remote(RemoteErrorKind::Other, "disk failure")),
            FailureMode::Local => Err(RpcError::Transport("connection reset".to_string())),
        }
    }

    async fn close(&self) -> Result<(), RpcError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out shared [`FakeDatanode`]s by name.
#[derive(Default)]
pub struct FakeConnector {
    datanodes: Mutex<HashMap<String, Arc<FakeDatanode>>>,
    pub connects: AtomicUsize,
    refuse: Mutex<HashSet<String>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get or create the datanode with this `host:port` name.
    pub fn datanode(&self, name: &str) -> Arc<FakeDatanode> {
        let mut datanodes = self.datanodes.lock().unwrap();
        datanodes
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(FakeDatanode {
                    name: name.to_string(),
                    failure: Mutex::new(FailureMode::None),
                    copies: Mutex::new(Vec::new()),
                    closed: AtomicBool::new(false),
                })
            })
            .clone()
    }

    /// Make `connect` fail for this node with a client-side error.
    pub fn refuse(&self, name: &str) {
        self.refuse.lock().unwrap().insert(name.to_string());
    }

    pub fn all_datanodes(&self) -> Vec<Arc<FakeDatanode>> {
        self.datanodes.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl DatanodeConnector for FakeConnector {
    async fn connect(&self, node: &DatanodeInfo) -> Result<Arc<dyn DatanodeRpc>, RpcError> {
        if self.refuse.lock().unwrap().contains(&node.name) {
            return Err(RpcError::Connect {
                endpoint: node.name.clone(),
                message: "connection refused".to_string(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.datanode(&node.name))
    }
}

// ---------------------------------------------------------------------------
// Cluster assembly
// ---------------------------------------------------------------------------

/// A namenode plus the datanode fleet it places blocks on.
pub struct TestCluster {
    pub namenode: Arc<FakeNamenode>,
    pub connector: Arc<FakeConnector>,
}

impl TestCluster {
    pub fn federated(namespace: NamespaceId) -> Self {
        Self {
            namenode: FakeNamenode::federated(namespace),
            connector: FakeConnector::new(),
        }
    }

    pub fn legacy() -> Self {
        Self {
            namenode: FakeNamenode::legacy(),
            connector: FakeConnector::new(),
        }
    }

    /// Build an engine copying within this cluster.
    pub async fn engine(&self) -> FastCopy {
        self.engine_with(test_config()).await
    }

    pub async fn engine_with(&self, config: FastCopyConfig) -> FastCopy {
        let namenode: Arc<dyn NamenodeRpc> = self.namenode.clone();
        FastCopy::new(config, namenode.clone(), namenode, self.connector.clone())
            .await
            .expect("engine construction failed")
    }
}

/// Build an engine copying between two clusters sharing one datanode fleet.
pub async fn engine_between(src: &TestCluster, dst: &TestCluster) -> Result<FastCopy, crate::CopyError> {
    let src_nn: Arc<dyn NamenodeRpc> = src.namenode.clone();
    let dst_nn: Arc<dyn NamenodeRpc> = dst.namenode.clone();
    FastCopy::new(test_config(), src_nn, dst_nn, src.connector.clone()).await
}
