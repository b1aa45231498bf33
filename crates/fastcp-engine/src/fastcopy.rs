//! [`FastCopy`] — the process-wide copy orchestrator.
//!
//! Owns the namenode handles, the shared registries and datanode cache, a
//! bounded pool of per-file copy jobs, and the background lease renewer.
//! Dropping a `FastCopy` without calling [`FastCopy::shutdown`] leaks RPC
//! connections; call it once all copies are done.

use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use fastcp_rpc::{DatanodeConnector, NamenodeFeatures, NamenodeRpc};
use fastcp_types::{CopyRequest, FastCopyConfig, FileCopyStatus};

use crate::cache::DatanodeCache;
use crate::error::CopyError;
use crate::job::FileCopyJob;
use crate::lease::LeaseRenewer;
use crate::quarantine::DatanodeErrorRegistry;
use crate::status::{BlockStatusRegistry, FileProgress};

/// Intra-cluster fast file copy.
///
/// Every replica of every source block is duplicated locally on the
/// datanode that already hosts it, steered by favored-nodes hints on block
/// allocation, so no block data crosses the top of the rack.
pub struct FastCopy {
    config: FastCopyConfig,
    client_name: String,
    src_namenode: Arc<dyn NamenodeRpc>,
    dst_namenode: Arc<dyn NamenodeRpc>,
    src_features: NamenodeFeatures,
    dst_features: NamenodeFeatures,
    pub(crate) block_status: Arc<BlockStatusRegistry>,
    pub(crate) progress: Arc<FileProgress>,
    pub(crate) datanode_errors: Arc<DatanodeErrorRegistry>,
    pub(crate) datanodes: Arc<DatanodeCache>,
    file_pool: Arc<Semaphore>,
    lease_renewer: Mutex<Option<LeaseRenewer>>,
}

impl FastCopy {
    /// Build an orchestrator against the given namenode handles.
    ///
    /// Pass the same `Arc` for `src_namenode` and `dst_namenode` when both
    /// URIs point at the same namenode; it is probed and closed only once.
    /// Probes each namenode's supported method shapes and starts the lease
    /// renewer.
    pub async fn new(
        config: FastCopyConfig,
        src_namenode: Arc<dyn NamenodeRpc>,
        dst_namenode: Arc<dyn NamenodeRpc>,
        connector: Arc<dyn DatanodeConnector>,
    ) -> Result<Self, CopyError> {
        // Per-instance randomness: the client name is the lease holder
        // identity, and two orchestrators in one process must not collide.
        let client_name = format!("FastCopy{}", rand::rng().random::<u32>());

        let src_features = src_namenode.probe_features().await?;
        let dst_features = if Arc::ptr_eq(&src_namenode, &dst_namenode) {
            src_features
        } else {
            dst_namenode.probe_features().await?
        };

        let lease_renewer = LeaseRenewer::spawn(
            dst_namenode.clone(),
            client_name.clone(),
            config.lease_renew_interval,
        );
        info!(client = %client_name, "fast copy client started");

        Ok(Self {
            client_name,
            src_namenode,
            dst_namenode,
            src_features,
            dst_features,
            block_status: Arc::new(BlockStatusRegistry::new(config.min_replication)),
            progress: Arc::new(FileProgress::new()),
            datanode_errors: Arc::new(DatanodeErrorRegistry::new(config.max_datanode_errors)),
            datanodes: Arc::new(DatanodeCache::new(connector)),
            file_pool: Arc::new(Semaphore::new(config.file_pool_size)),
            lease_renewer: Mutex::new(Some(lease_renewer)),
            config,
        })
    }

    /// The lease-holder identity of this instance.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Progress of the copy targeting `dst`, or `None` before its first
    /// block completes.
    pub fn status(&self, dst: &str) -> Option<FileCopyStatus> {
        self.progress.get(dst)
    }

    /// Copy one file.
    pub async fn copy(
        &self,
        src: impl Into<String>,
        dst: impl Into<String>,
    ) -> Result<(), CopyError> {
        let Ok(_permit) = self.file_pool.clone().acquire_owned().await else {
            return Err(CopyError::ShutDown);
        };
        self.job(CopyRequest::new(src, dst)).run().await
    }

    /// Copy a batch of files on the bounded file pool.
    ///
    /// Every request runs to completion regardless of its siblings; the
    /// per-request failures are aggregated into [`CopyError::Batch`].
    pub async fn copy_all(&self, requests: Vec<CopyRequest>) -> Result<(), CopyError> {
        let total = requests.len();
        let mut jobs = JoinSet::new();
        for request in requests {
            let pool = self.file_pool.clone();
            let job = self.job(request.clone());
            jobs.spawn(async move {
                let Ok(_permit) = pool.acquire_owned().await else {
                    return (request, Err(CopyError::ShutDown));
                };
                let result = job.run().await;
                (request, result)
            });
        }

        let mut failed = 0usize;
        let mut first: Option<CopyError> = None;
        while let Some(joined) = jobs.join_next().await {
            let error = match joined {
                Ok((_, Ok(()))) => continue,
                Ok((request, Err(e))) => {
                    warn!(src = %request.src, dst = %request.dst, error = %e, "copy request failed");
                    e
                }
                Err(e) => {
                    warn!(error = %e, "file copy task panicked");
                    CopyError::Internal(e.to_string())
                }
            };
            failed += 1;
            if first.is_none() {
                first = Some(error);
            }
        }

        match first {
            None => Ok(()),
            Some(first) => Err(CopyError::Batch {
                failed,
                total,
                first: Box::new(first),
            }),
        }
    }

    fn job(&self, request: CopyRequest) -> FileCopyJob {
        FileCopyJob {
            src: request.src,
            dst: request.dst,
            client_name: self.client_name.clone(),
            config: self.config.clone(),
            src_namenode: self.src_namenode.clone(),
            dst_namenode: self.dst_namenode.clone(),
            src_features: self.src_features,
            dst_features: self.dst_features,
            block_status: self.block_status.clone(),
            progress: self.progress.clone(),
            datanode_errors: self.datanode_errors.clone(),
            datanodes: self.datanodes.clone(),
        }
    }

    /// Tear down every RPC connection this instance created and stop the
    /// lease renewer. Must be called once copying is done; safe to call
    /// twice.
    pub async fn shutdown(&self) {
        let renewer = self
            .lease_renewer
            .lock()
            .expect("lease renewer slot poisoned")
            .take();
        if let Some(renewer) = renewer {
            renewer.stop().await;
        }

        if let Err(e) = self.src_namenode.close().await {
            warn!(error = %e, "failed to close source namenode connection");
        }
        if !Arc::ptr_eq(&self.src_namenode, &self.dst_namenode) {
            if let Err(e) = self.dst_namenode.close().await {
                warn!(error = %e, "failed to close destination namenode connection");
            }
        }

        self.datanodes.close_all().await;
        debug!(client = %self.client_name, "fast copy client shut down");
    }
}
