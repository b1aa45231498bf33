//! The per-file copy pipeline.
//!
//! A [`FileCopyJob`] fetches the source block list, creates the destination
//! file, then walks the blocks in source order: allocate a destination block
//! with the source replica nodes as favored-nodes hints, fan the replica
//! copies out on a bounded pool, and wait for the file's completed-block
//! count to catch up before allocating the next block. Once every block is
//! dispatched the job drains the pool and polls the destination namenode
//! until the file commits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use fastcp_rpc::{NamenodeFeatures, NamenodeRpc};
use fastcp_types::{DatanodeInfo, FastCopyConfig, LocatedBlock, NamespaceId};

use crate::cache::DatanodeCache;
use crate::error::CopyError;
use crate::quarantine::DatanodeErrorRegistry;
use crate::status::{BlockStatusRegistry, FileProgress};
use crate::task::ReplicaCopy;

/// Allocation retries while the previous block is below minimum replication.
const ALLOCATE_RETRIES: u32 = 10;
const ALLOCATE_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Poll cadence of the commit loop.
const COMMIT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// State shared between a job and its replica-copy tasks.
pub(crate) struct JobShared {
    /// Destination path the tasks report progress against.
    pub(crate) dst: String,
    /// Total number of blocks in the source file.
    pub(crate) total_blocks: usize,
    pub(crate) block_status: Arc<BlockStatusRegistry>,
    pub(crate) progress: Arc<FileProgress>,
    pub(crate) datanode_errors: Arc<DatanodeErrorRegistry>,
    pub(crate) datanodes: Arc<DatanodeCache>,
    /// First fatal error of this job; checked at every suspension point.
    error: Mutex<Option<CopyError>>,
}

impl JobShared {
    /// Set the sticky error (first writer wins) and wake backpressure waits.
    pub(crate) fn fail(&self, e: CopyError) {
        {
            let mut slot = self.error.lock().expect("job error slot poisoned");
            if slot.is_none() {
                *slot = Some(e);
            }
        }
        self.progress.nudge();
    }

    /// Surface the sticky error, if one is set.
    pub(crate) fn check(&self) -> Result<(), CopyError> {
        match &*self.error.lock().expect("job error slot poisoned") {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// One source → destination file copy.
pub(crate) struct FileCopyJob {
    pub(crate) src: String,
    pub(crate) dst: String,
    pub(crate) client_name: String,
    pub(crate) config: FastCopyConfig,
    pub(crate) src_namenode: Arc<dyn NamenodeRpc>,
    pub(crate) dst_namenode: Arc<dyn NamenodeRpc>,
    pub(crate) src_features: NamenodeFeatures,
    pub(crate) dst_features: NamenodeFeatures,
    pub(crate) block_status: Arc<BlockStatusRegistry>,
    pub(crate) progress: Arc<FileProgress>,
    pub(crate) datanode_errors: Arc<DatanodeErrorRegistry>,
    pub(crate) datanodes: Arc<DatanodeCache>,
}

impl FileCopyJob {
    pub(crate) async fn run(self) -> Result<(), CopyError> {
        let attrs = self
            .src_namenode
            .get_file_info(&self.src)
            .await?
            .ok_or_else(|| CopyError::SourceNotFound(self.src.clone()))?;

        // Create the destination first so the lease is ours for the whole
        // copy; from here on any failure must clean it up.
        self.dst_namenode
            .create(
                &self.dst,
                attrs.permission,
                &self.client_name,
                true,
                true,
                attrs.replication,
                attrs.block_size,
            )
            .await?;

        match self.copy_blocks().await {
            Ok(()) => {
                info!(src = %self.src, dst = %self.dst, "fast copy succeeded");
                Ok(())
            }
            Err(e) => {
                error!(src = %self.src, dst = %self.dst, error = %e, "fast copy failed");
                if let Err(del) = self.dst_namenode.delete(&self.dst, false).await {
                    warn!(dst = %self.dst, error = %del, "failed to remove partial destination");
                }
                Err(e)
            }
        }
    }

    async fn copy_blocks(&self) -> Result<(), CopyError> {
        let (located, src_namespace) = if self.src_features.open_and_fetch_meta_info {
            let (blocks, namespace) = self
                .src_namenode
                .open_and_fetch_meta_info(&self.src, 0, u64::MAX)
                .await?;
            (blocks, Some(namespace))
        } else {
            let blocks = self
                .src_namenode
                .get_block_locations(&self.src, 0, u64::MAX)
                .await?;
            (blocks, None)
        };
        debug!(src = %self.src, blocks = located.blocks.len(), "block locations retrieved");

        let shared = Arc::new(JobShared {
            dst: self.dst.clone(),
            total_blocks: located.blocks.len(),
            block_status: self.block_status.clone(),
            progress: self.progress.clone(),
            datanode_errors: self.datanode_errors.clone(),
            datanodes: self.datanodes.clone(),
            error: Mutex::new(None),
        });
        let pool = Arc::new(Semaphore::new(self.config.block_pool_size));
        let mut tasks = JoinSet::new();

        let mut blocks_added = 0usize;
        let mut start_pos = 0u64;
        for src_block in &located.blocks {
            // The source replica nodes are the favored-nodes hint: this is
            // what steers each destination replica onto a datanode that
            // already holds the source replica.
            let (dst_block, dst_namespace) = self
                .allocate_block(src_namespace.is_some(), &src_block.locations, start_pos)
                .await?;
            blocks_added += 1;
            start_pos += src_block.block.num_bytes;
            debug!(block = %dst_block.block, dst = %self.dst, "block added to destination");

            self.fan_out(
                &mut tasks,
                &pool,
                &shared,
                src_block,
                &dst_block,
                src_namespace,
                dst_namespace,
            );

            self.wait_for_block_copy(&shared, blocks_added).await?;
        }

        self.drain(tasks).await?;
        shared.check()?;
        self.commit(&shared).await
    }

    /// Allocate the next destination block, negotiating among the three
    /// shapes of the allocate RPC. Mixing a federated and a non-federated
    /// side is rejected before any RPC is issued.
    async fn allocate_block(
        &self,
        federated: bool,
        favored_nodes: &[DatanodeInfo],
        start_pos: u64,
    ) -> Result<(LocatedBlock, Option<NamespaceId>), CopyError> {
        let mut retries = 0u32;
        loop {
            let attempt = if self.dst_features.add_block_with_start_pos {
                if !federated {
                    return Err(CopyError::FederationMismatch(
                        "from a non-federated cluster to a federated cluster",
                    ));
                }
                self.dst_namenode
                    .add_block_and_fetch_meta_info(
                        &self.dst,
                        &self.client_name,
                        &[],
                        favored_nodes,
                        Some(start_pos),
                    )
                    .await
                    .map(|(block, namespace)| (block, Some(namespace)))
            } else if self.dst_features.add_block_and_fetch_meta_info {
                if !federated {
                    return Err(CopyError::FederationMismatch(
                        "from a non-federated cluster to a federated cluster",
                    ));
                }
                self.dst_namenode
                    .add_block_and_fetch_meta_info(
                        &self.dst,
                        &self.client_name,
                        &[],
                        favored_nodes,
                        None,
                    )
                    .await
                    .map(|(block, namespace)| (block, Some(namespace)))
            } else {
                if federated {
                    return Err(CopyError::FederationMismatch(
                        "from a federated cluster to a non-federated cluster",
                    ));
                }
                self.dst_namenode
                    .add_block(&self.dst, &self.client_name, &[], favored_nodes)
                    .await
                    .map(|block| (block, None))
            };

            match attempt {
                Ok(allocated) => return Ok(allocated),
                Err(e) if e.is_not_replicated_yet() && retries < ALLOCATE_RETRIES => {
                    retries += 1;
                    debug!(
                        dst = %self.dst,
                        retries,
                        "previous block not replicated yet, backing off"
                    );
                    tokio::time::sleep(ALLOCATE_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Pair source and destination replicas and submit one copy task each.
    #[allow(clippy::too_many_arguments)]
    fn fan_out(
        &self,
        tasks: &mut JoinSet<()>,
        pool: &Arc<Semaphore>,
        shared: &Arc<JobShared>,
        src: &LocatedBlock,
        dst: &LocatedBlock,
        src_namespace: Option<NamespaceId>,
        dst_namespace: Option<NamespaceId>,
    ) {
        // Sort both sides so the pairing does not depend on the order the
        // namenodes returned the locations in.
        let mut src_locs = src.locations.clone();
        let mut dst_locs = dst.locations.clone();
        src_locs.sort();
        dst_locs.sort();

        // The namenode can handle surplus locations on either side; only
        // the pairs we match up are copied by this tool.
        let replicas = src_locs.len().min(dst_locs.len());
        if replicas == 0 {
            shared.fail(CopyError::AllReplicasBad(dst.block.block_name()));
            return;
        }
        shared.block_status.register(dst.block, replicas as u16);

        for (src_node, dst_node) in src_locs.into_iter().zip(dst_locs) {
            let task = ReplicaCopy {
                src_namespace,
                src_block: src.block,
                dst_namespace,
                dst_block: dst.block,
                src_node,
                dst_node,
            };
            let pool = pool.clone();
            let shared = shared.clone();
            tasks.spawn(async move {
                let Ok(_permit) = pool.acquire_owned().await else {
                    return;
                };
                task.run(shared).await;
            });
        }
    }

    /// Wait until every block allocated so far has completed, surfacing the
    /// job's sticky error as soon as it is set.
    async fn wait_for_block_copy(
        &self,
        shared: &JobShared,
        blocks_added: usize,
    ) -> Result<(), CopyError> {
        if blocks_added == 0 {
            return Ok(());
        }
        loop {
            let notified = shared.progress.changed();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if shared.progress.blocks_done(&self.dst) == blocks_added {
                return Ok(());
            }
            shared.check()?;
            notified.await;
        }
    }

    /// Wait for the per-file pool to finish its outstanding copies.
    async fn drain(&self, mut tasks: JoinSet<()>) -> Result<(), CopyError> {
        let waited = self.config.file_wait_time;
        let drained = tokio::time::timeout(waited, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "replica copy task panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            tasks.abort_all();
            return Err(CopyError::WaitTimeout {
                what: "in-flight block copies",
                waited,
            });
        }
        Ok(())
    }

    /// Poll `complete` until the namenode accepts the file.
    async fn commit(&self, shared: &JobShared) -> Result<(), CopyError> {
        let waited = self.config.file_wait_time;
        let start = Instant::now();

        while !self
            .dst_namenode
            .complete(&self.dst, &self.client_name)
            .await?
        {
            shared.check()?;
            debug!(dst = %self.dst, "waiting for destination blocks to reach minimum replication");
            if start.elapsed() >= waited {
                return Err(CopyError::WaitTimeout {
                    what: "file commit",
                    waited,
                });
            }
            tokio::time::sleep(COMMIT_POLL_INTERVAL).await;
        }
        Ok(())
    }
}
