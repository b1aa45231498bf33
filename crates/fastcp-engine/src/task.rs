//! One replica-copy RPC with outcome accounting.

use std::sync::Arc;

use tracing::{debug, warn};

use fastcp_rpc::{CopyBlockRequest, RpcError};
use fastcp_types::{BlockId, DatanodeInfo, NamespaceId};

use crate::error::CopyError;
use crate::job::JobShared;
use crate::status::Verdict;

/// Copies one replica of a block: a single RPC to the source datanode
/// instructing it to duplicate the block onto the destination datanode.
///
/// There is no per-replica retry; redundancy comes from the sibling
/// replicas of the same block.
pub(crate) struct ReplicaCopy {
    pub(crate) src_namespace: Option<NamespaceId>,
    pub(crate) src_block: BlockId,
    pub(crate) dst_namespace: Option<NamespaceId>,
    pub(crate) dst_block: BlockId,
    pub(crate) src_node: DatanodeInfo,
    pub(crate) dst_node: DatanodeInfo,
}

impl ReplicaCopy {
    pub(crate) async fn run(self, shared: Arc<JobShared>) {
        // Quarantine gate: do not contact a node that has already failed
        // too often. The skip still counts as a bad replica so the block
        // is guaranteed to reach a verdict.
        let src_quarantined = shared.datanode_errors.over_limit(&self.src_node);
        if src_quarantined || shared.datanode_errors.over_limit(&self.dst_node) {
            let bad = if src_quarantined {
                &self.src_node
            } else {
                &self.dst_node
            };
            warn!(
                node = %bad,
                src = %self.src_block,
                dst = %self.dst_block,
                "datanode is over the error limit, aborting replica copy"
            );
            self.finish(&shared, false);
            return;
        }

        let outcome = self.copy(&shared).await;
        let good = match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    src = %self.src_block,
                    dst = %self.dst_block,
                    datanode = %self.dst_node.hostname,
                    error = %e,
                    "failed to copy block replica"
                );
                // A remote error originated on the destination datanode;
                // anything else failed on the outbound side of the call to
                // the source datanode.
                if e.is_remote() {
                    shared.datanode_errors.record(&self.dst_node);
                } else {
                    shared.datanode_errors.record(&self.src_node);
                }
                false
            }
        };
        self.finish(&shared, good);
    }

    async fn copy(&self, shared: &JobShared) -> Result<(), RpcError> {
        let datanode = shared.datanodes.get(&self.src_node).await?;
        debug!(
            src = %self.src_block,
            dst = %self.dst_block,
            datanode = %self.dst_node.hostname,
            "copying block replica"
        );
        // Blocking call: returns only once the destination datanode holds
        // the replica.
        datanode
            .copy_block(CopyBlockRequest {
                src_namespace: self.src_namespace,
                src_block: self.src_block,
                dst_namespace: self.dst_namespace,
                dst_block: self.dst_block,
                target: self.dst_node.clone(),
            })
            .await
    }

    fn finish(&self, shared: &JobShared, good: bool) {
        match shared.block_status.record(&self.dst_block, good) {
            Some(Verdict::Good) => {
                shared
                    .progress
                    .record_block_done(&shared.dst, shared.total_blocks);
            }
            Some(Verdict::Bad) => {
                shared.fail(CopyError::AllReplicasBad(self.dst_block.block_name()));
            }
            None => {}
        }
    }
}
