//! Error types for the copy engine.

use std::time::Duration;

use fastcp_rpc::RpcError;

/// Errors that can occur while copying files.
///
/// `Clone` because a copy job stores its first fatal error in a shared slot
/// and surfaces it at every suspension point.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CopyError {
    /// An RPC against a namenode failed.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// The source path does not exist.
    #[error("file {0} does not exist")]
    SourceNotFound(String),

    /// Every replica copy of a block failed.
    #[error("all replicas are bad for block {0}")]
    AllReplicasBad(String),

    /// One side of the copy is federated and the other is not.
    #[error("fast copy is not allowed {0}")]
    FederationMismatch(&'static str),

    /// A bounded wait expired.
    #[error("timed out waiting for {what} after {waited:?}")]
    WaitTimeout {
        /// What was being waited for.
        what: &'static str,
        /// How long the wait was allowed to run.
        waited: Duration,
    },

    /// A source pattern matched nothing.
    #[error("path {0} is invalid: the pattern matched nothing")]
    EmptyGlob(String),

    /// Multiple sources were given but the destination is a file.
    #[error("path {0} is not a directory")]
    DestinationNotDirectory(String),

    /// Multiple sources were given but the destination does not exist.
    #[error("path {0} does not exist")]
    DestinationMissing(String),

    /// The orchestrator was shut down while work was pending.
    #[error("the copy engine is shut down")]
    ShutDown,

    /// A copy task died without reporting a result.
    #[error("internal error: {0}")]
    Internal(String),

    /// One or more requests of a batch failed.
    #[error("{failed} of {total} copies failed; first error: {first}")]
    Batch {
        /// How many requests failed.
        failed: usize,
        /// How many requests the batch held.
        total: usize,
        /// The first failure observed.
        first: Box<CopyError>,
    },
}
