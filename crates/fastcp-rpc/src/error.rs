//! Error types for the RPC surface.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification of an error raised on the remote end of an RPC.
///
/// The copy engine only ever needs to distinguish a handful of remote
/// conditions; everything else is [`RemoteErrorKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    /// Block allocation refused because the previous block has not reached
    /// its minimum replication yet. Retryable.
    NotReplicatedYet,
    /// The path does not exist on the namenode.
    FileNotFound,
    /// The caller's write lease on the file has lapsed.
    LeaseExpired,
    /// Any other remote failure.
    Other,
}

/// Errors surfaced by the RPC surface.
///
/// The engine classifies failures by origin: a [`RpcError::Remote`] error
/// originated on the far end of the call, every other variant is a local
/// failure on the outbound side. Variants are `Clone` because the engine
/// stores the first fatal error of a copy job and surfaces it at several
/// suspension points.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    /// The remote end processed the call and reported a failure.
    #[error("remote error: {message}")]
    Remote {
        /// What the remote failure was.
        kind: RemoteErrorKind,
        /// Human-readable detail from the remote side.
        message: String,
    },

    /// Failed to establish a connection to an endpoint.
    #[error("failed to connect to {endpoint}: {message}")]
    Connect {
        /// The `host:port` we tried to reach.
        endpoint: String,
        /// Connection failure detail.
        message: String,
    },

    /// The transport failed mid-call (I/O error, connection reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// Encoding or decoding of a message failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The call did not complete within its deadline.
    #[error("rpc timed out after {0:?}")]
    TimedOut(Duration),

    /// The handle does not support the invoked method shape.
    #[error("method not supported by this namenode: {0}")]
    Unsupported(&'static str),
}

impl RpcError {
    /// Build a remote error.
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            kind,
            message: message.into(),
        }
    }

    /// Whether this error originated on the remote end of the call.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// The remote error classification, if this is a remote error.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this is the retryable not-replicated-yet allocation refusal.
    pub fn is_not_replicated_yet(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::NotReplicatedYet)
    }
}
