//! Datanode client over the fastcp wire protocol.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use fastcp_rpc::{CopyBlockRequest, DatanodeConnector, DatanodeRpc, RpcError};
use fastcp_types::DatanodeInfo;

use crate::message::{DatanodeRequest, DatanodeResponse};
use crate::transport::Connection;

/// Write timeout for the copy-block RPC: 8 minutes, comfortably above the
/// datanode's own pending-replication monitor timeout.
pub const DEFAULT_DATANODE_TIMEOUT: Duration = Duration::from_secs(8 * 60);

/// A datanode RPC handle over one persistent TCP connection.
pub struct IpcDatanode {
    endpoint: String,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
    closed: AtomicBool,
}

impl IpcDatanode {
    /// Dial a datanode at `host:port`.
    pub async fn connect(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RpcError> {
        let endpoint = endpoint.into();
        let conn = Connection::connect(&endpoint).await?;
        Ok(Self {
            endpoint,
            timeout,
            conn: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
        })
    }

    async fn call(&self, request: DatanodeRequest) -> Result<DatanodeResponse, RpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Transport("datanode handle is closed".to_string()));
        }

        let mut slot = self.conn.lock().await;
        let conn = match slot.as_mut() {
            Some(conn) => conn,
            None => slot.insert(Connection::connect(&self.endpoint).await?),
        };

        let result = tokio::time::timeout(
            self.timeout,
            conn.call::<_, DatanodeResponse>(&request),
        )
        .await;

        match result {
            Ok(Ok(DatanodeResponse::Error { kind, message })) => {
                Err(RpcError::Remote { kind, message })
            }
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                debug!(endpoint = %self.endpoint, error = %e, "dropping broken datanode connection");
                *slot = None;
                Err(e)
            }
            Err(_) => {
                // A response may still arrive on the old stream; it must not
                // be mistaken for the reply to a later request.
                *slot = None;
                Err(RpcError::TimedOut(self.timeout))
            }
        }
    }
}

#[async_trait]
impl DatanodeRpc for IpcDatanode {
    async fn copy_block(&self, request: CopyBlockRequest) -> Result<(), RpcError> {
        let wire = DatanodeRequest::CopyBlock {
            src_namespace: request.src_namespace,
            src_block: request.src_block,
            dst_namespace: request.dst_namespace,
            dst_block: request.dst_block,
            target: request.target,
        };
        match self.call(wire).await? {
            DatanodeResponse::Copied => Ok(()),
            other => Err(RpcError::Codec(format!(
                "unexpected datanode response: {other:?}"
            ))),
        }
    }

    async fn close(&self) -> Result<(), RpcError> {
        self.closed.store(true, Ordering::Release);
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.take() {
            debug!(endpoint = conn.endpoint(), "closed datanode connection");
        }
        Ok(())
    }
}

/// Connector producing [`IpcDatanode`] handles from a datanode's
/// `host:port` identity.
pub struct IpcDatanodeConnector {
    timeout: Duration,
}

impl IpcDatanodeConnector {
    /// Create a connector with the given copy-block timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for IpcDatanodeConnector {
    fn default() -> Self {
        Self::new(DEFAULT_DATANODE_TIMEOUT)
    }
}

#[async_trait]
impl DatanodeConnector for IpcDatanodeConnector {
    async fn connect(&self, node: &DatanodeInfo) -> Result<Arc<dyn DatanodeRpc>, RpcError> {
        let handle = IpcDatanode::connect(node.name.clone(), self.timeout).await?;
        Ok(Arc::new(handle))
    }
}
