//! Shared pool of datanode RPC handles.
//!
//! Handles are built lazily on first use and live until engine teardown.
//! Lookup is two-phase: a cheap read under the lock, then a re-checked
//! insert so concurrent tasks racing for the same node end up sharing one
//! handle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use fastcp_rpc::{DatanodeConnector, DatanodeRpc, RpcError};
use fastcp_types::DatanodeInfo;

/// Cache of datanode handles keyed by `host:port` identity.
pub struct DatanodeCache {
    connector: Arc<dyn DatanodeConnector>,
    handles: Mutex<HashMap<String, Arc<dyn DatanodeRpc>>>,
}

impl DatanodeCache {
    /// Create an empty cache backed by `connector`.
    pub fn new(connector: Arc<dyn DatanodeConnector>) -> Self {
        Self {
            connector,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached handle for a datanode, connecting on a miss.
    pub async fn get(&self, node: &DatanodeInfo) -> Result<Arc<dyn DatanodeRpc>, RpcError> {
        // Fast path: every block copy goes through here, so keep the common
        // lookup short.
        {
            let handles = self.handles.lock().await;
            if let Some(handle) = handles.get(&node.name) {
                return Ok(handle.clone());
            }
        }

        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(&node.name) {
            return Ok(handle.clone());
        }

        debug!(node = %node, "opening new datanode connection");
        let handle = self.connector.connect(node).await?;
        handles.insert(node.name.clone(), handle.clone());
        Ok(handle)
    }

    /// Number of cached handles.
    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }

    /// Close every cached handle and clear the cache.
    pub async fn close_all(&self) {
        let handles: Vec<_> = {
            let mut map = self.handles.lock().await;
            map.drain().collect()
        };
        for (name, handle) in handles {
            if let Err(e) = handle.close().await {
                warn!(node = name, error = %e, "failed to close datanode connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use fastcp_rpc::CopyBlockRequest;

    struct NoopDatanode;

    #[async_trait]
    impl DatanodeRpc for NoopDatanode {
        async fn copy_block(&self, _request: CopyBlockRequest) -> Result<(), RpcError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), RpcError> {
            Ok(())
        }
    }

    struct CountingConnector {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl DatanodeConnector for CountingConnector {
        async fn connect(
            &self,
            _node: &DatanodeInfo,
        ) -> Result<Arc<dyn DatanodeRpc>, RpcError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NoopDatanode))
        }
    }

    #[tokio::test]
    async fn test_handle_reused_per_node() {
        let connector = Arc::new(CountingConnector {
            connects: AtomicUsize::new(0),
        });
        let cache = DatanodeCache::new(connector.clone());

        let node = DatanodeInfo::new("dn-a:50010");
        cache.get(&node).await.unwrap();
        cache.get(&node).await.unwrap();
        cache.get(&DatanodeInfo::new("dn-b:50010")).await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_close_all_empties_cache() {
        let connector = Arc::new(CountingConnector {
            connects: AtomicUsize::new(0),
        });
        let cache = DatanodeCache::new(connector);

        cache.get(&DatanodeInfo::new("dn-a:50010")).await.unwrap();
        cache.close_all().await;
        assert!(cache.is_empty().await);
    }
}
