//! Background renewal of the client's write lease.
//!
//! The destination namenode holds a write lease per (client, file); it must
//! be refreshed for as long as copies are in flight. Renewal failures are
//! swallowed; if the lease truly lapses the next namenode RPC surfaces it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fastcp_rpc::NamenodeRpc;

/// Handle to the background lease-renewal task.
pub(crate) struct LeaseRenewer {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LeaseRenewer {
    /// Spawn the renewal loop against the destination namenode.
    pub(crate) fn spawn(
        namenode: Arc<dyn NamenodeRpc>,
        client_name: String,
        interval: Duration,
    ) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = namenode.renew_lease(&client_name).await {
                            warn!(client = %client_name, error = %e, "lease renewal failed");
                        }
                    }
                    _ = stopped.changed() => {
                        debug!(client = %client_name, "lease renewer stopped");
                        return;
                    }
                }
            }
        });
        Self { shutdown, task }
    }

    /// Stop the loop and wait for it to exit.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
