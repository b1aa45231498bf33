//! Per-datanode error accounting.
//!
//! Every failed replica copy is charged to one datanode: the destination
//! for remote errors, the source otherwise. Once a node accrues more than
//! the configured limit, copy tasks stop issuing RPCs that involve it.
//! Counts are process-wide for the life of the engine and never decay.

use std::collections::HashMap;
use std::sync::Mutex;

use fastcp_types::DatanodeInfo;

/// Monotone per-datanode error counter with a quarantine threshold.
pub struct DatanodeErrorRegistry {
    max_errors: u64,
    errors: Mutex<HashMap<String, u64>>,
}

impl DatanodeErrorRegistry {
    /// Create a registry that quarantines nodes beyond `max_errors`.
    pub fn new(max_errors: u64) -> Self {
        Self {
            max_errors,
            errors: Mutex::new(HashMap::new()),
        }
    }

    /// Charge one error to a datanode, returning its new count.
    pub fn record(&self, node: &DatanodeInfo) -> u64 {
        let mut errors = self.errors.lock().expect("datanode errors lock poisoned");
        let count = errors.entry(node.name.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Current error count of a datanode.
    pub fn count(&self, node: &DatanodeInfo) -> u64 {
        self.errors
            .lock()
            .expect("datanode errors lock poisoned")
            .get(&node.name)
            .copied()
            .unwrap_or(0)
    }

    /// Whether a datanode has accrued more errors than the limit.
    pub fn over_limit(&self, node: &DatanodeInfo) -> bool {
        self.count(node) > self.max_errors
    }
}
