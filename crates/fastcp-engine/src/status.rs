//! Copy-progress bookkeeping shared between copy tasks and copy jobs.
//!
//! [`BlockStatusRegistry`] tracks each in-flight destination block until it
//! reaches a terminal verdict; [`FileProgress`] counts completed blocks per
//! destination file and wakes waiters on every change. The GOOD transition
//! of a block and the corresponding file-progress bump happen under the
//! registry locks so each fires at most once per block.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio::sync::futures::Notified;

use fastcp_types::{BlockId, FileCopyStatus};

/// Terminal verdict of one destination block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Enough replicas copied successfully.
    Good,
    /// Every replica copy failed.
    Bad,
}

/// Replica tally of one in-flight destination block.
#[derive(Debug)]
struct BlockTally {
    total_replicas: u16,
    good: u16,
    bad: u16,
}

/// Tracks every destination block currently being copied.
///
/// A block is registered when its replica fan-out is dispatched and removed
/// on the first terminal verdict; later outcomes for the same block are
/// no-ops. The registry is shared by all files of one engine instance.
pub struct BlockStatusRegistry {
    min_replication: u16,
    inner: Mutex<HashMap<BlockId, BlockTally>>,
}

impl BlockStatusRegistry {
    /// Create a registry with the given good-replica threshold.
    pub fn new(min_replication: u16) -> Self {
        Self {
            min_replication,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Start tracking a destination block with `total_replicas` pending
    /// replica copies.
    pub fn register(&self, block: BlockId, total_replicas: u16) {
        let mut inner = self.inner.lock().expect("block status lock poisoned");
        inner.insert(
            block,
            BlockTally {
                total_replicas,
                good: 0,
                bad: 0,
            },
        );
    }

    /// Record one replica outcome.
    ///
    /// Returns the terminal verdict if this outcome settled the block; the
    /// entry is removed in the same critical section, so a given verdict is
    /// returned exactly once. Outcomes for blocks no longer tracked return
    /// `None`.
    pub fn record(&self, block: &BlockId, good: bool) -> Option<Verdict> {
        let mut inner = self.inner.lock().expect("block status lock poisoned");
        let tally = inner.get_mut(block)?;

        if good {
            tally.good += 1;
            if tally.good >= self.min_replication {
                inner.remove(block);
                return Some(Verdict::Good);
            }
        } else {
            tally.bad += 1;
            if tally.bad >= tally.total_replicas {
                inner.remove(block);
                return Some(Verdict::Bad);
            }
        }
        None
    }

    /// Number of blocks still awaiting a verdict.
    pub fn tracked(&self) -> usize {
        self.inner.lock().expect("block status lock poisoned").len()
    }
}

/// Per-destination-file block-completion counters.
///
/// Entries are created lazily when the first block of a file completes and
/// live until engine teardown; this is the status-reporting surface.
#[derive(Default)]
pub struct FileProgress {
    inner: Mutex<HashMap<String, FileCopyStatus>>,
    changed: Notify,
}

impl FileProgress {
    /// Create an empty progress table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the status of a destination file, if any block completed yet.
    pub fn get(&self, file: &str) -> Option<FileCopyStatus> {
        self.inner
            .lock()
            .expect("file progress lock poisoned")
            .get(file)
            .cloned()
    }

    /// Completed-block count of a destination file (0 when untracked).
    pub fn blocks_done(&self, file: &str) -> usize {
        self.inner
            .lock()
            .expect("file progress lock poisoned")
            .get(file)
            .map(|s| s.blocks_done)
            .unwrap_or(0)
    }

    /// Count one more completed block for `file` and wake waiters.
    pub(crate) fn record_block_done(&self, file: &str, total_blocks: usize) {
        {
            let mut inner = self.inner.lock().expect("file progress lock poisoned");
            let status = inner
                .entry(file.to_string())
                .or_insert_with(|| FileCopyStatus::new(file, total_blocks));
            status.blocks_done += 1;
        }
        self.changed.notify_waiters();
    }

    /// Wake waiters without recording progress (used when a job's sticky
    /// error is set, so backpressure waits re-check it).
    pub(crate) fn nudge(&self) {
        self.changed.notify_waiters();
    }

    /// A future resolving on the next progress change. Call `enable()` on
    /// the pinned future before re-checking state to avoid lost wakeups.
    pub(crate) fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }
}
