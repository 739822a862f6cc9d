//! # Watcher Committees
//!
//! A [`WatcherSet`] is the committee allowed to recover one DID during one
//! epoch. With fault bound `f`:
//!
//! | quantity          | value   |
//! |-------------------|---------|
//! | minimum committee | `3f+1`  |
//! | threshold         | `2f+1`  |
//!
//! Any two `2f+1` quorums out of `3f+1` members overlap in at least `f+1`
//! members, so at least one honest watcher sits in both. That is the whole
//! safety argument; everything else is bookkeeping.
//!
//! The set keeps the watchers in submission order (that's what `query`
//! hands back) alongside a hash index for O(1) membership checks. Only the
//! ordered list is persisted; the index is rebuilt on load.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::handle::Identity;

/// `3f+1`, or `None` if it doesn't fit.
pub fn minimum_committee_size(fault_tolerance: u32) -> Option<u32> {
    fault_tolerance.checked_mul(3)?.checked_add(1)
}

/// `2f+1`, or `None` if it doesn't fit.
pub fn quorum_threshold(fault_tolerance: u32) -> Option<u32> {
    fault_tolerance.checked_mul(2)?.checked_add(1)
}

/// The committee of one DID at one epoch.
///
/// The default value is the "unconfigured" state: epoch 0, no watchers,
/// threshold 0. Real committees always have epoch >= 1.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "StoredWatcherSet", into = "StoredWatcherSet")]
pub struct WatcherSet {
    watchers: Vec<Identity>,
    index: HashSet<Identity>,
    threshold: u32,
    fault_tolerance: u32,
    epoch: u64,
}

/// On-disk shape: the ordered list only.
#[derive(Serialize, Deserialize)]
struct StoredWatcherSet {
    watchers: Vec<Identity>,
    threshold: u32,
    fault_tolerance: u32,
    epoch: u64,
}

impl From<StoredWatcherSet> for WatcherSet {
    fn from(stored: StoredWatcherSet) -> Self {
        let index = stored.watchers.iter().copied().collect();
        Self {
            watchers: stored.watchers,
            index,
            threshold: stored.threshold,
            fault_tolerance: stored.fault_tolerance,
            epoch: stored.epoch,
        }
    }
}

impl From<WatcherSet> for StoredWatcherSet {
    fn from(set: WatcherSet) -> Self {
        Self {
            watchers: set.watchers,
            threshold: set.threshold,
            fault_tolerance: set.fault_tolerance,
            epoch: set.epoch,
        }
    }
}

impl WatcherSet {
    /// Build a committee at `epoch` with `threshold = 2f+1`.
    ///
    /// No validation happens here: size and uniqueness are checked by the
    /// watcher set manager before it ever calls this. Returns `None` only
    /// when `2f+1` overflows.
    pub fn new(watchers: Vec<Identity>, fault_tolerance: u32, epoch: u64) -> Option<Self> {
        let threshold = quorum_threshold(fault_tolerance)?;
        let index = watchers.iter().copied().collect();
        Some(Self {
            watchers,
            index,
            threshold,
            fault_tolerance,
            epoch,
        })
    }

    pub fn watchers(&self) -> &[Identity] {
        &self.watchers
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn fault_tolerance(&self) -> u32 {
        self.fault_tolerance
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Epoch 0 means nobody ever configured a committee for this DID.
    pub fn is_configured(&self) -> bool {
        self.epoch > 0
    }

    /// O(1) membership test.
    pub fn is_watcher(&self, identity: &Identity) -> bool {
        self.index.contains(identity)
    }
}
