//! # Storage Module
//!
//! The registry never touches a global map. Everything it persists goes
//! through the [`RecoveryStore`] trait, which is handed to the recovery
//! authority at construction time.
//!
//! ## What gets stored
//!
//! ```text
//! records      did            -> DidRecord
//! committees   did            -> WatcherSet
//! completions  (did, epoch)   -> ()          monotonic: never removed
//! ```
//!
//! ## Backends
//!
//! - [`MemoryStore`] — hash maps behind one `parking_lot::RwLock`. Tests and
//!   simulations.
//! - [`SledStore`] — sled trees with bincode values. Survives restarts.
//!
//! ## Atomicity
//!
//! [`RecoveryStore::commit_recovery`] writes the recovered record *and* the
//! completion marker as one unit. A reader never sees a new controller
//! without the epoch closed, or the epoch closed without the new controller.
//! The call also refuses to run twice for the same `(did, epoch)`, so even two
//! registries sharing one store can't double-commit.

pub mod db;
pub mod memory;

pub use db::SledStore;
pub use memory::MemoryStore;

use crate::identity::{DidId, DidRecord, WatcherSet};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt entry in {tree}: {detail}")]
    Corrupt { tree: &'static str, detail: String },
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A consistent read of a DID record and its completion flag for one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySnapshot {
    pub record: Option<DidRecord>,
    pub completed: bool,
}

/// Persistence for DID records, committees and recovery completions.
///
/// Implementations must be safe to share across threads. Callers serialise
/// mutations per DID themselves; the store only guarantees that each single
/// call is atomic.
pub trait RecoveryStore: Send + Sync {
    fn get_record(&self, did: &DidId) -> StoreResult<Option<DidRecord>>;

    /// Create-if-absent. Returns `false` (and writes nothing) if a record for
    /// the same DID already exists.
    fn insert_record(&self, record: &DidRecord) -> StoreResult<bool>;

    /// Overwrite an existing record.
    fn put_record(&self, record: &DidRecord) -> StoreResult<()>;

    fn get_watcher_set(&self, did: &DidId) -> StoreResult<Option<WatcherSet>>;

    fn put_watcher_set(&self, did: &DidId, set: &WatcherSet) -> StoreResult<()>;

    fn is_recovery_completed(&self, did: &DidId, epoch: u64) -> StoreResult<bool>;

    /// Write `record` and mark `(record.did, epoch)` completed, atomically.
    ///
    /// Returns `false` and writes nothing if the epoch was already completed.
    fn commit_recovery(&self, record: &DidRecord, epoch: u64) -> StoreResult<bool>;

    /// Read the record and the completion flag for `epoch` in one go.
    fn recovery_snapshot(&self, did: &DidId, epoch: u64) -> StoreResult<RecoverySnapshot>;

    /// Make prior writes durable. A no-op for volatile stores.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Shared behaviour checks, run against every backend.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::identity::{DocRef, Identity};
    use chrono::Utc;

    fn record(tag: u8) -> DidRecord {
        DidRecord::new(
            DidId::from_bytes([tag; 32]),
            Identity::from_bytes([tag.wrapping_add(1); 32]),
            DocRef::from_bytes([tag.wrapping_add(2); 32]),
            Utc::now(),
        )
    }

    pub fn insert_is_create_if_absent<S: RecoveryStore>(store: &S) {
        let r = record(1);
        assert!(store.insert_record(&r).unwrap());
        let mut other = r.clone();
        other.controller = Identity::from_bytes([0xee; 32]);
        assert!(!store.insert_record(&other).unwrap());
        assert_eq!(store.get_record(&r.did).unwrap(), Some(r));
    }

    pub fn missing_entries_are_none<S: RecoveryStore>(store: &S) {
        let did = DidId::from_bytes([0x77; 32]);
        assert_eq!(store.get_record(&did).unwrap(), None);
        assert_eq!(store.get_watcher_set(&did).unwrap(), None);
        assert!(!store.is_recovery_completed(&did, 1).unwrap());
        let snap = store.recovery_snapshot(&did, 1).unwrap();
        assert_eq!(snap.record, None);
        assert!(!snap.completed);
    }

    pub fn watcher_sets_replace<S: RecoveryStore>(store: &S) {
        let did = DidId::from_bytes([3; 32]);
        let first = WatcherSet::new(
            (1..=4).map(|i| Identity::from_bytes([i; 32])).collect(),
            1,
            1,
        )
        .unwrap();
        let second = WatcherSet::new(
            (10..=16).map(|i| Identity::from_bytes([i; 32])).collect(),
            2,
            2,
        )
        .unwrap();
        store.put_watcher_set(&did, &first).unwrap();
        store.put_watcher_set(&did, &second).unwrap();
        let loaded = store.get_watcher_set(&did).unwrap().unwrap();
        assert_eq!(loaded, second);
        assert!(!loaded.is_watcher(&Identity::from_bytes([1; 32])));
        assert!(loaded.is_watcher(&Identity::from_bytes([16; 32])));
    }

    pub fn commit_is_once_per_epoch<S: RecoveryStore>(store: &S) {
        let r = record(5);
        store.insert_record(&r).unwrap();

        let recovered = r
            .recovered(Identity::from_bytes([0xaa; 32]), DocRef::ZERO, Utc::now())
            .unwrap();
        assert!(store.commit_recovery(&recovered, 1).unwrap());
        assert!(store.is_recovery_completed(&r.did, 1).unwrap());
        assert!(!store.is_recovery_completed(&r.did, 2).unwrap());

        // Second commit at the same epoch is refused and writes nothing.
        let again = recovered
            .recovered(Identity::from_bytes([0xbb; 32]), DocRef::ZERO, Utc::now())
            .unwrap();
        assert!(!store.commit_recovery(&again, 1).unwrap());

        let snap = store.recovery_snapshot(&r.did, 1).unwrap();
        assert!(snap.completed);
        assert_eq!(snap.record, Some(recovered));

        // A later epoch is still open.
        assert!(store.commit_recovery(&again, 2).unwrap());
        assert_eq!(store.get_record(&r.did).unwrap(), Some(again));
    }
}
