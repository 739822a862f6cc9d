//! In-memory [`RecoveryStore`]. All three tables sit behind a single
//! `RwLock`, which is what makes `commit_recovery` atomic here.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::{RecoveryStore, RecoverySnapshot, StoreResult};
use crate::identity::{DidId, DidRecord, WatcherSet};

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<DidId, DidRecord>,
    committees: HashMap<DidId, WatcherSet>,
    completions: HashSet<(DidId, u64)>,
}

/// Volatile store for tests and simulation runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `(did, epoch)` pairs closed by a recovery.
    pub fn completed_recoveries(&self) -> usize {
        self.tables.read().completions.len()
    }
}

impl RecoveryStore for MemoryStore {
    fn get_record(&self, did: &DidId) -> StoreResult<Option<DidRecord>> {
        Ok(self.tables.read().records.get(did).cloned())
    }

    fn insert_record(&self, record: &DidRecord) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        if tables.records.contains_key(&record.did) {
            return Ok(false);
        }
        tables.records.insert(record.did, record.clone());
        Ok(true)
    }

    fn put_record(&self, record: &DidRecord) -> StoreResult<()> {
        self.tables.write().records.insert(record.did, record.clone());
        Ok(())
    }

    fn get_watcher_set(&self, did: &DidId) -> StoreResult<Option<WatcherSet>> {
        Ok(self.tables.read().committees.get(did).cloned())
    }

    fn put_watcher_set(&self, did: &DidId, set: &WatcherSet) -> StoreResult<()> {
        self.tables.write().committees.insert(*did, set.clone());
        Ok(())
    }

    fn is_recovery_completed(&self, did: &DidId, epoch: u64) -> StoreResult<bool> {
        Ok(self.tables.read().completions.contains(&(*did, epoch)))
    }

    fn commit_recovery(&self, record: &DidRecord, epoch: u64) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        if !tables.completions.insert((record.did, epoch)) {
            return Ok(false);
        }
        tables.records.insert(record.did, record.clone());
        Ok(true)
    }

    fn recovery_snapshot(&self, did: &DidId, epoch: u64) -> StoreResult<RecoverySnapshot> {
        let tables = self.tables.read();
        Ok(RecoverySnapshot {
            record: tables.records.get(did).cloned(),
            completed: tables.completions.contains(&(*did, epoch)),
        })
    }
}
