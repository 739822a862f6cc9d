//! # Watcher Set Manager
//!
//! Owns the per-DID committee. Configuration is all-or-nothing: the new
//! watcher list fully replaces the old one, the threshold becomes `2f+1`,
//! and the epoch moves forward by exactly one. Every proposal that targeted
//! the previous epoch is dead from that moment on; no revocation needed.
//!
//! ## Validation order
//!
//! 1. DID exists, is active, and the caller is its controller.
//! 2. `3f+1` is representable.
//! 3. At least `3f+1` watchers.
//! 4. No more than the configured maximum.
//! 5. No watcher listed twice (the first repeat is reported).

use std::collections::HashSet;

use bftdid_protocol::identity::{minimum_committee_size, DidId, Identity, WatcherSet};
use bftdid_protocol::storage::RecoveryStore;

use crate::did_registry::DidRegistry;
use crate::error::{RegistryError, RegistryResult};

/// Committee configuration and lookup over an injected store.
pub struct WatcherSetManager<'s, S: ?Sized> {
    store: &'s S,
    max_committee_size: usize,
}

impl<'s, S: RecoveryStore + ?Sized> WatcherSetManager<'s, S> {
    pub fn new(store: &'s S, max_committee_size: usize) -> Self {
        Self {
            store,
            max_committee_size,
        }
    }

    /// Replace the committee of `did`. Returns the new committee.
    pub fn configure(
        &self,
        did: &DidId,
        caller: &Identity,
        watchers: Vec<Identity>,
        fault_tolerance: u32,
    ) -> RegistryResult<WatcherSet> {
        DidRegistry::new(self.store).authorize(did, caller)?;

        let required = minimum_committee_size(fault_tolerance)
            .ok_or(RegistryError::FaultBoundOverflow(fault_tolerance))?
            as usize;
        if watchers.len() < required {
            return Err(RegistryError::InsufficientCommittee {
                size: watchers.len(),
                required,
            });
        }
        if watchers.len() > self.max_committee_size {
            return Err(RegistryError::CommitteeTooLarge {
                size: watchers.len(),
                max: self.max_committee_size,
            });
        }
        let mut seen = HashSet::with_capacity(watchers.len());
        if let Some(dup) = watchers.iter().find(|w| !seen.insert(**w)) {
            return Err(RegistryError::DuplicateWatcher(*dup));
        }

        let epoch = self
            .query(did)?
            .epoch()
            .checked_add(1)
            .ok_or(RegistryError::CounterOverflow("watcher set epoch"))?;
        let committee = WatcherSet::new(watchers, fault_tolerance, epoch)
            .ok_or(RegistryError::FaultBoundOverflow(fault_tolerance))?;
        self.store.put_watcher_set(did, &committee)?;
        Ok(committee)
    }

    /// The current committee, or the unconfigured default (epoch 0, no
    /// watchers, threshold 0). Only a storage failure makes this fail.
    pub fn query(&self, did: &DidId) -> RegistryResult<WatcherSet> {
        Ok(self.store.get_watcher_set(did)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bftdid_protocol::identity::DocRef;
    use bftdid_protocol::storage::MemoryStore;
    use chrono::Utc;

    const DID: DidId = DidId::from_bytes([1; 32]);
    const ALICE: Identity = Identity::from_bytes([2; 32]);

    fn watchers(n: u8) -> Vec<Identity> {
        (0..n).map(|i| Identity::from_bytes([0x80 + i; 32])).collect()
    }

    fn setup() -> MemoryStore {
        let store = MemoryStore::new();
        DidRegistry::new(&store)
            .create(DID, ALICE, DocRef::ZERO, Utc::now())
            .unwrap();
        store
    }

    #[test]
    fn configure_sets_threshold_and_bumps_epoch() {
        let store = setup();
        let manager = WatcherSetManager::new(&store, 64);

        let first = manager.configure(&DID, &ALICE, watchers(4), 1).unwrap();
        assert_eq!((first.epoch(), first.threshold()), (1, 3));

        let second = manager.configure(&DID, &ALICE, watchers(7), 2).unwrap();
        assert_eq!((second.epoch(), second.threshold()), (2, 5));
        assert_eq!(manager.query(&DID).unwrap(), second);
    }

    #[test]
    fn unconfigured_query_is_empty() {
        let store = setup();
        let manager = WatcherSetManager::new(&store, 64);
        let set = manager.query(&DidId::from_bytes([9; 32])).unwrap();
        assert_eq!(set.epoch(), 0);
        assert_eq!(set.threshold(), 0);
        assert!(set.watchers().is_empty());
    }

    #[test]
    fn committee_too_small() {
        let store = setup();
        let manager = WatcherSetManager::new(&store, 64);
        assert_eq!(
            manager.configure(&DID, &ALICE, watchers(6), 2),
            Err(RegistryError::InsufficientCommittee {
                size: 6,
                required: 7
            })
        );
        // Nothing changed.
        assert_eq!(manager.query(&DID).unwrap().epoch(), 0);
    }

    #[test]
    fn committee_too_large() {
        let store = setup();
        let manager = WatcherSetManager::new(&store, 5);
        assert_eq!(
            manager.configure(&DID, &ALICE, watchers(6), 1),
            Err(RegistryError::CommitteeTooLarge { size: 6, max: 5 })
        );
    }

    #[test]
    fn first_duplicate_reported() {
        let store = setup();
        let manager = WatcherSetManager::new(&store, 64);
        let mut list = watchers(5);
        list.push(list[3]);
        list.push(list[1]);
        assert_eq!(
            manager.configure(&DID, &ALICE, list.clone(), 1),
            Err(RegistryError::DuplicateWatcher(list[3]))
        );
    }

    #[test]
    fn huge_fault_bound_overflows() {
        let store = setup();
        let manager = WatcherSetManager::new(&store, 64);
        assert_eq!(
            manager.configure(&DID, &ALICE, watchers(4), u32::MAX),
            Err(RegistryError::FaultBoundOverflow(u32::MAX))
        );
    }

    #[test]
    fn non_controller_rejected() {
        let store = setup();
        let manager = WatcherSetManager::new(&store, 64);
        let mallory = Identity::from_bytes([0x66; 32]);
        assert!(matches!(
            manager.configure(&DID, &mallory, watchers(4), 1),
            Err(RegistryError::Unauthorized { .. })
        ));
    }
}
