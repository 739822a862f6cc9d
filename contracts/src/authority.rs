//! # Recovery Authority
//!
//! The public face of the registry. It wires the DID registry, the watcher
//! set manager and the recovery engine to one injected store, and supplies
//! what those components deliberately leave out:
//!
//! - **Critical sections.** Every mutating call on a DID runs under that
//!   DID's mutex, from the first read to the last write. Two commits for the
//!   same `(did, epoch)` can never both see "not completed", and a committee
//!   can't be swapped out from under a recovery mid-check. Different DIDs
//!   never contend.
//! - **Events.** Published after the store write succeeds, still inside the
//!   critical section, so subscribers see per-DID changes in commit order.
//! - **Logging.** Rejected recoveries are logged at `warn`.
//!
//! Share it as `Arc<RecoveryAuthority<S>>`.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use bftdid_protocol::config::{ConfigError, RegistryConfig, DIGEST_LENGTH};
use bftdid_protocol::crypto::{recover_signer, Endorsement};
use bftdid_protocol::identity::{DidId, DidRecord, DocRef, Identity, WatcherSet};
use bftdid_protocol::storage::RecoveryStore;

use crate::did_registry::DidRegistry;
use crate::error::{RegistryError, RegistryResult};
use crate::events::{EventBus, RegistryEvent};
use crate::proposal::{RecoveryProposal, RecoveryReceipt};
use crate::recovery::RecoveryEngine;
use crate::watcher_set::WatcherSetManager;

/// Where a DID stands with respect to recovery right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStatus {
    pub did: DidId,
    /// Current committee epoch. 0 if never configured.
    pub epoch: u64,
    pub threshold: u32,
    /// Record version. `None` if the DID was never created.
    pub version: Option<u64>,
    pub active: bool,
    /// Whether a recovery already closed the current epoch.
    pub completed: bool,
}

/// Thread-safe recovery authority over a [`RecoveryStore`].
pub struct RecoveryAuthority<S> {
    store: S,
    config: RegistryConfig,
    locks: DashMap<DidId, Arc<Mutex<()>>>,
    events: EventBus,
}

impl<S: RecoveryStore> RecoveryAuthority<S> {
    /// Build an authority. Fails only if `config` doesn't validate.
    pub fn new(store: S, config: RegistryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            events: EventBus::new(config.event_capacity),
            config,
            locks: DashMap::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Run `f` inside `did`'s critical section.
    ///
    /// The mutex lives in the map only while someone holds or waits on it.
    /// On the way out the entry is removed if this call held the last
    /// reference, so rejected calls on DIDs that never existed leave
    /// nothing behind.
    fn with_did_lock<T>(&self, did: &DidId, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.entry(*did).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        // Clones are only handed out under the shard lock `remove_if` holds,
        // so a count of 1 means nobody else can be waiting.
        self.locks.remove_if(did, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.len()
    }

    // -- DID registry -------------------------------------------------------

    pub fn create_did(
        &self,
        did: DidId,
        controller: Identity,
        doc_ref: DocRef,
    ) -> RegistryResult<DidRecord> {
        self.with_did_lock(&did, || {
            let record =
                DidRegistry::new(&self.store).create(did, controller, doc_ref, Utc::now())?;
            info!(%did, %controller, "DID created");
            self.events.publish(RegistryEvent::DidCreated {
                did,
                controller,
                doc_ref,
            });
            Ok(record)
        })
    }

    /// `Ok(None)` for a DID that was never created.
    pub fn resolve(&self, did: &DidId) -> RegistryResult<Option<DidRecord>> {
        DidRegistry::new(&self.store).resolve(did)
    }

    pub fn update_document(
        &self,
        did: &DidId,
        caller: &Identity,
        doc_ref: DocRef,
    ) -> RegistryResult<DidRecord> {
        self.with_did_lock(did, || {
            let record =
                DidRegistry::new(&self.store).update_document(did, caller, doc_ref, Utc::now())?;
            info!(%did, version = record.version, "DID document updated");
            self.publish_updated(&record);
            Ok(record)
        })
    }

    pub fn deactivate(&self, did: &DidId, caller: &Identity) -> RegistryResult<DidRecord> {
        self.with_did_lock(did, || {
            let record = DidRegistry::new(&self.store).deactivate(did, caller, Utc::now())?;
            info!(%did, version = record.version, "DID deactivated");
            self.events.publish(RegistryEvent::DidDeactivated {
                did: *did,
                version: record.version,
            });
            Ok(record)
        })
    }

    // -- Watcher sets -------------------------------------------------------

    /// Replace the committee. Returns the new epoch.
    pub fn configure_watchers(
        &self,
        did: &DidId,
        caller: &Identity,
        watchers: Vec<Identity>,
        fault_tolerance: u32,
    ) -> RegistryResult<u64> {
        self.with_did_lock(did, || {
            let committee = WatcherSetManager::new(&self.store, self.config.max_committee_size)
                .configure(did, caller, watchers, fault_tolerance)?;
            info!(
                %did,
                epoch = committee.epoch(),
                threshold = committee.threshold(),
                watchers = committee.len(),
                "watcher set configured"
            );
            self.events.publish(RegistryEvent::WatcherSetUpdated {
                did: *did,
                epoch: committee.epoch(),
                threshold: committee.threshold(),
                watchers: committee.len(),
            });
            Ok(committee.epoch())
        })
    }

    /// Current committee, or the empty epoch-0 default.
    pub fn query_watchers(&self, did: &DidId) -> RegistryResult<WatcherSet> {
        WatcherSetManager::new(&self.store, self.config.max_committee_size).query(did)
    }

    // -- Recovery -----------------------------------------------------------

    /// Validate `signatures` against `proposal` and commit the controller
    /// change if a quorum of the current committee endorsed it.
    pub fn commit_recovery(
        &self,
        proposal: &RecoveryProposal,
        signatures: &[Endorsement],
    ) -> RegistryResult<RecoveryReceipt> {
        self.with_did_lock(&proposal.did, || {
            let engine = RecoveryEngine::new(&self.store, self.config.domain());
            let receipt = match engine.commit(proposal, signatures, Utc::now()) {
                Ok(receipt) => receipt,
                Err(e) => {
                    warn!(
                        did = %proposal.did,
                        epoch = proposal.epoch,
                        submitted = signatures.len(),
                        reason = e.reason(),
                        "recovery rejected: {}",
                        e
                    );
                    return Err(e);
                }
            };

            self.events.publish(RegistryEvent::DidUpdated {
                did: receipt.did,
                controller: receipt.new_controller,
                doc_ref: receipt.new_doc_ref,
                version: receipt.version,
            });
            self.events.publish(RegistryEvent::RecoveryCommitted {
                did: receipt.did,
                epoch: receipt.epoch,
                previous_controller: receipt.previous_controller,
                new_controller: receipt.new_controller,
                signers: receipt.signers.len(),
            });
            Ok(receipt)
        })
    }

    /// Committee epoch, threshold, record state and completion flag, read
    /// inside the DID's critical section so they describe one moment.
    pub fn recovery_status(&self, did: &DidId) -> RegistryResult<RecoveryStatus> {
        self.with_did_lock(did, || {
            let committee = self.query_watchers(did)?;
            let snapshot = self.store.recovery_snapshot(did, committee.epoch())?;
            Ok(RecoveryStatus {
                did: *did,
                epoch: committee.epoch(),
                threshold: committee.threshold(),
                version: snapshot.record.as_ref().map(|r| r.version),
                active: snapshot.record.as_ref().is_some_and(|r| r.active),
                completed: committee.is_configured() && snapshot.completed,
            })
        })
    }

    /// The digest watchers must sign for `proposal` on this registry.
    pub fn proposal_digest(&self, proposal: &RecoveryProposal) -> [u8; DIGEST_LENGTH] {
        proposal.digest(&self.config.domain())
    }

    /// Pre-check a single endorsement the way a commit would count it.
    ///
    /// Returns the signer if the endorsement targets the current epoch,
    /// verifies, and comes from a current committee member.
    pub fn verify_endorsement(
        &self,
        proposal: &RecoveryProposal,
        endorsement: &Endorsement,
    ) -> RegistryResult<Identity> {
        let committee = self.query_watchers(&proposal.did)?;
        if proposal.epoch != committee.epoch() {
            return Err(RegistryError::EpochMismatch {
                expected: committee.epoch(),
                got: proposal.epoch,
            });
        }
        let signer = recover_signer(&self.proposal_digest(proposal), endorsement)?;
        if !committee.is_watcher(&signer) {
            return Err(RegistryError::Unauthorized {
                did: proposal.did,
                caller: signer,
            });
        }
        Ok(signer)
    }

    fn publish_updated(&self, record: &DidRecord) {
        self.events.publish(RegistryEvent::DidUpdated {
            did: record.did,
            controller: record.controller,
            doc_ref: record.doc_ref,
            version: record.version,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bftdid_protocol::crypto::Keypair;
    use bftdid_protocol::storage::MemoryStore;

    fn authority() -> RecoveryAuthority<MemoryStore> {
        RecoveryAuthority::new(MemoryStore::new(), RegistryConfig::default()).unwrap()
    }

    #[test]
    fn invalid_config_rejected() {
        let config = RegistryConfig {
            event_capacity: 0,
            ..RegistryConfig::default()
        };
        assert!(RecoveryAuthority::new(MemoryStore::new(), config).is_err());
    }

    #[test]
    fn status_tracks_epoch_and_completion() {
        let auth = authority();
        let controller = Keypair::generate();
        let watchers: Vec<Keypair> = (0..4).map(|_| Keypair::generate()).collect();
        let did = DidId::from_bytes([1; 32]);

        auth.create_did(did, controller.identity(), DocRef::ZERO).unwrap();
        let status = auth.recovery_status(&did).unwrap();
        assert_eq!((status.epoch, status.completed), (0, false));

        let epoch = auth
            .configure_watchers(
                &did,
                &controller.identity(),
                watchers.iter().map(Keypair::identity).collect(),
                1,
            )
            .unwrap();
        assert_eq!(epoch, 1);

        let proposal = RecoveryProposal {
            did,
            new_doc_ref: DocRef::ZERO,
            new_controller: Identity::from_bytes([9; 32]),
            nonce: 0,
            epoch,
        };
        let sigs: Vec<_> = watchers[..3]
            .iter()
            .map(|w| proposal.endorse(&auth.config().domain(), w))
            .collect();
        auth.commit_recovery(&proposal, &sigs).unwrap();

        let status = auth.recovery_status(&did).unwrap();
        assert_eq!((status.epoch, status.threshold, status.completed), (1, 3, true));
        assert_eq!((status.version, status.active), (Some(1), true));
    }

    #[test]
    fn status_of_unknown_did() {
        let status = authority().recovery_status(&DidId::from_bytes([7; 32])).unwrap();
        assert_eq!(status.version, None);
        assert!(!status.active);
        assert!(!status.completed);
    }

    #[test]
    fn rejected_calls_on_unknown_dids_leave_no_locks() {
        let auth = authority();
        let stranger = Identity::from_bytes([9; 32]);
        for i in 0..1_000u32 {
            let mut bytes = [0u8; 32];
            bytes[..4].copy_from_slice(&i.to_be_bytes());
            let proposal = RecoveryProposal {
                did: DidId::from_bytes(bytes),
                new_doc_ref: DocRef::ZERO,
                new_controller: stranger,
                nonce: 0,
                epoch: 1,
            };
            assert!(auth.commit_recovery(&proposal, &[]).is_err());
            assert!(auth
                .configure_watchers(&proposal.did, &stranger, vec![], 1)
                .is_err());
            auth.recovery_status(&proposal.did).unwrap();
        }
        assert_eq!(auth.lock_entries(), 0);
    }

    #[test]
    fn locks_released_after_contention() {
        let auth = Arc::new(authority());
        let controller = Keypair::generate();
        let did = DidId::from_bytes([3; 32]);
        auth.create_did(did, controller.identity(), DocRef::ZERO).unwrap();

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let auth = Arc::clone(&auth);
                std::thread::spawn(move || {
                    for j in 0..50u8 {
                        let doc = DocRef::from_bytes([i ^ j; 32]);
                        let _ = auth.update_document(&did, &controller_id(&auth, &did), doc);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(auth.lock_entries(), 0);
        assert_eq!(auth.resolve(&did).unwrap().unwrap().version, 400);
    }

    fn controller_id(auth: &RecoveryAuthority<MemoryStore>, did: &DidId) -> Identity {
        auth.resolve(did).unwrap().unwrap().controller
    }

    #[test]
    fn endorsement_precheck() {
        let auth = authority();
        let controller = Keypair::generate();
        let watcher = Keypair::generate();
        let others: Vec<Identity> = (0..3).map(|_| Keypair::generate().identity()).collect();
        let did = DidId::from_bytes([2; 32]);
        auth.create_did(did, controller.identity(), DocRef::ZERO).unwrap();
        let mut committee = others.clone();
        committee.push(watcher.identity());
        auth.configure_watchers(&did, &controller.identity(), committee, 1)
            .unwrap();

        let proposal = RecoveryProposal {
            did,
            new_doc_ref: DocRef::ZERO,
            new_controller: Identity::from_bytes([9; 32]),
            nonce: 0,
            epoch: 1,
        };
        let domain = auth.config().domain();

        let good = proposal.endorse(&domain, &watcher);
        assert_eq!(auth.verify_endorsement(&proposal, &good), Ok(watcher.identity()));

        let outsider = proposal.endorse(&domain, &Keypair::generate());
        assert!(matches!(
            auth.verify_endorsement(&proposal, &outsider),
            Err(RegistryError::Unauthorized { .. })
        ));

        let garbage = Endorsement::from_bytes(vec![0u8; 10]);
        assert!(matches!(
            auth.verify_endorsement(&proposal, &garbage),
            Err(RegistryError::InvalidSignature(_))
        ));

        let stale = RecoveryProposal { epoch: 0, ..proposal };
        assert_eq!(
            auth.verify_endorsement(&stale, &good),
            Err(RegistryError::EpochMismatch { expected: 1, got: 0 })
        );

        assert_eq!(auth.proposal_digest(&proposal), proposal.digest(&domain));
    }
}
