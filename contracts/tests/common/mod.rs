//! Shared fixtures for the contracts integration tests.

#![allow(dead_code)]

use bftdid_contracts::{RecoveryAuthority, RecoveryProposal};
use bftdid_protocol::config::RegistryConfig;
use bftdid_protocol::crypto::{Endorsement, Keypair};
use bftdid_protocol::identity::{DidId, DocRef, Identity};
use bftdid_protocol::storage::{MemoryStore, RecoveryStore, SledStore};
use std::path::Path;
use std::time::Duration;

/// One DID with a configured `3f+1` committee.
pub struct Scenario<S: RecoveryStore> {
    pub authority: RecoveryAuthority<S>,
    pub controller: Keypair,
    pub watchers: Vec<Keypair>,
    pub did: DidId,
    pub epoch: u64,
}

impl Scenario<MemoryStore> {
    pub fn new(f: u32) -> Self {
        Self::with_store(MemoryStore::new(), f)
    }
}

impl<S: RecoveryStore> Scenario<S> {
    pub fn with_store(store: S, f: u32) -> Self {
        let authority = RecoveryAuthority::new(store, RegistryConfig::default()).unwrap();
        let controller = Keypair::generate();
        let watchers: Vec<Keypair> = (0..3 * f + 1).map(|_| Keypair::generate()).collect();
        let did = DidId::from_did_string("did:example:alice").unwrap();

        authority
            .create_did(did, controller.identity(), DocRef::from_content(b"v0"))
            .unwrap();
        let epoch = authority
            .configure_watchers(&did, &controller.identity(), identities(&watchers), f)
            .unwrap();

        Self {
            authority,
            controller,
            watchers,
            did,
            epoch,
        }
    }

    pub fn proposal(&self, new_controller: Identity) -> RecoveryProposal {
        RecoveryProposal {
            did: self.did,
            new_doc_ref: DocRef::from_content(b"recovered"),
            new_controller,
            nonce: 7,
            epoch: self.epoch,
        }
    }

    /// Endorsements from the watchers at `indices`, in that order.
    pub fn endorse(&self, proposal: &RecoveryProposal, indices: &[usize]) -> Vec<Endorsement> {
        let domain = self.authority.config().domain();
        indices
            .iter()
            .map(|&i| proposal.endorse(&domain, &self.watchers[i]))
            .collect()
    }

    pub fn threshold(&self) -> usize {
        self.authority.query_watchers(&self.did).unwrap().threshold() as usize
    }
}

pub fn identities(keys: &[Keypair]) -> Vec<Identity> {
    keys.iter().map(Keypair::identity).collect()
}

/// An endorsement of `proposal` by someone outside every committee.
pub fn impostor(proposal: &RecoveryProposal) -> Endorsement {
    proposal.endorse(&RegistryConfig::default().domain(), &Keypair::generate())
}

pub fn garbage(len: usize) -> Endorsement {
    Endorsement::from_bytes(vec![0xa5; len])
}

/// Open a sled store at `path`, giving a just-dropped handle a moment to
/// release the file lock.
pub fn reopen_sled(path: &Path) -> SledStore {
    for _ in 0..50 {
        if let Ok(store) = SledStore::open(path) {
            return store;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    SledStore::open(path).expect("reopen sled store")
}
