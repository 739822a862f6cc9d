//! # Recovery Proposals
//!
//! A proposal says "replace the controller of `did` with `new_controller`
//! and point it at `new_doc_ref`", for one committee epoch. It is never
//! stored; watchers sign its digest and the engine recomputes that digest
//! from the submitted fields.
//!
//! ## Digest
//!
//! BLAKE3 in derive-key mode, context `"bftdid 2026-01-01 recovery proposal v1"`,
//! over fixed-width fields in this order:
//!
//! ```text
//! network_id (u32 BE) ‖ registry_id (32) ‖ did (32) ‖ new_doc_ref (32)
//!   ‖ new_controller (32) ‖ nonce (u64 BE) ‖ epoch (u64 BE)
//! ```
//!
//! The `(network_id, registry_id)` prefix pins an endorsement to one
//! registry instance. The DID and epoch pin it to one recovery slot. Change
//! any byte and every signature collected so far stops verifying.

use serde::{Deserialize, Serialize};

use bftdid_protocol::config::{DomainSeparator, DIGEST_LENGTH, PROPOSAL_DIGEST_CONTEXT};
use bftdid_protocol::crypto::{domain_separated_hash, sign_digest, Endorsement, Keypair};
use bftdid_protocol::identity::{DidId, DocRef, Identity};

/// A request to replace a DID's controller, as endorsed by watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoveryProposal {
    pub did: DidId,
    pub new_doc_ref: DocRef,
    pub new_controller: Identity,
    /// Free-form, chosen by whoever assembles the proposal. Lets watchers
    /// distinguish two otherwise identical proposals.
    pub nonce: u64,
    /// Committee epoch the proposal targets.
    pub epoch: u64,
}

impl RecoveryProposal {
    /// The exact 32 bytes every watcher endorsement must sign.
    pub fn digest(&self, domain: &DomainSeparator) -> [u8; DIGEST_LENGTH] {
        domain_separated_hash(
            PROPOSAL_DIGEST_CONTEXT,
            &[
                &domain.network_id.to_be_bytes(),
                &domain.registry_id,
                self.did.as_bytes(),
                self.new_doc_ref.as_bytes(),
                self.new_controller.as_bytes(),
                &self.nonce.to_be_bytes(),
                &self.epoch.to_be_bytes(),
            ],
        )
    }

    /// Endorse this proposal as `watcher`.
    pub fn endorse(&self, domain: &DomainSeparator, watcher: &Keypair) -> Endorsement {
        sign_digest(watcher, &self.digest(domain))
    }
}

/// Why individual signatures in a batch were not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSignatures {
    /// Wrong length, bad signer key, or not signed over this digest.
    pub invalid: usize,
    /// Verified, but the signer is not on the current committee.
    pub unauthorized: usize,
    /// A later copy from a signer already counted.
    pub duplicate: usize,
}

impl SkippedSignatures {
    pub fn total(&self) -> usize {
        self.invalid + self.unauthorized + self.duplicate
    }
}

/// What a successful recovery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReceipt {
    pub did: DidId,
    pub epoch: u64,
    pub previous_controller: Identity,
    pub new_controller: Identity,
    pub new_doc_ref: DocRef,
    /// DID record version after the commit.
    pub version: u64,
    /// Counted signers, in the order their first signature appeared.
    pub signers: Vec<Identity>,
    pub skipped: SkippedSignatures,
}
