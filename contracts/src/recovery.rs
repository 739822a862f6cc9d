//! # Recovery Engine
//!
//! The state-transition function at the heart of the registry: given a
//! proposal and a batch of endorsements, either replace the DID's controller
//! for this epoch or fail with a typed reason and change nothing.
//!
//! ## Pipeline
//!
//! Checks run in this order and stop at the first failure:
//!
//! 1. DID exists and is active                      → `DidInactive`
//! 2. proposal epoch == committee epoch             → `EpochMismatch`
//! 3. a committee has been configured               → `CommitteeNotConfigured`
//! 4. `(did, epoch)` not completed yet               → `AlreadyCompleted`
//! 5. `signatures.len() >= threshold`               → `ThresholdNotMet`
//! 6. recompute the digest, recover every signer, count each distinct
//!    committee member once; skip everything else
//! 7. counted signers `>= threshold`                → `InvalidSignatureCount`
//! 8. write the new record and close the epoch as one store operation
//!
//! Step 5 is a cheap filter on the raw count. Step 7 is the real quorum
//! check. Garbage, impostor and duplicate signatures in the batch are
//! tolerated as long as enough honest ones remain.
//!
//! ## State per (DID, epoch)
//!
//! ```text
//! Open ──commit──► Completed (terminal)
//!   │
//!   └─configure──► unreachable (EpochMismatch forever)
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

use bftdid_protocol::config::{DomainSeparator, DIGEST_LENGTH};
use bftdid_protocol::crypto::{recover_signer, Endorsement, InvalidSignature};
use bftdid_protocol::identity::{Identity, WatcherSet};
use bftdid_protocol::storage::RecoveryStore;

use crate::error::{RegistryError, RegistryResult};
use crate::proposal::{RecoveryProposal, RecoveryReceipt, SkippedSignatures};

/// Outcome of attributing a batch of endorsements to committee members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureTally {
    /// Distinct authorized signers, first occurrence order.
    pub accepted: Vec<Identity>,
    pub skipped: SkippedSignatures,
}

/// Attribute each endorsement to a signer and keep the ones that count.
///
/// A signer counts once, only if the endorsement verifies against `digest`
/// and the signer sits on `committee`. Nothing here fails; bad entries are
/// tallied and skipped.
pub fn tally_signatures(
    digest: &[u8; DIGEST_LENGTH],
    committee: &WatcherSet,
    signatures: &[Endorsement],
) -> SignatureTally {
    let mut tally = SignatureTally::default();
    let mut counted: HashSet<Identity> = HashSet::with_capacity(committee.len());

    for (position, endorsement) in signatures.iter().enumerate() {
        let signer = match recover_signer(digest, endorsement) {
            Ok(signer) => signer,
            Err(reason) => {
                log_invalid(position, reason);
                tally.skipped.invalid += 1;
                continue;
            }
        };
        if !committee.is_watcher(&signer) {
            debug!(position, %signer, "skipping signature from non-watcher");
            tally.skipped.unauthorized += 1;
            continue;
        }
        if !counted.insert(signer) {
            debug!(position, %signer, "skipping duplicate signature");
            tally.skipped.duplicate += 1;
            continue;
        }
        tally.accepted.push(signer);
    }

    tally
}

fn log_invalid(position: usize, reason: InvalidSignature) {
    debug!(position, %reason, "skipping invalid signature");
}

/// Applies recovery proposals against an injected store.
///
/// The engine does no locking of its own. Callers must run each
/// [`commit`](Self::commit) inside the DID's critical section.
pub struct RecoveryEngine<'s, S: ?Sized> {
    store: &'s S,
    domain: DomainSeparator,
}

impl<'s, S: RecoveryStore + ?Sized> RecoveryEngine<'s, S> {
    pub fn new(store: &'s S, domain: DomainSeparator) -> Self {
        Self { store, domain }
    }

    /// Run the full validation pipeline and, if it passes, commit.
    pub fn commit(
        &self,
        proposal: &RecoveryProposal,
        signatures: &[Endorsement],
        now: DateTime<Utc>,
    ) -> RegistryResult<RecoveryReceipt> {
        let did = proposal.did;
        if proposal.new_controller.is_zero() {
            return Err(RegistryError::NullController);
        }

        // The committee fixes which epoch matters. The record and that
        // epoch's completion flag are then read as one snapshot.
        let committee = self.store.get_watcher_set(&did)?.unwrap_or_default();
        let snapshot = self.store.recovery_snapshot(&did, committee.epoch())?;

        // 1. DID exists and is active.
        let record = snapshot
            .record
            .filter(|r| r.active)
            .ok_or(RegistryError::DidInactive(did))?;

        // 2-3. Epoch fencing against the current committee.
        if proposal.epoch != committee.epoch() {
            return Err(RegistryError::EpochMismatch {
                expected: committee.epoch(),
                got: proposal.epoch,
            });
        }
        if !committee.is_configured() {
            return Err(RegistryError::CommitteeNotConfigured(did));
        }

        // 4. Exactly once per epoch.
        if snapshot.completed {
            return Err(RegistryError::AlreadyCompleted {
                did,
                epoch: proposal.epoch,
            });
        }

        // 5. Cheap pre-filter.
        let need = committee.threshold() as usize;
        if signatures.len() < need {
            return Err(RegistryError::ThresholdNotMet {
                have: signatures.len(),
                need,
            });
        }

        // 6-7. The actual quorum.
        let digest = proposal.digest(&self.domain);
        let tally = tally_signatures(&digest, &committee, signatures);
        if tally.accepted.len() < need {
            return Err(RegistryError::InvalidSignatureCount {
                valid: tally.accepted.len(),
                need,
            });
        }

        // 8. Atomic write.
        let updated = record
            .recovered(proposal.new_controller, proposal.new_doc_ref, now)
            .ok_or(RegistryError::CounterOverflow("did version"))?;
        if !self.store.commit_recovery(&updated, proposal.epoch)? {
            return Err(RegistryError::AlreadyCompleted {
                did,
                epoch: proposal.epoch,
            });
        }

        info!(
            %did,
            epoch = proposal.epoch,
            signers = tally.accepted.len(),
            skipped = tally.skipped.total(),
            version = updated.version,
            "recovery committed"
        );

        Ok(RecoveryReceipt {
            did,
            epoch: proposal.epoch,
            previous_controller: record.controller,
            new_controller: updated.controller,
            new_doc_ref: updated.doc_ref,
            version: updated.version,
            signers: tally.accepted,
            skipped: tally.skipped,
        })
    }
}
