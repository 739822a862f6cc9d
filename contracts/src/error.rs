//! The registry's error taxonomy.
//!
//! Every failure is a typed variant. Per-signature problems inside
//! `commit_recovery` never show up here; they are skipped and tallied in the
//! receipt. Everything below is terminal for the call that hit it, and none
//! of it leaves partial state behind.

use bftdid_protocol::crypto::InvalidSignature;
use bftdid_protocol::identity::{DidId, Identity};
use bftdid_protocol::storage::StoreError;
use thiserror::Error;

/// Errors returned by the DID registry, the watcher set manager and the
/// recovery engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The caller is not the DID's controller, or the DID has no controller
    /// to compare against because it doesn't exist.
    #[error("unauthorized: {caller} does not control {did}")]
    Unauthorized { did: DidId, caller: Identity },

    #[error("DID {0} already exists")]
    AlreadyExists(DidId),

    /// Missing or deactivated.
    #[error("DID {0} is not active")]
    DidInactive(DidId),

    #[error("epoch mismatch: committee is at epoch {expected}, proposal targets {got}")]
    EpochMismatch { expected: u64, got: u64 },

    #[error("recovery for {did} at epoch {epoch} already completed")]
    AlreadyCompleted { did: DidId, epoch: u64 },

    /// Fewer signatures submitted than the threshold. Nothing was verified.
    #[error("threshold not met: {have} signatures submitted, {need} required")]
    ThresholdNotMet { have: usize, need: usize },

    /// Enough signatures submitted, but not enough valid, distinct,
    /// authorized signers among them.
    #[error("only {valid} valid authorized signers, {need} required")]
    InvalidSignatureCount { valid: usize, need: usize },

    /// Only returned by the endorsement pre-check, never by a commit.
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] InvalidSignature),

    #[error("committee of {size} watchers cannot tolerate the requested faults; {required} required")]
    InsufficientCommittee { size: usize, required: usize },

    #[error("watcher {0} listed more than once")]
    DuplicateWatcher(Identity),

    /// Recovery attempted against a DID that never had a committee.
    #[error("no watcher committee configured for {0}")]
    CommitteeNotConfigured(DidId),

    #[error("committee of {size} watchers exceeds the maximum of {max}")]
    CommitteeTooLarge { size: usize, max: usize },

    #[error("fault bound {0} is too large")]
    FaultBoundOverflow(u32),

    #[error("{0} counter exhausted")]
    CounterOverflow(&'static str),

    /// A controller must be a real identity, not the zero handle.
    #[error("controller must not be the zero identity")]
    NullController,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl RegistryError {
    /// Short stable label, used as a metrics label and in simulation reports.
    pub fn reason(&self) -> &'static str {
        match self {
            RegistryError::Unauthorized { .. } => "unauthorized",
            RegistryError::AlreadyExists(_) => "already_exists",
            RegistryError::DidInactive(_) => "did_inactive",
            RegistryError::EpochMismatch { .. } => "epoch_mismatch",
            RegistryError::AlreadyCompleted { .. } => "already_completed",
            RegistryError::ThresholdNotMet { .. } => "threshold_not_met",
            RegistryError::InvalidSignatureCount { .. } => "invalid_signature_count",
            RegistryError::InvalidSignature(_) => "invalid_signature",
            RegistryError::InsufficientCommittee { .. } => "insufficient_committee",
            RegistryError::DuplicateWatcher(_) => "duplicate_watcher",
            RegistryError::CommitteeNotConfigured(_) => "committee_not_configured",
            RegistryError::CommitteeTooLarge { .. } => "committee_too_large",
            RegistryError::FaultBoundOverflow(_) => "fault_bound_overflow",
            RegistryError::CounterOverflow(_) => "counter_overflow",
            RegistryError::NullController => "null_controller",
            RegistryError::Storage(_) => "storage",
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
