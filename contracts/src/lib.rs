// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # BFT-SH-DID Recovery Contracts
//!
//! The state-transition logic of a self-healing DID registry. A DID's
//! controller can be replaced, at most once per committee epoch, when at
//! least `2f+1` members of a `3f+1` watcher committee endorse the change.
//!
//! - **DID Registry** — creation, resolution, controller-signed updates
//!   and deactivation.
//! - **Watcher Set Manager** — per-DID committees, thresholds and epochs.
//! - **Recovery Engine** — verification, deduplication, the quorum check
//!   and the exactly-once commit.
//! - **Recovery Authority** — the thread-safe facade: per-DID critical
//!   sections, structured events, logging.
//!
//! ## Design Principles
//!
//! 1. Counters use `checked_add`. An exhausted version or epoch is an
//!    error, never a wraparound.
//! 2. State transitions are explicit: an epoch is open or completed, and
//!    completed is terminal.
//! 3. A bad signature in a batch is skipped, not fatal. A short quorum is.
//! 4. Storage is injected. Nothing here owns a global.

pub mod authority;
pub mod did_registry;
pub mod error;
pub mod events;
pub mod proposal;
pub mod recovery;
pub mod watcher_set;

pub use authority::{RecoveryAuthority, RecoveryStatus};
pub use error::{RegistryError, RegistryResult};
pub use events::{EventBus, RegistryEvent};
pub use proposal::{RecoveryProposal, RecoveryReceipt, SkippedSignatures};
pub use recovery::{tally_signatures, RecoveryEngine, SignatureTally};
