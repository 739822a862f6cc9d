//! # Identity Module
//!
//! What the registry knows about identities:
//!
//! 1. **Handles** — fixed-width 32-byte identifiers for watchers/controllers,
//!    DIDs and document references.
//! 2. **DID records** — controller, document reference, version, activity.
//! 3. **Committees** — the per-DID watcher set, its threshold and epoch.
//!
//! None of these types enforce the recovery rules themselves; they are plain
//! data with a few pure transitions. The rules live in `bftdid-contracts`.

pub mod committee;
pub mod did;
pub mod handle;

pub use committee::{minimum_committee_size, quorum_threshold, WatcherSet};
pub use did::DidRecord;
pub use handle::{DidId, DocRef, HandleError, Identity};
