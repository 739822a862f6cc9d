//! # DID Records
//!
//! The canonical state of one DID as the registry sees it:
//!
//! ```text
//! did ─► { controller, doc_ref, version, created_at, last_modified, active }
//! ```
//!
//! Records are created once and never deleted. Every mutation goes through
//! one of the transition methods below, which return a *new* record with
//! the version bumped. Storage writes the new record whole, so a half-applied
//! mutation can't exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::handle::{DidId, DocRef, Identity};

/// Identity state for one DID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidRecord {
    pub did: DidId,
    /// Who may update the document, deactivate, and configure watchers.
    pub controller: Identity,
    pub doc_ref: DocRef,
    /// Starts at 0, +1 on every mutation.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Deactivated DIDs stay resolvable but accept no further changes.
    pub active: bool,
}

impl DidRecord {
    /// A freshly created, active record at version 0.
    pub fn new(did: DidId, controller: Identity, doc_ref: DocRef, now: DateTime<Utc>) -> Self {
        Self {
            did,
            controller,
            doc_ref,
            version: 0,
            created_at: now,
            last_modified: now,
            active: true,
        }
    }

    /// The record after a committed recovery: new controller and document.
    ///
    /// `None` if the version counter is exhausted.
    pub fn recovered(
        &self,
        controller: Identity,
        doc_ref: DocRef,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        Some(Self {
            controller,
            doc_ref,
            version: self.version.checked_add(1)?,
            last_modified: now,
            ..self.clone()
        })
    }

    /// The record after a controller-signed document update.
    pub fn with_document(&self, doc_ref: DocRef, now: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            doc_ref,
            version: self.version.checked_add(1)?,
            last_modified: now,
            ..self.clone()
        })
    }

    /// The record after deactivation.
    pub fn deactivated(&self, now: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            active: false,
            version: self.version.checked_add(1)?,
            last_modified: now,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> DidRecord {
        DidRecord::new(
            DidId::from_bytes([1; 32]),
            Identity::from_bytes([2; 32]),
            DocRef::from_bytes([3; 32]),
            Utc::now(),
        )
    }

    #[test]
    fn new_record_starts_at_version_zero() {
        let r = record();
        assert_eq!(r.version, 0);
        assert!(r.active);
        assert_eq!(r.created_at, r.last_modified);
    }

    #[test]
    fn recovery_replaces_controller_and_document() {
        let r = record();
        let later = r.created_at + Duration::seconds(5);
        let next = r
            .recovered(Identity::from_bytes([9; 32]), DocRef::from_bytes([8; 32]), later)
            .unwrap();
        assert_eq!(next.controller, Identity::from_bytes([9; 32]));
        assert_eq!(next.doc_ref, DocRef::from_bytes([8; 32]));
        assert_eq!(next.version, 1);
        assert_eq!(next.last_modified, later);
        assert_eq!(next.created_at, r.created_at);
        assert_eq!(next.did, r.did);
    }

    #[test]
    fn deactivation_keeps_controller() {
        let r = record();
        let next = r.deactivated(Utc::now()).unwrap();
        assert!(!next.active);
        assert_eq!(next.controller, r.controller);
        assert_eq!(next.version, 1);
    }

    #[test]
    fn version_overflow_is_reported() {
        let mut r = record();
        r.version = u64::MAX;
        assert!(r.with_document(DocRef::ZERO, Utc::now()).is_none());
        assert!(r.deactivated(Utc::now()).is_none());
    }

    #[test]
    fn bincode_roundtrip() {
        let r = record();
        let bytes = bincode::serialize(&r).unwrap();
        assert_eq!(bincode::deserialize::<DidRecord>(&bytes).unwrap(), r);
    }
}
