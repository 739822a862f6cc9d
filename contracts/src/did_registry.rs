//! # DID Registry
//!
//! Owns the canonical [`DidRecord`]s. A DID comes into existence exactly
//! once through [`DidRegistry::create`]. After that its controller may
//! update the document reference or deactivate it; the only other way its
//! state changes is a committed recovery (see [`crate::recovery`]).
//!
//! Records are never deleted. A deactivated DID still resolves, so
//! verifiers can tell "gone" from "never existed".

use chrono::{DateTime, Utc};

use bftdid_protocol::identity::{DidId, DidRecord, DocRef, Identity};
use bftdid_protocol::storage::RecoveryStore;

use crate::error::{RegistryError, RegistryResult};

/// DID lifecycle operations over an injected store.
///
/// Callers are expected to hold the DID's critical section; see
/// [`crate::authority::RecoveryAuthority`].
pub struct DidRegistry<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S: RecoveryStore + ?Sized> DidRegistry<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Register a new DID at version 0.
    pub fn create(
        &self,
        did: DidId,
        controller: Identity,
        doc_ref: DocRef,
        now: DateTime<Utc>,
    ) -> RegistryResult<DidRecord> {
        if controller.is_zero() {
            return Err(RegistryError::NullController);
        }
        let record = DidRecord::new(did, controller, doc_ref, now);
        if !self.store.insert_record(&record)? {
            return Err(RegistryError::AlreadyExists(did));
        }
        Ok(record)
    }

    /// `None` for a DID that was never created. Never a zeroed default.
    pub fn resolve(&self, did: &DidId) -> RegistryResult<Option<DidRecord>> {
        Ok(self.store.get_record(did)?)
    }

    /// Load an active record and check that `caller` controls it.
    ///
    /// Unknown DIDs are `Unauthorized`: there is no controller to match.
    pub fn authorize(&self, did: &DidId, caller: &Identity) -> RegistryResult<DidRecord> {
        let record = self
            .store
            .get_record(did)?
            .ok_or(RegistryError::Unauthorized {
                did: *did,
                caller: *caller,
            })?;
        if !record.active {
            return Err(RegistryError::DidInactive(*did));
        }
        if record.controller != *caller {
            return Err(RegistryError::Unauthorized {
                did: *did,
                caller: *caller,
            });
        }
        Ok(record)
    }

    /// Controller-signed document update.
    pub fn update_document(
        &self,
        did: &DidId,
        caller: &Identity,
        doc_ref: DocRef,
        now: DateTime<Utc>,
    ) -> RegistryResult<DidRecord> {
        let record = self.authorize(did, caller)?;
        let updated = record
            .with_document(doc_ref, now)
            .ok_or(RegistryError::CounterOverflow("did version"))?;
        self.store.put_record(&updated)?;
        Ok(updated)
    }

    /// Permanently deactivate a DID. Recoveries against it fail from now on.
    pub fn deactivate(
        &self,
        did: &DidId,
        caller: &Identity,
        now: DateTime<Utc>,
    ) -> RegistryResult<DidRecord> {
        let record = self.authorize(did, caller)?;
        let updated = record
            .deactivated(now)
            .ok_or(RegistryError::CounterOverflow("did version"))?;
        self.store.put_record(&updated)?;
        Ok(updated)
    }
}
