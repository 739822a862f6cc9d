//! # SledStore — Persistent Recovery State
//!
//! sled-backed [`RecoveryStore`]. Three trees:
//!
//! | Tree          | Key                         | Value               |
//! |---------------|-----------------------------|---------------------|
//! | `records`     | `did` (32B)                 | `bincode(DidRecord)`  |
//! | `committees`  | `did` (32B)                 | `bincode(WatcherSet)` |
//! | `completions` | `did` (32B) ‖ `epoch` (8B BE) | `[1]`             |
//!
//! Epochs are big-endian so a prefix scan over one DID's completions comes
//! back in epoch order.
//!
//! ## Atomicity
//!
//! `insert_record` is a compare-and-swap against an absent key.
//! `commit_recovery` and `recovery_snapshot` run as sled transactions over
//! `records` and `completions` together.
//!
//! ## Durability
//!
//! The store runs without sled's background flusher. Every successful write
//! is flushed before the call returns, and dropping the last handle leaves
//! no thread behind holding the database lock.

use sled::transaction::{TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::debug;

use super::{RecoveryStore, RecoverySnapshot, StoreError, StoreResult};
use crate::identity::{DidId, DidRecord, WatcherSet};

const TREE_RECORDS: &str = "records";
const TREE_COMMITTEES: &str = "committees";
const TREE_COMPLETIONS: &str = "completions";

/// Value stored under every completion key. Presence is what matters.
const COMPLETION_MARKER: &[u8] = &[1];

/// `did || epoch_be`.
fn completion_key(did: &DidId, epoch: u64) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..32].copy_from_slice(did.as_bytes());
    key[32..].copy_from_slice(&epoch.to_be_bytes());
    key
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(tree: &'static str, bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt {
        tree,
        detail: e.to_string(),
    })
}

fn transaction_error(e: TransactionError<()>) -> StoreError {
    match e {
        TransactionError::Storage(e) => StoreError::from(e),
        TransactionError::Abort(()) => StoreError::Io("transaction aborted".into()),
    }
}

/// Persistent recovery store.
///
/// Cheap to clone: sled handles are reference counted. Share it across
/// threads freely.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    records: Tree,
    committees: Tree,
    completions: Tree,
}

impl SledStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::Config::new()
            .path(path)
            .flush_every_ms(None)
            .open()?;
        Self::from_db(db)
    }

    /// A store that lives in a temp dir and vanishes on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .flush_every_ms(None)
            .open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let records = db.open_tree(TREE_RECORDS)?;
        let committees = db.open_tree(TREE_COMMITTEES)?;
        let completions = db.open_tree(TREE_COMPLETIONS)?;
        Ok(Self {
            db,
            records,
            committees,
            completions,
        })
    }

    /// Every epoch of `did` that has been closed by a recovery, ascending.
    pub fn completed_epochs(&self, did: &DidId) -> StoreResult<Vec<u64>> {
        let mut epochs = Vec::new();
        for entry in self.completions.scan_prefix(did.as_bytes()) {
            let (key, _) = entry?;
            let tail: [u8; 8] = key
                .get(32..)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| StoreError::Corrupt {
                    tree: TREE_COMPLETIONS,
                    detail: format!("key of {} bytes", key.len()),
                })?;
            epochs.push(u64::from_be_bytes(tail));
        }
        Ok(epochs)
    }
}

impl RecoveryStore for SledStore {
    fn get_record(&self, did: &DidId) -> StoreResult<Option<DidRecord>> {
        match self.records.get(did.as_bytes())? {
            Some(bytes) => Ok(Some(decode(TREE_RECORDS, &bytes)?)),
            None => Ok(None),
        }
    }

    fn insert_record(&self, record: &DidRecord) -> StoreResult<bool> {
        let bytes = encode(record)?;
        let swapped = self.records.compare_and_swap(
            record.did.as_bytes(),
            None::<&[u8]>,
            Some(bytes.as_slice()),
        )?;
        if swapped.is_ok() {
            self.db.flush()?;
        }
        Ok(swapped.is_ok())
    }

    fn put_record(&self, record: &DidRecord) -> StoreResult<()> {
        let bytes = encode(record)?;
        self.records.insert(record.did.as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn get_watcher_set(&self, did: &DidId) -> StoreResult<Option<WatcherSet>> {
        match self.committees.get(did.as_bytes())? {
            Some(bytes) => Ok(Some(decode(TREE_COMMITTEES, &bytes)?)),
            None => Ok(None),
        }
    }

    fn put_watcher_set(&self, did: &DidId, set: &WatcherSet) -> StoreResult<()> {
        let bytes = encode(set)?;
        self.committees.insert(did.as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn is_recovery_completed(&self, did: &DidId, epoch: u64) -> StoreResult<bool> {
        Ok(self.completions.contains_key(completion_key(did, epoch))?)
    }

    fn commit_recovery(&self, record: &DidRecord, epoch: u64) -> StoreResult<bool> {
        let bytes = encode(record)?;
        let record_key = record.did.as_bytes();
        let done_key = completion_key(&record.did, epoch);

        let outcome: TransactionResult<bool, ()> = (&self.records, &self.completions)
            .transaction(|(records, completions)| {
                if completions.get(&done_key[..])?.is_some() {
                    return Ok(false);
                }
                records.insert(&record_key[..], bytes.as_slice())?;
                completions.insert(&done_key[..], COMPLETION_MARKER)?;
                Ok(true)
            });
        let committed = outcome.map_err(transaction_error)?;
        if committed {
            self.db.flush()?;
            debug!(did = %record.did, epoch, version = record.version, "recovery persisted");
        }
        Ok(committed)
    }

    fn recovery_snapshot(&self, did: &DidId, epoch: u64) -> StoreResult<RecoverySnapshot> {
        let done_key = completion_key(did, epoch);
        let read: TransactionResult<_, ()> = (&self.records, &self.completions).transaction(
            |(records, completions)| {
                Ok((
                    records.get(&did.as_bytes()[..])?,
                    completions.get(&done_key[..])?.is_some(),
                ))
            },
        );
        let (bytes, completed) = read.map_err(transaction_error)?;
        let record = match bytes {
            Some(bytes) => Some(decode(TREE_RECORDS, &bytes)?),
            None => None,
        };
        Ok(RecoverySnapshot { record, completed })
    }

    fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
