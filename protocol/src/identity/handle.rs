//! Fixed-width identifier handles.
//!
//! Every identifier the registry touches is exactly 32 bytes:
//!
//! - [`Identity`] — a controller or watcher. Equal to the Ed25519 verifying key.
//! - [`DidId`] — a DID. SHA-256 of the DID string, so `did:web:example.com`
//!   and friends all fit the same slot.
//! - [`DocRef`] — a content reference to the DID document (BLAKE3 of the
//!   document bytes, or any other 32-byte content address).
//!
//! Human-readable encodings (Display, JSON) are lowercase hex. Binary
//! encodings (bincode, sled) get the raw 32 bytes and nothing else.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::config::HANDLE_LENGTH;
use crate::crypto::hash::{blake3_hash, sha256};

/// Errors from parsing a handle out of text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("handle is not valid hex")]
    InvalidHex,

    #[error("handle must be {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },

    /// Not of the form `did:<method>:<method-specific-id>`.
    #[error("invalid DID string: {0}")]
    InvalidDid(String),
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name([u8; HANDLE_LENGTH]);

        impl $name {
            /// The all-zero handle.
            pub const ZERO: Self = Self([0u8; HANDLE_LENGTH]);

            pub const fn from_bytes(bytes: [u8; HANDLE_LENGTH]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; HANDLE_LENGTH] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; HANDLE_LENGTH]
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse 64 hex characters. An optional `0x` prefix is tolerated.
            pub fn from_hex(s: &str) -> Result<Self, HandleError> {
                let s = s.trim();
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s).map_err(|_| HandleError::InvalidHex)?;
                let got = bytes.len();
                let array: [u8; HANDLE_LENGTH] = bytes.try_into().map_err(|_| {
                    HandleError::Length {
                        expected: HANDLE_LENGTH,
                        got,
                    }
                })?;
                Ok(Self(array))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}..)", stringify!($name), &self.to_hex()[..12])
            }
        }

        impl std::str::FromStr for $name {
            type Err = HandleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl From<[u8; HANDLE_LENGTH]> for $name {
            fn from(bytes: [u8; HANDLE_LENGTH]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    Self::from_hex(&s).map_err(serde::de::Error::custom)
                } else {
                    <[u8; HANDLE_LENGTH]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

define_handle!(
    /// A controller or watcher identity: the 32-byte Ed25519 verifying key.
    Identity
);

define_handle!(
    /// A DID, reduced to a fixed-width handle.
    DidId
);

define_handle!(
    /// Opaque content reference to a DID document.
    DocRef
);

impl DidId {
    /// Derive the handle for a DID string: `SHA-256(did)`.
    ///
    /// Only the shape `did:<method>:<id>` is checked, with a lowercase
    /// alphanumeric method. Resolution of the method itself is not our job.
    pub fn from_did_string(did: &str) -> Result<Self, HandleError> {
        let mut parts = did.splitn(3, ':');
        let scheme = parts.next().unwrap_or_default();
        let method = parts.next().unwrap_or_default();
        let id = parts.next().unwrap_or_default();

        let method_ok = !method.is_empty()
            && method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if scheme != "did" || !method_ok || id.is_empty() {
            return Err(HandleError::InvalidDid(did.to_string()));
        }
        Ok(Self(sha256(did.as_bytes())))
    }
}

impl DocRef {
    /// Content reference of a document: `BLAKE3(document)`.
    pub fn from_content(document: &[u8]) -> Self {
        Self(blake3_hash(document))
    }
}
