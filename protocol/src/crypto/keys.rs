//! # Key Management
//!
//! Ed25519 keypairs for watchers and controllers.
//!
//! A watcher's on-registry identity *is* its verifying key: 32 bytes, no
//! hashing, no address derivation. That keeps signer recovery trivial and
//! keeps the committee membership check a plain set lookup.
//!
//! ## Security considerations
//!
//! - Private keys are zeroized on drop (thanks, ed25519-dalek).
//! - We use `OsRng` for key generation.
//! - Key bytes are never logged. `Debug` prints the public half only.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use crate::identity::Identity;

/// Errors that can occur during key operations. Messages never echo key
/// material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not hex")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// An Ed25519 keypair held by a watcher or a DID controller.
///
/// `Keypair` intentionally does NOT implement `Serialize`. Exporting a
/// secret should be a deliberate act: use [`Keypair::secret_key_bytes`].
pub struct Keypair {
    signing_key: SigningKey,
}

/// The public half of a keypair. Always a valid curve point; the registry
/// stores it as an [`Identity`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl Keypair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    ///
    /// Handy for tests and simulations that need reproducible committees.
    /// A weak seed is a weak key; production keys come from [`generate`](Self::generate).
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// The public key for this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.signing_key.verifying_key(),
        }
    }

    /// The registry identity this keypair signs as.
    pub fn identity(&self) -> Identity {
        self.public_key().identity()
    }

    /// Sign a message. Ed25519 is deterministic: same key, same message,
    /// same 64 bytes.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Exports the raw 32-byte secret key material. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material in debug output. Not even "partially."
        write!(f, "Keypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

impl PublicKey {
    /// Validate and wrap raw key bytes.
    ///
    /// Not every 32-byte string decompresses to a curve point; those are
    /// rejected here rather than at verification time.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(&bytes)
            .map(|key| Self { key })
            .map_err(|_| KeyError::InvalidPublicKey)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.key.as_bytes()
    }

    /// The ed25519-dalek `VerifyingKey`, already decompressed.
    pub fn to_verifying_key(&self) -> VerifyingKey {
        self.key
    }

    /// The registry identity of this key.
    pub fn identity(&self) -> Identity {
        Identity::from_bytes(*self.key.as_bytes())
    }

    /// Hex-encoded representation. 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.key.as_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

/// Some 32-byte string that does not decompress to a curve point.
///
/// Roughly half of all y-coordinates have no matching x, so a short scan
/// always finds one.
#[cfg(test)]
pub(crate) fn off_curve_bytes() -> [u8; 32] {
    (2u8..=255)
        .map(|y| {
            let mut bytes = [0u8; 32];
            bytes[0] = y;
            bytes
        })
        .find(|bytes| VerifyingKey::from_bytes(bytes).is_err())
        .expect("some small y is off the curve")
}
