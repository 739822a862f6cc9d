//! # Endorsements and the Signature Verifier
//!
//! An endorsement is what a watcher hands back after agreeing to a recovery
//! proposal: its verifying key followed by an Ed25519 signature over the
//! 32-byte proposal digest.
//!
//! ```text
//! +----------------------+-------------------------------+
//! | signer key (32)      | ed25519 signature (64)        |
//! +----------------------+-------------------------------+
//! ```
//!
//! [`recover_signer`] turns `(digest, endorsement)` into the signer's
//! [`Identity`] or an [`InvalidSignature`]. It is pure, never panics, and
//! has no idea who the watchers are; membership is the recovery engine's
//! problem.
//!
//! ## Strictness
//!
//! Verification uses `verify_strict`. We reject small-order keys and
//! non-canonical `R` values that lenient verifiers accept; a watcher's
//! endorsement must be unambiguous.

use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::keys::{Keypair, PublicKey};
use crate::config::{
    DIGEST_LENGTH, ENDORSEMENT_LENGTH, SIGNATURE_LENGTH, VERIFYING_KEY_LENGTH,
};
use crate::identity::Identity;

/// Why a single endorsement could not be attributed to a signer.
///
/// Not a security failure on its own. The recovery engine skips these and
/// keeps counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidSignature {
    #[error("endorsement must be {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },

    #[error("signer key is not a valid Ed25519 point")]
    SignerKey,

    #[error("signature does not match the proposal digest")]
    Mismatch,
}

/// A watcher's endorsement of a proposal digest, in wire form.
///
/// Held as raw bytes on purpose: submitters are untrusted and may send any
/// length. Nothing is validated until [`recover_signer`] runs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endorsement(Vec<u8>);

impl Endorsement {
    /// Wrap untrusted bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex-encoded endorsement. The length is *not* checked here.
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(hex::decode(hex_str.trim())?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Endorsement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        let shown = &hex[..hex.len().min(16)];
        write!(f, "Endorsement({}.., {} bytes)", shown, self.0.len())
    }
}

/// Endorse a digest: `signer_key || sign(digest)`.
pub fn sign_digest(keypair: &Keypair, digest: &[u8; DIGEST_LENGTH]) -> Endorsement {
    let mut bytes = Vec::with_capacity(ENDORSEMENT_LENGTH);
    bytes.extend_from_slice(keypair.public_key().as_bytes());
    bytes.extend_from_slice(&keypair.sign(digest));
    Endorsement(bytes)
}

/// Recover the identity that produced `endorsement` over `digest`.
///
/// Fails with [`InvalidSignature::Length`] for anything but 96 bytes,
/// [`InvalidSignature::SignerKey`] if the embedded key does not decompress,
/// and [`InvalidSignature::Mismatch`] if the signature does not verify
/// against `digest`. A signature made over some other digest lands in the
/// last bucket; that is how a proposal with any altered field is rejected.
pub fn recover_signer(
    digest: &[u8; DIGEST_LENGTH],
    endorsement: &Endorsement,
) -> Result<Identity, InvalidSignature> {
    let bytes = endorsement.as_bytes();
    if bytes.len() != ENDORSEMENT_LENGTH {
        return Err(InvalidSignature::Length {
            expected: ENDORSEMENT_LENGTH,
            got: bytes.len(),
        });
    }

    let (key_bytes, sig_bytes) = bytes.split_at(VERIFYING_KEY_LENGTH);
    let mut key = [0u8; VERIFYING_KEY_LENGTH];
    key.copy_from_slice(key_bytes);
    let mut sig = [0u8; SIGNATURE_LENGTH];
    sig.copy_from_slice(sig_bytes);

    let signer = PublicKey::from_bytes(key).map_err(|_| InvalidSignature::SignerKey)?;
    let signature = Signature::from_bytes(&sig);

    signer
        .to_verifying_key()
        .verify_strict(digest, &signature)
        .map_err(|_| InvalidSignature::Mismatch)?;

    Ok(signer.identity())
}
