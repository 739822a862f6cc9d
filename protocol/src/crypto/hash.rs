//! # Hashing Utilities
//!
//! Two hash functions, each with one job:
//!
//! - **SHA-256** — derives `DidId` handles from DID strings. DID methods
//!   outside this registry already speak SHA-256, so a resolver anywhere can
//!   recompute the handle without pulling in anything exotic.
//!
//! - **BLAKE3** — everything registry-native: content references and the
//!   domain-separated proposal digest.
//!
//! BLAKE3's `derive_key` mode is how we do domain separation. Don't prepend
//! a tag manually; `derive_key` runs under a different IV derived from the
//! context string, so cross-context collisions are impossible by construction.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data as a fixed-size array.
///
/// # Example
///
/// ```
/// use bftdid_protocol::crypto::sha256;
///
/// let hash = sha256(b"did:example:alice");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Domain-separated BLAKE3 over a sequence of parts.
///
/// The parts are fed in order with no length prefixes, so callers must only
/// pass fixed-width fields. Every caller in this crate does.
pub fn domain_separated_hash(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc") from FIPS 180-2.
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn blake3_deterministic() {
        assert_eq!(blake3_hash(b"doc"), blake3_hash(b"doc"));
        assert_ne!(blake3_hash(b"doc"), blake3_hash(b"doc2"));
    }

    #[test]
    fn domain_separation_changes_output() {
        let a = domain_separated_hash("ctx-a", &[b"payload"]);
        let b = domain_separated_hash("ctx-b", &[b"payload"]);
        assert_ne!(a, b);
        assert_ne!(a, blake3_hash(b"payload"));
    }

    #[test]
    fn parts_are_streamed_in_order() {
        let split = domain_separated_hash("ctx", &[b"ab", b"cd"]);
        let joined = domain_separated_hash("ctx", &[b"abcd"]);
        assert_eq!(split, joined);
        assert_ne!(split, domain_separated_hash("ctx", &[b"cd", b"ab"]));
    }
}
