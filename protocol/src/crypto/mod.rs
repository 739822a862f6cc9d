//! # Cryptographic Primitives
//!
//! Every signature check and every hash the registry relies on flows
//! through here. Boring, audited cryptography only:
//!
//! - **Ed25519** for watcher and controller keys.
//! - **BLAKE3** for the domain-separated proposal digest and content refs.
//! - **SHA-256** for deriving DID handles from DID strings.
//!
//! Everything here is a thin, typed wrapper around `ed25519-dalek`, `blake3`
//! and `sha2`. If you're tempted to optimize these functions, don't.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, domain_separated_hash, sha256};
pub use keys::{KeyError, Keypair, PublicKey};
pub use signatures::{recover_signer, sign_digest, Endorsement, InvalidSignature};
