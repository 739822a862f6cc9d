//! # Protocol Configuration & Constants
//!
//! Every magic number in BFT-SH-DID lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong.
//!
//! Two kinds of things live in this module:
//!
//! - **Constants** — wire widths, the digest context string, defaults.
//!   Changing any of these after deployment invalidates every endorsement
//!   ever collected, so don't.
//! - **[`RegistryConfig`]** — the per-deployment knobs: which network this
//!   registry instance serves, its instance id, and resource caps. The
//!   `(network_id, registry_id)` pair is the domain separator mixed into
//!   every proposal digest.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Mainnet. Endorsements collected here recover real identities.
pub const NETWORK_ID_MAINNET: u32 = 0x4244_4D4E; // "BDMN"

/// Testnet.
pub const NETWORK_ID_TESTNET: u32 = 0x4244_544E; // "BDTN"

/// Devnet — reset whenever someone feels like it.
pub const NETWORK_ID_DEVNET: u32 = 0x4244_4456; // "BDDV"

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Wire Widths
// ---------------------------------------------------------------------------

/// Width of every identifier handle (identity, DID, document reference).
pub const HANDLE_LENGTH: usize = 32;

/// Ed25519 verifying key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Wire length of a watcher endorsement: `signer_key || signature`.
pub const ENDORSEMENT_LENGTH: usize = VERIFYING_KEY_LENGTH + SIGNATURE_LENGTH;

/// Proposal digest length. BLAKE3 output, 32 bytes.
pub const DIGEST_LENGTH: usize = 32;

/// BLAKE3 derive-key context for recovery proposal digests.
///
/// The format follows BLAKE3's recommendation: application, date, purpose.
/// Bumping the version suffix is a hard fork of every outstanding endorsement.
pub const PROPOSAL_DIGEST_CONTEXT: &str = "bftdid 2026-01-01 recovery proposal v1";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Largest committee a single DID may configure. 1024 watchers tolerates
/// f = 341, far more than any sane deployment, while keeping a single
/// `commit_recovery` call bounded.
pub const DEFAULT_MAX_COMMITTEE_SIZE: usize = 1024;

/// Capacity of the outbound event channel. Slow subscribers that fall more
/// than this many events behind observe a lag error, not a stalled registry.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Errors produced while loading or validating a [`RegistryConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown network id: 0x{0:08X}")]
    UnknownNetwork(u32),

    #[error("max_committee_size must be at least 1")]
    ZeroCommitteeCap,

    #[error("event_capacity must be at least 1")]
    ZeroEventCapacity,

    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Domain separator binding a proposal digest to one registry instance.
///
/// Two registries on the same network with different `registry_id`s will
/// never accept each other's endorsements, and neither will the same
/// registry id deployed on a different network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainSeparator {
    /// Network this registry serves.
    pub network_id: u32,
    /// Opaque 32-byte instance id (e.g. the contract address, zero-padded).
    pub registry_id: [u8; 32],
}

/// Per-deployment configuration of a recovery registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Network this registry serves. Must be one of the known network ids.
    pub network_id: u32,
    /// Registry instance id, hex-encoded in JSON.
    #[serde(with = "hex_registry_id")]
    pub registry_id: [u8; 32],
    /// Largest committee a DID may configure.
    pub max_committee_size: usize,
    /// Capacity of the outbound event broadcast channel.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            network_id: NETWORK_ID_DEVNET,
            registry_id: [0u8; 32],
            max_committee_size: DEFAULT_MAX_COMMITTEE_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the registry cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if network_name(self.network_id).is_none() {
            return Err(ConfigError::UnknownNetwork(self.network_id));
        }
        if self.max_committee_size == 0 {
            return Err(ConfigError::ZeroCommitteeCap);
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }

    /// The domain separator every proposal digest of this registry binds to.
    pub fn domain(&self) -> DomainSeparator {
        DomainSeparator {
            network_id: self.network_id,
            registry_id: self.registry_id,
        }
    }
}

/// Returns a friendly name for a network id, mainly for logging.
pub fn network_name(network_id: u32) -> Option<&'static str> {
    match network_id {
        NETWORK_ID_MAINNET => Some("mainnet"),
        NETWORK_ID_TESTNET => Some("testnet"),
        NETWORK_ID_DEVNET => Some("devnet"),
        _ => None,
    }
}

/// Resolve a network name back to its id.
pub fn network_id_by_name(name: &str) -> Option<u32> {
    match name.to_ascii_lowercase().as_str() {
        "mainnet" => Some(NETWORK_ID_MAINNET),
        "testnet" => Some(NETWORK_ID_TESTNET),
        "devnet" => Some(NETWORK_ID_DEVNET),
        _ => None,
    }
}

mod hex_registry_id {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("registry_id must be 32 bytes"))
    }
}
