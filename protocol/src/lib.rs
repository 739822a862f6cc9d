// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # BFT-SH-DID Protocol — Primitives
//!
//! The building blocks for a Byzantine-fault-tolerant, self-healing DID
//! registry: a DID's controller can be replaced when a 2f+1 quorum of an
//! independent watcher committee endorses the change.
//!
//! This crate holds everything the recovery state machine *consumes* but
//! does not decide: keys, endorsement verification, identifier handles,
//! the persisted records, and the storage abstraction those records live
//! behind. The state machine itself lives in `bftdid-contracts`.
//!
//! ## Architecture
//!
//! - **crypto** — Ed25519 keys, the endorsement verifier, hashing.
//! - **identity** — Fixed-width handles (`Identity`, `DidId`, `DocRef`),
//!   the `DidRecord`, and the per-DID `WatcherSet`.
//! - **storage** — The `RecoveryStore` trait plus in-memory and sled backends.
//! - **config** — Protocol constants and the registry's runtime configuration.
//!
//! ## Design Philosophy
//!
//! 1. Every identifier is a fixed 32-byte handle. No variable-width strings
//!    inside the state machine, no ambiguity in what gets hashed.
//! 2. Verification never panics. Garbage in, typed error out.
//! 3. Storage is injected, never global. Tests get a fresh store each.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod storage;
