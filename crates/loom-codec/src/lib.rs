// SPDX-License-Identifier: Apache-2.0
//! Canonical binary encoding and content hashing for loom.
//!
//! Patches, graph-state snapshots, and frontiers are all encoded through
//! [`to_canonical_bytes`] before they are written as blobs or hashed. The
//! encoding is CBOR (via `ciborium`): map keys sorted, sequences in whatever
//! order the caller's type already canonicalizes them to (this crate does
//! not reorder sequences itself — callers sort before handing over a value,
//! the same way `RenderGraph::to_canonical_bytes` sorts nodes/edges by id
//! before serializing), and no floating point. Two canonical encodings of
//! equal values are byte-identical, which is what lets [`digest`] double as
//! a content hash.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::module_name_repetitions
)]

use serde::{de::DeserializeOwned, Serialize};

/// A 32-byte BLAKE3 content digest.
///
/// Thin newtype so digests of different semantic kinds (patch bytes, state
/// bytes, frontier bytes) aren't accidentally interchangeable at the type
/// level, following the `NodeId`/`TypeId` wrapper convention this codebase
/// uses throughout its identifier types.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, serde::Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// View the digest as a byte slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, for logging and error messages.
    pub fn to_hex(self) -> String {
        let mut s = String::with_capacity(64);
        for byte in &self.0 {
            s.push_str(&format!("{byte:02x}"));
        }
        s
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Errors produced by canonical encode/decode.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value could not be serialized to canonical CBOR.
    #[error("canonical encode failed: {0}")]
    Encode(String),
    /// The bytes were not valid canonical CBOR for the requested type.
    #[error("canonical decode failed: {0}")]
    Decode(String),
}

/// Encode `value` as canonical CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the value cannot be represented in CBOR
/// (this should not happen for the plain-data types this crate is used
/// with; non-finite floats and non-UTF-8 map keys are the usual causes
/// upstream, neither of which loom's types carry).
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decode canonical CBOR bytes back into `T`.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if `bytes` is not a valid CBOR encoding of
/// `T`, including truncated input and unknown enum tags.
pub fn from_canonical_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// BLAKE3 digest of arbitrary bytes.
pub fn digest(bytes: &[u8]) -> Digest {
    Digest(*blake3::hash(bytes).as_bytes())
}

/// Canonically encode `value` and return both the bytes and their digest.
///
/// This is the composite operation the reducer and checkpoint service use:
/// `state_hash` and `patch_oid`/`state.cbor`'s blob hash are always computed
/// this way so that encoding and hashing never drift out of sync.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] under the same conditions as
/// [`to_canonical_bytes`].
pub fn encode_and_digest<T: Serialize>(value: &T) -> Result<(Vec<u8>, Digest), CodecError> {
    let bytes = to_canonical_bytes(value)?;
    let d = digest(&bytes);
    Ok((bytes, d))
}
