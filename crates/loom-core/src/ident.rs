// SPDX-License-Identifier: Apache-2.0
//! Identifier types: writer identity, graph name, and CRDT dots.
//!
//! Validation follows `spec.md` §3 and is exercised directly by the tests
//! below: writer identity and graph name share a restricted ASCII
//! alphabet, differing only in whether `/` nests.

use crate::error::{LoomError, Result};

const MAX_LEN: usize = 64;

fn reject(name: &str, reason: &str) -> Result<()> {
    Err(LoomError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

fn check_common(name: &str) -> Result<()> {
    if name.is_empty() {
        return reject(name, "must not be empty");
    }
    if name.len() > MAX_LEN {
        return reject(name, "must not exceed 64 bytes");
    }
    if name.contains("..") {
        return reject(name, "must not contain '..'");
    }
    for b in name.bytes() {
        if b == b'\0' {
            return reject(name, "must not contain a null byte");
        }
        if b.is_ascii_whitespace() {
            return reject(name, "must not contain whitespace");
        }
        if !b.is_ascii_graphic() {
            return reject(name, "must be printable ASCII");
        }
    }
    if name.contains(';') {
        return reject(name, "must not contain ';'");
    }
    Ok(())
}

/// Validate a writer identity: 1–64 bytes, printable ASCII excluding `/`,
/// whitespace, null, and `..`.
pub fn validate_writer(name: &str) -> Result<()> {
    check_common(name)?;
    if name.contains('/') {
        return reject(name, "writer identity must not contain '/'");
    }
    Ok(())
}

/// Validate a graph name: path-like, `/` permitted as a nesting separator,
/// otherwise the same restricted alphabet as a writer identity.
pub fn validate_graph_name(name: &str) -> Result<()> {
    check_common(name)?;
    Ok(())
}

/// An opaque writer identity: the owner of one append-only patch chain.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct WriterId(String);

impl WriterId {
    /// Validate and wrap a writer identity string.
    ///
    /// # Errors
    /// [`LoomError::InvalidName`] if `raw` fails `spec.md` §3 validation.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate_writer(&raw)?;
        Ok(Self(raw))
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WriterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A path-like graph identifier, nested with `/`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct GraphName(String);

impl GraphName {
    /// Validate and wrap a graph name string.
    ///
    /// # Errors
    /// [`LoomError::InvalidName`] if `raw` fails `spec.md` §3 validation.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate_graph_name(&raw)?;
        Ok(Self(raw))
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GraphName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application-chosen node identifier. Opaque to the reducer.
pub type NodeId = String;

/// A `(writer, counter)` pair uniquely identifying one registered CRDT event
/// (one operation) in an OR-Set, per `spec.md` §3/§4.2.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct Dot {
    /// The writer that produced this dot.
    pub writer: String,
    /// That writer's per-operation monotonic counter.
    pub counter: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_graph_names() {
        for n in ["a", "team/shared", "Graph_v2", "a.b.c"] {
            assert!(validate_graph_name(n).is_ok(), "{n} should be valid");
        }
    }

    #[test]
    fn accepts_valid_writer_names() {
        for n in ["a", "Graph_v2", "a.b.c"] {
            assert!(validate_writer(n).is_ok(), "{n} should be valid as writer");
        }
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(validate_graph_name("..").is_err());
        assert!(validate_graph_name("foo/../bar").is_err());
    }

    #[test]
    fn rejects_slash_in_writer() {
        assert!(validate_writer("a/b").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_graph_name("").is_err());
        assert!(validate_writer("").is_err());
    }

    #[test]
    fn rejects_whitespace_semicolon_and_null() {
        assert!(validate_graph_name("has space").is_err());
        assert!(validate_graph_name("a;b").is_err());
        assert!(validate_graph_name("a\0b").is_err());
    }

    #[test]
    fn rejects_over_64_bytes() {
        let long = "a".repeat(65);
        assert!(validate_graph_name(&long).is_err());
        let ok = "a".repeat(64);
        assert!(validate_graph_name(&ok).is_ok());
    }

    #[test]
    fn graph_name_permits_slash_nesting() {
        assert!(GraphName::new("team/shared/events").is_ok());
    }
}
