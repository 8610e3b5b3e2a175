// SPDX-License-Identifier: Apache-2.0
//! Frontiers: the per-writer tip commit map a checkpoint pins (`spec.md` §4/§5).
//!
//! A frontier is the "which commit did we last see from each writer" half of
//! a checkpoint; [`GraphState::applied_vv`](crate::reducer::GraphState) is
//! the CRDT-internal "which dot did we last apply" half. They are merged and
//! hashed independently because a frontier must survive round trips through
//! storage commit ids, while the applied version vector is pure CRDT state.

use std::collections::BTreeMap;

use loom_cas::CommitId;
use serde::{Deserialize, Serialize};

/// A writer → tip-commit map, canonically ordered by writer name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frontier(BTreeMap<String, CommitIdRepr>);

/// `loom_cas::CommitId` has no `Serialize`/`Deserialize` of its own (it is a
/// storage-layer type); this mirrors its digest for the codec boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
struct CommitIdRepr(loom_codec::Digest);

impl From<CommitId> for CommitIdRepr {
    fn from(c: CommitId) -> Self {
        Self(c.0)
    }
}

impl From<CommitIdRepr> for CommitId {
    fn from(r: CommitIdRepr) -> Self {
        Self(r.0)
    }
}

impl Frontier {
    /// An empty frontier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `writer`'s tip as `commit`, overwriting any prior value.
    pub fn set(&mut self, writer: impl Into<String>, commit: CommitId) {
        self.0.insert(writer.into(), commit.into());
    }

    /// `writer`'s current tip, if known.
    #[must_use]
    pub fn get(&self, writer: &str) -> Option<CommitId> {
        self.0.get(writer).copied().map(Into::into)
    }

    /// Writers this frontier has an entry for, in sorted order.
    pub fn writers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of writers this frontier tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this frontier tracks no writers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` into `self`: for any writer present in both,
    /// `resolve_forward` decides which tip survives by walking the object
    /// store's ancestry (the merge itself is a pure structural union —
    /// callers that only need "whichever is newer per my own observation"
    /// should just prefer one side consistently, e.g. always `other`).
    pub fn merge_preferring(&mut self, other: &Self) {
        for (writer, commit) in &other.0 {
            self.0.insert(writer.clone(), *commit);
        }
    }

    /// Iterate `(writer, commit)` pairs in canonical (writer-sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, CommitId)> {
        self.0.iter().map(|(w, c)| (w.as_str(), (*c).into()))
    }

    /// This frontier's content hash. Stable under any insertion order since
    /// the backing map is a `BTreeMap` and the codec's encoding is
    /// canonical.
    ///
    /// # Errors
    /// [`loom_codec::CodecError`] if encoding fails.
    pub fn hash(&self) -> Result<loom_codec::Digest, loom_codec::CodecError> {
        Ok(loom_codec::encode_and_digest(self)?.1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn commit(seed: &[u8]) -> CommitId {
        CommitId(loom_codec::digest(seed))
    }

    #[test]
    fn hash_is_stable_under_insertion_order() {
        let mut f1 = Frontier::new();
        f1.set("a", commit(b"a-tip"));
        f1.set("b", commit(b"b-tip"));

        let mut f2 = Frontier::new();
        f2.set("b", commit(b"b-tip"));
        f2.set("a", commit(b"a-tip"));

        assert_eq!(f1.hash().unwrap(), f2.hash().unwrap());
    }

    #[test]
    fn get_returns_none_for_unknown_writer() {
        let f = Frontier::new();
        assert_eq!(f.get("nobody"), None);
    }

    #[test]
    fn merge_preferring_overwrites_shared_writers_with_other() {
        let mut base = Frontier::new();
        base.set("a", commit(b"old"));
        let mut incoming = Frontier::new();
        incoming.set("a", commit(b"new"));
        incoming.set("b", commit(b"b-tip"));

        base.merge_preferring(&incoming);
        assert_eq!(base.get("a"), Some(commit(b"new")));
        assert_eq!(base.get("b"), Some(commit(b"b-tip")));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn writers_are_sorted() {
        let mut f = Frontier::new();
        f.set("zeta", commit(b"z"));
        f.set("alpha", commit(b"a"));
        assert_eq!(f.writers().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }
}
