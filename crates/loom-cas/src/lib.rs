// SPDX-License-Identifier: Apache-2.0
//! The object store port loom's core consumes.
//!
//! `loom-cas` defines [`ObjectStore`]: content-addressed blobs, trees,
//! commits, and compare-and-set named references, plus the ancestry query
//! the backfill validator and health checks need. This is the **only**
//! surface the core assumes of its storage substrate (`spec.md` §6) — it
//! never reaches for a concrete backend directly.
//!
//! # Hash Domain Policy
//!
//! Blob hashing is content-only: `BLAKE3(bytes)` with no domain prefix. Two
//! blobs with identical bytes are the same blob regardless of which
//! component wrote them — deduplication is a feature, not a bug. Commit and
//! tree ids are likewise content digests, computed over their own canonical
//! encoding (see `loom-codec`), so two object stores that received the same
//! operations produce identical ids without coordinating.
//!
//! # Determinism Invariant
//!
//! No public API exposes store iteration order beyond what [`ObjectStore::list_refs`]
//! explicitly promises (lexicographic by ref name). Any future bulk-read API
//! must sort before returning.
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
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod memory;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use loom_codec::Digest;

/// Content hash identifying a commit node.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CommitId(pub Digest);

/// Content hash identifying a blob.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlobOid(pub Digest);

/// Content hash identifying a tree (a sorted set of named blob entries).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TreeOid(pub Digest);

macro_rules! impl_display_hex {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
impl_display_hex!(CommitId);
impl_display_hex!(BlobOid);
impl_display_hex!(TreeOid);

/// A named entry inside a tree: `(name, blob)`.
pub type TreeEntry = (String, BlobOid);

/// The decoded header of a commit node, as returned by [`ObjectStore::get_node_info`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    /// The full commit message, including any trailer lines the core did
    /// not itself write (forward compatibility: unknown trailers must be
    /// preserved, not dropped).
    pub message: String,
    /// Parent commits, in the order they were supplied to `commit_node*`.
    pub parents: Vec<CommitId>,
    /// The commit's tree, if it has one (parents-only commits, such as
    /// coverage anchors, have none).
    pub tree: Option<TreeOid>,
    /// Backend-assigned creation timestamp (Unix seconds), if the backend
    /// tracks one. Informational only — no core invariant depends on it.
    pub date: Option<i64>,
}

/// Errors surfaced by an [`ObjectStore`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CasError {
    /// Blob bytes did not match a declared hash.
    #[error("[CAS_HASH_MISMATCH] expected {expected}, computed {computed}")]
    HashMismatch {
        /// The hash that was declared/expected.
        expected: BlobOid,
        /// The hash actually computed from the bytes.
        computed: BlobOid,
    },
    /// `update_ref`'s compare-and-set lost the race: the ref's current value
    /// did not match `expected`.
    #[error("[CAS_REF_CONFLICT] ref {refname} expected {expected:?}, found {actual:?}")]
    RefConflict {
        /// The ref that was being updated.
        refname: String,
        /// The value the caller expected to observe.
        expected: Option<CommitId>,
        /// The value actually stored.
        actual: Option<CommitId>,
    },
    /// A referenced object (blob, tree, or commit) does not exist.
    #[error("[CAS_NOT_FOUND] {what}")]
    NotFound {
        /// Human-readable description of what was missing (not parsed by callers).
        what: String,
    },
    /// The backend failed for a reason outside this crate's error taxonomy
    /// (I/O failure, network timeout, corruption). Always wraps a message;
    /// durable backends should additionally implement `std::error::Error::source`.
    #[error("[CAS_BACKEND] {0}")]
    Backend(String),
}

/// Content-addressed object store: blobs, trees, commits, and named
/// references, plus ancestry queries over the commit graph.
///
/// This is the **only** external collaborator the loom core requires
/// (`spec.md` §6). Every method is a suspension point — implementations may
/// be backed by disk, a remote service, or (as here) memory; callers must
/// treat every call as cancellable at the `.await` point, and a cancelled
/// call must leave no partial reference update visible (content-addressed
/// blobs/trees/commits are immutable and safe to leave dangling; only
/// `update_ref`/`delete_ref` mutate visible state, and both are atomic).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all ref names beginning with `prefix`, sorted lexicographically.
    async fn list_refs(&self, prefix: &str) -> Result<Vec<String>, CasError>;

    /// Read the commit a ref currently points at. `None` if the ref does not exist.
    async fn read_ref(&self, refname: &str) -> Result<Option<CommitId>, CasError>;

    /// Compare-and-set a ref: succeeds only if the ref's current value equals
    /// `expected` (`None` meaning "does not yet exist"). On mismatch returns
    /// [`CasError::RefConflict`] with the actual value so the caller can retry.
    async fn update_ref(
        &self,
        refname: &str,
        expected: Option<CommitId>,
        new: CommitId,
    ) -> Result<(), CasError>;

    /// Remove a ref. No error if it does not exist.
    async fn delete_ref(&self, refname: &str) -> Result<(), CasError>;

    /// Store a blob, returning its content hash. Idempotent.
    async fn write_blob(&self, bytes: &[u8]) -> Result<BlobOid, CasError>;

    /// Read a blob's bytes by hash.
    ///
    /// # Errors
    /// [`CasError::NotFound`] if the blob has not been written.
    async fn read_blob(&self, oid: BlobOid) -> Result<Arc<[u8]>, CasError>;

    /// Store a tree (a named set of blob entries), returning its content hash.
    /// Entries are stored and returned sorted by name.
    async fn write_tree(&self, entries: &[TreeEntry]) -> Result<TreeOid, CasError>;

    /// Read a tree's entries by hash, sorted by name.
    ///
    /// # Errors
    /// [`CasError::NotFound`] if the tree has not been written.
    async fn read_tree(&self, oid: TreeOid) -> Result<Vec<TreeEntry>, CasError>;

    /// Write a parents-only commit (no tree) — used for coverage anchors.
    async fn commit_node(
        &self,
        message: String,
        parents: Vec<CommitId>,
    ) -> Result<CommitId, CasError>;

    /// Write a commit with an attached tree — used for patches and checkpoints.
    async fn commit_node_with_tree(
        &self,
        tree: TreeOid,
        parents: Vec<CommitId>,
        message: String,
    ) -> Result<CommitId, CasError>;

    /// Read a commit's header.
    ///
    /// # Errors
    /// [`CasError::NotFound`] if the commit has not been written.
    async fn get_node_info(&self, commit: CommitId) -> Result<CommitInfo, CasError>;

    /// Whether `ancestor` is reachable from `descendant` by walking parent
    /// edges (any parent, not just the first — coverage anchors and
    /// checkpoints are octopus merges). `is_ancestor(x, x)` is always `true`.
    async fn is_ancestor(&self, ancestor: CommitId, descendant: CommitId)
        -> Result<bool, CasError>;

    /// Liveness check.
    async fn ping(&self) -> Result<(), CasError>;
}
