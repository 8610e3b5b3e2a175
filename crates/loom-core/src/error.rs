// SPDX-License-Identifier: Apache-2.0
//! The core's single error type.
//!
//! Every fallible public operation returns `Result<T, LoomError>`. Variants
//! carry only structured context (never a pre-rendered, locale-specific
//! string) so a presentation layer outside the core can format them however
//! it likes; `Display` gives a reasonable default.

use loom_cas::CasError;

/// Errors produced by the loom core.
#[derive(Debug, thiserror::Error)]
pub enum LoomError {
    /// A graph or writer name failed validation (`spec.md` §3).
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// [`crate::patch::PatchBuilder::commit`] was called with no operations.
    #[error("commit called with no operations accumulated")]
    EmptyPatch,

    /// A patch failed to decode, or carried an unrecognized operation tag.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// An incoming patch's commit is `same` or `behind` the checkpoint
    /// frontier for its writer.
    #[error("backfill rejected for writer {writer}: incoming commit is not ahead of checkpoint frontier")]
    BackfillRejected {
        /// The writer whose patch was rejected.
        writer: String,
    },

    /// An incoming patch's commit diverges from the checkpoint frontier
    /// (neither ancestor nor descendant of the checkpoint head for that writer).
    #[error("writer {writer} forked: incoming commit shares no ancestry with checkpoint head")]
    WriterFork {
        /// The writer whose chain forked.
        writer: String,
    },

    /// `schema=2` was requested but an unmigrated `schema=1` writer chain
    /// exists with no `schema=2` checkpoint to anchor the migration.
    #[error("migration required: writer {writer} has unmigrated schema=1 history")]
    MigrationRequired {
        /// The writer with unmigrated history.
        writer: String,
    },

    /// The requested graph does not exist.
    #[error("graph not found: {0}")]
    GraphNotFound(String),

    /// The requested node does not exist in the materialized state.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The requested cursor does not exist.
    #[error("cursor not found: {0}")]
    CursorNotFound(String),

    /// A `schema=2`-only operation was called on a `schema=1` graph, or an
    /// operation that requires cached state was called with none available.
    #[error("operation requires schema=2 or cached state: {0}")]
    SchemaRequired(String),

    /// The object store port failed. Wraps the port's own error unmodified.
    #[error("storage error: {0}")]
    StorageError(#[from] CasError),

    /// The canonical codec failed to encode or decode a value.
    #[error("codec error: {0}")]
    CodecError(#[from] loom_codec::CodecError),
}

/// Machine-readable error code, stable across `Display` wording changes.
///
/// The outer CLI (out of core scope) maps these onto process exit codes:
/// `StorageError` → 3 (internal), `*NotFound` → 2 (not-found), everything
/// else → 1 (usage/validation).
impl LoomError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidName { .. } => "INVALID_NAME",
            Self::EmptyPatch => "EMPTY_PATCH",
            Self::InvalidPatch(_) => "INVALID_PATCH",
            Self::BackfillRejected { .. } => "BACKFILL_REJECTED",
            Self::WriterFork { .. } => "WRITER_FORK",
            Self::MigrationRequired { .. } => "MIGRATION_REQUIRED",
            Self::GraphNotFound(_) => "GRAPH_NOT_FOUND",
            Self::NodeNotFound(_) => "NODE_NOT_FOUND",
            Self::CursorNotFound(_) => "CURSOR_NOT_FOUND",
            Self::SchemaRequired(_) => "SCHEMA_REQUIRED",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::CodecError(_) => "CODEC_ERROR",
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, LoomError>;
