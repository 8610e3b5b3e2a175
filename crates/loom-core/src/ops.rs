// SPDX-License-Identifier: Apache-2.0
//! The operation algebra: the seven op kinds a patch carries (`spec.md` §3).

use serde::{Deserialize, Serialize};

use crate::ident::NodeId;

/// Reference to a content-addressed blob, by its digest.
pub type BlobRef = loom_codec::Digest;

/// `(from, to, label)` — the key an edge register is addressed by.
pub type EdgeKey = (NodeId, NodeId, String);

/// A property register's value: inline bytes, or a reference to a blob
/// written by a `BlobValue` operation (in this patch or an earlier one).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropValue {
    /// Small values travel inline in the patch.
    Inline(Vec<u8>),
    /// Large values are written once as a `BlobValue` op and referenced
    /// from here by digest, avoiding duplicating bytes across every
    /// `PropSet` that shares a value.
    Blob(BlobRef),
}

/// One mutation within a patch.
///
/// Unknown tags fail decode with [`crate::error::LoomError::InvalidPatch`]
/// (`#[serde(deny_unknown_fields)]` on the carried records plus
/// `ciborium`'s rejection of unrecognized enum variants together give this
/// for free — there is no permissive fallback arm).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Assert a node alive.
    NodeAdd {
        /// The node being asserted alive.
        node_id: NodeId,
    },
    /// Assert a node dead.
    NodeTombstone {
        /// The node being asserted dead.
        node_id: NodeId,
    },
    /// Assert an edge alive.
    EdgeAdd {
        /// Source node.
        from: NodeId,
        /// Destination node.
        to: NodeId,
        /// Edge label (edges are keyed by the full `(from, to, label)` triple).
        label: String,
    },
    /// Assert an edge dead.
    EdgeTombstone {
        /// Source node.
        from: NodeId,
        /// Destination node.
        to: NodeId,
        /// Edge label.
        label: String,
    },
    /// Write a property register.
    PropSet {
        /// Owning node.
        node_id: NodeId,
        /// Property key.
        key: String,
        /// New value.
        value: PropValue,
    },
    /// Tombstone a property register.
    PropRemove {
        /// Owning node.
        node_id: NodeId,
        /// Property key.
        key: String,
    },
    /// Content-addressed large value, written alongside the patch that
    /// introduces it. Carries no state register of its own.
    BlobValue {
        /// The blob's content digest.
        oid: BlobRef,
        /// The blob's bytes.
        bytes: Vec<u8>,
    },
}

impl Operation {
    /// The node this operation concerns, for the delete-guard policy check
    /// (`spec.md` §4.1) and for diagnostics. Returns `None` for ops with no
    /// single owning node (`BlobValue`).
    #[must_use]
    pub fn subject_node(&self) -> Option<&NodeId> {
        match self {
            Self::NodeAdd { node_id }
            | Self::NodeTombstone { node_id }
            | Self::PropSet { node_id, .. }
            | Self::PropRemove { node_id, .. } => Some(node_id),
            Self::EdgeAdd { .. } | Self::EdgeTombstone { .. } | Self::BlobValue { .. } => None,
        }
    }
}
