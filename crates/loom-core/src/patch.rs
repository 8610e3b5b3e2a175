// SPDX-License-Identifier: Apache-2.0
//! Patches: the unit of change a writer appends to its chain (`spec.md` §3–§4).
//!
//! A [`Patch`] bundles one or more [`Operation`]s under a single Lamport
//! stamp. `schema=2` patches additionally stamp each operation with a
//! `(writer, counter)` dot and record the writer's observed frontier at the
//! time the patch was built, which is what lets [`crate::reducer`] implement
//! precise observed-remove semantics instead of blunt last-writer-wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use loom_cas::{CommitId, ObjectStore, TreeOid};

use crate::error::{LoomError, Result};
use crate::ident::{Dot, GraphName, NodeId, WriterId};
use crate::message::{build_patch_message, parse_patch_message};
use crate::ops::{Operation, PropValue};
use crate::reducer::GraphState;

/// Current schema version new patches are built under.
///
/// `spec.md` §9 resolves the open question on schema coexistence by shipping
/// only `schema=2` semantics: a fresh writer always builds `schema=2`
/// patches, and `schema=1` history is recognized only as migration input
/// (see [`crate::graph::Graph::open`]'s `MigrationRequired` check) — it is
/// never produced here.
pub const CURRENT_SCHEMA: u8 = 2;

/// One writer's append to its chain: a Lamport stamp, a set of operations,
/// and (schema 2) the per-operation dots and observed frontier that make
/// the operations precisely garbage-collectible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// The schema this patch was encoded under.
    pub schema: u8,
    /// The writer that authored this patch.
    pub writer: String,
    /// This patch's Lamport stamp: `previous_tip.lamport + 1`, or `1` for a
    /// writer's first patch.
    pub lamport: u64,
    /// The operations this patch applies, in order.
    pub ops: Vec<Operation>,
    /// One dot per operation in `ops`, parallel by index. Empty for
    /// `schema=1` patches (ingested only, never built by this crate).
    pub dots: Vec<Dot>,
    /// The writer's observed version vector at the time this patch was
    /// built: for each other writer it has causally observed, the highest
    /// dot counter seen. Empty for `schema=1` patches.
    pub observed_frontier: BTreeMap<String, u64>,
}

impl Patch {
    /// Decode a patch's operations paired with their dots, or `(op, None)`
    /// for every operation in a `schema=1` patch (which carries no dots).
    #[must_use]
    pub fn ops_with_dots(&self) -> Vec<(&Operation, Option<&Dot>)> {
        if self.dots.len() == self.ops.len() {
            self.ops.iter().zip(self.dots.iter().map(Some)).collect()
        } else {
            self.ops.iter().map(|op| (op, None)).collect()
        }
    }
}

pub(crate) async fn load_patch<S: ObjectStore>(
    store: &S,
    product: &str,
    commit: CommitId,
) -> Result<Patch> {
    Ok(load_patch_with_parent(store, product, commit).await?.0)
}

/// Load the patch a commit carries, plus its single parent (a writer's
/// chain is always linear: one parent, except the first patch which has
/// none).
pub(crate) async fn load_patch_with_parent<S: ObjectStore>(
    store: &S,
    product: &str,
    commit: CommitId,
) -> Result<(Patch, Option<CommitId>)> {
    let info = store.get_node_info(commit).await?;
    let parsed = parse_patch_message(product, &info.message)
        .ok_or_else(|| LoomError::InvalidPatch("commit is not a patch commit".into()))?;
    let bytes = store.read_blob(parsed.patch_oid).await?;
    let patch: Patch = loom_codec::from_canonical_bytes(&bytes)?;
    Ok((patch, info.parents.first().copied()))
}

/// What the delete-guard policy does when a [`PatchBuilder::remove_node`]
/// call targets a node with live edges or properties (`spec.md` §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeleteGuardPolicy {
    /// Refuse the removal outright.
    Reject,
    /// Allow the removal but record a warning on the builder.
    #[default]
    Warn,
    /// Allow the removal and additionally tombstone every live edge and
    /// property the node owns, in the same patch.
    Cascade,
}

/// Accumulates operations for one writer's next patch and commits them
/// atomically against the writer's CAS-guarded tip ref.
///
/// The delete-guard check and the observed-frontier default both consult an
/// optional cached [`GraphState`] snapshot. Without one (`spec.md` §9), the
/// guard is skipped entirely (best-effort, not a correctness guarantee) and
/// the observed frontier defaults to empty — exactly the "writer B tombstones
/// with an empty observed frontier" scenario.
pub struct PatchBuilder<'a, S: ObjectStore> {
    store: &'a S,
    product: String,
    graph: GraphName,
    writer: WriterId,
    policy: DeleteGuardPolicy,
    cached_state: Option<&'a GraphState>,
    ops: Vec<Operation>,
    /// Non-fatal notices accumulated while building (e.g. a `Warn`-policy
    /// removal of a node that still had live edges).
    pub warnings: Vec<String>,
}

impl<'a, S: ObjectStore> PatchBuilder<'a, S> {
    /// Start a new, empty patch for `writer` on `graph`.
    #[must_use]
    pub fn new(
        store: &'a S,
        product: impl Into<String>,
        graph: GraphName,
        writer: WriterId,
        policy: DeleteGuardPolicy,
        cached_state: Option<&'a GraphState>,
    ) -> Self {
        Self {
            store,
            product: product.into(),
            graph,
            writer,
            policy,
            cached_state,
            ops: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Number of operations accumulated so far.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Assert `node_id` alive.
    pub fn add_node(&mut self, node_id: impl Into<NodeId>) -> &mut Self {
        self.ops.push(Operation::NodeAdd {
            node_id: node_id.into(),
        });
        self
    }

    /// Assert `node_id` dead, applying the delete-guard policy against the
    /// cached state (if any).
    ///
    /// # Errors
    /// [`LoomError::InvalidPatch`] if `policy` is [`DeleteGuardPolicy::Reject`]
    /// and the node has live edges or properties.
    pub fn remove_node(&mut self, node_id: impl Into<NodeId>) -> Result<&mut Self> {
        let node_id = node_id.into();
        if let Some(state) = self.cached_state {
            let dependents = state.live_dependents(&node_id);
            if !dependents.is_empty() {
                match self.policy {
                    DeleteGuardPolicy::Reject => {
                        return Err(LoomError::InvalidPatch(format!(
                            "node {node_id:?} has {} live dependent(s); refusing removal",
                            dependents.len()
                        )));
                    }
                    DeleteGuardPolicy::Warn => {
                        self.warnings.push(format!(
                            "removing node {node_id:?} with {} live dependent(s)",
                            dependents.len()
                        ));
                    }
                    DeleteGuardPolicy::Cascade => {
                        for op in dependents {
                            self.ops.push(op);
                        }
                    }
                }
            }
        }
        self.ops.push(Operation::NodeTombstone { node_id });
        Ok(self)
    }

    /// Assert an edge alive.
    pub fn add_edge(
        &mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        label: impl Into<String>,
    ) -> &mut Self {
        self.ops.push(Operation::EdgeAdd {
            from: from.into(),
            to: to.into(),
            label: label.into(),
        });
        self
    }

    /// Assert an edge dead.
    pub fn remove_edge(
        &mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        label: impl Into<String>,
    ) -> &mut Self {
        self.ops.push(Operation::EdgeTombstone {
            from: from.into(),
            to: to.into(),
            label: label.into(),
        });
        self
    }

    /// Write a property register inline.
    pub fn set_property(
        &mut self,
        node_id: impl Into<NodeId>,
        key: impl Into<String>,
        value: Vec<u8>,
    ) -> &mut Self {
        self.ops.push(Operation::PropSet {
            node_id: node_id.into(),
            key: key.into(),
            value: PropValue::Inline(value),
        });
        self
    }

    /// Write a large property value as a content-addressed blob, plus a
    /// `PropSet` referencing it.
    pub fn set_property_blob(
        &mut self,
        node_id: impl Into<NodeId>,
        key: impl Into<String>,
        bytes: Vec<u8>,
    ) -> &mut Self {
        let oid = loom_codec::digest(&bytes);
        self.ops.push(Operation::BlobValue { oid, bytes });
        self.ops.push(Operation::PropSet {
            node_id: node_id.into(),
            key: key.into(),
            value: PropValue::Blob(oid),
        });
        self
    }

    /// Tombstone a property register.
    pub fn remove_property(&mut self, node_id: impl Into<NodeId>, key: impl Into<String>) -> &mut Self {
        self.ops.push(Operation::PropRemove {
            node_id: node_id.into(),
            key: key.into(),
        });
        self
    }

    fn observed_frontier(&self) -> BTreeMap<String, u64> {
        self.cached_state
            .map(|s| s.applied_vv.clone())
            .unwrap_or_default()
    }

    /// Encode the accumulated operations, stamp dots and a Lamport tick, and
    /// commit atomically against the writer's tip ref, retrying on a
    /// concurrent compare-and-set conflict.
    ///
    /// # Errors
    /// [`LoomError::EmptyPatch`] if no operations were accumulated.
    /// Propagates [`LoomError::StorageError`] for any non-conflict storage
    /// failure.
    #[tracing::instrument(skip(self), fields(graph = %self.graph, writer = %self.writer))]
    pub async fn commit(self) -> Result<CommitId> {
        if self.ops.is_empty() {
            return Err(LoomError::EmptyPatch);
        }
        let refname = crate::refs::writer_ref(&self.product, &self.graph, &self.writer);
        let observed_frontier = self.observed_frontier();

        loop {
            let tip = self.store.read_ref(&refname).await?;
            let (lamport, mut next_counter) = match tip {
                Some(commit) => {
                    let prev = load_patch(self.store, &self.product, commit).await?;
                    let max_counter = prev.dots.iter().map(|d| d.counter).max().unwrap_or(0);
                    (prev.lamport + 1, max_counter + 1)
                }
                None => (1, 1),
            };

            let mut dots = Vec::with_capacity(self.ops.len());
            for _ in &self.ops {
                dots.push(Dot {
                    writer: self.writer.as_str().to_string(),
                    counter: next_counter,
                });
                next_counter += 1;
            }

            let patch = Patch {
                schema: CURRENT_SCHEMA,
                writer: self.writer.as_str().to_string(),
                lamport,
                ops: self.ops.clone(),
                dots,
                observed_frontier: observed_frontier.clone(),
            };

            let (bytes, patch_digest) = loom_codec::encode_and_digest(&patch)?;
            let patch_oid = self.store.write_blob(&bytes).await?;
            debug_assert_eq!(patch_oid.0, patch_digest);
            let tree: TreeOid = self
                .store
                .write_tree(&[("patch".to_string(), patch_oid)])
                .await?;
            let message = build_patch_message(
                &self.product,
                self.graph.as_str(),
                self.writer.as_str(),
                lamport,
                patch_oid,
            );
            let parents = tip.into_iter().collect::<Vec<_>>();
            let commit = self
                .store
                .commit_node_with_tree(tree, parents, message)
                .await?;

            match self.store.update_ref(&refname, tip, commit).await {
                Ok(()) => {
                    tracing::debug!(lamport, ops = patch.ops.len(), "patch committed");
                    return Ok(commit);
                }
                Err(loom_cas::CasError::RefConflict { .. }) => {
                    tracing::debug!("writer tip moved concurrently, retrying patch commit");
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}
