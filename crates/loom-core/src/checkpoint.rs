// SPDX-License-Identifier: Apache-2.0
//! Checkpoints: a pinned `(state, frontier)` pair that lets readers skip
//! replaying a graph's entire patch history (`spec.md` §5).
//!
//! A checkpoint commit's tree holds two blobs, `state` and `frontier`; its
//! message records the state's content hash so [`load`] can detect storage
//! corruption before handing a caller a silently-wrong `GraphState`.

use loom_cas::{CommitId, ObjectStore, TreeOid};

use crate::error::{LoomError, Result};
use crate::frontier::Frontier;
use crate::patch::load_patch_with_parent;
use crate::reducer::{reduce_from, GraphState};
use crate::message::{build_checkpoint_message, parse_checkpoint_message};

const STATE_ENTRY: &str = "state";
const FRONTIER_ENTRY: &str = "frontier";

/// A checkpoint's decoded payload.
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    /// The materialized state at the time of the checkpoint.
    pub state: GraphState,
    /// The per-writer frontier the state was built from.
    pub frontier: Frontier,
    /// The schema the checkpoint was taken under.
    pub schema: u8,
}

/// Write and read checkpoint commits. Stateless: every method takes the
/// object store and any identifiers it needs explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointService;

impl CheckpointService {
    /// Create a new checkpoint commit pinning `state` and `frontier`.
    /// `parents` should be the frontier's own commits (one per writer, plus
    /// the previous checkpoint if any) so ancestry queries can reach every
    /// patch the checkpoint summarizes.
    ///
    /// # Errors
    /// Propagates codec and storage errors.
    #[tracing::instrument(skip(store, state, frontier, parents), fields(graph))]
    pub async fn create<S: ObjectStore>(
        &self,
        store: &S,
        product: &str,
        graph: &str,
        state: &GraphState,
        frontier: &Frontier,
        parents: Vec<CommitId>,
        schema: u8,
    ) -> Result<CommitId> {
        let state_hash = state.state_hash()?;
        let (state_bytes, _) = loom_codec::encode_and_digest(state)?;
        let (frontier_bytes, _) = loom_codec::encode_and_digest(frontier)?;

        let state_oid = store.write_blob(&state_bytes).await?;
        let frontier_oid = store.write_blob(&frontier_bytes).await?;
        let tree: TreeOid = store
            .write_tree(&[
                (STATE_ENTRY.to_string(), state_oid),
                (FRONTIER_ENTRY.to_string(), frontier_oid),
            ])
            .await?;

        let message = build_checkpoint_message(product, graph, state_hash, frontier_oid, None, schema);
        let commit = store.commit_node_with_tree(tree, parents, message).await?;
        tracing::debug!(%commit, writers = frontier.len(), "checkpoint created");
        Ok(commit)
    }

    /// Load a checkpoint commit's state and frontier, verifying the state's
    /// content hash against the one recorded in the commit message.
    ///
    /// # Errors
    /// [`LoomError::InvalidPatch`] if the commit is not a checkpoint, is
    /// missing its tree, or the decoded state's hash does not match the one
    /// the commit message recorded (storage corruption).
    pub async fn load<S: ObjectStore>(&self, store: &S, product: &str, commit: CommitId) -> Result<LoadedCheckpoint> {
        let info = store.get_node_info(commit).await?;
        let parsed = parse_checkpoint_message(product, &info.message)
            .ok_or_else(|| LoomError::InvalidPatch("commit is not a checkpoint commit".into()))?;
        let tree_oid = info
            .tree
            .ok_or_else(|| LoomError::InvalidPatch("checkpoint commit carries no tree".into()))?;
        let entries = store.read_tree(tree_oid).await?;

        let state_oid = entries
            .iter()
            .find(|(name, _)| name == STATE_ENTRY)
            .map(|(_, oid)| *oid)
            .ok_or_else(|| LoomError::InvalidPatch("checkpoint tree missing state entry".into()))?;
        let frontier_oid_found = entries
            .iter()
            .find(|(name, _)| name == FRONTIER_ENTRY)
            .map(|(_, oid)| *oid)
            .ok_or_else(|| LoomError::InvalidPatch("checkpoint tree missing frontier entry".into()))?;

        let state_bytes = store.read_blob(state_oid).await?;
        let state: GraphState = loom_codec::from_canonical_bytes(&state_bytes)?;
        let actual_hash = state.state_hash()?;
        if actual_hash != parsed.state_hash {
            return Err(LoomError::InvalidPatch(format!(
                "checkpoint state hash mismatch: recorded {}, computed {}",
                parsed.state_hash, actual_hash
            )));
        }

        let frontier_bytes = store.read_blob(frontier_oid_found).await?;
        let frontier: Frontier = loom_codec::from_canonical_bytes(&frontier_bytes)?;

        Ok(LoadedCheckpoint {
            state,
            frontier,
            schema: parsed.schema,
        })
    }

    /// Replay only the patches between a checkpoint and `target_frontier`,
    /// folding them onto the checkpoint's pinned state instead of refolding
    /// a graph's whole history.
    ///
    /// # Errors
    /// Propagates storage and codec errors from walking each writer's chain.
    pub async fn materialize_incremental<S: ObjectStore>(
        &self,
        store: &S,
        product: &str,
        checkpoint_commit: CommitId,
        target_frontier: &Frontier,
    ) -> Result<GraphState> {
        let loaded = self.load(store, product, checkpoint_commit).await?;
        let mut new_patches = Vec::new();

        for writer in target_frontier.writers().map(str::to_string).collect::<Vec<_>>() {
            let Some(target_commit) = target_frontier.get(&writer) else {
                continue;
            };
            let since = loaded.frontier.get(&writer);
            new_patches.extend(collect_patches_since(store, product, since, target_commit).await?);
        }

        Ok(reduce_from(loaded.state, &new_patches))
    }
}

/// Walk a writer's linear chain backward from `to` until `from` (exclusive)
/// or the root, returning patches in forward (oldest-first) order.
async fn collect_patches_since<S: ObjectStore>(
    store: &S,
    product: &str,
    from: Option<CommitId>,
    to: CommitId,
) -> Result<Vec<crate::patch::Patch>> {
    if Some(to) == from {
        return Ok(Vec::new());
    }
    let mut acc = Vec::new();
    let mut cursor = to;
    loop {
        let (patch, parent) = load_patch_with_parent(store, product, cursor).await?;
        acc.push(patch);
        match parent {
            Some(p) if Some(p) != from => cursor = p,
            _ => break,
        }
    }
    acc.reverse();
    Ok(acc)
}
