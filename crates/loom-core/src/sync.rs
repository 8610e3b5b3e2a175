// SPDX-License-Identifier: Apache-2.0
//! Sync primitives: the minimal surface a network replication protocol
//! would build on top of (`spec.md` Non-goals excludes the protocol itself,
//! not this exchange-of-patches building block).
//!
//! A [`SyncRequest`] states what the requester already has (a frontier); a
//! [`SyncResponse`] carries the patches it is missing, re-derivable as
//! identical commit objects on the requester's own store because everything
//! here is content-addressed. Transport, authentication, and batching are
//! left to whatever embeds this.

use loom_cas::{CommitId, ObjectStore};
use serde::{Deserialize, Serialize};

use crate::backfill::BackfillValidator;
use crate::error::Result;
use crate::frontier::Frontier;
use crate::graph::Graph;
use crate::message::build_patch_message;
use crate::patch::load_patch_with_parent;

/// What the requester already has.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// The requester's current frontier.
    pub frontier: Frontier,
}

/// One patch the requester is missing, carried as its canonically encoded
/// bytes so the requester can re-derive the identical commit locally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncPatch {
    /// The writer this patch belongs to.
    pub writer: String,
    /// The canonically encoded patch bytes.
    pub patch_bytes: Vec<u8>,
}

/// Patches the responder has that the requester's frontier did not include.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Missing patches, oldest-first per writer.
    pub patches: Vec<SyncPatch>,
    /// The responder's frontier at the time of the response.
    pub frontier: Frontier,
}

impl<'s, S: ObjectStore> Graph<'s, S> {
    /// Build a [`SyncResponse`] containing every patch this graph has that
    /// `request.frontier` does not.
    ///
    /// # Errors
    /// Propagates storage errors walking each writer's chain.
    pub async fn process_sync_request(&self, request: &SyncRequest) -> Result<SyncResponse> {
        let local_frontier = self.get_frontier().await?;
        let mut patches = Vec::new();

        for writer in local_frontier.writers().map(str::to_string).collect::<Vec<_>>() {
            let Some(local_tip) = local_frontier.get(&writer) else {
                continue;
            };
            let since = request.frontier.get(&writer);
            let mut chain = Vec::new();
            let mut cursor = Some(local_tip);
            while let Some(commit) = cursor {
                if Some(commit) == since {
                    break;
                }
                let (patch, parent) = load_patch_with_parent(self.store(), self.product(), commit).await?;
                let (bytes, _) = loom_codec::encode_and_digest(&patch)?;
                chain.push(SyncPatch {
                    writer: writer.clone(),
                    patch_bytes: bytes,
                });
                cursor = parent;
            }
            chain.reverse();
            patches.extend(chain);
        }

        Ok(SyncResponse {
            patches,
            frontier: local_frontier,
        })
    }

    /// Apply a [`SyncResponse`]: re-derive each patch's commit locally
    /// (deterministic from its content) and fast-forward each writer's ref,
    /// validated through [`BackfillValidator`].
    ///
    /// # Errors
    /// [`crate::error::LoomError::BackfillRejected`] or
    /// [`crate::error::LoomError::WriterFork`] if a patch does not extend
    /// the writer's current tip cleanly.
    pub async fn apply_sync_response(&self, response: &SyncResponse) -> Result<()> {
        let validator = BackfillValidator;
        let mut by_writer: std::collections::BTreeMap<String, Vec<&SyncPatch>> = std::collections::BTreeMap::new();
        for p in &response.patches {
            by_writer.entry(p.writer.clone()).or_default().push(p);
        }

        for (writer, chain) in by_writer {
            let refname = crate::refs::writer_ref(self.product(), self.name(), &crate::ident::WriterId::new(writer.clone())?);
            let mut tip = self.store().read_ref(&refname).await?;

            for sync_patch in chain {
                let patch: crate::patch::Patch = loom_codec::from_canonical_bytes(&sync_patch.patch_bytes)?;
                let patch_oid = self.store().write_blob(&sync_patch.patch_bytes).await?;
                let tree = self
                    .store()
                    .write_tree(&[("patch".to_string(), patch_oid)])
                    .await?;
                let message = build_patch_message(self.product(), self.name().as_str(), &writer, patch.lamport, patch_oid);
                let parents: Vec<CommitId> = tip.into_iter().collect();
                let commit = self.store().commit_node_with_tree(tree, parents, message).await?;

                validator.validate(self.store(), &writer, tip, commit).await?;
                self.store().update_ref(&refname, tip, commit).await?;
                tip = Some(commit);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use loom_cas::MemoryStore;

    use crate::graph::GraphConfig;
    use crate::ident::{GraphName, WriterId};

    #[tokio::test]
    async fn sync_request_response_round_trip_converges() {
        let upstream_store = MemoryStore::default();
        let upstream = Graph::open(
            &upstream_store,
            GraphName::new("events").unwrap(),
            WriterId::new("alice").unwrap(),
            GraphConfig::default(),
        )
        .await
        .unwrap();
        {
            let mut b = upstream.patch_builder(None);
            b.add_node("n1");
            b.commit().await.unwrap();
        }

        let downstream_store = MemoryStore::default();
        let downstream = Graph::open(
            &downstream_store,
            GraphName::new("events").unwrap(),
            WriterId::new("alice").unwrap(),
            GraphConfig::default(),
        )
        .await
        .unwrap();

        let request = SyncRequest {
            frontier: downstream.get_frontier().await.unwrap(),
        };
        let response = upstream.process_sync_request(&request).await.unwrap();
        assert_eq!(response.patches.len(), 1);

        downstream.apply_sync_response(&response).await.unwrap();
        let state = downstream.materialize().await.unwrap();
        assert!(state.is_node_alive("n1"));
    }
}
