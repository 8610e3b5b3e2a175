// SPDX-License-Identifier: Apache-2.0
//! Tick index: the global, deterministic ordering of patches a seek cursor
//! addresses (`spec.md` §5).
//!
//! A "tick" *is* a Lamport value, not a dense position in the merge — two
//! patches from different writers can and do share a tick. `ticks` is the
//! sorted union of every writer's `(lamport, commit)` pairs, ordered the
//! same way the reducer orders operations, `(lamport, writer)`, and
//! `max_tick` is the maximum Lamport value reachable from `frontier`.
//! Addressing by Lamport value (rather than by merge ordinal) is what makes
//! "replay only patches with lamport ≤ ceiling" (`spec.md` §4.7) fold in
//! every writer tied at that ceiling, not just the first one encountered.

use std::collections::BTreeMap;

use loom_cas::{CommitId, ObjectStore};

use crate::error::Result;
use crate::frontier::Frontier;
use crate::patch::load_patch_with_parent;

/// One patch's position in the global tick order. `tick` and `lamport` are
/// the same value — the patch's own Lamport stamp — kept as separate fields
/// because `tick` is the address a seek cursor names and `lamport` is the
/// CRDT quantity it's drawn from; they must never diverge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickEntry {
    /// This patch's tick, i.e. its Lamport stamp.
    pub tick: u64,
    /// The writer that authored this patch.
    pub writer: String,
    /// The patch's own Lamport stamp (identical to `tick`).
    pub lamport: u64,
    /// The commit carrying this patch.
    pub commit: CommitId,
}

/// The result of walking a frontier's full history: every patch in global
/// tick order, the highest tick (Lamport value) reachable, and which ticks
/// belong to each writer.
#[derive(Clone, Debug, Default)]
pub struct TickIndex {
    /// Every patch across all writers, in tick order.
    pub ticks: Vec<TickEntry>,
    /// The highest tick (Lamport value) assigned (0 if the graph has no
    /// patches yet).
    pub max_tick: u64,
    /// Writer → ticks that writer authored, in ascending order.
    pub per_writer: BTreeMap<String, Vec<u64>>,
}

impl TickIndex {
    /// A commit at exactly `tick`, if one exists. When more than one writer
    /// shares `tick` (two writers at the same Lamport value), this returns
    /// whichever sorts first by writer — callers that need *all* patches at
    /// a tick should fold `ticks` directly rather than use this.
    #[must_use]
    pub fn commit_at(&self, tick: u64) -> Option<CommitId> {
        self.ticks.iter().find(|t| t.tick == tick).map(|t| t.commit)
    }

    /// The frontier as of `tick`: each writer's tip commit considering only
    /// patches at or before `tick`.
    #[must_use]
    pub fn frontier_at(&self, tick: u64) -> Frontier {
        let mut frontier = Frontier::new();
        for entry in &self.ticks {
            if entry.tick > tick {
                break;
            }
            frontier.set(entry.writer.clone(), entry.commit);
        }
        frontier
    }
}

/// Walk every writer's full chain up to `frontier` and build the global
/// tick order.
///
/// # Errors
/// Propagates storage errors walking each writer's chain.
pub async fn discover_ticks<S: ObjectStore>(
    store: &S,
    product: &str,
    frontier: &Frontier,
) -> Result<TickIndex> {
    let mut entries: Vec<(u64, String, CommitId)> = Vec::new();

    for writer in frontier.writers().map(str::to_string).collect::<Vec<_>>() {
        let Some(tip) = frontier.get(&writer) else {
            continue;
        };
        let mut cursor = Some(tip);
        while let Some(commit) = cursor {
            let (patch, parent) = load_patch_with_parent(store, product, commit).await?;
            entries.push((patch.lamport, writer.clone(), commit));
            cursor = parent;
        }
    }

    entries.sort_by(|a, b| (a.0, a.1.as_str()).cmp(&(b.0, b.1.as_str())));

    let max_tick = entries.iter().map(|(lamport, _, _)| *lamport).max().unwrap_or(0);

    let mut ticks = Vec::with_capacity(entries.len());
    let mut per_writer: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for (lamport, writer, commit) in entries {
        per_writer.entry(writer.clone()).or_default().push(lamport);
        ticks.push(TickEntry {
            tick: lamport,
            writer,
            lamport,
            commit,
        });
    }

    Ok(TickIndex {
        ticks,
        max_tick,
        per_writer,
    })
}
