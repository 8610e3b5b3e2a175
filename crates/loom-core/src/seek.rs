// SPDX-License-Identifier: Apache-2.0
//! Seeking: resolving a tick reference to a materialized state and diffing
//! two ticks structurally (`spec.md` §5).

use loom_cas::ObjectStore;
use loom_codec::Digest;

use crate::error::Result;
use crate::patch::load_patch;
use crate::reducer::{reduce, GraphState};
use crate::seek_cache::{SeekCache, SeekCacheKey};
use crate::tick_index::TickIndex;

/// How a tick was requested: an absolute Lamport value, or relative to a
/// cursor's current position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickRequest {
    /// An absolute tick, 0 meaning "before any patch".
    Absolute(u64),
    /// A signed offset from `current`.
    Relative(i64),
}

/// A resolved position in a graph's tick order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// The resolved, absolute tick.
    pub tick: u64,
    /// How many nodes are alive at this tick.
    pub nodes: usize,
    /// How many edges are alive at this tick.
    pub edges: usize,
    /// The content hash of the frontier as of this tick.
    pub frontier_hash: Digest,
}

/// A per-tick summary, analogous to a receipt a writer could use to confirm
/// what materializing a tick actually produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeekReceipt {
    /// The tick this receipt describes.
    pub tick: u64,
    /// The content hash of the materialized state.
    pub state_hash: Digest,
    /// The content hash of the frontier as of this tick.
    pub frontier_hash: Digest,
}

/// The result of a structural diff between two ticks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructuralDiff {
    /// Nodes alive in `after` but not `before`.
    pub nodes_added: Vec<String>,
    /// Nodes alive in `before` but not `after`.
    pub nodes_removed: Vec<String>,
    /// Edges alive in `after` but not `before`, as `from -> to [label]`.
    pub edges_added: Vec<(String, String, String)>,
    /// Edges alive in `before` but not `after`.
    pub edges_removed: Vec<(String, String, String)>,
    /// Property registers that changed value, as `(node, key)`.
    pub props_changed: Vec<(String, String)>,
    /// Set when the diff hit `diff_limit` and stopped early. A truncated
    /// diff is still correctly *ordered* (nodes, then edges, then props) —
    /// only the tail within whichever section it stopped in was dropped.
    pub truncated: bool,
}

/// Resolves ticks, materializes state at a tick, and diffs between ticks.
pub struct SeekEngine<'a, S: ObjectStore, C: SeekCache> {
    store: &'a S,
    product: String,
    cache: &'a C,
}

impl<'a, S: ObjectStore, C: SeekCache> SeekEngine<'a, S, C> {
    /// Build a seek engine over `store`, using `cache` to memoize
    /// materializations.
    pub fn new(store: &'a S, product: impl Into<String>, cache: &'a C) -> Self {
        Self {
            store,
            product: product.into(),
            cache,
        }
    }

    /// Resolve a [`TickRequest`] against `index`, clamping to `[0, max_tick]`.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn resolve_tick(index: &TickIndex, current: u64, request: TickRequest) -> u64 {
        let raw = match request {
            TickRequest::Absolute(t) => i64::try_from(t).unwrap_or(i64::MAX),
            TickRequest::Relative(delta) => i64::try_from(current).unwrap_or(i64::MAX).saturating_add(delta),
        };
        let clamped = raw.clamp(0, i64::try_from(index.max_tick).unwrap_or(i64::MAX));
        clamped as u64
    }

    /// Materialize the graph state as of `tick`, consulting and populating
    /// the seek cache.
    ///
    /// # Errors
    /// Propagates storage and codec errors loading patches.
    pub async fn materialize_at(&self, index: &TickIndex, tick: u64) -> Result<GraphState> {
        let frontier = index.frontier_at(tick);
        let frontier_hash = frontier.hash()?;
        let key = SeekCacheKey { frontier_hash, tick };

        if let Some(cached) = self.cache.get(key) {
            return Ok(cached);
        }

        let mut patches = Vec::new();
        for entry in &index.ticks {
            if entry.tick > tick {
                break;
            }
            patches.push(load_patch(self.store, &self.product, entry.commit).await?);
        }
        let state = reduce(&patches);
        self.cache.put(key, state.clone());
        Ok(state)
    }

    /// Build a [`Cursor`] for `tick`.
    ///
    /// # Errors
    /// Propagates [`Self::materialize_at`]'s errors.
    pub async fn cursor_at(&self, index: &TickIndex, tick: u64) -> Result<Cursor> {
        let state = self.materialize_at(index, tick).await?;
        let frontier_hash = index.frontier_at(tick).hash()?;
        Ok(Cursor {
            tick,
            nodes: state.node_alive.values().filter(|d| !d.is_empty()).count(),
            edges: state.edge_alive.values().filter(|d| !d.is_empty()).count(),
            frontier_hash,
        })
    }

    /// Build a [`SeekReceipt`] for `tick`.
    ///
    /// # Errors
    /// Propagates [`Self::materialize_at`]'s errors.
    pub async fn receipt_at(&self, index: &TickIndex, tick: u64) -> Result<SeekReceipt> {
        let state = self.materialize_at(index, tick).await?;
        let frontier_hash = index.frontier_at(tick).hash()?;
        Ok(SeekReceipt {
            tick,
            state_hash: state.state_hash()?,
            frontier_hash,
        })
    }

    /// Diff the materialized states at `before_tick` and `after_tick`,
    /// stopping early after `diff_limit` total entries across all sections.
    /// If the two ticks share a frontier hash, the diff short-circuits to
    /// empty without materializing anything (`spec.md` §5's
    /// frontier-hash-based diff suppression).
    ///
    /// # Errors
    /// Propagates [`Self::materialize_at`]'s errors.
    pub async fn diff(
        &self,
        index: &TickIndex,
        before_tick: u64,
        after_tick: u64,
        diff_limit: usize,
    ) -> Result<StructuralDiff> {
        let before_frontier_hash = index.frontier_at(before_tick).hash()?;
        let after_frontier_hash = index.frontier_at(after_tick).hash()?;
        if before_frontier_hash == after_frontier_hash {
            return Ok(StructuralDiff::default());
        }

        let before = self.materialize_at(index, before_tick).await?;
        let after = self.materialize_at(index, after_tick).await?;
        Ok(structural_diff(&before, &after, diff_limit))
    }
}

fn structural_diff(before: &GraphState, after: &GraphState, diff_limit: usize) -> StructuralDiff {
    let mut diff = StructuralDiff::default();
    let mut count = 0usize;

    for node in after.node_alive.keys() {
        if count >= diff_limit {
            diff.truncated = true;
            return diff;
        }
        if after.is_node_alive(node) && !before.is_node_alive(node) {
            diff.nodes_added.push(node.clone());
            count += 1;
        }
    }
    for node in before.node_alive.keys() {
        if count >= diff_limit {
            diff.truncated = true;
            return diff;
        }
        if before.is_node_alive(node) && !after.is_node_alive(node) {
            diff.nodes_removed.push(node.clone());
            count += 1;
        }
    }

    for key in after.edge_alive.keys() {
        if count >= diff_limit {
            diff.truncated = true;
            return diff;
        }
        if after.is_edge_alive(&key.0, &key.1, &key.2) && !before.is_edge_alive(&key.0, &key.1, &key.2) {
            diff.edges_added.push(key.clone());
            count += 1;
        }
    }
    for key in before.edge_alive.keys() {
        if count >= diff_limit {
            diff.truncated = true;
            return diff;
        }
        if before.is_edge_alive(&key.0, &key.1, &key.2) && !after.is_edge_alive(&key.0, &key.1, &key.2) {
            diff.edges_removed.push(key.clone());
            count += 1;
        }
    }

    let mut prop_keys: std::collections::BTreeSet<_> = after.prop.keys().cloned().collect();
    prop_keys.extend(before.prop.keys().cloned());
    for slot in prop_keys {
        if count >= diff_limit {
            diff.truncated = true;
            return diff;
        }
        let before_val = before.prop.get(&slot).map(|r| &r.value);
        let after_val = after.prop.get(&slot).map(|r| &r.value);
        if before_val != after_val {
            diff.props_changed.push(slot);
            count += 1;
        }
    }

    diff
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use loom_cas::MemoryStore;

    use crate::frontier::Frontier;
    use crate::ident::{GraphName, WriterId};
    use crate::patch::{DeleteGuardPolicy, PatchBuilder};
    use crate::seek_cache::InMemorySeekCache;
    use crate::tick_index::discover_ticks;

    async fn sample_index(store: &MemoryStore) -> TickIndex {
        let graph = GraphName::new("events").unwrap();
        let writer = WriterId::new("a").unwrap();

        let mut b1 = PatchBuilder::new(store, "loom", graph.clone(), writer.clone(), DeleteGuardPolicy::Warn, None);
        b1.add_node("n1");
        let c1 = b1.commit().await.unwrap();

        let mut b2 = PatchBuilder::new(store, "loom", graph, writer, DeleteGuardPolicy::Warn, None);
        b2.add_node("n2");
        let c2 = b2.commit().await.unwrap();

        let mut frontier = Frontier::new();
        frontier.set("a", c2);
        let _ = c1;
        discover_ticks(store, "loom", &frontier).await.unwrap()
    }

    #[test]
    fn resolve_tick_clamps_absolute_above_max() {
        let mut index = TickIndex::default();
        index.max_tick = 5;
        assert_eq!(SeekEngine::<MemoryStore, InMemorySeekCache>::resolve_tick(&index, 0, TickRequest::Absolute(99)), 5);
    }

    #[test]
    fn resolve_tick_clamps_relative_below_zero() {
        let mut index = TickIndex::default();
        index.max_tick = 5;
        assert_eq!(
            SeekEngine::<MemoryStore, InMemorySeekCache>::resolve_tick(&index, 1, TickRequest::Relative(-10)),
            0
        );
    }

    #[tokio::test]
    async fn materialize_at_zero_is_empty() {
        let store = MemoryStore::default();
        let index = sample_index(&store).await;
        let cache = InMemorySeekCache::default();
        let engine = SeekEngine::new(&store, "loom", &cache);
        let state = engine.materialize_at(&index, 0).await.unwrap();
        assert!(!state.is_node_alive("n1"));
    }

    #[tokio::test]
    async fn materialize_at_folds_every_writer_tied_at_the_same_lamport() {
        let store = MemoryStore::default();
        let graph = GraphName::new("events").unwrap();

        let mut a = PatchBuilder::new(&store, "loom", graph.clone(), WriterId::new("a").unwrap(), DeleteGuardPolicy::Warn, None);
        a.add_node("from-a");
        let a1 = a.commit().await.unwrap();

        let mut b = PatchBuilder::new(&store, "loom", graph, WriterId::new("b").unwrap(), DeleteGuardPolicy::Warn, None);
        b.add_node("from-b");
        let b1 = b.commit().await.unwrap();

        // Both writers' only patch lands at lamport 1 — a ceiling of 1 must
        // fold both, not just whichever sorts first.
        let mut frontier = Frontier::new();
        frontier.set("a", a1);
        frontier.set("b", b1);

        let index = discover_ticks(&store, "loom", &frontier).await.unwrap();
        assert_eq!(index.max_tick, 1);

        let cache = InMemorySeekCache::default();
        let engine = SeekEngine::new(&store, "loom", &cache);
        let state = engine.materialize_at(&index, 1).await.unwrap();
        assert!(state.is_node_alive("from-a"));
        assert!(state.is_node_alive("from-b"));
    }

    #[tokio::test]
    async fn materialize_at_max_tick_has_both_nodes() {
        let store = MemoryStore::default();
        let index = sample_index(&store).await;
        let cache = InMemorySeekCache::default();
        let engine = SeekEngine::new(&store, "loom", &cache);
        let state = engine.materialize_at(&index, index.max_tick).await.unwrap();
        assert!(state.is_node_alive("n1"));
        assert!(state.is_node_alive("n2"));
    }

    #[tokio::test]
    async fn diff_between_identical_ticks_is_empty_via_frontier_suppression() {
        let store = MemoryStore::default();
        let index = sample_index(&store).await;
        let cache = InMemorySeekCache::default();
        let engine = SeekEngine::new(&store, "loom", &cache);
        let diff = engine.diff(&index, 1, 1, 100).await.unwrap();
        assert_eq!(diff, StructuralDiff::default());
    }

    #[tokio::test]
    async fn diff_reports_node_added_between_ticks() {
        let store = MemoryStore::default();
        let index = sample_index(&store).await;
        let cache = InMemorySeekCache::default();
        let engine = SeekEngine::new(&store, "loom", &cache);
        let diff = engine.diff(&index, 1, 2, 100).await.unwrap();
        assert_eq!(diff.nodes_added, vec!["n2".to_string()]);
        assert!(!diff.truncated);
    }

    #[tokio::test]
    async fn diff_truncates_at_limit() {
        let store = MemoryStore::default();
        let index = sample_index(&store).await;
        let cache = InMemorySeekCache::default();
        let engine = SeekEngine::new(&store, "loom", &cache);
        let diff = engine.diff(&index, 0, 2, 1).await.unwrap();
        assert!(diff.truncated);
        assert_eq!(diff.nodes_added.len(), 1);
    }
}
