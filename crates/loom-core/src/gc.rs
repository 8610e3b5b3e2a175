// SPDX-License-Identifier: Apache-2.0
//! Garbage collection: compacting tombstoned registers out of a
//! materialized [`GraphState`] once a configured threshold is crossed
//! (`spec.md` §5).
//!
//! Compaction is purely a space optimization over the *materialized* state
//! — an empty dot set and an absent map entry are equivalent under
//! [`GraphState::is_node_alive`]/[`GraphState::is_edge_alive`], so dropping
//! the empty entries changes nothing observable. It never touches the
//! underlying patch history, which remains the source of truth.

use serde::{Deserialize, Serialize};

use crate::reducer::GraphState;

/// Thresholds governing when [`should_run_gc`] recommends compaction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GcPolicy {
    /// Run once the tombstone ratio (dead registers / total registers)
    /// reaches this fraction.
    pub tombstone_ratio_threshold: f64,
    /// Never run again within this many patches of the last run, even if
    /// the ratio threshold is crossed (avoids thrashing on bursty deletes).
    pub min_patches_since_last_gc: u64,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self {
            tombstone_ratio_threshold: 0.3,
            min_patches_since_last_gc: 100,
        }
    }
}

/// A snapshot of how much of a [`GraphState`] is dead weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GcMetrics {
    /// Total node registers (alive or tombstoned).
    pub total_nodes: usize,
    /// Node registers with no live dot.
    pub tombstoned_nodes: usize,
    /// Total edge registers.
    pub total_edges: usize,
    /// Edge registers with no live dot.
    pub tombstoned_edges: usize,
    /// Property registers holding a `None` (removed) value.
    pub tombstoned_props: usize,
    /// Total property registers.
    pub total_props: usize,
}

impl GcMetrics {
    /// Fraction of all registers (nodes, edges, props) that are tombstoned.
    #[must_use]
    pub fn tombstone_ratio(&self) -> f64 {
        let total = self.total_nodes + self.total_edges + self.total_props;
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let dead = (self.tombstoned_nodes + self.tombstoned_edges + self.tombstoned_props) as f64;
        #[allow(clippy::cast_precision_loss)]
        let total = total as f64;
        dead / total
    }
}

/// Measure how much of `state` is tombstoned.
#[must_use]
pub fn collect_gc_metrics(state: &GraphState) -> GcMetrics {
    let tombstoned_nodes = state.node_alive.values().filter(|d| d.is_empty()).count();
    let tombstoned_edges = state.edge_alive.values().filter(|d| d.is_empty()).count();
    let tombstoned_props = state.prop.values().filter(|r| r.value.is_none()).count();
    GcMetrics {
        total_nodes: state.node_alive.len(),
        tombstoned_nodes,
        total_edges: state.edge_alive.len(),
        tombstoned_edges,
        tombstoned_props,
        total_props: state.prop.len(),
    }
}

/// Pure predicate: should a GC pass run now, given the measured metrics and
/// how many patches have landed since the last run?
#[must_use]
pub fn should_run_gc(metrics: &GcMetrics, policy: &GcPolicy, patches_since_last_gc: u64) -> bool {
    patches_since_last_gc >= policy.min_patches_since_last_gc
        && metrics.tombstone_ratio() >= policy.tombstone_ratio_threshold
}

/// Compact `state` in place: drop node/edge registers with no live dot and
/// property registers holding a tombstone. Idempotent — running it twice in
/// a row is a no-op the second time.
pub fn execute_gc(state: &mut GraphState) {
    state.node_alive.retain(|_, dots| !dots.is_empty());
    state.edge_alive.retain(|_, dots| !dots.is_empty());
    state.prop.retain(|_, reg| reg.value.is_some());
}
