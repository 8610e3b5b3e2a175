// SPDX-License-Identifier: Apache-2.0
//! Health assessment: a cheap, synchronous read of whether a graph needs
//! attention (`spec.md` §5) — high tombstone pressure, or a writer whose tip
//! the last coverage anchor never witnessed.

use loom_cas::{CommitId, ObjectStore};

use crate::error::Result;
use crate::frontier::Frontier;
use crate::gc::GcMetrics;

/// Tombstone ratio at or above which a graph is `Unhealthy`.
pub const UNHEALTHY_TOMBSTONE_RATIO: f64 = 0.30;
/// Tombstone ratio at or above which a graph is `Degraded`.
pub const DEGRADED_TOMBSTONE_RATIO: f64 = 0.15;

/// Overall health classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    /// Nothing needs attention.
    Healthy,
    /// Tombstone pressure is building; a GC pass is advisable soon.
    Degraded,
    /// Either tombstone pressure is severe, or a writer's tip is not
    /// witnessed by the last coverage anchor.
    Unhealthy,
}

/// A point-in-time health assessment.
#[derive(Clone, Debug, PartialEq)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// The tombstone ratio the assessment was based on.
    pub tombstone_ratio: f64,
    /// Writers whose current tip is not reachable from the last coverage
    /// anchor (`spec.md` §5's octopus-merge coverage witness).
    pub missing_from_coverage: Vec<String>,
}

/// Assess health from GC metrics and a coverage gap list.
#[must_use]
pub fn assess(metrics: &GcMetrics, missing_from_coverage: Vec<String>) -> HealthReport {
    let ratio = metrics.tombstone_ratio();
    let status = if !missing_from_coverage.is_empty() || ratio >= UNHEALTHY_TOMBSTONE_RATIO {
        HealthStatus::Unhealthy
    } else if ratio >= DEGRADED_TOMBSTONE_RATIO {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    HealthReport {
        status,
        tombstone_ratio: ratio,
        missing_from_coverage,
    }
}

/// Which writers in `frontier` are not reachable from `coverage_head` (a
/// writer with no coverage anchor at all counts as missing).
///
/// # Errors
/// Propagates storage errors from the ancestry queries.
pub async fn find_missing_from_coverage<S: ObjectStore>(
    store: &S,
    frontier: &Frontier,
    coverage_head: Option<CommitId>,
) -> Result<Vec<String>> {
    let mut missing = Vec::new();
    for writer in frontier.writers().map(str::to_string).collect::<Vec<_>>() {
        let Some(tip) = frontier.get(&writer) else {
            continue;
        };
        let covered = match coverage_head {
            None => false,
            Some(head) => store.is_ancestor(tip, head).await?,
        };
        if !covered {
            missing.push(writer);
        }
    }
    Ok(missing)
}
