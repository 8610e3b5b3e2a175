// SPDX-License-Identifier: Apache-2.0
//! Seek cache: memoizes tick materialization so repeated seeks over the
//! same frontier don't refold patches every time (`spec.md` §5).
//!
//! Keyed by `(frontier_hash, tick)` rather than `tick` alone — a writer's
//! chain being backfilled or a checkpoint being recreated changes the
//! frontier hash, which invalidates every memoized entry implicitly instead
//! of requiring an explicit invalidation pass.

use std::sync::Mutex;

use loom_codec::Digest;
use rustc_hash::FxHashMap;

use crate::reducer::GraphState;

/// A memoization key: which frontier, and which tick within it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SeekCacheKey {
    /// The hash of the frontier this tick was resolved against.
    pub frontier_hash: Digest,
    /// The tick materialized.
    pub tick: u64,
}

/// Storage for memoized `(frontier_hash, tick) → GraphState` materializations.
pub trait SeekCache: Send + Sync {
    /// Fetch a memoized state, if present.
    fn get(&self, key: SeekCacheKey) -> Option<GraphState>;
    /// Store a materialized state under `key`.
    fn put(&self, key: SeekCacheKey, state: GraphState);
    /// Drop every memoized entry.
    fn clear(&self);
}

/// An in-process, in-memory [`SeekCache`]. Not persisted — a process
/// restart starts cold, which is correct: the cache is purely an
/// optimization over [`crate::checkpoint::CheckpointService`] and
/// [`crate::tick_index`].
#[derive(Default)]
pub struct InMemorySeekCache {
    entries: Mutex<FxHashMap<SeekCacheKey, GraphState>>,
}

impl SeekCache for InMemorySeekCache {
    fn get(&self, key: SeekCacheKey) -> Option<GraphState> {
        #[allow(clippy::unwrap_used)]
        self.entries.lock().unwrap().get(&key).cloned()
    }

    fn put(&self, key: SeekCacheKey, state: GraphState) {
        #[allow(clippy::unwrap_used)]
        self.entries.lock().unwrap().insert(key, state);
    }

    fn clear(&self) {
        #[allow(clippy::unwrap_used)]
        self.entries.lock().unwrap().clear();
    }
}
