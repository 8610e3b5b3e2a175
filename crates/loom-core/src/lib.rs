// SPDX-License-Identifier: Apache-2.0
//! loom-core: a multi-writer, eventually-consistent CRDT graph layered on a
//! content-addressed object store.
//!
//! Every writer appends [`patch::Patch`]es to its own chain; [`reducer`]
//! folds any set of patches from any writer, in any arrival order, into one
//! deterministic [`reducer::GraphState`]. [`checkpoint`] pins periodic
//! snapshots so readers don't refold a graph's entire history, [`backfill`]
//! validates that an incoming writer tip actually extends what a checkpoint
//! already covers, and [`seek`] lets a caller address and diff any point in
//! a graph's history by tick ordinal. [`graph::Graph`] wires all of this
//! together behind one façade over a single [`loom_cas::ObjectStore`] — the
//! only external collaborator this crate assumes of its storage substrate.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod backfill;
mod checkpoint;
mod error;
mod frontier;
mod gc;
mod graph;
mod health;
mod ident;
mod message;
mod ops;
mod patch;
mod reducer;
mod refs;
mod seek;
mod seek_cache;
mod sync;
mod tick_index;

/// Backfill classification and validation against a checkpointed frontier.
pub use backfill::{is_ancestor_opt, BackfillClass, BackfillValidator};
/// Checkpoint creation, loading, and incremental replay.
pub use checkpoint::{CheckpointService, LoadedCheckpoint};
/// The core's single error type and result alias.
pub use error::{LoomError, Result};
/// Per-writer tip frontiers.
pub use frontier::Frontier;
/// Garbage collection metrics, policy, and execution.
pub use gc::{collect_gc_metrics, execute_gc, should_run_gc, GcMetrics, GcPolicy};
/// The `Graph` façade and its configuration.
pub use graph::{Graph, GraphConfig};
/// Health assessment.
pub use health::{find_missing_from_coverage, HealthReport, HealthStatus};
/// Identifier types: writer identity, graph name, node id, and CRDT dots.
pub use ident::{Dot, GraphName, NodeId, WriterId};
/// The operation algebra a patch carries.
pub use ops::{BlobRef, EdgeKey, Operation, PropValue};
/// Patch construction and the delete-guard policy.
pub use patch::{DeleteGuardPolicy, Patch, PatchBuilder, CURRENT_SCHEMA};
/// The CRDT reducer and materialized graph state.
pub use reducer::{reduce, reduce_from, GraphState, PropRegister};
/// Seeking: tick resolution, materialization, and structural diffing.
pub use seek::{Cursor, SeekEngine, SeekReceipt, StructuralDiff, TickRequest};
/// The in-memory seek cache.
pub use seek_cache::{InMemorySeekCache, SeekCache, SeekCacheKey};
/// Sync primitives for building a replication protocol on top of this core.
pub use sync::{SyncPatch, SyncRequest, SyncResponse};
/// Global tick ordering over a graph's patch history.
pub use tick_index::{discover_ticks, TickEntry, TickIndex};
