// SPDX-License-Identifier: Apache-2.0
//! The `Graph` façade: the single entry point wiring the reducer, frontier,
//! checkpoint, backfill, tick index, and GC/health machinery together over
//! one `ObjectStore` (`spec.md` §2/§5).

use loom_cas::{CommitId, ObjectStore};
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointService;
use crate::error::{LoomError, Result};
use crate::frontier::Frontier;
use crate::gc::{self, GcPolicy};
use crate::health::{self, HealthReport};
use crate::ident::{GraphName, WriterId};
use crate::message::{build_anchor_message, parse_patch_message};
use crate::patch::{load_patch, DeleteGuardPolicy, PatchBuilder, CURRENT_SCHEMA};
use crate::reducer::{reduce, GraphState};
use crate::refs;
use crate::tick_index::{self, TickIndex};

/// Per-graph configuration a caller supplies to [`Graph::open`]. There is no
/// environment or file-based configuration inside the core (`spec.md` §9
/// ambient addendum) — a hosting process is responsible for sourcing these
/// values however it likes and constructing this struct.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// The product tag every ref and commit message under this graph is
    /// namespaced by (`refs/<product>/<graph>/...`).
    pub product: String,
    /// The schema new patches are built under. Only [`CURRENT_SCHEMA`] is
    /// accepted; anything else fails `open` immediately.
    pub schema: u8,
    /// How [`PatchBuilder::remove_node`] behaves when the target node has
    /// live dependents.
    pub delete_guard_policy: DeleteGuardPolicy,
    /// Thresholds governing when a GC pass is recommended.
    pub gc_policy: GcPolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            product: "loom".to_string(),
            schema: CURRENT_SCHEMA,
            delete_guard_policy: DeleteGuardPolicy::default(),
            gc_policy: GcPolicy::default(),
        }
    }
}

/// A handle onto one graph, scoped to one writer identity, backed by one
/// object store.
pub struct Graph<'s, S: ObjectStore> {
    store: &'s S,
    graph: GraphName,
    writer: WriterId,
    config: GraphConfig,
}

impl<'s, S: ObjectStore> Graph<'s, S> {
    /// Open a graph for read/write as `writer`.
    ///
    /// # Errors
    /// [`LoomError::InvalidName`] if `config.schema` is not [`CURRENT_SCHEMA`].
    /// [`LoomError::MigrationRequired`] if a writer's tip patch predates
    /// `CURRENT_SCHEMA` and no checkpoint has yet anchored its migration.
    #[tracing::instrument(skip(store, config), fields(graph = %graph, writer = %writer))]
    pub async fn open(store: &'s S, graph: GraphName, writer: WriterId, config: GraphConfig) -> Result<Self> {
        if config.schema != CURRENT_SCHEMA {
            return Err(LoomError::InvalidName {
                name: config.schema.to_string(),
                reason: format!("only schema={CURRENT_SCHEMA} is supported"),
            });
        }
        let this = Self {
            store,
            graph,
            writer,
            config,
        };
        this.check_migration_required().await?;
        Ok(this)
    }

    async fn check_migration_required(&self) -> Result<()> {
        let checkpoint_exists = self
            .store
            .read_ref(&refs::checkpoints_head(&self.config.product, &self.graph))
            .await?
            .is_some();
        if checkpoint_exists {
            return Ok(());
        }
        for writer in self.discover_writers().await? {
            let refname = refs::writer_ref(&self.config.product, &self.graph, &writer);
            let Some(tip) = self.store.read_ref(&refname).await? else {
                continue;
            };
            let patch = load_patch(self.store, &self.config.product, tip).await?;
            if patch.schema < CURRENT_SCHEMA {
                return Err(LoomError::MigrationRequired {
                    writer: writer.as_str().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Every writer that has ever committed to this graph.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn discover_writers(&self) -> Result<Vec<WriterId>> {
        let prefix = refs::writers_prefix(&self.config.product, &self.graph);
        let names = self.store.list_refs(&prefix).await?;
        Ok(names
            .into_iter()
            .filter_map(|name| refs::parse_writer(&self.config.product, &self.graph, &name))
            .collect())
    }

    /// The current per-writer tip frontier.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn get_frontier(&self) -> Result<Frontier> {
        let mut frontier = Frontier::new();
        for writer in self.discover_writers().await? {
            let refname = refs::writer_ref(&self.config.product, &self.graph, &writer);
            if let Some(tip) = self.store.read_ref(&refname).await? {
                frontier.set(writer.as_str(), tip);
            }
        }
        Ok(frontier)
    }

    async fn tick_index(&self, frontier: &Frontier) -> Result<TickIndex> {
        tick_index::discover_ticks(self.store, &self.config.product, frontier).await
    }

    /// Materialize the current state: from the latest checkpoint forward if
    /// one exists, or by folding the full history otherwise.
    ///
    /// # Errors
    /// Propagates storage and codec errors.
    #[tracing::instrument(skip(self), fields(graph = %self.graph))]
    pub async fn materialize(&self) -> Result<GraphState> {
        let frontier = self.get_frontier().await?;
        let checkpoint_commit = self
            .store
            .read_ref(&refs::checkpoints_head(&self.config.product, &self.graph))
            .await?;

        match checkpoint_commit {
            Some(commit) => {
                CheckpointService
                    .materialize_incremental(self.store, &self.config.product, commit, &frontier)
                    .await
            }
            None => {
                let index = self.tick_index(&frontier).await?;
                let mut patches = Vec::with_capacity(index.ticks.len());
                for entry in &index.ticks {
                    patches.push(load_patch(self.store, &self.config.product, entry.commit).await?);
                }
                Ok(reduce(&patches))
            }
        }
    }

    /// Materialize the state pinned by a specific checkpoint commit,
    /// bypassing the current frontier entirely.
    ///
    /// # Errors
    /// Propagates [`CheckpointService::load`]'s errors.
    pub async fn materialize_at(&self, checkpoint_commit: CommitId) -> Result<GraphState> {
        Ok(CheckpointService
            .load(self.store, &self.config.product, checkpoint_commit)
            .await?
            .state)
    }

    /// Create a new checkpoint pinning the current materialized state and
    /// frontier, then advance `checkpoints/head` to it.
    ///
    /// # Errors
    /// Propagates storage and codec errors.
    #[tracing::instrument(skip(self), fields(graph = %self.graph))]
    pub async fn create_checkpoint(&self) -> Result<CommitId> {
        let state = self.materialize().await?;
        let frontier = self.get_frontier().await?;
        let parents: Vec<CommitId> = frontier.iter().map(|(_, c)| c).collect();

        let refname = refs::checkpoints_head(&self.config.product, &self.graph);
        loop {
            let expected = self.store.read_ref(&refname).await?;
            let mut all_parents = parents.clone();
            all_parents.extend(expected);
            let commit = CheckpointService
                .create(
                    self.store,
                    &self.config.product,
                    self.graph.as_str(),
                    &state,
                    &frontier,
                    all_parents,
                    CURRENT_SCHEMA,
                )
                .await?;
            match self.store.update_ref(&refname, expected, commit).await {
                Ok(()) => {
                    tracing::debug!(%commit, "checkpoint created");
                    return Ok(commit);
                }
                Err(loom_cas::CasError::RefConflict { .. }) => continue,
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Create a coverage anchor: an octopus-merge commit whose parents are
    /// every writer's current tip, witnessing that the graph has observed
    /// all of them at least once.
    ///
    /// # Errors
    /// Propagates storage errors.
    #[tracing::instrument(skip(self), fields(graph = %self.graph))]
    pub async fn sync_coverage(&self) -> Result<CommitId> {
        let frontier = self.get_frontier().await?;
        let parents: Vec<CommitId> = frontier.iter().map(|(_, c)| c).collect();
        let message = build_anchor_message(&self.config.product, self.graph.as_str());
        let commit = self.store.commit_node(message, parents).await?;

        let refname = refs::coverage_head(&self.config.product, &self.graph);
        loop {
            let expected = self.store.read_ref(&refname).await?;
            match self.store.update_ref(&refname, expected, commit).await {
                Ok(()) => return Ok(commit),
                Err(loom_cas::CasError::RefConflict { .. }) => continue,
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// A point-in-time health assessment combining GC pressure and coverage
    /// gaps.
    ///
    /// # Errors
    /// Propagates storage and codec errors.
    pub async fn status(&self) -> Result<HealthReport> {
        let state = self.materialize().await?;
        let metrics = gc::collect_gc_metrics(&state);
        let frontier = self.get_frontier().await?;
        let coverage_head = self
            .store
            .read_ref(&refs::coverage_head(&self.config.product, &self.graph))
            .await?;
        let missing = health::find_missing_from_coverage(self.store, &frontier, coverage_head).await?;
        Ok(health::assess(&metrics, missing))
    }

    /// Begin building this writer's next patch, optionally supplying a
    /// cached materialized state for the delete-guard check and default
    /// observed frontier.
    #[must_use]
    pub fn patch_builder<'c>(&'c self, cached_state: Option<&'c GraphState>) -> PatchBuilder<'c, S> {
        PatchBuilder::new(
            self.store,
            self.config.product.clone(),
            self.graph.clone(),
            self.writer.clone(),
            self.config.delete_guard_policy,
            cached_state,
        )
    }

    /// The graph name this handle is scoped to.
    #[must_use]
    pub fn name(&self) -> &GraphName {
        &self.graph
    }

    /// The writer identity this handle is scoped to.
    #[must_use]
    pub fn writer(&self) -> &WriterId {
        &self.writer
    }

    /// The underlying object store, for sibling modules extending this
    /// façade (e.g. [`crate::sync`]).
    pub(crate) fn store(&self) -> &S {
        self.store
    }

    /// The product tag this handle is namespaced under.
    pub(crate) fn product(&self) -> &str {
        &self.config.product
    }
}

/// Inspect the commit message on a writer-tip commit without decoding the
/// full patch — used by diagnostics that only need the Lamport stamp.
pub(crate) fn peek_lamport(product: &str, message: &str) -> Option<u64> {
    parse_patch_message(product, message).map(|p| p.lamport)
}
