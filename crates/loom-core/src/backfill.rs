// SPDX-License-Identifier: Apache-2.0
//! Backfill validation: deciding whether an incoming writer-tip commit may
//! be accepted against the last checkpointed frontier (`spec.md` §5).
//!
//! Four outcomes fall out of comparing one writer's incoming commit to its
//! checkpointed commit by ancestry: identical, strictly ahead (the normal
//! case — new patches since the checkpoint), strictly behind (a stale
//! writer replaying patches the checkpoint already covers), or diverged (no
//! ancestry relation either way — the writer forked its own chain, which a
//! well-behaved writer never does).

use loom_cas::{CommitId, ObjectStore};

use crate::error::{LoomError, Result};

/// The relation an incoming writer-tip commit has to the last checkpointed
/// commit for that writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackfillClass {
    /// The incoming commit equals the checkpointed commit exactly.
    Same,
    /// The checkpointed commit is an ancestor of the incoming commit: the
    /// normal case.
    Ahead,
    /// The incoming commit is an ancestor of the checkpointed commit: the
    /// writer is replaying patches the checkpoint already covers.
    Behind,
    /// Neither commit is an ancestor of the other: the writer's chain forked.
    Diverged,
}

/// Classifies and validates incoming writer-tip commits against a
/// checkpoint frontier.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillValidator;

impl BackfillValidator {
    /// Classify `incoming` against `checkpointed` (`None` meaning the writer
    /// has no prior checkpointed tip — a brand-new writer, always `Ahead`).
    ///
    /// # Errors
    /// Propagates storage errors from the ancestry queries.
    pub async fn classify<S: ObjectStore>(
        &self,
        store: &S,
        checkpointed: Option<CommitId>,
        incoming: CommitId,
    ) -> Result<BackfillClass> {
        let Some(checkpointed) = checkpointed else {
            return Ok(BackfillClass::Ahead);
        };
        if checkpointed == incoming {
            return Ok(BackfillClass::Same);
        }
        if store.is_ancestor(checkpointed, incoming).await? {
            return Ok(BackfillClass::Ahead);
        }
        if store.is_ancestor(incoming, checkpointed).await? {
            return Ok(BackfillClass::Behind);
        }
        Ok(BackfillClass::Diverged)
    }

    /// Classify and enforce: accept only `Ahead`, reject `Same`/`Behind`
    /// with [`LoomError::BackfillRejected`], and `Diverged` with
    /// [`LoomError::WriterFork`].
    ///
    /// # Errors
    /// See variants above.
    #[tracing::instrument(skip(self, store), fields(writer))]
    pub async fn validate<S: ObjectStore>(
        &self,
        store: &S,
        writer: &str,
        checkpointed: Option<CommitId>,
        incoming: CommitId,
    ) -> Result<()> {
        match self.classify(store, checkpointed, incoming).await? {
            BackfillClass::Ahead => Ok(()),
            BackfillClass::Same | BackfillClass::Behind => {
                tracing::warn!(writer, "backfill rejected: incoming commit not ahead of checkpoint");
                Err(LoomError::BackfillRejected {
                    writer: writer.to_string(),
                })
            }
            BackfillClass::Diverged => {
                tracing::warn!(writer, "writer fork detected against checkpoint frontier");
                Err(LoomError::WriterFork {
                    writer: writer.to_string(),
                })
            }
        }
    }
}

/// `is_ancestor` lifted over an optional `ancestor`: `None` never has
/// anything as a descendant, so this is always `false` rather than an error
/// (`spec.md` §8's testable property).
///
/// # Errors
/// Propagates storage errors from the ancestry query.
pub async fn is_ancestor_opt<S: ObjectStore>(
    store: &S,
    ancestor: Option<CommitId>,
    descendant: CommitId,
) -> Result<bool> {
    match ancestor {
        None => Ok(false),
        Some(a) => Ok(store.is_ancestor(a, descendant).await?),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use loom_cas::MemoryStore;

    async fn root(store: &MemoryStore) -> CommitId {
        store.commit_node("root".to_string(), vec![]).await.unwrap()
    }

    async fn child(store: &MemoryStore, parent: CommitId, label: &str) -> CommitId {
        store.commit_node(label.to_string(), vec![parent]).await.unwrap()
    }

    #[tokio::test]
    async fn same_commit_classifies_same() {
        let store = MemoryStore::default();
        let c = root(&store).await;
        let v = BackfillValidator;
        assert_eq!(v.classify(&store, Some(c), c).await.unwrap(), BackfillClass::Same);
        assert!(v.validate(&store, "w", Some(c), c).await.is_err());
    }

    #[tokio::test]
    async fn descendant_of_checkpoint_is_ahead() {
        let store = MemoryStore::default();
        let cp = root(&store).await;
        let incoming = child(&store, cp, "patch-2").await;
        let v = BackfillValidator;
        assert_eq!(v.classify(&store, Some(cp), incoming).await.unwrap(), BackfillClass::Ahead);
        assert!(v.validate(&store, "w", Some(cp), incoming).await.is_ok());
    }

    #[tokio::test]
    async fn ancestor_of_checkpoint_is_behind() {
        let store = MemoryStore::default();
        let root_commit = root(&store).await;
        let cp = child(&store, root_commit, "patch-2").await;
        let v = BackfillValidator;
        assert_eq!(
            v.classify(&store, Some(cp), root_commit).await.unwrap(),
            BackfillClass::Behind
        );
        assert!(v.validate(&store, "w", Some(cp), root_commit).await.is_err());
    }

    #[tokio::test]
    async fn unrelated_commits_diverge() {
        let store = MemoryStore::default();
        let cp = root(&store).await;
        let other_root = root_distinct(&store).await;
        let v = BackfillValidator;
        assert_eq!(
            v.classify(&store, Some(cp), other_root).await.unwrap(),
            BackfillClass::Diverged
        );
        assert!(matches!(
            v.validate(&store, "w", Some(cp), other_root).await,
            Err(LoomError::WriterFork { .. })
        ));
    }

    async fn root_distinct(store: &MemoryStore) -> CommitId {
        store.commit_node("root-distinct".to_string(), vec![]).await.unwrap()
    }

    #[tokio::test]
    async fn no_checkpoint_is_always_ahead() {
        let store = MemoryStore::default();
        let incoming = root(&store).await;
        let v = BackfillValidator;
        assert_eq!(v.classify(&store, None, incoming).await.unwrap(), BackfillClass::Ahead);
        assert!(v.validate(&store, "w", None, incoming).await.is_ok());
    }

    #[tokio::test]
    async fn is_ancestor_opt_is_false_for_none() {
        let store = MemoryStore::default();
        let c = root(&store).await;
        assert!(!is_ancestor_opt(&store, None, c).await.unwrap());
    }
}
