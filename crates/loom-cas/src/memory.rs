// SPDX-License-Identifier: Apache-2.0
//! In-memory object store.
//!
//! [`MemoryStore`] keeps every blob, tree, commit, and ref in process
//! memory behind a single mutex. It is not meant to survive a process
//! restart; it exists so `loom-core` can be driven by tests and by
//! single-process embedders without a durable backend wired up.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loom_codec::{digest, Digest};

use crate::{BlobOid, CasError, CommitId, CommitInfo, ObjectStore, TreeEntry, TreeOid};

#[derive(Debug, Clone)]
struct CommitNode {
    message: String,
    parents: Vec<CommitId>,
    tree: Option<TreeOid>,
    date: i64,
}

#[derive(Default)]
struct Inner {
    blobs: BTreeMap<BlobOid, Arc<[u8]>>,
    trees: BTreeMap<TreeOid, Vec<TreeEntry>>,
    commits: BTreeMap<CommitId, CommitNode>,
    refs: BTreeMap<String, CommitId>,
    next_date: i64,
}

/// In-memory [`ObjectStore`].
///
/// Refs are a plain `BTreeMap<String, CommitId>` guarded by a `Mutex`;
/// `update_ref` performs its compare-and-set entirely inside the lock, so
/// concurrent `commit`-retry loops never interleave a read with a stale
/// write. Commit "dates" are a monotonically increasing logical counter
/// rather than wall-clock time, which keeps tests reproducible; callers
/// that need real timestamps should use a durable backend.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of distinct refs currently set. Test/inspection helper.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        self.inner.lock().unwrap().refs.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn tree_digest(entries: &[TreeEntry]) -> Digest {
    let mut canon = Vec::with_capacity(entries.len());
    for (name, oid) in entries {
        canon.push((name.clone(), oid.0));
    }
    canon.sort_by(|a, b| a.0.cmp(&b.0));
    #[allow(clippy::unwrap_used)]
    let bytes = loom_codec::to_canonical_bytes(&canon).unwrap();
    digest(&bytes)
}

fn commit_digest(tree: Option<TreeOid>, parents: &[CommitId], message: &str) -> Digest {
    let encoded_parents: Vec<Digest> = parents.iter().map(|p| p.0).collect();
    let encoded_tree = tree.map(|t| t.0);
    #[allow(clippy::unwrap_used)]
    let bytes =
        loom_codec::to_canonical_bytes(&(encoded_tree, encoded_parents, message.to_string()))
            .unwrap();
    digest(&bytes)
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_refs(&self, prefix: &str) -> Result<Vec<String>, CasError> {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .refs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn read_ref(&self, refname: &str) -> Result<Option<CommitId>, CasError> {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        Ok(inner.refs.get(refname).copied())
    }

    async fn update_ref(
        &self,
        refname: &str,
        expected: Option<CommitId>,
        new: CommitId,
    ) -> Result<(), CasError> {
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();
        let actual = inner.refs.get(refname).copied();
        if actual != expected {
            return Err(CasError::RefConflict {
                refname: refname.to_string(),
                expected,
                actual,
            });
        }
        if !inner.commits.contains_key(&new) {
            return Err(CasError::NotFound {
                what: format!("commit {new} referenced by update_ref({refname})"),
            });
        }
        inner.refs.insert(refname.to_string(), new);
        tracing::debug!(refname, %new, "ref updated");
        Ok(())
    }

    async fn delete_ref(&self, refname: &str) -> Result<(), CasError> {
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();
        inner.refs.remove(refname);
        Ok(())
    }

    async fn write_blob(&self, bytes: &[u8]) -> Result<BlobOid, CasError> {
        let oid = BlobOid(digest(bytes));
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();
        inner.blobs.entry(oid).or_insert_with(|| Arc::from(bytes));
        Ok(oid)
    }

    async fn read_blob(&self, oid: BlobOid) -> Result<Arc<[u8]>, CasError> {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        inner
            .blobs
            .get(&oid)
            .cloned()
            .ok_or_else(|| CasError::NotFound {
                what: format!("blob {oid}"),
            })
    }

    async fn write_tree(&self, entries: &[TreeEntry]) -> Result<TreeOid, CasError> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let oid = TreeOid(tree_digest(&sorted));
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();
        inner.trees.entry(oid).or_insert(sorted);
        Ok(oid)
    }

    async fn read_tree(&self, oid: TreeOid) -> Result<Vec<TreeEntry>, CasError> {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        inner
            .trees
            .get(&oid)
            .cloned()
            .ok_or_else(|| CasError::NotFound {
                what: format!("tree {oid}"),
            })
    }

    async fn commit_node(
        &self,
        message: String,
        parents: Vec<CommitId>,
    ) -> Result<CommitId, CasError> {
        self.write_commit(None, parents, message).await
    }

    async fn commit_node_with_tree(
        &self,
        tree: TreeOid,
        parents: Vec<CommitId>,
        message: String,
    ) -> Result<CommitId, CasError> {
        self.write_commit(Some(tree), parents, message).await
    }

    async fn get_node_info(&self, commit: CommitId) -> Result<CommitInfo, CasError> {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        let node = inner
            .commits
            .get(&commit)
            .ok_or_else(|| CasError::NotFound {
                what: format!("commit {commit}"),
            })?;
        Ok(CommitInfo {
            message: node.message.clone(),
            parents: node.parents.clone(),
            tree: node.tree,
            date: Some(node.date),
        })
    }

    async fn is_ancestor(
        &self,
        ancestor: CommitId,
        descendant: CommitId,
    ) -> Result<bool, CasError> {
        if ancestor == descendant {
            return Ok(true);
        }
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        if !inner.commits.contains_key(&descendant) {
            return Err(CasError::NotFound {
                what: format!("commit {descendant}"),
            });
        }
        let mut frontier = vec![descendant];
        let mut visited = std::collections::HashSet::new();
        visited.insert(descendant);
        while let Some(current) = frontier.pop() {
            let Some(node) = inner.commits.get(&current) else {
                continue;
            };
            for parent in &node.parents {
                if *parent == ancestor {
                    return Ok(true);
                }
                if visited.insert(*parent) {
                    frontier.push(*parent);
                }
            }
        }
        Ok(false)
    }

    async fn ping(&self) -> Result<(), CasError> {
        Ok(())
    }
}

impl MemoryStore {
    async fn write_commit(
        &self,
        tree: Option<TreeOid>,
        parents: Vec<CommitId>,
        message: String,
    ) -> Result<CommitId, CasError> {
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();
        for parent in &parents {
            if !inner.commits.contains_key(parent) {
                return Err(CasError::NotFound {
                    what: format!("parent commit {parent}"),
                });
            }
        }
        if let Some(t) = tree {
            if !inner.trees.contains_key(&t) {
                return Err(CasError::NotFound {
                    what: format!("tree {t}"),
                });
            }
        }
        let id = CommitId(commit_digest(tree, &parents, &message));
        let date = inner.next_date;
        inner.next_date += 1;
        inner.commits.entry(id).or_insert(CommitNode {
            message,
            parents,
            tree,
            date,
        });
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn store() -> MemoryStore {
        MemoryStore::new()
    }

    #[tokio::test]
    async fn blob_put_get_round_trip() {
        let s = store().await;
        let oid = s.write_blob(b"hello loom").await.unwrap();
        let got = s.read_blob(oid).await.unwrap();
        assert_eq!(&*got, b"hello loom");
    }

    #[tokio::test]
    async fn blob_read_missing_is_not_found() {
        let s = store().await;
        let oid = BlobOid(digest(b"never written"));
        let err = s.read_blob(oid).await.unwrap_err();
        assert!(matches!(err, CasError::NotFound { .. }));
    }

    #[tokio::test]
    async fn tree_round_trip_sorted_by_name() {
        let s = store().await;
        let b1 = s.write_blob(b"one").await.unwrap();
        let b2 = s.write_blob(b"two").await.unwrap();
        let oid = s
            .write_tree(&[("zz".into(), b1), ("aa".into(), b2)])
            .await
            .unwrap();
        let entries = s.read_tree(oid).await.unwrap();
        assert_eq!(entries, vec![("aa".to_string(), b2), ("zz".to_string(), b1)]);
    }

    #[tokio::test]
    async fn root_commit_has_no_parents() {
        let s = store().await;
        let c = s.commit_node("root".into(), vec![]).await.unwrap();
        let info = s.get_node_info(c).await.unwrap();
        assert!(info.parents.is_empty());
        assert_eq!(info.message, "root");
    }

    #[tokio::test]
    async fn ref_compare_and_set_succeeds_and_conflicts() {
        let s = store().await;
        let c1 = s.commit_node("c1".into(), vec![]).await.unwrap();
        let c2 = s.commit_node("c2".into(), vec![c1]).await.unwrap();

        s.update_ref("refs/loom/g/writers/a", None, c1).await.unwrap();
        assert_eq!(
            s.read_ref("refs/loom/g/writers/a").await.unwrap(),
            Some(c1)
        );

        // Correct CAS succeeds.
        s.update_ref("refs/loom/g/writers/a", Some(c1), c2)
            .await
            .unwrap();

        // Stale CAS fails with the actual value surfaced.
        let err = s
            .update_ref("refs/loom/g/writers/a", Some(c1), c2)
            .await
            .unwrap_err();
        match err {
            CasError::RefConflict { actual, .. } => assert_eq!(actual, Some(c2)),
            other => panic!("expected RefConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn is_ancestor_reflexive_and_transitive() {
        let s = store().await;
        let c1 = s.commit_node("c1".into(), vec![]).await.unwrap();
        let c2 = s.commit_node("c2".into(), vec![c1]).await.unwrap();
        let c3 = s.commit_node("c3".into(), vec![c2]).await.unwrap();

        assert!(s.is_ancestor(c1, c1).await.unwrap());
        assert!(s.is_ancestor(c1, c3).await.unwrap());
        assert!(!s.is_ancestor(c3, c1).await.unwrap());
    }

    #[tokio::test]
    async fn is_ancestor_across_octopus_merge() {
        let s = store().await;
        let a = s.commit_node("a".into(), vec![]).await.unwrap();
        let b = s.commit_node("b".into(), vec![]).await.unwrap();
        let c = s.commit_node("c".into(), vec![]).await.unwrap();
        let merge = s.commit_node("merge".into(), vec![a, b, c]).await.unwrap();

        assert!(s.is_ancestor(a, merge).await.unwrap());
        assert!(s.is_ancestor(b, merge).await.unwrap());
        assert!(s.is_ancestor(c, merge).await.unwrap());
    }

    #[tokio::test]
    async fn list_refs_filters_by_prefix_and_sorts() {
        let s = store().await;
        let c = s.commit_node("root".into(), vec![]).await.unwrap();
        s.update_ref("refs/loom/g/writers/b", None, c).await.unwrap();
        s.update_ref("refs/loom/g/writers/a", None, c).await.unwrap();
        s.update_ref("refs/loom/other/x", None, c).await.unwrap();

        let listed = s.list_refs("refs/loom/g/writers/").await.unwrap();
        assert_eq!(listed, vec!["refs/loom/g/writers/a", "refs/loom/g/writers/b"]);
    }

    #[tokio::test]
    async fn commit_with_missing_parent_is_rejected() {
        let s = store().await;
        let ghost = CommitId(digest(b"never committed"));
        let err = s.commit_node("x".into(), vec![ghost]).await.unwrap_err();
        assert!(matches!(err, CasError::NotFound { .. }));
    }

    #[tokio::test]
    async fn ping_always_ok() {
        let s = store().await;
        assert!(s.ping().await.is_ok());
    }
}
