// SPDX-License-Identifier: Apache-2.0
//! Ref Layout: the pure mapping from `(graph, writer, purpose)` to a
//! reference name, and its inverse.
//!
//! Every name begins with `refs/<product>/<graph>/…` (`spec.md` §6); no ref
//! this module builds can escape its graph's namespace, which is the
//! invariant `spec.md` §3 calls out explicitly.

use crate::ident::{GraphName, WriterId};

const WRITERS: &str = "writers";
const CHECKPOINTS_HEAD: &str = "checkpoints/head";
const COVERAGE_HEAD: &str = "coverage/head";
const CURSOR_ACTIVE: &str = "cursor/active";
const CURSOR_SAVED: &str = "cursor/saved";
const SEEK_CACHE: &str = "seek-cache";

fn graph_root(product: &str, graph: &GraphName) -> String {
    format!("refs/{product}/{graph}")
}

/// The prefix under which all of a graph's writer tips live — the argument
/// `discover_writers` lists against.
#[must_use]
pub fn writers_prefix(product: &str, graph: &GraphName) -> String {
    format!("{}/{WRITERS}/", graph_root(product, graph))
}

/// The ref holding `writer`'s current tip commit.
#[must_use]
pub fn writer_ref(product: &str, graph: &GraphName, writer: &WriterId) -> String {
    format!("{}{writer}", writers_prefix(product, graph))
}

/// Recover the writer id from a ref name, if it is a writer-tip ref under
/// this `(product, graph)` namespace. Returns `None` for any other ref
/// (including malformed trailing segments), per `spec.md` §8's
/// reference-layout round-trip property.
#[must_use]
pub fn parse_writer(product: &str, graph: &GraphName, refname: &str) -> Option<WriterId> {
    let prefix = writers_prefix(product, graph);
    let suffix = refname.strip_prefix(&prefix)?;
    if suffix.is_empty() {
        return None;
    }
    WriterId::new(suffix).ok()
}

/// The ref holding the latest checkpoint commit.
#[must_use]
pub fn checkpoints_head(product: &str, graph: &GraphName) -> String {
    format!("{}/{CHECKPOINTS_HEAD}", graph_root(product, graph))
}

/// The ref holding the latest coverage anchor commit.
#[must_use]
pub fn coverage_head(product: &str, graph: &GraphName) -> String {
    format!("{}/{COVERAGE_HEAD}", graph_root(product, graph))
}

/// The ref holding the active seek cursor blob commit.
#[must_use]
pub fn cursor_active(product: &str, graph: &GraphName) -> String {
    format!("{}/{CURSOR_ACTIVE}", graph_root(product, graph))
}

/// The ref holding a named, saved seek cursor.
#[must_use]
pub fn cursor_saved(product: &str, graph: &GraphName, name: &str) -> String {
    format!("{}/{CURSOR_SAVED}/{name}", graph_root(product, graph))
}

/// The ref holding the seek cache blob.
#[must_use]
pub fn seek_cache(product: &str, graph: &GraphName) -> String {
    format!("{}/{SEEK_CACHE}", graph_root(product, graph))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn graph() -> GraphName {
        GraphName::new("events").unwrap()
    }

    #[test]
    fn all_refs_begin_with_product_graph_prefix() {
        let g = graph();
        let w = WriterId::new("alice").unwrap();
        let root = "refs/loom/events/";
        assert!(writer_ref("loom", &g, &w).starts_with(root));
        assert!(checkpoints_head("loom", &g).starts_with(root));
        assert!(coverage_head("loom", &g).starts_with(root));
        assert!(cursor_active("loom", &g).starts_with(root));
        assert!(cursor_saved("loom", &g, "mine").starts_with(root));
        assert!(seek_cache("loom", &g).starts_with(root));
    }

    #[test]
    fn writer_ref_round_trips_through_parse() {
        let g = graph();
        let w = WriterId::new("alice").unwrap();
        let refname = writer_ref("loom", &g, &w);
        assert_eq!(parse_writer("loom", &g, &refname), Some(w));
    }

    #[test]
    fn parse_writer_rejects_non_writer_refs() {
        let g = graph();
        assert_eq!(parse_writer("loom", &g, &checkpoints_head("loom", &g)), None);
        assert_eq!(parse_writer("loom", &g, "refs/other/graph/writers/alice"), None);
        assert_eq!(parse_writer("loom", &g, &writers_prefix("loom", &g)), None);
    }

    #[test]
    fn different_graphs_do_not_collide() {
        let g1 = GraphName::new("events").unwrap();
        let g2 = GraphName::new("events2").unwrap();
        let w = WriterId::new("alice").unwrap();
        assert_ne!(writer_ref("loom", &g1, &w), writer_ref("loom", &g2, &w));
        // A ref built for g2 must not parse under g1's namespace even though
        // "events" is a prefix of "events2".
        assert_eq!(parse_writer("loom", &g1, &writer_ref("loom", &g2, &w)), None);
    }
}
