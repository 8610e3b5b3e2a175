// SPDX-License-Identifier: Apache-2.0
//! Commit message composition and parsing (`spec.md` §6).
//!
//! Three kinds of commit carry a structured message as their first line
//! plus `<product>-key: value` trailers. Parsers tolerate additional
//! trailer lines for forward compatibility — an unrecognized trailer is
//! preserved by `get_node_info` and simply ignored here, never an error.

use std::collections::BTreeMap;

use loom_cas::BlobOid;
use loom_codec::Digest;

fn trailers(product: &str, body: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in body.lines().skip(1) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let Some(stripped) = key.strip_prefix(product).and_then(|k| k.strip_prefix('-')) else {
            continue;
        };
        map.insert(stripped.to_string(), value.trim().to_string());
    }
    map
}

fn parse_oid(s: &str) -> Option<Digest> {
    if s.len() != 64 {
        return None;
    }
    let mut bytes = [0u8; 32];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hex = std::str::from_utf8(chunk).ok()?;
        bytes[i] = u8::from_str_radix(hex, 16).ok()?;
    }
    Some(Digest(bytes))
}

/// Decoded fields of a `<product>:patch` commit message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchMessage {
    /// The graph this patch belongs to.
    pub graph: String,
    /// The writer that authored the patch.
    pub writer: String,
    /// The patch's Lamport stamp.
    pub lamport: u64,
    /// The blob holding the canonically encoded patch.
    pub patch_oid: BlobOid,
}

/// Build a `<product>:patch` commit message.
#[must_use]
pub fn build_patch_message(
    product: &str,
    graph: &str,
    writer: &str,
    lamport: u64,
    patch_oid: BlobOid,
) -> String {
    format!(
        "{product}:patch\n{product}-kind: patch\n{product}-graph: {graph}\n{product}-writer: {writer}\n{product}-lamport: {lamport}\n{product}-patch: {patch_oid}\n"
    )
}

/// Parse a `<product>:patch` commit message. Returns `None` if `body` is
/// not a patch message for `product` (including a message of a different
/// kind).
#[must_use]
pub fn parse_patch_message(product: &str, body: &str) -> Option<PatchMessage> {
    let first = body.lines().next()?;
    if first != format!("{product}:patch") {
        return None;
    }
    let t = trailers(product, body);
    Some(PatchMessage {
        graph: t.get("graph")?.clone(),
        writer: t.get("writer")?.clone(),
        lamport: t.get("lamport")?.parse().ok()?,
        patch_oid: BlobOid(parse_oid(t.get("patch")?)?),
    })
}

/// Decoded fields of a `<product>:checkpoint` commit message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMessage {
    /// The graph this checkpoint belongs to.
    pub graph: String,
    /// The `GraphState`'s content hash at the time of the checkpoint.
    pub state_hash: Digest,
    /// The blob holding the canonically encoded frontier.
    pub frontier_oid: BlobOid,
    /// The blob holding the canonically encoded tick index, if built.
    pub index_oid: Option<BlobOid>,
    /// The schema this checkpoint was taken under.
    pub schema: u8,
}

/// Build a `<product>:checkpoint` commit message.
#[must_use]
pub fn build_checkpoint_message(
    product: &str,
    graph: &str,
    state_hash: Digest,
    frontier_oid: BlobOid,
    index_oid: Option<BlobOid>,
    schema: u8,
) -> String {
    let mut msg = format!(
        "{product}:checkpoint\n{product}-kind: checkpoint\n{product}-graph: {graph}\n{product}-state-hash: {state_hash}\n{product}-frontier-oid: {frontier_oid}\n{product}-schema: {schema}\n"
    );
    if let Some(idx) = index_oid {
        msg.push_str(&format!("{product}-index-oid: {idx}\n"));
    }
    msg
}

/// Parse a `<product>:checkpoint` commit message.
#[must_use]
pub fn parse_checkpoint_message(product: &str, body: &str) -> Option<CheckpointMessage> {
    let first = body.lines().next()?;
    if first != format!("{product}:checkpoint") {
        return None;
    }
    let t = trailers(product, body);
    Some(CheckpointMessage {
        graph: t.get("graph")?.clone(),
        state_hash: parse_oid(t.get("state-hash")?)?,
        frontier_oid: BlobOid(parse_oid(t.get("frontier-oid")?)?),
        index_oid: t.get("index-oid").and_then(|s| parse_oid(s)).map(BlobOid),
        schema: t.get("schema")?.parse().ok()?,
    })
}

/// Build a `<product>:anchor` commit message.
#[must_use]
pub fn build_anchor_message(product: &str, graph: &str) -> String {
    format!("{product}:anchor\n{product}-kind: anchor\n{product}-graph: {graph}\n")
}

/// Returns `true` if `body` is an `<product>:anchor` commit message for the
/// given graph.
#[must_use]
pub fn is_anchor_message(product: &str, body: &str) -> bool {
    body.lines().next() == Some(&format!("{product}:anchor"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn patch_message_round_trips() {
        let oid = BlobOid(loom_codec::digest(b"patch bytes"));
        let msg = build_patch_message("loom", "events", "alice", 3, oid);
        let parsed = parse_patch_message("loom", &msg).unwrap();
        assert_eq!(parsed.graph, "events");
        assert_eq!(parsed.writer, "alice");
        assert_eq!(parsed.lamport, 3);
        assert_eq!(parsed.patch_oid, oid);
    }

    #[test]
    fn patch_message_tolerates_extra_trailers() {
        let oid = BlobOid(loom_codec::digest(b"patch bytes"));
        let mut msg = build_patch_message("loom", "events", "alice", 3, oid);
        msg.push_str("loom-future-field: surprise\n");
        let parsed = parse_patch_message("loom", &msg).unwrap();
        assert_eq!(parsed.lamport, 3);
    }

    #[test]
    fn checkpoint_message_round_trips_with_and_without_index() {
        let state_hash = loom_codec::digest(b"state");
        let frontier_oid = BlobOid(loom_codec::digest(b"frontier"));
        let idx = BlobOid(loom_codec::digest(b"index"));
        let msg = build_checkpoint_message("loom", "events", state_hash, frontier_oid, Some(idx), 2);
        let parsed = parse_checkpoint_message("loom", &msg).unwrap();
        assert_eq!(parsed.state_hash, state_hash);
        assert_eq!(parsed.index_oid, Some(idx));

        let msg2 = build_checkpoint_message("loom", "events", state_hash, frontier_oid, None, 2);
        let parsed2 = parse_checkpoint_message("loom", &msg2).unwrap();
        assert_eq!(parsed2.index_oid, None);
    }

    #[test]
    fn anchor_message_detected() {
        let msg = build_anchor_message("loom", "events");
        assert!(is_anchor_message("loom", &msg));
        assert!(!is_anchor_message("loom", "loom:patch\n"));
    }

    #[test]
    fn mismatched_kind_returns_none() {
        let oid = BlobOid(loom_codec::digest(b"x"));
        let msg = build_patch_message("loom", "events", "alice", 1, oid);
        assert!(parse_checkpoint_message("loom", &msg).is_none());
    }
}
