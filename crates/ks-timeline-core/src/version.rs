//! Version tracking.
//!
//! Versions of one artifact form a strictly linear chain. A new version is
//! created only when the observed content hash differs from the head; an
//! identical observation is a no-op. A vanished path gets a terminal
//! tombstone version, and a later reappearance starts again from a
//! `created` delta whose parent is that tombstone.

use std::collections::HashMap;

use serde_json::json;

use crate::error::IngestError;
use crate::ids;
use crate::models::{Delta, DeltaKind, Version};

/// Count `\w+` runs.
pub fn word_count(text: &str) -> i64 {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .count() as i64
}

/// Line and word statistics between two text states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStats {
    pub lines_added: i64,
    pub lines_removed: i64,
    pub words_before: i64,
    pub words_after: i64,
}

impl TextStats {
    pub fn between(before: Option<&str>, after: Option<&str>) -> Self {
        let before = before.unwrap_or("");
        let after = after.unwrap_or("");
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for line in before.lines() {
            *counts.entry(line).or_default() += 1;
        }
        let mut lines_added = 0;
        for line in after.lines() {
            match counts.get_mut(line) {
                Some(n) if *n > 0 => *n -= 1,
                _ => lines_added += 1,
            }
        }
        let lines_removed = counts.values().sum();
        Self {
            lines_added,
            lines_removed,
            words_before: word_count(before),
            words_after: word_count(after),
        }
    }

    pub fn words_added(&self) -> i64 {
        (self.words_after - self.words_before).max(0)
    }
}

/// A content state observed by the filesystem extractor.
#[derive(Debug, Clone)]
pub struct Observed<'a> {
    pub artifact_id: &'a str,
    pub path: &'a str,
    pub content_hash: &'a str,
    pub ts: i64,
    pub size: u64,
    pub author: Option<&'a str>,
    /// Extracted text of the new content, when the file is text-like.
    pub text: Option<&'a str>,
    /// Extracted text of the head version, when a snapshot exists.
    pub prior_text: Option<&'a str>,
}

/// A version planned by the tracker, with its delta.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub version: Version,
    pub delta: Delta,
    pub words_added: i64,
}

/// Per-pass view of every artifact's version chain.
///
/// Built from the store at the start of a pass; planned versions are
/// appended so later decisions in the same pass see them as the head.
#[derive(Debug, Default)]
pub struct VersionTracker {
    chains: HashMap<String, Vec<Version>>,
}

impl VersionTracker {
    /// Seed from stored versions. Each artifact's versions must form one
    /// linear chain.
    pub fn new(versions: impl IntoIterator<Item = Version>) -> Result<Self, IngestError> {
        let mut grouped: HashMap<String, Vec<Version>> = HashMap::new();
        for v in versions {
            grouped.entry(v.artifact_id.clone()).or_default().push(v);
        }
        let mut chains = HashMap::with_capacity(grouped.len());
        for (artifact_id, versions) in grouped {
            let chain = order_chain(versions)
                .map_err(|e| IngestError::invariant(format!("artifact {}: {}", artifact_id, e)))?;
            chains.insert(artifact_id, chain);
        }
        Ok(Self { chains })
    }

    pub fn head(&self, artifact_id: &str) -> Option<&Version> {
        self.chains.get(artifact_id).and_then(|c| c.last())
    }

    pub fn chain(&self, artifact_id: &str) -> &[Version] {
        self.chains.get(artifact_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the artifact has a live (non-tombstone) head.
    pub fn is_live(&self, artifact_id: &str) -> bool {
        self.head(artifact_id).is_some_and(|h| !h.is_tombstone())
    }

    /// Latest version created at or before `ts`.
    pub fn version_at(&self, artifact_id: &str, ts: i64) -> Option<&Version> {
        self.chain(artifact_id)
            .iter()
            .rev()
            .find(|v| v.created_at <= ts)
    }

    /// Record an observed content state; `None` when it equals the head.
    pub fn observe(&mut self, obs: Observed<'_>) -> Option<NewVersion> {
        let head = self.head(obs.artifact_id).cloned();
        let kind = match &head {
            Some(h) if h.content_hash.as_deref() == Some(obs.content_hash) => return None,
            Some(h) if !h.is_tombstone() => DeltaKind::Modified,
            _ => DeltaKind::Created,
        };

        let parent_id = head.as_ref().map(|h| h.id.clone());
        // Chains are ordered by creation time even if mtimes go backwards.
        let created_at = head
            .as_ref()
            .map_or(obs.ts, |h| obs.ts.max(h.created_at));
        let id = ids::version_id(obs.artifact_id, parent_id.as_deref(), Some(obs.content_hash));

        let prior = if kind == DeltaKind::Modified {
            obs.prior_text
        } else {
            None
        };
        let stats = TextStats::between(prior, obs.text);
        let summary = match kind {
            DeltaKind::Created => format!("created {} ({} bytes)", obs.path, obs.size),
            _ if obs.text.is_some() => format!(
                "+{} / -{} lines",
                stats.lines_added, stats.lines_removed
            ),
            _ => format!("content changed ({} bytes)", obs.size),
        };
        let detail = json!({
            "path": obs.path,
            "bytes": obs.size,
            "text": obs.text.is_some(),
            "lines_added": stats.lines_added,
            "lines_removed": stats.lines_removed,
            "words_before": stats.words_before,
            "words_after": stats.words_after,
        });

        let version = Version {
            id: id.clone(),
            artifact_id: obs.artifact_id.to_string(),
            parent_id,
            content_hash: Some(obs.content_hash.to_string()),
            created_at,
            author: obs.author.map(str::to_string),
        };
        self.chains
            .entry(obs.artifact_id.to_string())
            .or_default()
            .push(version.clone());

        Some(NewVersion {
            version,
            delta: Delta {
                version_id: id,
                kind,
                summary,
                detail,
            },
            words_added: stats.words_added(),
        })
    }

    /// Terminate a live chain because its path vanished.
    pub fn tombstone(&mut self, artifact_id: &str, path: &str, ts: i64) -> Option<NewVersion> {
        let head = self.head(artifact_id)?.clone();
        if head.is_tombstone() {
            return None;
        }
        let id = ids::version_id(artifact_id, Some(&head.id), None);
        let version = Version {
            id: id.clone(),
            artifact_id: artifact_id.to_string(),
            parent_id: Some(head.id.clone()),
            content_hash: None,
            created_at: ts.max(head.created_at),
            author: None,
        };
        self.chains
            .entry(artifact_id.to_string())
            .or_default()
            .push(version.clone());
        Some(NewVersion {
            version,
            delta: Delta {
                version_id: id,
                kind: DeltaKind::Deleted,
                summary: format!("deleted {}", path),
                detail: json!({ "path": path }),
            },
            words_added: 0,
        })
    }

    /// Fill in the author of a version planned in this pass.
    pub fn attribute(&mut self, artifact_id: &str, version_id: &str, author: &str) {
        if let Some(v) = self
            .chains
            .get_mut(artifact_id)
            .and_then(|c| c.iter_mut().rev().find(|v| v.id == version_id))
        {
            if v.author.is_none() {
                v.author = Some(author.to_string());
            }
        }
    }
}

/// Order one artifact's versions root-first by following parent pointers.
pub fn order_chain(versions: Vec<Version>) -> Result<Vec<Version>, String> {
    if versions.is_empty() {
        return Ok(versions);
    }
    let total = versions.len();
    let mut by_parent: HashMap<Option<String>, Version> = HashMap::with_capacity(total);
    for v in versions {
        let key = v.parent_id.clone();
        if by_parent.insert(key, v).is_some() {
            return Err("two versions share a parent".to_string());
        }
    }
    let mut chain = Vec::with_capacity(total);
    let mut cursor: Option<String> = None;
    while let Some(v) = by_parent.remove(&cursor) {
        cursor = Some(v.id.clone());
        chain.push(v);
    }
    if chain.len() != total {
        return Err(format!(
            "chain reaches {} of {} versions from its root",
            chain.len(),
            total
        ));
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed<'a>(hash: &'a str, ts: i64, text: Option<&'a str>, prior: Option<&'a str>) -> Observed<'a> {
        Observed {
            artifact_id: "art",
            path: "a.txt",
            content_hash: hash,
            ts,
            size: 10,
            author: None,
            text,
            prior_text: prior,
        }
    }

    #[test]
    fn identical_content_is_a_no_op() {
        let mut t = VersionTracker::default();
        assert!(t.observe(observed("h1", 10, None, None)).is_some());
        assert!(t.observe(observed("h1", 20, None, None)).is_none());
        assert_eq!(t.chain("art").len(), 1);
    }

    #[test]
    fn chain_is_linear_and_parented_by_head() {
        let mut t = VersionTracker::default();
        let v1 = t.observe(observed("h1", 10, Some("a"), None)).unwrap();
        let v2 = t.observe(observed("h2", 20, Some("a\nb"), Some("a"))).unwrap();
        assert_eq!(v1.delta.kind, DeltaKind::Created);
        assert!(v1.version.parent_id.is_none());
        assert_eq!(v2.delta.kind, DeltaKind::Modified);
        assert_eq!(v2.version.parent_id.as_deref(), Some(v1.version.id.as_str()));
        assert_eq!(v2.delta.summary, "+1 / -0 lines");
        assert_eq!(v2.words_added, 1);

        let ordered = order_chain(t.chain("art").to_vec()).unwrap();
        assert_eq!(ordered.len(), 2);
        assert!(ordered[0].parent_id.is_none());
    }

    #[test]
    fn tombstone_then_reappearance() {
        let mut t = VersionTracker::default();
        t.observe(observed("h1", 10, None, None)).unwrap();
        let del = t.tombstone("art", "a.txt", 50).unwrap();
        assert_eq!(del.delta.kind, DeltaKind::Deleted);
        assert!(del.version.is_tombstone());
        assert!(t.tombstone("art", "a.txt", 60).is_none());
        assert!(!t.is_live("art"));

        let back = t.observe(observed("h1", 70, None, None)).unwrap();
        assert_eq!(back.delta.kind, DeltaKind::Created);
        assert_eq!(back.version.parent_id.as_deref(), Some(del.version.id.as_str()));
        assert_ne!(back.version.id, t.chain("art")[0].id);
    }

    #[test]
    fn creation_time_never_goes_backwards() {
        let mut t = VersionTracker::default();
        t.observe(observed("h1", 100, None, None)).unwrap();
        let v2 = t.observe(observed("h2", 40, None, None)).unwrap();
        assert_eq!(v2.version.created_at, 100);
    }

    #[test]
    fn version_at_picks_latest_not_after() {
        let mut t = VersionTracker::default();
        let v1 = t.observe(observed("h1", 10, None, None)).unwrap();
        let v2 = t.observe(observed("h2", 20, None, None)).unwrap();
        assert!(t.version_at("art", 5).is_none());
        assert_eq!(t.version_at("art", 15).unwrap().id, v1.version.id);
        assert_eq!(t.version_at("art", 20).unwrap().id, v2.version.id);
    }

    #[test]
    fn seeding_rejects_branches() {
        let root = Version {
            id: "v1".into(),
            artifact_id: "art".into(),
            parent_id: None,
            content_hash: Some("h1".into()),
            created_at: 1,
            author: None,
        };
        let a = Version {
            id: "v2".into(),
            parent_id: Some("v1".into()),
            ..root.clone()
        };
        let b = Version {
            id: "v3".into(),
            parent_id: Some("v1".into()),
            ..root.clone()
        };
        assert!(VersionTracker::new(vec![root.clone(), a.clone()]).is_ok());
        assert!(matches!(
            VersionTracker::new(vec![root, a, b]),
            Err(IngestError::Invariant(_))
        ));
    }

    #[test]
    fn text_stats_multiset() {
        let s = TextStats::between(Some("a\nb\nb"), Some("b\nc\nd"));
        assert_eq!(s.lines_added, 2);
        assert_eq!(s.lines_removed, 2);
        assert_eq!(word_count("hello, wide_world 42"), 3);
    }
}
