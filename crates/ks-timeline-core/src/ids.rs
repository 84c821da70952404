//! Deterministic identifiers.
//!
//! Every id in the data model except the collection id is a SHA-256 hex
//! digest of the fields that define the entity, so re-ingesting the same
//! evidence always reproduces the same ids.

use sha2::{Digest, Sha256};

use crate::models::EventSource;

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of raw file content.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Artifact id: bound to the collection and the `/`-separated relative path.
pub fn artifact_id(collection_id: &str, rel_path: &str) -> String {
    let normalized = rel_path.replace('\\', "/");
    digest(&["artifact", collection_id, &normalized])
}

/// Version id: the artifact, the version it supersedes, and its content.
///
/// A `None` content hash marks a deletion tombstone.
pub fn version_id(artifact_id: &str, parent_id: Option<&str>, content_hash: Option<&str>) -> String {
    digest(&[
        "version",
        artifact_id,
        parent_id.unwrap_or(""),
        content_hash.unwrap_or("<deleted>"),
    ])
}

/// Event id: the exact-repeat fingerprint
/// `(source, artifact id, version id, timestamp, raw actor id)`.
pub fn event_id(
    source: EventSource,
    artifact_id: &str,
    version_id: Option<&str>,
    ts: i64,
    actor: Option<&str>,
) -> String {
    digest(&[
        "event",
        source.as_str(),
        artifact_id,
        version_id.unwrap_or(""),
        &ts.to_string(),
        actor.unwrap_or(""),
    ])
}
