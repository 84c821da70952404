//! Core data model.
//!
//! These types describe the reconciled state shared by every component:
//! collections, artifacts, their content-addressed versions and deltas,
//! change events from both evidence sources, and pseudonymous participants.
//! All timestamps are Unix seconds (UTC).

use serde::{Deserialize, Serialize};

use crate::formats::LogFormat;

/// One watched root directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    pub root_path: String,
    pub label: String,
    pub created_at: i64,
    pub last_scan: Option<i64>,
    pub total_files: i64,
    pub total_bytes: i64,
}

/// Inferred artifact type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Text,
    Markdown,
    Json,
    Docx,
    Pptx,
    Pdf,
    Diagram,
    Other,
    /// Named by a log record but never observed on disk.
    Unit,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Text => "text",
            ArtifactKind::Markdown => "md",
            ArtifactKind::Json => "json",
            ArtifactKind::Docx => "docx",
            ArtifactKind::Pptx => "pptx",
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Diagram => "diagram",
            ArtifactKind::Other => "other",
            ArtifactKind::Unit => "unit",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "text" => ArtifactKind::Text,
            "md" => ArtifactKind::Markdown,
            "json" => ArtifactKind::Json,
            "docx" => ArtifactKind::Docx,
            "pptx" => ArtifactKind::Pptx,
            "pdf" => ArtifactKind::Pdf,
            "diagram" => ArtifactKind::Diagram,
            "unit" => ArtifactKind::Unit,
            _ => ArtifactKind::Other,
        }
    }

    /// Infer the kind from a path's extension.
    pub fn from_path(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "rst" | "csv" | "log" | "ini" | "cfg" | "conf" | "yaml" | "yml" | "xml" => {
                ArtifactKind::Text
            }
            "md" | "markdown" => ArtifactKind::Markdown,
            "json" | "jsonl" => ArtifactKind::Json,
            "docx" => ArtifactKind::Docx,
            "pptx" => ArtifactKind::Pptx,
            "pdf" => ArtifactKind::Pdf,
            "drawio" | "svg" | "vsdx" | "excalidraw" => ArtifactKind::Diagram,
            _ => ArtifactKind::Other,
        }
    }
}

/// One logical file within a collection; identity is bound to its path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub collection_id: String,
    pub path: String,
    pub kind: ArtifactKind,
    pub title: Option<String>,
    pub first_seen: i64,
}

/// One observed content state of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    pub id: String,
    pub artifact_id: String,
    pub parent_id: Option<String>,
    /// SHA-256 of the content; `None` for a deletion tombstone.
    pub content_hash: Option<String>,
    pub created_at: i64,
    pub author: Option<String>,
}

impl Version {
    pub fn is_tombstone(&self) -> bool {
        self.content_hash.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Created,
    Modified,
    Deleted,
}

impl DeltaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaKind::Created => "created",
            DeltaKind::Modified => "modified",
            DeltaKind::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(DeltaKind::Created),
            "modified" => Some(DeltaKind::Modified),
            "deleted" => Some(DeltaKind::Deleted),
            _ => None,
        }
    }
}

/// Transition from a version's parent to the version itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    pub version_id: String,
    pub kind: DeltaKind,
    pub summary: String,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Filesystem,
    Log,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Filesystem => "filesystem",
            EventSource::Log => "log",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "filesystem" => Some(EventSource::Filesystem),
            "log" => Some(EventSource::Log),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Modified,
    Deleted,
    Renamed,
    Moved,
    Commented,
    Note,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Modified => "modified",
            EventType::Deleted => "deleted",
            EventType::Renamed => "renamed",
            EventType::Moved => "moved",
            EventType::Commented => "commented",
            EventType::Note => "note",
        }
    }

    /// Map a verb found in a log row onto an event type.
    pub fn from_action(action: &str) -> Self {
        match action.trim().to_ascii_lowercase().as_str() {
            "created" | "create" | "added" | "add" | "uploaded" => EventType::Created,
            "edited" | "edit" | "modified" | "updated" | "changed" => EventType::Modified,
            "deleted" | "delete" | "removed" | "trashed" => EventType::Deleted,
            "renamed" | "rename" => EventType::Renamed,
            "moved" | "move" => EventType::Moved,
            "commented" | "comment" | "replied" => EventType::Commented,
            _ => EventType::Note,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventType::Created),
            "modified" => Some(EventType::Modified),
            "deleted" => Some(EventType::Deleted),
            "renamed" => Some(EventType::Renamed),
            "moved" => Some(EventType::Moved),
            "commented" => Some(EventType::Commented),
            "note" => Some(EventType::Note),
            _ => None,
        }
    }
}

impl From<DeltaKind> for EventType {
    fn from(kind: DeltaKind) -> Self {
        match kind {
            DeltaKind::Created => EventType::Created,
            DeltaKind::Modified => EventType::Modified,
            DeltaKind::Deleted => EventType::Deleted,
        }
    }
}

/// Fields every piece of evidence carries regardless of its source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub ts: i64,
    pub actor: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsEvidence {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub rel_path: String,
    pub change: DeltaKind,
    pub content_hash: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEvidence {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub log_path: String,
    pub format: LogFormat,
    pub line: usize,
    pub action: String,
    pub unit: Option<String>,
    pub excerpt: Option<String>,
    pub row: String,
}

/// Raw evidence behind an event, kept verbatim for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Evidence {
    Filesystem(FsEvidence),
    Log(LogEvidence),
}

impl Evidence {
    pub fn envelope(&self) -> &Envelope {
        match self {
            Evidence::Filesystem(fs) => &fs.envelope,
            Evidence::Log(log) => &log.envelope,
        }
    }

    pub fn source(&self) -> EventSource {
        match self {
            Evidence::Filesystem(_) => EventSource::Filesystem,
            Evidence::Log(_) => EventSource::Log,
        }
    }
}

/// One atomic, timestamped, immutable piece of evidence of change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub source: EventSource,
    pub event_type: EventType,
    pub artifact_id: String,
    pub version_id: Option<String>,
    pub actor: Option<String>,
    pub ts: i64,
    pub summary: String,
    pub excerpt: Option<String>,
    pub words_added: i64,
    pub raw: Evidence,
}

/// Stable pseudonymous identity for one raw actor id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub raw_id: String,
    pub pid: String,
    pub display_name: Option<String>,
    pub first_seen: i64,
}

impl Participant {
    /// Display name when set, otherwise the participant id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.pid)
    }
}

/// A gap-bounded run of one participant's events. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub pid: String,
    pub start: i64,
    pub end: i64,
    pub event_count: usize,
}

/// Read-side projection of an event joined with its artifact and participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventView {
    pub id: String,
    pub source: EventSource,
    pub event_type: EventType,
    pub collection_id: String,
    pub artifact_id: String,
    pub artifact_path: String,
    pub version_id: Option<String>,
    pub actor: Option<String>,
    pub pid: Option<String>,
    pub actor_label: Option<String>,
    pub ts: i64,
    pub summary: String,
    pub excerpt: Option<String>,
    pub words_added: i64,
}

/// Stored content snapshot, addressed by content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub content_hash: String,
    pub bytes: Vec<u8>,
    pub text: Option<String>,
}

/// An evidence item that could not be used, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedItem {
    pub path: String,
    pub line: Option<usize>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Committed,
    Failed,
}

/// Outcome of one `Ingest` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanReport {
    pub collection_id: String,
    pub status: PassStatus,
    pub files_seen: u64,
    pub bytes_seen: u64,
    pub log_files: u64,
    pub log_records: u64,
    pub new_artifacts: u64,
    pub new_versions: u64,
    pub new_deltas: u64,
    pub new_events: u64,
    pub new_participants: u64,
    /// Filesystem candidates dropped in favor of a matching log event.
    pub cross_source_duplicates: u64,
    /// Candidates whose fingerprint was already recorded.
    pub repeated_events: u64,
    pub skipped: Vec<SkippedItem>,
    pub error: Option<String>,
}

impl ScanReport {
    pub fn new(collection_id: &str) -> Self {
        Self {
            collection_id: collection_id.to_string(),
            status: PassStatus::Failed,
            files_seen: 0,
            bytes_seen: 0,
            log_files: 0,
            log_records: 0,
            new_artifacts: 0,
            new_versions: 0,
            new_deltas: 0,
            new_events: 0,
            new_participants: 0,
            cross_source_duplicates: 0,
            repeated_events: 0,
            skipped: Vec::new(),
            error: None,
        }
    }
}
