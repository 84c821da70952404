//! Storage abstraction for ks-timeline.
//!
//! The [`Store`] trait is the single source of truth every query reads
//! from. Writes happen only through [`Store::commit_pass`], which loads the
//! state a pass needs, reconciles the batch, and applies the resulting plan
//! as one all-or-nothing unit.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::IngestError;
use crate::models::{Artifact, Collection, Delta, EventView, Participant, ScanReport, Snapshot, Version};
use crate::reconcile::{ReconcileOptions, ScanBatch};

/// Selection over the recorded events. Results are always ordered by
/// timestamp, then event id.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub collection_id: Option<String>,
    pub artifact_id: Option<String>,
    pub pid: Option<String>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn collection(id: &str) -> Self {
        Self {
            collection_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    pub fn artifact(id: &str) -> Self {
        Self {
            artifact_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    pub fn participant(pid: &str) -> Self {
        Self {
            pid: Some(pid.to_string()),
            ..Default::default()
        }
    }
}

/// Entity counts for the store overview.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub collections: i64,
    pub artifacts: i64,
    pub versions: i64,
    pub events: i64,
    pub participants: i64,
    pub snapshots: i64,
}

/// Abstract persistent store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`open_collection`](Store::open_collection) | Get or register the collection for a root path |
/// | [`commit_pass`](Store::commit_pass) | Reconcile and persist one scan pass atomically |
/// | [`events`](Store::events) | Ordered event views for timelines and metrics |
/// | [`versions`](Store::versions) | One artifact's chain, root first |
/// | [`snapshot`](Store::snapshot) | Stored content of a version |
#[async_trait]
pub trait Store: Send + Sync {
    /// Return the collection rooted at `candidate.root_path`, registering
    /// `candidate` when none exists yet.
    async fn open_collection(&self, candidate: &Collection) -> Result<Collection>;

    /// Reconcile `batch` against the current state and persist the plan.
    ///
    /// Either every write of the pass lands or none does. The returned
    /// report has status `Committed`.
    async fn commit_pass(
        &self,
        collection_id: &str,
        batch: ScanBatch,
        options: &ReconcileOptions,
    ) -> Result<ScanReport, IngestError>;

    async fn collections(&self) -> Result<Vec<Collection>>;

    async fn collection(&self, id: &str) -> Result<Option<Collection>>;

    async fn artifacts(&self, collection_id: &str) -> Result<Vec<Artifact>>;

    async fn artifact(&self, id: &str) -> Result<Option<Artifact>>;

    /// Versions of one artifact, root first.
    async fn versions(&self, artifact_id: &str) -> Result<Vec<Version>>;

    async fn delta(&self, version_id: &str) -> Result<Option<Delta>>;

    async fn events(&self, filter: &EventFilter) -> Result<Vec<EventView>>;

    /// All participants, ordered by participant id.
    async fn participants(&self) -> Result<Vec<Participant>>;

    /// Set or clear a display name. Returns `false` for an unknown pid.
    async fn set_display_name(&self, pid: &str, name: Option<&str>) -> Result<bool>;

    async fn snapshot(&self, version_id: &str) -> Result<Option<Snapshot>>;

    async fn counts(&self) -> Result<StoreCounts>;
}
