//! In-memory [`Store`] implementation for tests and embedding.
//!
//! All state lives behind one `std::sync::RwLock`. A pass holds the write
//! lock from the state load to the last write, and nothing is mutated until
//! the plan has been built and validated, so a failed pass leaves the store
//! untouched.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::IngestError;
use crate::identity::pid_order;
use crate::models::{
    Artifact, Collection, Delta, Event, EventView, Participant, PassStatus, ScanReport, Snapshot,
    Version,
};
use crate::reconcile::{ReconcileOptions, Reconciler, ScanBatch, ScanState};
use crate::version::order_chain;

use super::{EventFilter, Store, StoreCounts};

#[derive(Default)]
struct MemoryState {
    collections: Vec<Collection>,
    artifacts: Vec<Artifact>,
    versions: Vec<Version>,
    deltas: HashMap<String, Delta>,
    events: Vec<Event>,
    participants: Vec<Participant>,
    snapshots: HashMap<String, Snapshot>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn view(event: &Event, artifact: Option<&Artifact>, participant: Option<&Participant>) -> EventView {
    EventView {
        id: event.id.clone(),
        source: event.source,
        event_type: event.event_type,
        collection_id: artifact.map(|a| a.collection_id.clone()).unwrap_or_default(),
        artifact_id: event.artifact_id.clone(),
        artifact_path: artifact.map(|a| a.path.clone()).unwrap_or_default(),
        version_id: event.version_id.clone(),
        actor: event.actor.clone(),
        pid: participant.map(|p| p.pid.clone()),
        actor_label: participant.map(|p| p.label().to_string()),
        ts: event.ts,
        summary: event.summary.clone(),
        excerpt: event.excerpt.clone(),
        words_added: event.words_added,
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn open_collection(&self, candidate: &Collection) -> Result<Collection> {
        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        if let Some(existing) = state
            .collections
            .iter()
            .find(|c| c.root_path == candidate.root_path)
        {
            return Ok(existing.clone());
        }
        state.collections.push(candidate.clone());
        Ok(candidate.clone())
    }

    async fn commit_pass(
        &self,
        collection_id: &str,
        batch: ScanBatch,
        options: &ReconcileOptions,
    ) -> Result<ScanReport, IngestError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| IngestError::Persistence("in-memory store lock poisoned".into()))?;
        let collection_idx = state
            .collections
            .iter()
            .position(|c| c.id == collection_id)
            .ok_or_else(|| IngestError::Persistence(format!("unknown collection {}", collection_id)))?;

        let artifacts: Vec<Artifact> = state
            .artifacts
            .iter()
            .filter(|a| a.collection_id == collection_id)
            .cloned()
            .collect();
        let artifact_ids: HashSet<&str> = artifacts.iter().map(|a| a.id.as_str()).collect();
        let versions: Vec<Version> = state
            .versions
            .iter()
            .filter(|v| artifact_ids.contains(v.artifact_id.as_str()))
            .cloned()
            .collect();
        let known_event_ids = state
            .events
            .iter()
            .filter(|e| artifact_ids.contains(e.artifact_id.as_str()))
            .map(|e| e.id.clone())
            .collect();
        drop(artifact_ids);

        let reconciler = Reconciler::new(
            ScanState {
                collection_id: collection_id.to_string(),
                artifacts,
                versions,
                participants: state.participants.clone(),
                known_event_ids,
            },
            options.clone(),
        )?;
        let prior_texts: HashMap<String, String> = reconciler
            .needed_snapshots(&batch)
            .into_iter()
            .filter_map(|hash| {
                let text = state.snapshots.get(&hash)?.text.clone()?;
                Some((hash, text))
            })
            .collect();
        let scanned_at = batch.scanned_at;
        let (files, bytes) = (batch.files_seen, batch.bytes_seen);
        let plan = reconciler.plan(batch, &prior_texts)?;

        for promoted in plan.promoted {
            if let Some(a) = state.artifacts.iter_mut().find(|a| a.id == promoted.id) {
                *a = promoted;
            }
        }
        state.artifacts.extend(plan.artifacts);
        for snapshot in plan.snapshots {
            state
                .snapshots
                .entry(snapshot.content_hash.clone())
                .or_insert(snapshot);
        }
        state.versions.extend(plan.versions);
        for delta in plan.deltas {
            state.deltas.insert(delta.version_id.clone(), delta);
        }
        state.participants.extend(plan.participants);
        state.events.extend(plan.events);

        let collection = &mut state.collections[collection_idx];
        collection.last_scan = Some(scanned_at);
        collection.total_files = files as i64;
        collection.total_bytes = bytes as i64;

        let mut report = plan.report;
        report.status = PassStatus::Committed;
        Ok(report)
    }

    async fn collections(&self) -> Result<Vec<Collection>> {
        let mut out = self.read()?.collections.clone();
        out.sort_by(|a, b| a.root_path.cmp(&b.root_path));
        Ok(out)
    }

    async fn collection(&self, id: &str) -> Result<Option<Collection>> {
        Ok(self.read()?.collections.iter().find(|c| c.id == id).cloned())
    }

    async fn artifacts(&self, collection_id: &str) -> Result<Vec<Artifact>> {
        let mut out: Vec<Artifact> = self
            .read()?
            .artifacts
            .iter()
            .filter(|a| a.collection_id == collection_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn artifact(&self, id: &str) -> Result<Option<Artifact>> {
        Ok(self.read()?.artifacts.iter().find(|a| a.id == id).cloned())
    }

    async fn versions(&self, artifact_id: &str) -> Result<Vec<Version>> {
        let versions: Vec<Version> = self
            .read()?
            .versions
            .iter()
            .filter(|v| v.artifact_id == artifact_id)
            .cloned()
            .collect();
        order_chain(versions).map_err(|e| anyhow!("artifact {}: {}", artifact_id, e))
    }

    async fn delta(&self, version_id: &str) -> Result<Option<Delta>> {
        Ok(self.read()?.deltas.get(version_id).cloned())
    }

    async fn events(&self, filter: &EventFilter) -> Result<Vec<EventView>> {
        let state = self.read()?;
        let artifacts: HashMap<&str, &Artifact> =
            state.artifacts.iter().map(|a| (a.id.as_str(), a)).collect();
        let participants: HashMap<&str, &Participant> = state
            .participants
            .iter()
            .map(|p| (p.raw_id.as_str(), p))
            .collect();

        let mut out: Vec<EventView> = state
            .events
            .iter()
            .map(|e| {
                let participant = e.actor.as_deref().and_then(|a| participants.get(a).copied());
                view(e, artifacts.get(e.artifact_id.as_str()).copied(), participant)
            })
            .filter(|v| {
                filter
                    .collection_id
                    .as_ref()
                    .map_or(true, |c| &v.collection_id == c)
            })
            .filter(|v| filter.artifact_id.as_ref().map_or(true, |a| &v.artifact_id == a))
            .filter(|v| {
                filter
                    .pid
                    .as_ref()
                    .map_or(true, |p| v.pid.as_ref() == Some(p))
            })
            .collect();
        out.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn participants(&self) -> Result<Vec<Participant>> {
        let mut out = self.read()?.participants.clone();
        out.sort_by(|a, b| pid_order(&a.pid, &b.pid));
        Ok(out)
    }

    async fn set_display_name(&self, pid: &str, name: Option<&str>) -> Result<bool> {
        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        match state.participants.iter_mut().find(|p| p.pid == pid) {
            Some(p) => {
                p.display_name = name.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn snapshot(&self, version_id: &str) -> Result<Option<Snapshot>> {
        let state = self.read()?;
        Ok(state
            .versions
            .iter()
            .find(|v| v.id == version_id)
            .and_then(|v| v.content_hash.as_ref())
            .and_then(|hash| state.snapshots.get(hash))
            .cloned())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let state = self.read()?;
        Ok(StoreCounts {
            collections: state.collections.len() as i64,
            artifacts: state.artifacts.len() as i64,
            versions: state.versions.len() as i64,
            events: state.events.len() as i64,
            participants: state.participants.len() as i64,
            snapshots: state.snapshots.len() as i64,
        })
    }
}
