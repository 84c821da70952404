//! Event reconciliation.
//!
//! A scan pass is reconciled in two steps. First a [`Reconciler`] is built
//! from the store's current state ([`ScanState`]); then [`Reconciler::plan`]
//! turns the extractors' [`ScanBatch`] into a [`ReconcilePlan`]: every
//! artifact, version, delta, snapshot, event, and participant the pass adds.
//! Planning is pure. Stores apply the plan inside the same transaction they
//! loaded the state in, so the pass is all-or-nothing.
//!
//! Two dedup rules apply:
//!
//! 1. **Cross-source**: a filesystem candidate and a log candidate for the
//!    same artifact whose timestamps differ by at most the tolerance window
//!    describe one change. The log candidate is kept; the filesystem one is
//!    dropped (its version and delta are still recorded).
//! 2. **Exact repeat**: a candidate whose fingerprint
//!    `(source, artifact, version, ts, actor)` is already recorded, or
//!    already planned in this pass, is not inserted again.

use std::collections::{HashMap, HashSet};

use crate::error::IngestError;
use crate::formats::{self, ChangeRecord, LogFormat};
use crate::identity::IdentityResolver;
use crate::ids;
use crate::models::{
    Artifact, ArtifactKind, Delta, Envelope, Event, EventSource, EventType, Evidence, FsEvidence,
    LogEvidence, Participant, ScanReport, SkippedItem, Snapshot, Version,
};
use crate::version::{word_count, Observed, VersionTracker};

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Cross-source dedup window, in seconds.
    pub tolerance_secs: i64,
    /// Raw actor id attributed to filesystem evidence.
    pub actor_hint: Option<String>,
    /// `false` parses logs only: no versions, no deletion detection.
    pub track_files: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            tolerance_secs: 60,
            actor_hint: None,
            track_files: true,
        }
    }
}

/// One file as seen by the filesystem extractor.
#[derive(Debug, Clone)]
pub struct FileObservation {
    /// `/`-separated path relative to the collection root.
    pub rel_path: String,
    pub content_hash: String,
    pub size: u64,
    pub mtime: i64,
    pub title: Option<String>,
    /// Extracted text for text-like and OOXML files.
    pub text: Option<String>,
    /// Raw bytes, when small enough to snapshot.
    pub snapshot: Option<Vec<u8>>,
}

/// One change record and the log it came from.
#[derive(Debug, Clone)]
pub struct LocatedRecord {
    pub log_path: String,
    pub format: LogFormat,
    pub record: ChangeRecord,
}

/// Unordered evidence from both extractors for one pass.
#[derive(Debug, Clone, Default)]
pub struct ScanBatch {
    pub scanned_at: i64,
    pub files_seen: u64,
    pub bytes_seen: u64,
    pub observations: Vec<FileObservation>,
    pub records: Vec<LocatedRecord>,
    /// Files consumed as embedded logs; they are not versioned.
    pub log_paths: Vec<String>,
    /// Files present but unreadable; they must not be treated as deleted.
    pub unreadable: Vec<String>,
    pub skipped: Vec<SkippedItem>,
}

/// Store state a pass is reconciled against.
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    pub collection_id: String,
    pub artifacts: Vec<Artifact>,
    pub versions: Vec<Version>,
    pub participants: Vec<Participant>,
    pub known_event_ids: HashSet<String>,
}

/// Everything one pass adds to the store.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub artifacts: Vec<Artifact>,
    /// Stored virtual units that this pass observed as real files; their
    /// kind and title change in place.
    pub promoted: Vec<Artifact>,
    pub versions: Vec<Version>,
    pub deltas: Vec<Delta>,
    pub snapshots: Vec<Snapshot>,
    pub events: Vec<Event>,
    pub participants: Vec<Participant>,
    pub report: ScanReport,
}

struct Candidate {
    source: EventSource,
    event_type: EventType,
    artifact_id: String,
    version_id: Option<String>,
    actor: Option<String>,
    ts: i64,
    summary: String,
    excerpt: Option<String>,
    words_added: i64,
    raw: Evidence,
}

pub struct Reconciler {
    collection_id: String,
    options: ReconcileOptions,
    artifacts: Vec<Artifact>,
    by_path: HashMap<String, usize>,
    tracker: VersionTracker,
    resolver: IdentityResolver,
    known_event_ids: HashSet<String>,
    existing_artifacts: usize,
    promoted: HashSet<usize>,
}

impl Reconciler {
    pub fn new(state: ScanState, options: ReconcileOptions) -> Result<Self, IngestError> {
        let artifact_ids: HashSet<&str> = state.artifacts.iter().map(|a| a.id.as_str()).collect();
        if let Some(orphan) = state
            .versions
            .iter()
            .find(|v| !artifact_ids.contains(v.artifact_id.as_str()))
        {
            return Err(IngestError::invariant(format!(
                "version {} references unknown artifact {}",
                orphan.id, orphan.artifact_id
            )));
        }
        let tracker = VersionTracker::new(state.versions)?;
        let by_path = state
            .artifacts
            .iter()
            .enumerate()
            .map(|(i, a)| (a.path.clone(), i))
            .collect();
        Ok(Self {
            collection_id: state.collection_id,
            options,
            existing_artifacts: state.artifacts.len(),
            artifacts: state.artifacts,
            by_path,
            tracker,
            resolver: IdentityResolver::new(state.participants),
            known_event_ids: state.known_event_ids,
            promoted: HashSet::new(),
        })
    }

    /// Content hashes of head versions whose text is needed to describe
    /// this batch's modifications.
    pub fn needed_snapshots(&self, batch: &ScanBatch) -> Vec<String> {
        if !self.options.track_files {
            return Vec::new();
        }
        let mut needed: Vec<String> = batch
            .observations
            .iter()
            .filter(|o| o.text.is_some())
            .filter_map(|o| {
                let idx = self.by_path.get(&o.rel_path)?;
                let head = self.tracker.head(&self.artifacts[*idx].id)?;
                let hash = head.content_hash.as_ref()?;
                (hash != &o.content_hash).then(|| hash.clone())
            })
            .collect();
        needed.sort();
        needed.dedup();
        needed
    }

    fn ensure_artifact(
        &mut self,
        path: &str,
        kind: ArtifactKind,
        title: Option<String>,
        now: i64,
    ) -> String {
        if let Some(&idx) = self.by_path.get(path) {
            let existing = &mut self.artifacts[idx];
            if existing.kind == ArtifactKind::Unit && kind != ArtifactKind::Unit {
                tracing::debug!(path, kind = kind.as_str(), "virtual unit observed as a file");
                existing.kind = kind;
                existing.title = title;
                if idx < self.existing_artifacts {
                    self.promoted.insert(idx);
                }
            }
            return existing.id.clone();
        }
        let artifact = Artifact {
            id: ids::artifact_id(&self.collection_id, path),
            collection_id: self.collection_id.clone(),
            path: path.to_string(),
            kind,
            title,
            first_seen: now,
        };
        let id = artifact.id.clone();
        self.by_path.insert(path.to_string(), self.artifacts.len());
        self.artifacts.push(artifact);
        id
    }

    /// Map a unit named by a log row onto an artifact: exact path, then a
    /// unique file name or stem match among real files, then an existing
    /// virtual unit.
    fn resolve_unit(&self, unit: &str) -> Option<String> {
        let real = |a: &&Artifact| a.kind != ArtifactKind::Unit;
        if let Some(a) = self.by_path.get(unit).map(|i| &self.artifacts[*i]).filter(real) {
            return Some(a.id.clone());
        }
        let wanted = unit.rsplit('/').next().unwrap_or(unit).to_lowercase();
        let unique = |matches: Vec<&Artifact>| match matches.as_slice() {
            [only] => Some(only.id.clone()),
            _ => None,
        };
        let by_name: Vec<&Artifact> = self
            .artifacts
            .iter()
            .filter(real)
            .filter(|a| file_name(&a.path).to_lowercase() == wanted)
            .collect();
        if let Some(id) = unique(by_name) {
            return Some(id);
        }
        let by_stem: Vec<&Artifact> = self
            .artifacts
            .iter()
            .filter(real)
            .filter(|a| file_stem(file_name(&a.path)).to_lowercase() == wanted)
            .collect();
        if let Some(id) = unique(by_stem) {
            return Some(id);
        }
        self.by_path.get(unit).map(|i| self.artifacts[*i].id.clone())
    }

    /// Reconcile `batch` into a plan. `prior_texts` maps the content hashes
    /// from [`needed_snapshots`](Self::needed_snapshots) to their text.
    pub fn plan(
        mut self,
        batch: ScanBatch,
        prior_texts: &HashMap<String, String>,
    ) -> Result<ReconcilePlan, IngestError> {
        let now = batch.scanned_at;
        let tolerance = self.options.tolerance_secs.max(0);
        let mut report = ScanReport::new(&self.collection_id);
        report.files_seen = batch.files_seen;
        report.bytes_seen = batch.bytes_seen;
        report.log_files = batch.log_paths.len() as u64;
        report.log_records = batch.records.len() as u64;
        report.skipped = batch.skipped;

        let log_paths: HashSet<String> = batch.log_paths.into_iter().collect();
        let unreadable = batch.unreadable;
        let is_unreadable = |path: &str| unreadable.iter().any(|u| covers(u, path));

        let mut versions: Vec<Version> = Vec::new();
        let mut deltas: Vec<Delta> = Vec::new();
        let mut snapshots: Vec<Snapshot> = Vec::new();
        let mut candidates: Vec<Candidate> = Vec::new();

        if self.options.track_files {
            let mut observations = batch.observations;
            observations.retain(|o| !log_paths.contains(&o.rel_path));
            observations.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
            let observed: HashSet<String> =
                observations.iter().map(|o| o.rel_path.clone()).collect();
            let hint = self
                .options
                .actor_hint
                .as_deref()
                .and_then(formats::normalize_actor);

            for obs in observations {
                let artifact_id = self.ensure_artifact(
                    &obs.rel_path,
                    ArtifactKind::from_path(&obs.rel_path),
                    obs.title.clone(),
                    now,
                );
                let prior_text = self
                    .tracker
                    .head(&artifact_id)
                    .and_then(|h| h.content_hash.as_ref())
                    .and_then(|h| prior_texts.get(h))
                    .map(String::as_str);
                let Some(new) = self.tracker.observe(Observed {
                    artifact_id: &artifact_id,
                    path: &obs.rel_path,
                    content_hash: &obs.content_hash,
                    ts: obs.mtime,
                    size: obs.size,
                    author: hint.as_deref(),
                    text: obs.text.as_deref(),
                    prior_text,
                }) else {
                    continue;
                };
                tracing::debug!(path = %obs.rel_path, kind = new.delta.kind.as_str(), "new version");

                if let Some(bytes) = obs.snapshot {
                    snapshots.push(Snapshot {
                        content_hash: obs.content_hash.clone(),
                        bytes,
                        text: obs.text,
                    });
                }
                candidates.push(Candidate {
                    source: EventSource::Filesystem,
                    event_type: new.delta.kind.into(),
                    artifact_id,
                    version_id: Some(new.version.id.clone()),
                    actor: hint.clone(),
                    ts: new.version.created_at,
                    summary: new.delta.summary.clone(),
                    excerpt: None,
                    words_added: new.words_added,
                    raw: Evidence::Filesystem(FsEvidence {
                        envelope: Envelope {
                            ts: new.version.created_at,
                            actor: hint.clone(),
                            summary: new.delta.summary.clone(),
                        },
                        rel_path: obs.rel_path,
                        change: new.delta.kind,
                        content_hash: Some(obs.content_hash),
                        size: obs.size,
                    }),
                });
                versions.push(new.version);
                deltas.push(new.delta);
            }

            let vanished: Vec<(String, String)> = self
                .artifacts
                .iter()
                .filter(|a| a.kind != ArtifactKind::Unit)
                .filter(|a| self.tracker.is_live(&a.id))
                .filter(|a| {
                    !observed.contains(&a.path)
                        && !is_unreadable(&a.path)
                        && !log_paths.contains(&a.path)
                })
                .map(|a| (a.id.clone(), a.path.clone()))
                .collect();
            for (artifact_id, path) in vanished {
                let Some(del) = self.tracker.tombstone(&artifact_id, &path, now) else {
                    continue;
                };
                candidates.push(Candidate {
                    source: EventSource::Filesystem,
                    event_type: EventType::Deleted,
                    artifact_id,
                    version_id: Some(del.version.id.clone()),
                    actor: hint.clone(),
                    ts: del.version.created_at,
                    summary: del.delta.summary.clone(),
                    excerpt: None,
                    words_added: 0,
                    raw: Evidence::Filesystem(FsEvidence {
                        envelope: Envelope {
                            ts: del.version.created_at,
                            actor: hint.clone(),
                            summary: del.delta.summary.clone(),
                        },
                        rel_path: path,
                        change: del.delta.kind,
                        content_hash: None,
                        size: 0,
                    }),
                });
                versions.push(del.version);
                deltas.push(del.delta);
            }
        }

        let mut records = batch.records;
        records.sort_by(|a, b| {
            a.log_path
                .cmp(&b.log_path)
                .then(a.record.line.cmp(&b.record.line))
        });
        for located in records {
            let mut rec = located.record;
            rec.actor = rec.actor.as_deref().and_then(formats::normalize_actor);
            let unit = rec
                .unit
                .clone()
                .map(|u| u.replace('\\', "/").trim_matches('/').to_string())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| formats::unit_from_log_name(file_name(&located.log_path)));
            let artifact_id = match self.resolve_unit(&unit) {
                Some(id) => id,
                None => self.ensure_artifact(&unit, ArtifactKind::Unit, Some(unit.clone()), now),
            };
            let version_id = self
                .tracker
                .version_at(&artifact_id, rec.ts.saturating_add(tolerance))
                .map(|v| v.id.clone());
            let words_added = rec.excerpt.as_deref().map(word_count).unwrap_or(0);
            candidates.push(Candidate {
                source: EventSource::Log,
                event_type: EventType::from_action(&rec.action),
                artifact_id,
                version_id,
                actor: rec.actor.clone(),
                ts: rec.ts,
                summary: rec.summary.clone(),
                excerpt: rec.excerpt.clone(),
                words_added,
                raw: Evidence::Log(LogEvidence {
                    envelope: Envelope {
                        ts: rec.ts,
                        actor: rec.actor,
                        summary: rec.summary,
                    },
                    log_path: located.log_path,
                    format: located.format,
                    line: rec.line,
                    action: rec.action,
                    unit: Some(unit),
                    excerpt: rec.excerpt,
                    row: rec.row,
                }),
            });
        }

        let (fs, logs): (Vec<Candidate>, Vec<Candidate>) = candidates
            .into_iter()
            .partition(|c| c.source == EventSource::Filesystem);
        let mut kept: Vec<Candidate> = Vec::with_capacity(fs.len() + logs.len());
        for candidate in fs {
            let twin = logs
                .iter()
                .filter(|l| l.artifact_id == candidate.artifact_id)
                .filter(|l| (l.ts - candidate.ts).abs() <= tolerance)
                .min_by_key(|l| (l.ts - candidate.ts).abs());
            match twin {
                Some(log) => {
                    report.cross_source_duplicates += 1;
                    if let (Some(actor), Some(version_id)) = (&log.actor, &candidate.version_id) {
                        self.tracker
                            .attribute(&candidate.artifact_id, version_id, actor);
                        if let Some(v) = versions.iter_mut().find(|v| &v.id == version_id) {
                            if v.author.is_none() {
                                v.author = Some(actor.clone());
                            }
                        }
                    }
                    tracing::debug!(artifact = %candidate.artifact_id, "filesystem event superseded by log event");
                }
                None => kept.push(candidate),
            }
        }
        kept.extend(logs);

        let mut events: Vec<Event> = Vec::with_capacity(kept.len());
        let mut planned_ids: HashSet<String> = HashSet::new();
        for c in kept {
            let id = ids::event_id(
                c.source,
                &c.artifact_id,
                c.version_id.as_deref(),
                c.ts,
                c.actor.as_deref(),
            );
            if self.known_event_ids.contains(&id) || !planned_ids.insert(id.clone()) {
                report.repeated_events += 1;
                continue;
            }
            events.push(Event {
                id,
                source: c.source,
                event_type: c.event_type,
                artifact_id: c.artifact_id,
                version_id: c.version_id,
                actor: c.actor,
                ts: c.ts,
                summary: c.summary,
                excerpt: c.excerpt,
                words_added: c.words_added,
                raw: c.raw,
            });
        }
        events.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id)));

        for event in &events {
            if let Some(actor) = event.actor.as_deref().filter(|a| !a.is_empty()) {
                self.resolver.resolve(actor, event.ts);
            }
        }

        let new_artifacts: Vec<Artifact> = self.artifacts.split_off(self.existing_artifacts);
        let mut promoted: Vec<usize> = self.promoted.iter().copied().collect();
        promoted.sort_unstable();
        let plan = ReconcilePlan {
            artifacts: new_artifacts,
            promoted: promoted.iter().map(|&i| self.artifacts[i].clone()).collect(),
            versions,
            deltas,
            snapshots,
            events,
            participants: self.resolver.into_allocated(),
            report,
        };
        validate(&plan, &self.artifacts, &self.tracker)?;

        let mut plan = plan;
        plan.report.new_artifacts = plan.artifacts.len() as u64;
        plan.report.new_versions = plan.versions.len() as u64;
        plan.report.new_deltas = plan.deltas.len() as u64;
        plan.report.new_events = plan.events.len() as u64;
        plan.report.new_participants = plan.participants.len() as u64;
        Ok(plan)
    }
}

/// Referential checks on a plan; any failure aborts the pass.
fn validate(
    plan: &ReconcilePlan,
    existing: &[Artifact],
    tracker: &VersionTracker,
) -> Result<(), IngestError> {
    let artifacts: HashSet<&str> = existing
        .iter()
        .chain(plan.artifacts.iter())
        .map(|a| a.id.as_str())
        .collect();
    let planned: HashSet<&str> = plan.versions.iter().map(|v| v.id.as_str()).collect();

    for v in &plan.versions {
        if !artifacts.contains(v.artifact_id.as_str()) {
            return Err(IngestError::invariant(format!(
                "version {} references unknown artifact {}",
                v.id, v.artifact_id
            )));
        }
    }
    for d in &plan.deltas {
        if !planned.contains(d.version_id.as_str()) {
            return Err(IngestError::invariant(format!(
                "delta references unplanned version {}",
                d.version_id
            )));
        }
    }
    if plan.deltas.len() != plan.versions.len() {
        return Err(IngestError::invariant(
            "every new version needs exactly one delta",
        ));
    }
    for e in &plan.events {
        if !artifacts.contains(e.artifact_id.as_str()) {
            return Err(IngestError::invariant(format!(
                "event {} references unknown artifact {}",
                e.id, e.artifact_id
            )));
        }
        if let Some(version_id) = &e.version_id {
            if !tracker
                .chain(&e.artifact_id)
                .iter()
                .any(|v| &v.id == version_id)
            {
                return Err(IngestError::invariant(format!(
                    "event {} references version {} of another artifact",
                    e.id, version_id
                )));
            }
        }
    }
    Ok(())
}

/// Whether an unreadable entry (a file, or a directory the walk could not
/// enter) hides `path`. An empty entry is the root itself.
fn covers(entry: &str, path: &str) -> bool {
    entry.is_empty()
        || path == entry
        || path
            .strip_prefix(entry)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Reconcile in one call when no prior snapshot text is available.
pub fn plan_pass(
    state: ScanState,
    batch: ScanBatch,
    options: ReconcileOptions,
) -> Result<ReconcilePlan, IngestError> {
    Reconciler::new(state, options)?.plan(batch, &HashMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::content_hash;
    use crate::models::DeltaKind;

    fn obs(path: &str, body: &str, mtime: i64) -> FileObservation {
        FileObservation {
            rel_path: path.to_string(),
            content_hash: content_hash(body.as_bytes()),
            size: body.len() as u64,
            mtime,
            title: Some(path.to_string()),
            text: Some(body.to_string()),
            snapshot: Some(body.as_bytes().to_vec()),
        }
    }

    fn record(log: &str, line: usize, ts: i64, actor: &str, unit: Option<&str>) -> LocatedRecord {
        LocatedRecord {
            log_path: log.to_string(),
            format: LogFormat::JsonLines,
            record: ChangeRecord {
                line,
                ts,
                actor: Some(actor.to_string()),
                unit: unit.map(str::to_string),
                action: "edited".to_string(),
                summary: format!("{} edited", actor),
                excerpt: Some("two words".to_string()),
                row: String::new(),
            },
        }
    }

    fn batch(now: i64, observations: Vec<FileObservation>, records: Vec<LocatedRecord>) -> ScanBatch {
        ScanBatch {
            scanned_at: now,
            files_seen: observations.len() as u64,
            observations,
            records,
            ..Default::default()
        }
    }

    fn state() -> ScanState {
        ScanState {
            collection_id: "c1".to_string(),
            ..Default::default()
        }
    }

    /// Fold a plan into the state the way a store commit would.
    fn apply(state: &mut ScanState, plan: &ReconcilePlan) {
        for promoted in &plan.promoted {
            if let Some(a) = state.artifacts.iter_mut().find(|a| a.id == promoted.id) {
                *a = promoted.clone();
            }
        }
        state.artifacts.extend(plan.artifacts.iter().cloned());
        state.versions.extend(plan.versions.iter().cloned());
        state.participants.extend(plan.participants.iter().cloned());
        state
            .known_event_ids
            .extend(plan.events.iter().map(|e| e.id.clone()));
    }

    fn run(state: &mut ScanState, b: ScanBatch, options: ReconcileOptions) -> ReconcilePlan {
        let plan = plan_pass(state.clone(), b, options).unwrap();
        apply(state, &plan);
        plan
    }

    #[test]
    fn first_pass_creates_versions_and_events() {
        let mut st = state();
        let options = ReconcileOptions {
            actor_hint: Some("alice".to_string()),
            ..Default::default()
        };
        let plan = run(
            &mut st,
            batch(1_000, vec![obs("a.md", "one two", 100), obs("b.md", "x", 200)], vec![]),
            options,
        );
        assert_eq!(plan.artifacts.len(), 2);
        assert_eq!(plan.versions.len(), 2);
        assert_eq!(plan.deltas.len(), 2);
        assert!(plan.deltas.iter().all(|d| d.kind == DeltaKind::Created));
        assert_eq!(plan.events.len(), 2);
        assert_eq!(plan.events[0].ts, 100);
        assert_eq!(plan.events[0].words_added, 2);
        assert_eq!(plan.snapshots.len(), 2);
        assert_eq!(plan.participants.len(), 1);
        assert_eq!(plan.participants[0].pid, "P001");
        assert_eq!(plan.participants[0].first_seen, 100);
        assert_eq!(plan.report.new_events, 2);
    }

    #[test]
    fn unchanged_rescan_is_idempotent() {
        let mut st = state();
        let files = || vec![obs("a.md", "hello", 100)];
        let records = || vec![record("log.jsonl", 1, 50, "bob", Some("a.md"))];
        run(&mut st, batch(1_000, files(), records()), ReconcileOptions::default());
        let again = run(&mut st, batch(2_000, files(), records()), ReconcileOptions::default());
        assert!(again.artifacts.is_empty());
        assert!(again.versions.is_empty());
        assert!(again.deltas.is_empty());
        assert!(again.events.is_empty());
        assert!(again.participants.is_empty());
        assert_eq!(again.report.repeated_events, 1);
    }

    #[test]
    fn log_event_supersedes_filesystem_event_within_tolerance() {
        let mut st = state();
        run(
            &mut st,
            batch(1_000, vec![obs("a.md", "a", 100), obs("b.md", "b", 100)], vec![]),
            ReconcileOptions::default(),
        );
        let plan = run(
            &mut st,
            batch(
                2_000,
                vec![obs("a.md", "a", 100), obs("b.md", "b changed", 500)],
                vec![record("b_changelog.jsonl", 1, 502, "carol", Some("b.md"))],
            ),
            ReconcileOptions::default(),
        );
        assert_eq!(plan.versions.len(), 1);
        assert_eq!(plan.deltas.len(), 1);
        assert_eq!(plan.events.len(), 1);
        assert_eq!(plan.events[0].source, EventSource::Log);
        assert_eq!(plan.events[0].version_id.as_deref(), Some(plan.versions[0].id.as_str()));
        assert_eq!(plan.versions[0].author.as_deref(), Some("carol"));
        assert_eq!(plan.report.cross_source_duplicates, 1);
    }

    #[test]
    fn events_outside_tolerance_are_both_kept() {
        let mut st = state();
        let plan = run(
            &mut st,
            batch(
                1_000,
                vec![obs("a.md", "a", 100)],
                vec![record("log.jsonl", 1, 400, "dave", Some("a.md"))],
            ),
            ReconcileOptions::default(),
        );
        assert_eq!(plan.events.len(), 2);
        assert_eq!(plan.report.cross_source_duplicates, 0);
    }

    #[test]
    fn deletion_then_reappearance_extends_the_chain() {
        let mut st = state();
        run(&mut st, batch(1_000, vec![obs("a.md", "v1", 100)], vec![]), ReconcileOptions::default());
        let gone = run(&mut st, batch(2_000, vec![], vec![]), ReconcileOptions::default());
        assert_eq!(gone.versions.len(), 1);
        assert!(gone.versions[0].is_tombstone());
        assert_eq!(gone.deltas[0].kind, DeltaKind::Deleted);
        assert_eq!(gone.events[0].event_type, EventType::Deleted);

        let back = run(&mut st, batch(3_000, vec![obs("a.md", "v1", 2_500)], vec![]), ReconcileOptions::default());
        assert!(back.artifacts.is_empty());
        assert_eq!(back.versions.len(), 1);
        assert_eq!(back.versions[0].parent_id.as_deref(), Some(gone.versions[0].id.as_str()));
        assert_eq!(back.deltas[0].kind, DeltaKind::Created);
    }

    #[test]
    fn unreadable_files_are_not_deleted() {
        let mut st = state();
        run(&mut st, batch(1_000, vec![obs("a.md", "v1", 100)], vec![]), ReconcileOptions::default());
        let mut b = batch(2_000, vec![], vec![]);
        b.unreadable.push("a.md".to_string());
        let plan = run(&mut st, b, ReconcileOptions::default());
        assert!(plan.versions.is_empty());
        assert!(plan.events.is_empty());
    }

    #[test]
    fn log_units_resolve_by_stem_then_fall_back_to_virtual() {
        let mut st = state();
        run(&mut st, batch(1_000, vec![obs("docs/Report.docx", "r", 100)], vec![]), ReconcileOptions::default());
        let plan = run(
            &mut st,
            batch(
                2_000,
                vec![obs("docs/Report.docx", "r", 100)],
                vec![
                    record("Report_changelog.jsonl", 1, 5_000, "erin", None),
                    record("misc.jsonl", 1, 5_001, "erin", Some("Planning Notes")),
                ],
            ),
            ReconcileOptions::default(),
        );
        let report_id = ids::artifact_id("c1", "docs/Report.docx");
        assert_eq!(plan.events[0].artifact_id, report_id);
        assert_eq!(plan.artifacts.len(), 1);
        assert_eq!(plan.artifacts[0].kind, ArtifactKind::Unit);
        assert_eq!(plan.events[1].artifact_id, plan.artifacts[0].id);
        assert_eq!(plan.events[1].version_id, None);
        assert_eq!(plan.participants.len(), 1);
    }

    #[test]
    fn log_files_are_not_versioned() {
        let mut st = state();
        let mut b = batch(
            1_000,
            vec![obs("a.md", "a", 100), obs("a_changelog.jsonl", "{}", 100)],
            vec![record("a_changelog.jsonl", 1, 10, "frank", None)],
        );
        b.log_paths.push("a_changelog.jsonl".to_string());
        let plan = run(&mut st, b, ReconcileOptions::default());
        assert_eq!(plan.versions.len(), 1);
        assert!(plan.artifacts.iter().all(|a| a.path != "a_changelog.jsonl"));
        assert_eq!(plan.report.log_files, 1);
    }

    #[test]
    fn log_only_mode_skips_versioning() {
        let mut st = state();
        let options = ReconcileOptions {
            track_files: false,
            ..Default::default()
        };
        let plan = run(
            &mut st,
            batch(
                1_000,
                vec![obs("a.md", "a", 100)],
                vec![record("log.jsonl", 1, 10, "gina", Some("a.md"))],
            ),
            options,
        );
        assert!(plan.versions.is_empty());
        assert_eq!(plan.events.len(), 1);
        assert_eq!(plan.artifacts[0].kind, ArtifactKind::Unit);
    }

    #[test]
    fn pids_follow_event_order() {
        let mut st = state();
        let plan = run(
            &mut st,
            batch(
                1_000,
                vec![],
                vec![
                    record("log.jsonl", 1, 300, "zed", Some("u")),
                    record("log.jsonl", 2, 100, "amy", Some("u")),
                ],
            ),
            ReconcileOptions::default(),
        );
        assert_eq!(plan.participants[0].raw_id, "amy");
        assert_eq!(plan.participants[0].pid, "P001");
        assert_eq!(plan.participants[1].raw_id, "zed");
        assert_eq!(plan.participants[1].first_seen, 300);
    }

    #[test]
    fn needed_snapshots_lists_changed_heads() {
        let mut st = state();
        run(&mut st, batch(1_000, vec![obs("a.md", "old", 100)], vec![]), ReconcileOptions::default());
        let reconciler = Reconciler::new(st.clone(), ReconcileOptions::default()).unwrap();
        let b = batch(2_000, vec![obs("a.md", "new text", 200)], vec![]);
        assert_eq!(reconciler.needed_snapshots(&b), vec![content_hash(b"old")]);

        let mut priors = HashMap::new();
        priors.insert(content_hash(b"old"), "old".to_string());
        let plan = reconciler.plan(b, &priors).unwrap();
        assert_eq!(plan.deltas[0].kind, DeltaKind::Modified);
        assert_eq!(plan.events[0].words_added, 1);
    }

    #[test]
    fn blank_actors_are_unattributed() {
        let mut st = state();
        let options = ReconcileOptions {
            actor_hint: Some("   ".to_string()),
            ..Default::default()
        };
        let plan = run(
            &mut st,
            batch(
                1_000,
                vec![obs("a.md", "a", 100)],
                vec![
                    record("log.jsonl", 1, 400, "", Some("a.md")),
                    record("log.jsonl", 2, 500, " \t", Some("a.md")),
                    record("log.jsonl", 3, 600, "ann", Some("a.md")),
                ],
            ),
            options,
        );
        assert_eq!(plan.events.len(), 4);
        assert_eq!(plan.events.iter().filter(|e| e.actor.is_none()).count(), 3);
        assert!(plan.versions[0].author.is_none());
        assert_eq!(plan.participants.len(), 1);
        assert_eq!(plan.participants[0].raw_id, "ann");
    }

    #[test]
    fn unit_named_before_its_file_exists_is_promoted() {
        let mut st = state();
        let first = run(
            &mut st,
            batch(1_000, vec![], vec![record("log.jsonl", 1, 50, "ann", Some("a.md"))]),
            ReconcileOptions::default(),
        );
        assert_eq!(first.artifacts[0].kind, ArtifactKind::Unit);

        let seen = run(&mut st, batch(2_000, vec![obs("a.md", "text", 1_500)], vec![]), ReconcileOptions::default());
        assert!(seen.artifacts.is_empty());
        assert_eq!(seen.promoted.len(), 1);
        assert_eq!(seen.promoted[0].id, first.artifacts[0].id);
        assert_eq!(seen.promoted[0].kind, ArtifactKind::Markdown);
        assert_eq!(seen.versions.len(), 1);
        assert_eq!(st.artifacts[0].kind, ArtifactKind::Markdown);

        let gone = run(&mut st, batch(3_000, vec![], vec![]), ReconcileOptions::default());
        assert!(gone.promoted.is_empty());
        assert_eq!(gone.versions.len(), 1);
        assert!(gone.versions[0].is_tombstone());
        assert_eq!(gone.events[0].event_type, EventType::Deleted);
    }

    #[test]
    fn unreadable_directory_hides_every_file_under_it() {
        let mut st = state();
        run(
            &mut st,
            batch(
                1_000,
                vec![obs("docs/a.md", "a", 100), obs("docs/b.md", "b", 100), obs("docs2/c.md", "c", 100)],
                vec![],
            ),
            ReconcileOptions::default(),
        );
        let mut b = batch(2_000, vec![], vec![]);
        b.unreadable.push("docs".to_string());
        let plan = run(&mut st, b, ReconcileOptions::default());
        assert_eq!(plan.versions.len(), 1);
        assert_eq!(plan.events.len(), 1);
        assert_eq!(plan.events[0].artifact_id, ids::artifact_id("c1", "docs2/c.md"));
    }

    #[test]
    fn unreadable_entries_cover_paths_by_component() {
        assert!(covers("docs", "docs"));
        assert!(covers("docs", "docs/a/b.md"));
        assert!(!covers("docs", "docs2/a.md"));
        assert!(covers("", "anything.md"));
    }

    #[test]
    fn second_pass_keeps_pids_and_version_ownership() {
        let mut st = state();
        let first = run(
            &mut st,
            batch(
                1_000,
                vec![obs("a.md", "a", 100), obs("b.md", "b", 100)],
                vec![record("log.jsonl", 1, 100, "ann", Some("a.md"))],
            ),
            ReconcileOptions::default(),
        );
        let ann = first.participants[0].pid.clone();

        let second = run(
            &mut st,
            batch(
                2_000,
                vec![obs("a.md", "a more", 1_500), obs("b.md", "b more", 1_600)],
                vec![
                    record("log.jsonl", 1, 100, "ann", Some("a.md")),
                    record("log.jsonl", 2, 1_510, "bob", Some("a.md")),
                    record("log.jsonl", 3, 1_620, "ann", Some("b.md")),
                ],
            ),
            ReconcileOptions::default(),
        );
        assert_eq!(second.participants.len(), 1);
        assert_eq!(second.participants[0].raw_id, "bob");
        assert_eq!(second.participants[0].pid, "P002");
        let resolver = IdentityResolver::new(st.participants.clone());
        assert_eq!(resolver.lookup("ann").map(|p| p.pid.clone()), Some(ann));

        for e in &second.events {
            let version_id = e.version_id.as_deref().unwrap();
            assert!(st
                .versions
                .iter()
                .any(|v| v.id == version_id && v.artifact_id == e.artifact_id));
        }
    }

    #[test]
    fn orphan_versions_are_rejected() {
        let mut st = state();
        st.versions.push(Version {
            id: "v".to_string(),
            artifact_id: "missing".to_string(),
            parent_id: None,
            content_hash: Some("h".to_string()),
            created_at: 0,
            author: None,
        });
        assert!(matches!(
            Reconciler::new(st, ReconcileOptions::default()),
            Err(IngestError::Invariant(_))
        ));
    }
}
