//! Timeline Builder.
//!
//! Timelines are read-only views over the store's events, recomputed on
//! every query. Sessions are derived here and never persisted.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::models::{EventView, Session};
use crate::store::{EventFilter, Store};

/// Sort by timestamp, ties broken by event id.
pub fn order_events(events: &mut [EventView]) {
    events.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id)));
}

/// Split one participant's timestamps into sessions. A new session starts
/// whenever the gap to the previous event exceeds `gap_secs`.
pub fn segment_sessions(pid: &str, timestamps: &[i64], gap_secs: i64) -> Vec<Session> {
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();

    let mut sessions: Vec<Session> = Vec::new();
    for ts in sorted {
        match sessions.last_mut() {
            Some(current) if ts - current.end <= gap_secs => {
                current.end = ts;
                current.event_count += 1;
            }
            _ => sessions.push(Session {
                pid: pid.to_string(),
                start: ts,
                end: ts,
                event_count: 1,
            }),
        }
    }
    sessions
}

/// Sessions for every participant present in `events`, grouped by pid.
pub fn sessions_by_participant(events: &[EventView], gap_secs: i64) -> BTreeMap<String, Vec<Session>> {
    let mut by_pid: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for e in events {
        if let Some(pid) = &e.pid {
            by_pid.entry(pid.clone()).or_default().push(e.ts);
        }
    }
    by_pid
        .into_iter()
        .map(|(pid, ts)| {
            let sessions = segment_sessions(&pid, &ts, gap_secs);
            (pid, sessions)
        })
        .collect()
}

/// All events of a collection in timeline order.
pub async fn global_timeline(store: &dyn Store, collection_id: &str) -> Result<Vec<EventView>> {
    let mut events = store.events(&EventFilter::collection(collection_id)).await?;
    order_events(&mut events);
    Ok(events)
}

/// All events of one artifact in timeline order.
pub async fn unit_timeline(store: &dyn Store, artifact_id: &str) -> Result<Vec<EventView>> {
    let mut events = store.events(&EventFilter::artifact(artifact_id)).await?;
    order_events(&mut events);
    Ok(events)
}

pub async fn sessions(store: &dyn Store, pid: &str, gap_secs: i64) -> Result<Vec<Session>> {
    let events = store.events(&EventFilter::participant(pid)).await?;
    let ts: Vec<i64> = events.iter().map(|e| e.ts).collect();
    Ok(segment_sessions(pid, &ts, gap_secs))
}
