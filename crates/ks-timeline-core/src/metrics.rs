//! Metrics Aggregator: one row per participant.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;

use crate::identity::pid_order;
use crate::models::EventView;
use crate::store::{EventFilter, Store};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParticipantMetrics {
    pub pid: String,
    pub label: String,
    pub total_edits: u64,
    pub words_added: i64,
    pub first_ts: i64,
    pub last_ts: i64,
    pub span_secs: i64,
    /// Zero when the span is zero.
    pub edits_per_minute: f64,
}

/// Reduce events to per-participant rows, in numeric pid order. Events without
/// an actor are not attributed to anyone and are ignored.
pub fn aggregate(events: &[EventView]) -> Vec<ParticipantMetrics> {
    let mut rows: HashMap<&str, ParticipantMetrics> = HashMap::new();
    for e in events {
        let Some(pid) = e.pid.as_deref() else {
            continue;
        };
        let row = rows.entry(pid).or_insert_with(|| ParticipantMetrics {
            pid: pid.to_string(),
            label: e.actor_label.clone().unwrap_or_else(|| pid.to_string()),
            total_edits: 0,
            words_added: 0,
            first_ts: e.ts,
            last_ts: e.ts,
            span_secs: 0,
            edits_per_minute: 0.0,
        });
        row.total_edits += 1;
        row.words_added += e.words_added.max(0);
        row.first_ts = row.first_ts.min(e.ts);
        row.last_ts = row.last_ts.max(e.ts);
    }

    let mut rows: Vec<ParticipantMetrics> = rows
        .into_values()
        .map(|mut row| {
            row.span_secs = row.last_ts - row.first_ts;
            row.edits_per_minute = if row.span_secs > 0 {
                row.total_edits as f64 / (row.span_secs as f64 / 60.0)
            } else {
                0.0
            };
            row
        })
        .collect();
    rows.sort_by(|a, b| pid_order(&a.pid, &b.pid));
    rows
}

pub async fn collection_metrics(store: &dyn Store, collection_id: &str) -> Result<Vec<ParticipantMetrics>> {
    let events = store.events(&EventFilter::collection(collection_id)).await?;
    Ok(aggregate(&events))
}
