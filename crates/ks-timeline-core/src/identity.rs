//! Identity resolution: raw actor ids to stable participant ids.
//!
//! Equality is exact string equality on the raw id. Participant ids are
//! sequential (`P001`, `P002`, …) and never reassigned or merged.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::Participant;

/// Prefix of every participant id.
pub const PID_PREFIX: &str = "P";

pub fn format_pid(n: u32) -> String {
    format!("{}{:03}", PID_PREFIX, n)
}

fn pid_number(pid: &str) -> Option<u32> {
    pid.strip_prefix(PID_PREFIX)?.parse().ok()
}

/// Numeric pid order: `P999` before `P1000`.
pub fn pid_order(a: &str, b: &str) -> Ordering {
    pid_number(a)
        .cmp(&pid_number(b))
        .then_with(|| a.cmp(b))
}

/// Resolver seeded from the participants already recorded in a store.
///
/// Newly allocated participants are collected so the caller can persist
/// them in the same transaction as the events that reference them.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    by_raw: HashMap<String, Participant>,
    next: u32,
    allocated: Vec<Participant>,
}

impl IdentityResolver {
    pub fn new(existing: impl IntoIterator<Item = Participant>) -> Self {
        let mut by_raw = HashMap::new();
        let mut max = 0;
        for p in existing {
            if let Some(n) = pid_number(&p.pid) {
                max = max.max(n);
            }
            by_raw.insert(p.raw_id.clone(), p);
        }
        Self {
            by_raw,
            next: max + 1,
            allocated: Vec::new(),
        }
    }

    /// Participant id for `raw_id`, allocating one on first sight.
    ///
    /// `seen_at` becomes the first-seen time of a new participant.
    pub fn resolve(&mut self, raw_id: &str, seen_at: i64) -> String {
        if let Some(p) = self.by_raw.get(raw_id) {
            return p.pid.clone();
        }
        let participant = Participant {
            raw_id: raw_id.to_string(),
            pid: format_pid(self.next),
            display_name: None,
            first_seen: seen_at,
        };
        self.next += 1;
        let pid = participant.pid.clone();
        self.allocated.push(participant.clone());
        self.by_raw.insert(raw_id.to_string(), participant);
        pid
    }

    /// Lookup without allocation.
    pub fn lookup(&self, raw_id: &str) -> Option<&Participant> {
        self.by_raw.get(raw_id)
    }

    /// Participants allocated since construction, in allocation order.
    pub fn allocated(&self) -> &[Participant] {
        &self.allocated
    }

    pub fn into_allocated(self) -> Vec<Participant> {
        self.allocated
    }
}
