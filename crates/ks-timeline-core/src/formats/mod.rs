//! Embedded change-log formats.
//!
//! Each recognized format is one [`LogFormat`] variant exposing the same
//! two capabilities:
//!
//! - [`LogFormat::sniff`]: inspect raw bytes and return a confidence in
//!   `[0.0, 1.0]` that they are a log of this format. A format matches when
//!   enough of the first [`SNIFF_LINES`] lines parse as its rows; headers,
//!   notes, and wrapped continuation lines do not count against it;
//! - [`LogFormat::parse`]: turn the bytes into [`ChangeRecord`]s.
//!
//! Detection is by content. A log-like file name only nudges the
//! confidence of a format that already matched; it never selects one alone.
//!
//! Parsing is per record: a malformed row becomes a [`RecordError`] and
//! the remaining rows are still returned.

mod bracketed;
mod drive_audit;
mod json_lines;

use serde::{Deserialize, Serialize};

/// Lines inspected by `sniff`.
pub const SNIFF_LINES: usize = 200;

/// Confidence of a format whose row count just clears its minimum. The
/// share of matching lines raises it toward 1.0.
pub const MIN_CONFIDENCE: f32 = 0.5;

const NAME_HINT_BONUS: f32 = 0.1;

const NAME_HINTS: &[&str] = &[
    "changelog",
    "change_log",
    "change-log",
    "history",
    "audit",
    "activity",
    "revisions",
    "revision",
    "log",
    "trail",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Cloud-drive audit export: `2024-03-01T10:00:00Z - people/123456 edited X at Y`.
    DriveAudit,
    /// Editor activity pane: `[EDIT] Name (• 2:14 PM, Aug 19 (MDT)): text`.
    BracketedActivity,
    /// One JSON object per line with at least a `ts` field.
    JsonLines,
}

/// Parse-time information that does not live in the log bytes.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Year applied to timestamps that omit one (the log's modification year).
    pub default_year: i32,
}

/// One structured row of an embedded log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// 1-based line number in the log.
    pub line: usize,
    pub ts: i64,
    pub actor: Option<String>,
    /// Unit (file or document) the row says was affected.
    pub unit: Option<String>,
    pub action: String,
    pub summary: String,
    pub excerpt: Option<String>,
    pub row: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    pub records: Vec<ChangeRecord>,
    pub errors: Vec<RecordError>,
}

impl LogFormat {
    pub const ALL: [LogFormat; 3] = [
        LogFormat::DriveAudit,
        LogFormat::BracketedActivity,
        LogFormat::JsonLines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::DriveAudit => "drive_audit",
            LogFormat::BracketedActivity => "bracketed_activity",
            LogFormat::JsonLines => "json_lines",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    /// Rows that must match among the first [`SNIFF_LINES`] lines.
    pub fn min_rows(&self) -> usize {
        match self {
            LogFormat::DriveAudit => 3,
            LogFormat::BracketedActivity | LogFormat::JsonLines => 2,
        }
    }

    /// Confidence that `bytes` hold a log of this format: zero below
    /// [`min_rows`](Self::min_rows), otherwise at least [`MIN_CONFIDENCE`].
    pub fn sniff(&self, bytes: &[u8]) -> f32 {
        let text = decode(bytes);
        let lines: Vec<&str> = text
            .lines()
            .take(SNIFF_LINES)
            .filter(|l| !l.trim().is_empty())
            .collect();
        let hits = match self {
            LogFormat::DriveAudit => drive_audit::count_matches(&lines),
            LogFormat::BracketedActivity => bracketed::count_matches(&lines),
            LogFormat::JsonLines => json_lines::count_matches(&lines),
        };
        if hits < self.min_rows() {
            return 0.0;
        }
        let share = hits as f32 / lines.len() as f32;
        MIN_CONFIDENCE + (1.0 - MIN_CONFIDENCE) * share
    }

    /// Parse every non-blank row. Rows that fail are reported, not fatal.
    pub fn parse(&self, bytes: &[u8], ctx: &LogContext) -> ParsedLog {
        let text = decode(bytes);
        let mut parsed = ParsedLog::default();
        for (idx, raw) in text.lines().enumerate() {
            let row = raw.trim_start_matches('\u{feff}').trim();
            if row.is_empty() {
                continue;
            }
            let line = idx + 1;
            let result = match self {
                LogFormat::DriveAudit => drive_audit::parse_row(row),
                LogFormat::BracketedActivity => bracketed::parse_row(row, ctx),
                LogFormat::JsonLines => json_lines::parse_row(row),
            };
            match result {
                Ok(partial) => parsed.records.push(ChangeRecord {
                    line,
                    ts: partial.ts,
                    actor: partial.actor.as_deref().and_then(normalize_actor),
                    unit: partial.unit,
                    action: partial.action,
                    summary: partial.summary,
                    excerpt: partial.excerpt,
                    row: row.to_string(),
                }),
                Err(reason) => parsed.errors.push(RecordError { line, reason }),
            }
        }
        parsed
    }
}

/// Row fields produced by a format-specific parser.
struct RowFields {
    ts: i64,
    actor: Option<String>,
    unit: Option<String>,
    action: String,
    summary: String,
    excerpt: Option<String>,
}

/// Trimmed actor id, or `None` when nothing is left.
pub fn normalize_actor(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn decode(bytes: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Whether a file name suggests a change log.
pub fn looks_like_log_name(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    NAME_HINTS.iter().any(|h| lower.contains(h))
}

/// Pick the best-matching format, if any has enough matching rows. A
/// log-like file name only breaks near-ties.
pub fn detect(bytes: &[u8], file_name: &str) -> Option<(LogFormat, f32)> {
    let bonus = if looks_like_log_name(file_name) {
        NAME_HINT_BONUS
    } else {
        0.0
    };
    LogFormat::ALL
        .into_iter()
        .filter_map(|format| {
            let base = format.sniff(bytes);
            if base <= 0.0 {
                return None;
            }
            Some((format, (base + bonus).min(1.0)))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// Unit named by a log's own file name: `Report_changelog.txt` → `Report`.
pub fn unit_from_log_name(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    let lower = stem.to_ascii_lowercase();
    for suffix in [
        "_changelog",
        "-changelog",
        ".changelog",
        " changelog",
        "_activity",
        "-activity",
        "_history",
        "-history",
    ] {
        if lower.ends_with(suffix) {
            return stem[..stem.len() - suffix.len()].trim().to_string();
        }
    }
    stem.to_string()
}
