use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;

use super::RowFields;

lazy_static! {
    static ref MOVED: Regex = Regex::new(
        r"(?i)^\s*(?P<ts>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z)\s*-\s*(?P<actor>people/\d{6,})\s+moved\s+(?P<name>.+?)\s+from\s+(?P<from>.+?)\s+to\s+(?P<to>.+?)\s*$"
    )
    .unwrap();
    static ref RENAMED: Regex = Regex::new(
        r"(?i)^\s*(?P<ts>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z)\s*-\s*(?P<actor>people/\d{6,})\s+renamed\s+(?P<old>.+?)\s+to\s+(?P<new>.+?)\s+at\s+(?P<path>.+?)\s*$"
    )
    .unwrap();
    static ref ACTION_AT: Regex = Regex::new(
        r"(?i)^\s*(?P<ts>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z)\s*-\s*(?P<actor>people/\d{6,})\s+(?P<action>created|edited|commented|moved|renamed|deleted)\s+(?P<name>.+?)\s+at\s+(?P<path>.+?)\s*$"
    )
    .unwrap();
}

fn matches(line: &str) -> bool {
    MOVED.is_match(line) || RENAMED.is_match(line) || ACTION_AT.is_match(line)
}

pub(super) fn count_matches(lines: &[&str]) -> usize {
    lines.iter().filter(|l| matches(l)).count()
}

fn parse_ts(ts: &str) -> Result<i64, String> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.timestamp())
        .map_err(|e| format!("bad timestamp '{}': {}", ts, e))
}

pub(super) fn parse_row(row: &str) -> Result<RowFields, String> {
    if let Some(c) = MOVED.captures(row) {
        return Ok(RowFields {
            ts: parse_ts(&c["ts"])?,
            actor: Some(c["actor"].to_string()),
            unit: Some(c["name"].trim().to_string()),
            action: "moved".to_string(),
            summary: format!("moved {} from {} to {}", &c["name"], &c["from"], &c["to"]),
            excerpt: None,
        });
    }

    if let Some(c) = RENAMED.captures(row) {
        return Ok(RowFields {
            ts: parse_ts(&c["ts"])?,
            actor: Some(c["actor"].to_string()),
            unit: Some(c["new"].trim().to_string()),
            action: "renamed".to_string(),
            summary: format!("renamed {} to {} at {}", &c["old"], &c["new"], &c["path"]),
            excerpt: None,
        });
    }

    if let Some(c) = ACTION_AT.captures(row) {
        let action = c["action"].to_ascii_lowercase();
        return Ok(RowFields {
            ts: parse_ts(&c["ts"])?,
            actor: Some(c["actor"].to_string()),
            unit: Some(c["name"].trim().to_string()),
            summary: format!("{} {} at {}", action, &c["name"], &c["path"]),
            action,
            excerpt: None,
        });
    }

    Err("unrecognized drive audit row".to_string())
}
