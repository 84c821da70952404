use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use lazy_static::lazy_static;
use regex::Regex;

use super::{LogContext, RowFields};

lazy_static! {
    static ref BRACKETED: Regex = Regex::new(
        r"^\s*\[(?P<action>[A-Za-z]+)\]\s*(?P<actor>[^(\[\]]+?)\s*\(\s*(?:•\s*)?(?P<when>[^()]+?)\s*(?:\((?P<tz>[A-Za-z]{2,5})\)\s*)?\)\s*:\s*(?P<content>.*?)\s*$"
    )
    .unwrap();
}

/// Year-less layouts seen in editor activity panes; the year is appended.
const LAYOUTS: &[&str] = &["%I:%M %p, %b %d %Y", "%H:%M, %b %d %Y", "%b %d, %I:%M %p %Y"];

const SUMMARY_CHARS: usize = 500;

pub(super) fn count_matches(lines: &[&str]) -> usize {
    lines.iter().filter(|l| BRACKETED.is_match(l)).count()
}

/// Offset east of UTC, in hours, for the zone names these logs print.
fn zone_offset_hours(tz: &str) -> Option<i32> {
    match tz.to_ascii_uppercase().as_str() {
        "UTC" | "GMT" | "Z" => Some(0),
        "EST" => Some(-5),
        "EDT" => Some(-4),
        "CST" => Some(-6),
        "CDT" => Some(-5),
        "MST" => Some(-7),
        "MDT" => Some(-6),
        "PST" => Some(-8),
        "PDT" => Some(-7),
        _ => None,
    }
}

fn parse_when(when: &str, tz: Option<&str>, year: i32) -> Result<i64, String> {
    let with_year = format!("{} {}", when.trim(), year);
    let naive = LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(&with_year, layout).ok())
        .ok_or_else(|| format!("unrecognized time '{}'", when))?;
    let hours = tz.and_then(zone_offset_hours).unwrap_or(0);
    let offset = FixedOffset::east_opt(hours * 3600)
        .ok_or_else(|| format!("bad zone offset {}", hours))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| format!("ambiguous local time '{}'", when))
}

pub(super) fn parse_row(row: &str, ctx: &LogContext) -> Result<RowFields, String> {
    let c = BRACKETED
        .captures(row)
        .ok_or_else(|| "unrecognized activity row".to_string())?;
    let ts = parse_when(&c["when"], c.name("tz").map(|m| m.as_str()), ctx.default_year)?;
    let content = c["content"].to_string();
    let summary: String = content.chars().take(SUMMARY_CHARS).collect();
    Ok(RowFields {
        ts,
        actor: Some(c["actor"].trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string),
        unit: None,
        action: c["action"].to_ascii_lowercase(),
        summary,
        excerpt: if content.is_empty() { None } else { Some(content) },
    })
}
