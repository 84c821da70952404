use chrono::DateTime;
use serde_json::Value;

use super::RowFields;

pub(super) fn count_matches(lines: &[&str]) -> usize {
    lines
        .iter()
        .filter(|l| {
            serde_json::from_str::<Value>(l)
                .map(|v| v.get("ts").is_some())
                .unwrap_or(false)
        })
        .count()
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|f| f.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_ts(v: &Value) -> Result<i64, String> {
    match v.get("ts") {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp())
            .map_err(|e| format!("bad timestamp '{}': {}", s, e)),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| format!("bad timestamp {}", n)),
        Some(other) => Err(format!("bad timestamp {}", other)),
        None => Err("missing ts".to_string()),
    }
}

pub(super) fn parse_row(row: &str) -> Result<RowFields, String> {
    let v: Value = serde_json::from_str(row).map_err(|e| format!("invalid JSON: {}", e))?;
    if !v.is_object() {
        return Err("expected a JSON object".to_string());
    }
    let ts = parse_ts(&v)?;
    let action = str_field(&v, "action").unwrap_or_else(|| "edited".to_string());
    let unit = str_field(&v, "unit");
    let summary = str_field(&v, "summary").unwrap_or_else(|| match &unit {
        Some(u) => format!("{} {}", action, u),
        None => action.clone(),
    });
    Ok(RowFields {
        ts,
        actor: str_field(&v, "actor"),
        unit,
        action,
        summary,
        excerpt: str_field(&v, "content"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_and_epoch_timestamps() {
        let a = parse_row(r#"{"ts":"2024-03-01T10:00:00Z","actor":"a@x.org","unit":"a.md"}"#).unwrap();
        assert_eq!(a.ts, 1_709_287_200);
        assert_eq!(a.summary, "edited a.md");
        let b = parse_row(r#"{"ts":1709287200,"action":"commented","summary":"nit"}"#).unwrap();
        assert_eq!(b.ts, 1_709_287_200);
        assert!(b.actor.is_none());
    }

    #[test]
    fn missing_ts_is_an_error() {
        assert!(parse_row(r#"{"actor":"a"}"#).is_err());
        assert!(parse_row("[1,2]").is_err());
    }
}
