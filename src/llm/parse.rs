//! Extraction of structured payloads from model output.
//!
//! Models wrap JSON in markdown fences, prepend prose, or emit truncated
//! objects. These helpers recover a parseable value where possible; callers
//! get `None` when nothing salvageable remains and map that to a
//! `parse_failed` error after their one repair attempt.

use serde_json::Value;

/// Extract a JSON value from raw model output.
///
/// Tries, in order: a fenced ```json block, the first balanced `{...}`
/// object, and the raw text itself.
#[must_use]
pub fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.len() < 2 {
        return None;
    }

    if let Some(fenced) = extract_fenced_block(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(&fenced) {
            return Some(v);
        }
    }

    if let Some(obj) = extract_balanced_object(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(obj) {
            return Some(v);
        }
    }

    serde_json::from_str::<Value>(trimmed).ok()
}

/// Extract a JSON object that contains the given top-level key, repairing
/// the common failure where the model emits `"key": [...]` without the
/// enclosing braces.
#[must_use]
pub fn extract_json_with_key(raw: &str, key: &str) -> Option<Value> {
    if let Some(v) = extract_json(raw) {
        if v.get(key).is_some() {
            return Some(v);
        }
        // Planner responses sometimes come back under a sibling name.
        if let Some(obj) = v.as_object() {
            if obj.len() == 1 {
                let (_, inner) = obj.iter().next()?;
                if inner.is_array() {
                    return Some(serde_json::json!({ key: inner.clone() }));
                }
            }
        }
    }

    // Bare `"key": [...]` without braces.
    let trimmed = raw.trim();
    let needle = format!("\"{key}\"");
    if trimmed.contains(&needle) && !trimmed.starts_with('{') {
        let wrapped = format!("{{{trimmed}}}");
        if let Ok(v) = serde_json::from_str::<Value>(&wrapped) {
            if v.get(key).is_some() {
                return Some(v);
            }
        }
    }

    None
}

/// Strip markdown fences and surrounding prose from SQL output.
///
/// Generation prompts ask for SQL only, but models still wrap statements in
/// ```sql fences or prefix them with a sentence.
#[must_use]
pub fn extract_sql(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Some(fenced) = extract_fenced_block(trimmed) {
        return fenced.trim().to_string();
    }

    // Drop a leading prose line when the statement starts on a later line.
    let starters = ["SELECT", "INSERT", "UPDATE", "DELETE", "WITH", "CREATE", "DROP", "ALTER", "TRUNCATE"];
    let upper = trimmed.to_uppercase();
    if !starters.iter().any(|s| upper.starts_with(s)) {
        for (idx, line) in trimmed.lines().enumerate() {
            let line_upper = line.trim().to_uppercase();
            if starters.iter().any(|s| line_upper.starts_with(s)) {
                return trimmed
                    .lines()
                    .skip(idx)
                    .collect::<Vec<_>>()
                    .join("\n")
                    .trim()
                    .to_string();
            }
        }
    }

    trimmed.to_string()
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip an optional language tag on the fence line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].to_string())
}

fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let v = extract_json(r#"{"queries": []}"#).unwrap();
        assert!(v["queries"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_extract_json_fenced() {
        let raw = "Here you go:\n```json\n{\"columns\": [\"a\", \"b\"]}\n```\nDone.";
        let v = extract_json(raw).unwrap();
        assert_eq!(v["columns"][1], "b");
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let raw = "The plan is {\"questions\": [{\"question\": \"q1\"}]} as requested";
        let v = extract_json(raw).unwrap();
        assert_eq!(v["questions"][0]["question"], "q1");
    }

    #[test]
    fn test_extract_json_with_key_repairs_braceless() {
        let raw = "\"queries\": [{\"sql\": \"SELECT 1\", \"description\": \"d\", \"type\": \"t\"}]";
        let v = extract_json_with_key(raw, "queries").unwrap();
        assert_eq!(v["queries"][0]["sql"], "SELECT 1");
    }

    #[test]
    fn test_extract_json_with_key_renames_single_sibling() {
        let raw = r#"{"questions": [{"sql": "SELECT 1"}]}"#;
        let v = extract_json_with_key(raw, "queries").unwrap();
        assert!(v["queries"].is_array());
    }

    #[test]
    fn test_extract_json_rejects_garbage() {
        assert!(extract_json("queries").is_none());
        assert!(extract_json("").is_none());
    }

    #[test]
    fn test_extract_sql_strips_fences() {
        let raw = "```sql\nSELECT * FROM t;\n```";
        assert_eq!(extract_sql(raw), "SELECT * FROM t;");
    }

    #[test]
    fn test_extract_sql_drops_leading_prose() {
        let raw = "Sure, here is the query:\nSELECT count(*) FROM t";
        assert_eq!(extract_sql(raw), "SELECT count(*) FROM t");
    }

    #[test]
    fn test_extract_sql_passthrough() {
        assert_eq!(extract_sql("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_balanced_object_ignores_braces_in_strings() {
        let raw = r#"{"a": "{not a brace}", "b": 2}"#;
        let v = extract_json(raw).unwrap();
        assert_eq!(v["b"], 2);
    }
}
