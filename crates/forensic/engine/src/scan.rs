//! Locating structured fragments inside free-form model output.

use serde_json::Value;

/// Every top-level JSON object embedded in `text`, in order of appearance.
///
/// Models wrap their JSON in prose or code fences, so each `{` is tried as the
/// start of a value. If nothing parses, a second pass swaps single quotes for
/// double quotes to catch Python-style dicts.
pub(crate) fn embedded_objects(text: &str) -> Vec<Value> {
    let strict = scan_objects(text);
    if !strict.is_empty() || !text.contains('\'') {
        return strict;
    }
    scan_objects(&text.replace('\'', "\""))
}

fn scan_objects(text: &str) -> Vec<Value> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find('{') {
        let start = cursor + offset;
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value @ Value::Object(_))) => {
                cursor = start + values.byte_offset();
                found.push(value);
            }
            _ => cursor = start + 1,
        }
    }
    found
}

/// Lowercased key with separators removed: `Final_BPS` → `finalbps`.
pub(crate) fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Integer with optional comma thousands grouping: `9,650` → 9650.
///
/// Groups after the first must be exactly three digits, so `96,50` is rejected.
pub(crate) fn parse_grouped(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    let digits = text.strip_prefix('-').unwrap_or(text);
    let mut groups = digits.split(',');
    let head = groups.next()?;
    let all_digits = |g: &str| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit());
    if head.len() > 3 || !all_digits(head) {
        return None;
    }
    let mut grouped = false;
    for group in groups {
        if group.len() != 3 || !all_digits(group) {
            return None;
        }
        grouped = true;
    }
    if !grouped {
        return None;
    }
    text.replace(',', "").parse().ok()
}

/// Integer view of a JSON number or numeric string.
pub(crate) fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            parse_grouped(trimmed).or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.round() as i64)
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_objects_inside_prose_and_fences() {
        let text = "Verdict follows.\n```json\n{\"bps\": 9100}\n```\nand {\"x\": {\"y\": 1}} done";
        let objects = embedded_objects(text);
        assert_eq!(objects, vec![json!({"bps": 9100}), json!({"x": {"y": 1}})]);
    }

    #[test]
    fn unbalanced_braces_are_skipped() {
        assert!(embedded_objects("score {not json at all").is_empty());
    }

    #[test]
    fn single_quoted_dicts_are_recovered() {
        let objects = embedded_objects("{'jury': [{'voter': 1, 'score': 40}]}");
        assert_eq!(objects[0]["jury"][0]["score"], json!(40));
    }

    #[test]
    fn numeric_views() {
        assert_eq!(as_integer(&json!(9650)), Some(9650));
        assert_eq!(as_integer(&json!(96.6)), Some(97));
        assert_eq!(as_integer(&json!(" 9100 ")), Some(9100));
        assert_eq!(as_integer(&json!("high")), None);
        assert_eq!(as_integer(&json!("9,650")), Some(9650));
        assert_eq!(normalize_key("Final_BPS"), "finalbps");
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(parse_grouped("9,650"), Some(9650));
        assert_eq!(parse_grouped("-1,000"), Some(-1000));
        assert_eq!(parse_grouped("10,000,000"), Some(10_000_000));
        assert_eq!(parse_grouped("96,50"), None);
        assert_eq!(parse_grouped("9650,"), None);
        assert_eq!(parse_grouped(",650"), None);
    }
}
