//! Shared stages: null check, fence unwrap, tree parse, array search, salvage.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use briefwire_shared::{BriefwireError, ResponseErrorCode, Result};

use crate::ValidatorOptions;

/// Keys conventionally holding the item array inside an object response.
const CONVENTIONAL_KEYS: &[&str] = &["articles", "results", "data", "items"];

/// Characters of raw text kept in `parse_error` diagnostics.
const EXCERPT_CHARS: usize = 200;

/// Remove a markdown code-fence wrapper, returning the trimmed body.
///
/// A fence wrapping the whole response is preferred; otherwise the first
/// fenced block found anywhere in the text is used. Unfenced text is only
/// trimmed.
pub fn strip_code_fence(raw: &str) -> &str {
    static EMBEDDED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("valid regex")
    });

    if let Some(inner) = wrapping_fence(raw) {
        return inner;
    }
    if let Some(inner) = EMBEDDED_RE.captures(raw).and_then(|c| c.get(1)) {
        return inner.as_str().trim();
    }
    raw.trim()
}

/// Remove a fence only when it wraps the whole text; anything else is
/// just trimmed.
pub fn strip_wrapping_fence(raw: &str) -> &str {
    wrapping_fence(raw).unwrap_or_else(|| raw.trim())
}

fn wrapping_fence(raw: &str) -> Option<&str> {
    static WRAPPED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```\s*$").expect("valid regex")
    });
    WRAPPED_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Truncated copy of `raw` for diagnostics, cut on a char boundary.
pub fn excerpt(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Stages 1–3: reject empty input, unwrap a fence, parse JSON.
pub(crate) fn parse_tree(raw: Option<&str>) -> Result<Value> {
    let raw = match raw {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            return Err(BriefwireError::malformed(
                ResponseErrorCode::NullResponse,
                "completion returned no content",
            ));
        }
    };

    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(BriefwireError::malformed(
            ResponseErrorCode::NullResponse,
            "completion contained an empty code block",
        ));
    }

    serde_json::from_str(body).map_err(|e| {
        BriefwireError::malformed(
            ResponseErrorCode::ParseError,
            format!("{e}; raw: {}", excerpt(raw)),
        )
    })
}

/// Stage 4: find the item array.
///
/// Bare arrays are used directly. For objects, `preferred` keys are tried
/// first, then the conventional keys, then the first array-valued property
/// in document order.
pub(crate) fn locate_array<'a>(value: &'a Value, preferred: &[&str]) -> Result<&'a [Value]> {
    let found = match value {
        Value::Array(items) => Some(items.as_slice()),
        Value::Object(map) => preferred
            .iter()
            .chain(CONVENTIONAL_KEYS)
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .or_else(|| map.values().find_map(Value::as_array))
            .map(Vec::as_slice),
        _ => None,
    };

    found.ok_or_else(|| {
        BriefwireError::malformed(
            ResponseErrorCode::InvalidStructure,
            format!("no array found in {} response", json_kind(value)),
        )
    })
}

/// Stage 5–6: validate each item, keep the survivors, enforce the floor.
pub(crate) fn salvage<T, F>(
    kind: &str,
    items: &[Value],
    opts: &ValidatorOptions,
    check: F,
) -> Result<Vec<T>>
where
    F: Fn(&Value) -> std::result::Result<T, String>,
{
    let mut kept = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match check(item) {
            Ok(valid) => kept.push(valid),
            Err(reason) => debug!(kind, index, %reason, "discarding invalid item"),
        }
    }

    let dropped = items.len() - kept.len();
    if kept.len() < opts.floor() {
        return Err(BriefwireError::malformed(
            ResponseErrorCode::NoValidItems,
            format!(
                "{} of {} {kind} item(s) valid, need at least {}",
                kept.len(),
                items.len(),
                opts.floor()
            ),
        ));
    }

    if dropped > 0 {
        info!(kind, kept = kept.len(), dropped, "salvaged partial response");
    }
    Ok(kept)
}

/// Non-empty trimmed string field.
pub(crate) fn required_str(item: &Value, key: &str) -> std::result::Result<String, String> {
    match item.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(format!("'{key}' is empty")),
        Some(other) => Err(format!("'{key}' is a {}, not a string", json_kind(other))),
        None => Err(format!("'{key}' is missing")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strips_whole_fence() {
        let raw = "```json\n[1, 2]\n```";
        assert_eq!(strip_code_fence(raw), "[1, 2]");
        let raw = "  ```\n{\"a\": 1}\n```  \n";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn strips_embedded_fence() {
        let raw = "Here you go:\n```json\n[\"llm\"]\n```\nLet me know!";
        assert_eq!(strip_code_fence(raw), "[\"llm\"]");
    }

    #[test]
    fn unfenced_text_is_trimmed() {
        assert_eq!(strip_code_fence("  [1]\n"), "[1]");
    }

    #[test]
    fn wrapping_fence_only_strips_whole_text() {
        assert_eq!(strip_wrapping_fence("```md\nBody.\n```"), "Body.");
        let prose = "Intro.\n```\nsnippet\n```\nOutro.";
        assert_eq!(strip_wrapping_fence(prose), prose);
        assert_eq!(strip_code_fence(prose), "snippet");
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn parse_tree_codes() {
        let err = parse_tree(None).unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseErrorCode::NullResponse));

        let err = parse_tree(Some("   \n")).unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseErrorCode::NullResponse));

        let err = parse_tree(Some("```json\n```")).unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseErrorCode::NullResponse));

        let err = parse_tree(Some("I could not find any articles.")).unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseErrorCode::ParseError));
        assert!(err.to_string().contains("I could not find"));
    }

    #[test]
    fn locate_array_key_search() {
        let bare = json!([1]);
        assert_eq!(locate_array(&bare, &[]).unwrap().len(), 1);

        let keyed = json!({"meta": {"n": 2}, "results": [1, 2]});
        assert_eq!(locate_array(&keyed, &[]).unwrap().len(), 2);

        let conventional_wins = json!({"other": [1], "items": [1, 2, 3]});
        assert_eq!(locate_array(&conventional_wins, &[]).unwrap().len(), 3);

        let preferred_wins = json!({"articles": [1], "tags": [1, 2]});
        assert_eq!(locate_array(&preferred_wins, &["tags"]).unwrap().len(), 2);

        let first_array =
            serde_json::from_str::<Value>(r#"{"zeta": [1, 2], "alpha": [1]}"#).unwrap();
        assert_eq!(locate_array(&first_array, &[]).unwrap().len(), 2);

        let none = json!({"count": 3});
        let err = locate_array(&none, &[]).unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseErrorCode::InvalidStructure));

        let scalar = json!("text");
        assert!(locate_array(&scalar, &[]).is_err());
    }

    #[test]
    fn salvage_respects_floor() {
        let items = vec![json!(1), json!("x"), json!(2)];
        let check = |v: &Value| v.as_i64().ok_or_else(|| "not a number".to_string());

        let kept = salvage("num", &items, &ValidatorOptions::default(), check).unwrap();
        assert_eq!(kept, vec![1, 2]);

        let strict = ValidatorOptions { min_valid_items: 3 };
        let err = salvage("num", &items, &strict, check).unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseErrorCode::NoValidItems));

        let zero = ValidatorOptions { min_valid_items: 0 };
        let err = salvage("num", &[json!("a")], &zero, check).unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseErrorCode::NoValidItems));
    }
}
