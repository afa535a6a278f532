//! Tag list validation against the known vocabulary.

use serde_json::Value;

use briefwire_shared::{Result, is_known_tag};

use crate::ValidatorOptions;
use crate::parse::{locate_array, parse_tree, salvage};

/// Parse a tag list, keeping only entries from the known vocabulary.
///
/// Entries are trimmed and lowercased; duplicates collapse onto their first
/// occurrence.
pub fn validate_tags(raw: Option<&str>, opts: &ValidatorOptions) -> Result<Vec<String>> {
    let tree = parse_tree(raw)?;
    let items = locate_array(&tree, &["tags"])?;

    let mut seen: Vec<String> = Vec::new();
    let unique: Vec<Value> = items
        .iter()
        .map(|item| match item.as_str() {
            Some(s) => Value::String(s.trim().to_lowercase()),
            None => item.clone(),
        })
        .filter(|item| match item.as_str() {
            Some(tag) if seen.iter().any(|s| s == tag) => false,
            Some(tag) => {
                seen.push(tag.to_string());
                true
            }
            None => true,
        })
        .collect();

    salvage("tag", &unique, opts, check_tag)
}

fn check_tag(item: &Value) -> std::result::Result<String, String> {
    let tag = item.as_str().ok_or_else(|| "tag is not a string".to_string())?;
    if is_known_tag(tag) {
        Ok(tag.to_string())
    } else {
        Err(format!("'{tag}' is not a known tag"))
    }
}
