//! Podcast script validation.

use serde_json::Value;

use briefwire_shared::{DialogueLine, Result};

use crate::ValidatorOptions;
use crate::parse::{locate_array, parse_tree, required_str, salvage};

/// Parse a podcast script into dialogue lines.
///
/// Accepts a bare array or an object holding it under `lines`, `script` or
/// `dialogue`. Each line needs a non-empty `speaker` and `text`.
pub fn validate_script(raw: Option<&str>, opts: &ValidatorOptions) -> Result<Vec<DialogueLine>> {
    let tree = parse_tree(raw)?;
    let items = locate_array(&tree, &["lines", "script", "dialogue"])?;
    salvage("dialogue", items, opts, check_line)
}

fn check_line(item: &Value) -> std::result::Result<DialogueLine, String> {
    Ok(DialogueLine {
        speaker: required_str(item, "speaker")?,
        text: required_str(item, "text")?,
    })
}
