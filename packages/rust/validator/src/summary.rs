//! Article summary validation.

use briefwire_shared::{BriefwireError, ResponseErrorCode, Result};

use crate::parse::strip_wrapping_fence;

/// Accept a summary if it is a non-empty string once trimmed.
///
/// A code fence wrapping the whole text is removed first; fenced snippets
/// inside prose are kept as written.
pub fn validate_summary(raw: Option<&str>) -> Result<String> {
    let text = raw.map(strip_wrapping_fence).unwrap_or_default();
    if text.is_empty() {
        return Err(BriefwireError::malformed(
            ResponseErrorCode::NullResponse,
            "summary is empty",
        ));
    }
    Ok(text.to_string())
}
