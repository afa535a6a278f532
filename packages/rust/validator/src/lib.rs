//! Defensive parsing of free-form completion output into typed records.
//!
//! Every validator follows the same staged path: raw text → optional
//! code-fence unwrap → generic JSON tree → locate the item array →
//! per-item checks with salvage. Items that fail their checks are dropped;
//! the batch only fails when fewer than [`ValidatorOptions::min_valid_items`]
//! survive.
//!
//! - [`validate_articles`]: article candidates
//! - [`validate_tags`]: tags filtered to the known vocabulary
//! - [`validate_summary`]: a non-empty trimmed string
//! - [`validate_script`]: podcast dialogue lines

mod article;
mod parse;
mod script;
mod summary;
mod tags;

pub use article::{ArticleCandidate, validate_articles};
pub use parse::{excerpt, strip_code_fence, strip_wrapping_fence};
pub use script::validate_script;
pub use summary::validate_summary;
pub use tags::validate_tags;

/// Knobs shared by the list validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorOptions {
    /// Fewer surviving items than this is reported as `no_valid_items`.
    /// Values below 1 behave as 1.
    pub min_valid_items: usize,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self { min_valid_items: 1 }
    }
}

impl ValidatorOptions {
    pub(crate) fn floor(&self) -> usize {
        self.min_valid_items.max(1)
    }
}
