//! Prompt text sent to the completion service.

use briefwire_shared::{Article, KNOWN_TAGS, ScrapedItem};

/// Longest slice of rendered page text placed into an extraction prompt.
const MAX_SOURCE_CHARS: usize = 12_000;

/// First line of every extraction prompt.
pub const EXTRACTION_HEADER: &str = "Extract AI news articles from the page text below.";
/// First line of every summary prompt.
pub const SUMMARY_HEADER: &str = "Summarize this news article in two sentences.";
/// First line of every tagging prompt.
pub const TAGS_HEADER: &str = "Choose topic tags for this news article.";
/// First line of every podcast script prompt.
pub const SCRIPT_HEADER: &str = "Write a short two-host podcast script about these stories.";

pub fn extraction(item: &ScrapedItem) -> String {
    let text = truncate_chars(&item.text, MAX_SOURCE_CHARS);
    format!(
        "{EXTRACTION_HEADER}\n\
         Return only a JSON array. Each element must have: \"title\", \"description\", \
         \"url\" (absolute), \"source\" (use \"{source}\"), \"relevanceScore\" (0 to 1, how \
         relevant to AI practitioners). Optional: \"tags\" (from: {tags}), \"entities\" \
         (companies, people, models), \"publishedAt\" (RFC 3339).\n\
         Page URL: {url}\n\n\
         ---\n{text}\n---",
        source = item.source,
        url = item.url,
        tags = KNOWN_TAGS.join(", "),
    )
}

pub fn summary(article: &Article) -> String {
    format!(
        "{SUMMARY_HEADER}\n\
         Reply with the summary text only.\n\n\
         Title: {}\nSource: {}\nDescription: {}",
        article.title, article.source, article.description
    )
}

pub fn tags(article: &Article) -> String {
    format!(
        "{TAGS_HEADER}\n\
         Return a JSON array of 1 to 3 tags taken only from: {}.\n\n\
         Title: {}\nDescription: {}",
        KNOWN_TAGS.join(", "),
        article.title,
        article.summary_or_description()
    )
}

pub fn script(articles: &[&Article]) -> String {
    let stories: Vec<String> = articles
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {} ({}): {}", i + 1, a.title, a.source, a.summary_or_description()))
        .collect();
    format!(
        "{SCRIPT_HEADER}\n\
         Hosts are \"Ana\" and \"Ben\". Return a JSON object {{\"lines\": [{{\"speaker\": ..., \
         \"text\": ...}}]}} covering every story in order.\n\n{}",
        stories.join("\n")
    )
}

/// Text read aloud for one article.
pub fn narration(article: &Article) -> String {
    format!("{}. {}", article.title, article.summary_or_description())
}

/// Text embedded for one article.
pub fn embedding_input(article: &Article) -> String {
    format!("{}\n\n{}", article.title, article.summary_or_description())
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn extraction_prompt_truncates_source() {
        let item = ScrapedItem {
            source: "wire".into(),
            url: "https://wire.example/ai".into(),
            text: "ü".repeat(MAX_SOURCE_CHARS + 50),
            fetched_at: Utc::now(),
        };
        let prompt = extraction(&item);
        assert!(prompt.starts_with(EXTRACTION_HEADER));
        assert!(prompt.contains("use \"wire\""));
        assert_eq!(prompt.matches('ü').count(), MAX_SOURCE_CHARS);
    }

    #[test]
    fn prompts_use_summary_when_present() {
        let mut article = Article::new("T", "https://x", "s", "desc", 0.5, Utc::now());
        assert!(tags(&article).contains("Description: desc"));
        article.summary = Some("sum".into());
        assert!(tags(&article).contains("Description: sum"));
        assert_eq!(narration(&article), "T. sum");
        assert!(script(&[&article]).contains("1. T (s): sum"));
    }
}
