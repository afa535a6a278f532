//! Article candidates extracted by the completion service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use briefwire_shared::{Article, Result, is_known_tag};

use crate::ValidatorOptions;
use crate::parse::{locate_array, parse_tree, required_str, salvage};

/// An extracted item that passed the minimal article shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleCandidate {
    pub title: String,
    pub url: String,
    pub source: String,
    pub description: String,
    pub relevance_score: f64,
    /// Known-vocabulary tags supplied alongside the item, if any.
    pub tags: Vec<String>,
    pub entities: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ArticleCandidate {
    /// Promote to an [`Article`] scraped at `scraped_at`.
    pub fn into_article(self, scraped_at: DateTime<Utc>) -> Article {
        let mut article = Article::new(
            self.title,
            self.url,
            self.source,
            self.description,
            self.relevance_score,
            scraped_at,
        );
        article.add_tags(self.tags);
        if !self.entities.is_empty() {
            article.entities = Some(self.entities);
        }
        article.published_at = self.published_at;
        article
    }
}

/// Parse a completion response into article candidates, salvaging the
/// valid subset.
pub fn validate_articles(
    raw: Option<&str>,
    opts: &ValidatorOptions,
) -> Result<Vec<ArticleCandidate>> {
    let tree = parse_tree(raw)?;
    let items = locate_array(&tree, &[])?;
    salvage("article", items, opts, validate_item)
}

fn validate_item(item: &Value) -> std::result::Result<ArticleCandidate, String> {
    if !item.is_object() {
        return Err("item is not an object".into());
    }

    let title = required_str(item, "title")?;
    let description = required_str(item, "description")?;
    let url = required_str(item, "url")?;
    let source = required_str(item, "source")?;
    let relevance_score = relevance(item)?;

    Ok(ArticleCandidate {
        title,
        url,
        source,
        description,
        relevance_score,
        tags: optional_tags(item),
        entities: optional_strings(item, "entities"),
        published_at: optional_timestamp(item),
    })
}

fn relevance(item: &Value) -> std::result::Result<f64, String> {
    let value = item
        .get("relevanceScore")
        .or_else(|| item.get("relevance_score"))
        .ok_or_else(|| "'relevanceScore' is missing".to_string())?;

    let score = value
        .as_f64()
        .ok_or_else(|| "'relevanceScore' is not a number".to_string())?;

    if !(0.0..=1.0).contains(&score) {
        return Err(format!("'relevanceScore' {score} outside [0, 1]"));
    }
    Ok(score)
}

fn optional_strings(item: &Value, key: &str) -> Vec<String> {
    let Some(values) = item.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for s in values.iter().filter_map(Value::as_str) {
        let s = s.trim();
        if !s.is_empty() && !out.iter().any(|existing| existing == s) {
            out.push(s.to_string());
        }
    }
    out
}

fn optional_tags(item: &Value) -> Vec<String> {
    optional_strings(item, "tags")
        .into_iter()
        .map(|t| t.to_lowercase())
        .filter(|t| is_known_tag(t))
        .fold(Vec::new(), |mut acc, t| {
            if !acc.contains(&t) {
                acc.push(t);
            }
            acc
        })
}

fn optional_timestamp(item: &Value) -> Option<DateTime<Utc>> {
    let raw = item
        .get("publishedAt")
        .or_else(|| item.get("published_at"))?
        .as_str()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
