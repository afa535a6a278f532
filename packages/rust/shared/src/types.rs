//! Core domain types for briefwire runs and articles.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BriefwireError;

/// Fixed tag vocabulary accepted from the completion service.
pub const KNOWN_TAGS: &[&str] = &[
    "llm",
    "research",
    "open-source",
    "product",
    "funding",
    "policy",
    "safety",
    "hardware",
    "robotics",
    "agents",
    "vision",
    "audio",
    "tooling",
    "industry",
];

/// Whether `tag` (already normalized) is part of [`KNOWN_TAGS`].
pub fn is_known_tag(tag: &str) -> bool {
    KNOWN_TAGS.contains(&tag)
}

// ---------------------------------------------------------------------------
// RunDate
// ---------------------------------------------------------------------------

/// Calendar date a pipeline run belongs to (`YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunDate(pub NaiveDate);

impl RunDate {
    pub const FORMAT: &'static str = "%Y-%m-%d";

    /// Today's date in UTC.
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for RunDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for RunDate {
    type Err = BriefwireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), Self::FORMAT)
            .map(Self)
            .map_err(|e| BriefwireError::validation(format!("invalid run date '{s}': {e}")))
    }
}

impl From<NaiveDate> for RunDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

// ---------------------------------------------------------------------------
// PipelinePhase
// ---------------------------------------------------------------------------

/// One stage of the daily pipeline. Declaration order is pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Scrape,
    Gpt,
    Enrich,
    Moderate,
    Embed,
    Audio,
    Podcast,
    Final,
}

impl PipelinePhase {
    /// Every phase, in execution order.
    pub const ALL: [PipelinePhase; 8] = [
        Self::Scrape,
        Self::Gpt,
        Self::Enrich,
        Self::Moderate,
        Self::Embed,
        Self::Audio,
        Self::Podcast,
        Self::Final,
    ];

    /// Token used in checkpoint keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Gpt => "gpt",
            Self::Enrich => "enrich",
            Self::Moderate => "moderate",
            Self::Embed => "embed",
            Self::Audio => "audio",
            Self::Podcast => "podcast",
            Self::Final => "final",
        }
    }

    /// Position in the pipeline (scrape = 0 … final = 7).
    pub fn order(&self) -> usize {
        match self {
            Self::Scrape => 0,
            Self::Gpt => 1,
            Self::Enrich => 2,
            Self::Moderate => 3,
            Self::Embed => 4,
            Self::Audio => 5,
            Self::Podcast => 6,
            Self::Final => 7,
        }
    }

    /// The phase that runs after this one, if any.
    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.order() + 1).copied()
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelinePhase {
    type Err = BriefwireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| BriefwireError::validation(format!("unknown pipeline phase '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// A ranked, progressively enriched news item.
///
/// Fields are only ever added by later phases; `id` and `url` are fixed at
/// creation. Serialized in camelCase, the record format downstream
/// consumers read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
    /// Topical fit in `[0, 1]`.
    pub relevance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub scraped_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderation_passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl Article {
    /// Create a bare article; the id is derived from the URL.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        description: impl Into<String>,
        relevance_score: f64,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        Self {
            id: Self::id_for_url(&url),
            title: title.into(),
            url,
            source: source.into(),
            description: description.into(),
            summary: None,
            tags: Vec::new(),
            entities: None,
            relevance_score,
            ranking_score: None,
            embedding: None,
            scraped_at,
            published_at: None,
            moderation_passed: None,
            audio_url: None,
        }
    }

    /// Stable identifier: first 16 hex chars of SHA-256 over the URL.
    pub fn id_for_url(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.trim().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }

    /// Summary if present, otherwise the description.
    pub fn summary_or_description(&self) -> &str {
        self.summary.as_deref().unwrap_or(&self.description)
    }

    /// Date used for date indexing: publication date, else scrape date.
    pub fn index_date(&self) -> NaiveDate {
        self.published_at.unwrap_or(self.scraped_at).date_naive()
    }

    /// Append tags not already present, preserving order.
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }

    /// Set the summary unless one is already present.
    pub fn set_summary_if_absent(&mut self, summary: String) {
        if self.summary.is_none() {
            self.summary = Some(summary);
        }
    }

    /// Fold another record for the same URL into this one.
    ///
    /// Only unset fields are filled and tags are extended; fields already
    /// present are kept. `id`, `url` and the core text fields never change.
    pub fn merge_enrichment(&mut self, other: Article) {
        if other.id != self.id {
            return;
        }
        self.add_tags(other.tags);
        if let Some(summary) = other.summary {
            self.set_summary_if_absent(summary);
        }
        fill(&mut self.entities, other.entities);
        fill(&mut self.ranking_score, other.ranking_score);
        fill(&mut self.embedding, other.embedding);
        fill(&mut self.published_at, other.published_at);
        fill(&mut self.moderation_passed, other.moderation_passed);
        fill(&mut self.audio_url, other.audio_url);
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

// ---------------------------------------------------------------------------
// Phase payloads
// ---------------------------------------------------------------------------

/// Raw text rendered from one configured source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedItem {
    pub source: String,
    pub url: String,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
}

/// One spoken line of the generated podcast script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    pub text: String,
}

/// Scripted dialogue assembled from the day's top articles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodcastEpisode {
    pub title: String,
    pub lines: Vec<DialogueLine>,
    pub article_ids: Vec<String>,
}

/// Snapshot of a run, written as the checkpoint payload after every phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scraped: Vec<ScrapedItem>,
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub podcast: Option<PodcastEpisode>,
}
