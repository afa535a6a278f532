//! In-memory lookup structures over a finished article corpus.
//!
//! [`build_article_index`] takes a snapshot of articles and derives id, tag,
//! date and source indexes. The index is read-only; a new corpus means a new
//! index. Query functions return borrowed articles in corpus order unless
//! they rank.

mod similarity;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

use briefwire_shared::Article;
use chrono::NaiveDate;
use tracing::debug;

pub use similarity::{ScoredArticle, cosine_similarity, find_similar_articles};

// ---------------------------------------------------------------------------
// ArticleIndex
// ---------------------------------------------------------------------------

/// Read-only view over one article snapshot.
///
/// Every article in [`all`](Self::all) has exactly one id slot and appears
/// under each of its tags, its date and its source.
#[derive(Debug, Clone, Default)]
pub struct ArticleIndex {
    all: Vec<Article>,
    by_id: HashMap<String, usize>,
    by_tag: BTreeMap<String, Vec<usize>>,
    by_date: BTreeMap<NaiveDate, Vec<usize>>,
    by_source: BTreeMap<String, Vec<usize>>,
}

impl ArticleIndex {
    pub fn all(&self) -> &[Article] {
        &self.all
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Article> {
        self.by_id.get(id).map(|&i| &self.all[i])
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&Article> {
        self.resolve(self.by_tag.get(&tag_key(tag)))
    }

    pub fn by_date(&self, date: NaiveDate) -> Vec<&Article> {
        self.resolve(self.by_date.get(&date))
    }

    pub fn by_source(&self, source: &str) -> Vec<&Article> {
        self.resolve(self.by_source.get(source))
    }

    /// Tags present in the corpus with their article counts.
    pub fn tag_counts(&self) -> Vec<(&str, usize)> {
        self.by_tag
            .iter()
            .map(|(tag, slots)| (tag.as_str(), slots.len()))
            .collect()
    }

    /// Sources present in the corpus, sorted.
    pub fn sources(&self) -> Vec<&str> {
        self.by_source.keys().map(String::as_str).collect()
    }

    fn resolve(&self, slots: Option<&Vec<usize>>) -> Vec<&Article> {
        slots
            .map(|slots| slots.iter().map(|&i| &self.all[i]).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Tags are indexed and looked up trimmed and lowercased.
fn tag_key(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Derive every index from `articles`.
///
/// Later duplicates of an id are dropped so each id maps to one article.
pub fn build_article_index(articles: Vec<Article>) -> ArticleIndex {
    let mut index = ArticleIndex::default();

    for article in articles {
        if index.by_id.contains_key(&article.id) {
            debug!(article_id = %article.id, "skipping duplicate article id");
            continue;
        }
        let slot = index.all.len();

        index.by_id.insert(article.id.clone(), slot);
        let tags: HashSet<String> = article.tags.iter().map(|t| tag_key(t)).collect();
        for tag in tags {
            index.by_tag.entry(tag).or_default().push(slot);
        }
        index
            .by_date
            .entry(article.index_date())
            .or_default()
            .push(slot);
        index
            .by_source
            .entry(article.source.clone())
            .or_default()
            .push(slot);

        index.all.push(article);
    }

    debug!(
        articles = index.all.len(),
        tags = index.by_tag.len(),
        dates = index.by_date.len(),
        "article index built"
    );
    index
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Case-insensitive substring search over title, description and summary.
///
/// A blank query returns every article.
pub fn search_articles<'a>(index: &'a ArticleIndex, query: &str) -> Vec<&'a Article> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return index.all.iter().collect();
    }

    index
        .all
        .iter()
        .filter(|a| {
            a.title.to_lowercase().contains(&needle)
                || a.description.to_lowercase().contains(&needle)
                || a
                    .summary
                    .as_deref()
                    .is_some_and(|s| s.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Articles carrying any of `tags` (OR), each at most once.
///
/// An empty tag list returns every article.
pub fn filter_by_tags<'a, S: AsRef<str>>(index: &'a ArticleIndex, tags: &[S]) -> Vec<&'a Article> {
    if tags.is_empty() {
        return index.all.iter().collect();
    }

    let mut slots: Vec<usize> = tags
        .iter()
        .filter_map(|t| index.by_tag.get(&tag_key(t.as_ref())))
        .flatten()
        .copied()
        .collect();
    slots.sort_unstable();
    slots.dedup();
    slots.into_iter().map(|i| &index.all[i]).collect()
}

/// Articles dated within `[from, to]`, both bounds inclusive and optional.
pub fn filter_by_date_range(
    index: &ArticleIndex,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Vec<&Article> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Vec::new();
        }
    }

    let lower = from.map_or(Bound::Unbounded, Bound::Included);
    let upper = to.map_or(Bound::Unbounded, Bound::Included);

    let mut slots: Vec<usize> = index
        .by_date
        .range((lower, upper))
        .flat_map(|(_, slots)| slots.iter().copied())
        .collect();
    slots.sort_unstable();
    slots.into_iter().map(|i| &index.all[i]).collect()
}

/// Articles from exactly `source`.
pub fn filter_by_source<'a>(index: &'a ArticleIndex, source: &str) -> Vec<&'a Article> {
    index.by_source(source)
}

/// The `limit` best articles by ranking score, falling back to relevance.
pub fn top_articles(index: &ArticleIndex, limit: usize) -> Vec<&Article> {
    let mut ranked: Vec<&Article> = index.all.iter().collect();
    ranked.sort_by(|a, b| {
        rank_of(b)
            .total_cmp(&rank_of(a))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.truncate(limit);
    ranked
}

fn rank_of(article: &Article) -> f64 {
    article.ranking_score.unwrap_or(article.relevance_score)
}
