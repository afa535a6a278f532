//! Embedding similarity between articles.

use briefwire_shared::Article;
use serde::Serialize;

use crate::ArticleIndex;

/// An article paired with its similarity to a query article.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredArticle<'a> {
    pub article: &'a Article,
    pub score: f64,
}

/// Cosine similarity of two vectors.
///
/// Mismatched lengths, empty vectors and zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Articles most similar to `article_id` by embedding, best first.
///
/// Only articles whose embedding has the target's length are compared; the
/// target itself is excluded. An unknown id or a target without an
/// embedding yields nothing.
pub fn find_similar_articles<'a>(
    index: &'a ArticleIndex,
    article_id: &str,
    limit: usize,
) -> Vec<ScoredArticle<'a>> {
    let Some(target) = index.get(article_id) else {
        return Vec::new();
    };
    let Some(query) = target.embedding.as_deref() else {
        return Vec::new();
    };

    let mut scored: Vec<ScoredArticle<'a>> = index
        .all()
        .iter()
        .filter(|a| a.id != target.id)
        .filter_map(|a| {
            let embedding = a.embedding.as_deref()?;
            (embedding.len() == query.len()).then(|| ScoredArticle {
                article: a,
                score: cosine_similarity(query, embedding),
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.article.id.cmp(&b.article.id))
    });
    scored.truncate(limit);
    scored
}
