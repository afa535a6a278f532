//! Final ordering of the corpus.

use std::cmp::Ordering;

use briefwire_shared::{Article, RunDate};

/// Score lost per day of age: `freshness = 1 / (1 + DECAY * age_days)`.
pub const FRESHNESS_DECAY_PER_DAY: f64 = 0.1;

/// Whole days between the article's date and the run date, never negative.
pub fn age_days(article: &Article, run_date: RunDate) -> f64 {
    let days = (run_date.date() - article.index_date()).num_days();
    days.max(0) as f64
}

pub fn freshness(age_days: f64) -> f64 {
    1.0 / (1.0 + FRESHNESS_DECAY_PER_DAY * age_days.max(0.0))
}

/// Set `ranking_score` on every article and sort best first (ties by id).
pub fn rank_articles(articles: &mut [Article], run_date: RunDate) {
    for article in articles.iter_mut() {
        let score = article.relevance_score * freshness(age_days(article, run_date));
        article.ranking_score = Some(score);
    }
    articles.sort_by(compare_ranked);
}

fn compare_ranked(a: &Article, b: &Article) -> Ordering {
    let score = |x: &Article| x.ranking_score.unwrap_or(x.relevance_score);
    score(b).total_cmp(&score(a)).then_with(|| a.id.cmp(&b.id))
}

/// Best-first by relevance alone (ties by id); used before final ranking.
pub fn by_relevance<'a>(articles: impl IntoIterator<Item = &'a Article>) -> Vec<&'a Article> {
    let mut sorted: Vec<&Article> = articles.into_iter().collect();
    sorted.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.id.cmp(&b.id))
    });
    sorted
}
