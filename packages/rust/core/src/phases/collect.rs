//! Scrape and extraction phases.

use chrono::Utc;
use tracing::{info, instrument, warn};

use briefwire_shared::{Article, BriefwireError, PipelinePhase, Result, RunState, ScrapedItem};
use briefwire_validator::validate_articles;

use super::PhaseEnv;
use crate::prompts;
use crate::ranking::by_relevance;

/// Render every configured source. Sources that fail are skipped; the phase
/// fails when none render or when a host's breaker is open.
#[instrument(skip_all, fields(phase = "scrape", date = %env.date))]
pub async fn scrape(env: &PhaseEnv<'_>, _state: RunState) -> Result<RunState> {
    let ctx = env.ctx;
    if ctx.sources.is_empty() {
        return Err(BriefwireError::insufficient("no sources configured"));
    }

    let total = ctx.sources.len();
    let mut scraped = Vec::with_capacity(total);
    for (i, source) in ctx.sources.iter().enumerate() {
        ctx.pacer.before(i).await;
        let renderer = &ctx.services.renderer;
        let result = ctx
            .guards
            .renderer(&source.url)
            .call(|| renderer.render(&source.url))
            .await;
        env.progress.item(PipelinePhase::Scrape, i + 1, total);

        match result {
            Ok(text) if !text.trim().is_empty() => scraped.push(ScrapedItem {
                source: source.name.clone(),
                url: source.url.clone(),
                text,
                fetched_at: Utc::now(),
            }),
            Ok(_) => warn!(url = %source.url, "source rendered no text, skipping"),
            Err(e) if e.is_circuit_open() => return Err(e),
            Err(e) => warn!(url = %source.url, code = e.code(), error = %e, "source failed, skipping"),
        }
    }

    if scraped.is_empty() {
        return Err(BriefwireError::insufficient(format!(
            "none of {total} source(s) could be rendered"
        )));
    }

    info!(rendered = scraped.len(), total, "scrape complete");
    Ok(RunState {
        scraped,
        ..RunState::default()
    })
}

/// Extract article candidates from each scraped page through the completion
/// service. Duplicate URLs are merged and the corpus is capped at
/// `max_articles`, keeping the most relevant. An open completion breaker
/// fails the phase.
#[instrument(skip_all, fields(phase = "gpt", date = %env.date))]
pub async fn gpt(env: &PhaseEnv<'_>, mut state: RunState) -> Result<RunState> {
    let ctx = env.ctx;
    let opts = ctx.validator_options();
    let completion = &ctx.services.completion;

    let total = state.scraped.len();
    let mut articles: Vec<Article> = Vec::new();
    for (i, item) in state.scraped.iter().enumerate() {
        ctx.pacer.before(i).await;
        let prompt = prompts::extraction(item);
        let raw = ctx
            .guards
            .completion
            .call(|| completion.complete(&prompt))
            .await;
        env.progress.item(PipelinePhase::Gpt, i + 1, total);

        let candidates = match raw.and_then(|raw| validate_articles(raw.as_deref(), &opts)) {
            Ok(candidates) => candidates,
            Err(e) if e.is_circuit_open() => return Err(e),
            Err(e) => {
                warn!(url = %item.url, code = e.code(), error = %e, "extraction failed, skipping source");
                continue;
            }
        };

        for candidate in candidates {
            let article = candidate.into_article(item.fetched_at);
            match articles.iter_mut().find(|a| a.id == article.id) {
                Some(existing) => existing.merge_enrichment(article),
                None => articles.push(article),
            }
        }
    }

    if articles.is_empty() {
        return Err(BriefwireError::insufficient(
            "completion produced no valid articles",
        ));
    }

    let cap = ctx.settings.max_articles;
    if articles.len() > cap {
        let keep: Vec<String> = by_relevance(&articles)
            .into_iter()
            .take(cap)
            .map(|a| a.id.clone())
            .collect();
        articles.retain(|a| keep.contains(&a.id));
        info!(cap, "article list capped");
    }

    info!(articles = articles.len(), "extraction complete");
    state.articles = articles;
    Ok(state)
}
