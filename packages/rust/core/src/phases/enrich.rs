//! Per-article enrichment: summaries and tags, moderation, embeddings.

use tracing::{debug, info, instrument, warn};

use briefwire_shared::{PipelinePhase, Result, RunState};
use briefwire_validator::{validate_summary, validate_tags};

use super::PhaseEnv;
use crate::prompts;

/// Add a summary and tags to every article. A failed call falls back to the
/// article's own fields; only an open completion breaker aborts the phase.
#[instrument(skip_all, fields(phase = "enrich", date = %env.date))]
pub async fn enrich(env: &PhaseEnv<'_>, mut state: RunState) -> Result<RunState> {
    let ctx = env.ctx;
    let opts = ctx.validator_options();
    let completion = &ctx.services.completion;
    let guard = &ctx.guards.completion;

    let total = state.articles.len();
    let mut calls = 0usize;
    let mut fallbacks = 0usize;
    for (i, article) in state.articles.iter_mut().enumerate() {
        if article.summary.is_none() {
            ctx.pacer.before(calls).await;
            calls += 1;
            let prompt = prompts::summary(article);
            let summary = guard
                .call(|| completion.complete(&prompt))
                .await
                .and_then(|raw| validate_summary(raw.as_deref()));
            match summary {
                Ok(summary) => article.set_summary_if_absent(summary),
                Err(e) if e.is_circuit_open() => return Err(e),
                Err(e) => {
                    warn!(article_id = %article.id, code = e.code(), error = %e, "summary failed, using description");
                    fallbacks += 1;
                    let description = article.description.clone();
                    article.set_summary_if_absent(description);
                }
            }
        }

        ctx.pacer.before(calls).await;
        calls += 1;
        let prompt = prompts::tags(article);
        let tags = guard
            .call(|| completion.complete(&prompt))
            .await
            .and_then(|raw| validate_tags(raw.as_deref(), &opts));
        match tags {
            Ok(tags) => article.add_tags(tags),
            Err(e) if e.is_circuit_open() => return Err(e),
            Err(e) => {
                debug!(article_id = %article.id, code = e.code(), error = %e, "tagging failed, keeping existing tags")
            }
        }

        env.progress.item(PipelinePhase::Enrich, i + 1, total);
    }

    info!(articles = total, fallbacks, "enrichment complete");
    Ok(state)
}

/// Screen articles through the moderation service.
///
/// Flagged articles are marked and dropped. A moderation error leaves the
/// article unmarked and keeps it. An open breaker fails the phase so the
/// remaining articles are screened on the next run.
#[instrument(skip_all, fields(phase = "moderate", date = %env.date))]
pub async fn moderate(env: &PhaseEnv<'_>, mut state: RunState) -> Result<RunState> {
    let ctx = env.ctx;
    let moderation = &ctx.services.moderation;

    let total = state.articles.len();
    let mut unchecked = 0usize;
    for (i, article) in state.articles.iter_mut().enumerate() {
        if article.moderation_passed.is_some() {
            continue;
        }
        ctx.pacer.before(i).await;
        let text = format!("{}\n\n{}", article.title, article.summary_or_description());
        let verdict = ctx
            .guards
            .moderation
            .call(|| moderation.moderate(&text))
            .await;

        match verdict {
            Ok(verdict) if verdict.flagged() => {
                info!(
                    article_id = %article.id,
                    categories = ?verdict.flagged_categories(),
                    "article flagged by moderation"
                );
                article.moderation_passed = Some(false);
            }
            Ok(_) => article.moderation_passed = Some(true),
            Err(e) if e.is_circuit_open() => return Err(e),
            Err(e) => {
                warn!(article_id = %article.id, code = e.code(), error = %e, "moderation unavailable, passing article through");
                unchecked += 1;
            }
        }
        env.progress.item(PipelinePhase::Moderate, i + 1, total);
    }

    state.articles.retain(|a| a.moderation_passed != Some(false));
    info!(
        kept = state.articles.len(),
        removed = total - state.articles.len(),
        unchecked,
        "moderation complete"
    );
    Ok(state)
}

/// Attach embeddings in batches of `min(embedding_batch_size, provider max)`.
/// A failed batch leaves its articles without embeddings; an open breaker
/// fails the phase.
#[instrument(skip_all, fields(phase = "embed", date = %env.date))]
pub async fn embed(env: &PhaseEnv<'_>, mut state: RunState) -> Result<RunState> {
    let ctx = env.ctx;
    let embedding = &ctx.services.embedding;
    let batch_size = ctx
        .settings
        .embedding_batch_size
        .min(embedding.max_batch())
        .max(1);

    let pending: Vec<usize> = state
        .articles
        .iter()
        .enumerate()
        .filter(|(_, a)| a.embedding.is_none())
        .map(|(i, _)| i)
        .collect();

    let batches = pending.len().div_ceil(batch_size);
    let mut embedded = 0usize;
    for (b, chunk) in pending.chunks(batch_size).enumerate() {
        ctx.pacer.before(b).await;
        let texts: Vec<String> = chunk
            .iter()
            .map(|&i| prompts::embedding_input(&state.articles[i]))
            .collect();

        let result = ctx
            .guards
            .embedding
            .call(|| embedding.embed(&texts))
            .await;
        env.progress.item(PipelinePhase::Embed, b + 1, batches);

        match result {
            Ok(vectors) if vectors.len() == chunk.len() => {
                for (&i, vector) in chunk.iter().zip(vectors) {
                    state.articles[i].embedding = Some(vector);
                }
                embedded += chunk.len();
            }
            Ok(vectors) => warn!(
                batch = b,
                expected = chunk.len(),
                got = vectors.len(),
                "embedding batch size mismatch, skipping batch"
            ),
            Err(e) if e.is_circuit_open() => return Err(e),
            Err(e) => warn!(batch = b, code = e.code(), error = %e, "embedding batch failed"),
        }
    }

    info!(embedded, batches, "embedding complete");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use briefwire_providers::ModerationVerdict;
    use briefwire_shared::{Article, BriefwireError};
    use chrono::Utc;

    use super::*;
    use crate::testing::{Fixture, RecordingSleeper, env_for, test_config, test_date};

    fn articles(n: usize) -> RunState {
        let articles = (0..n)
            .map(|i| {
                Article::new(
                    format!("Story {i}"),
                    format!("https://news.test/{i}"),
                    "news",
                    format!("Description {i}"),
                    0.5,
                    Utc::now(),
                )
            })
            .collect();
        RunState {
            articles,
            ..RunState::default()
        }
    }

    #[tokio::test]
    async fn enrich_adds_summary_and_tags() {
        let fixture = Fixture::happy();
        let ctx = fixture.context(&test_config());
        let state = enrich(&env_for(&ctx, test_date()), articles(2)).await.unwrap();

        for a in &state.articles {
            assert_eq!(a.summary.as_deref(), Some("A short summary."));
            assert_eq!(a.tags, vec!["research"]);
        }
        assert_eq!(fixture.completion.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn enrich_falls_back_to_description() {
        let fixture = Fixture::happy();
        fixture.completion.fail_all();
        let mut config = test_config();
        config.retry.max_attempts = 1;
        let ctx = fixture.context(&config);
        let state = enrich(&env_for(&ctx, test_date()), articles(1)).await.unwrap();

        let a = &state.articles[0];
        assert_eq!(a.summary.as_deref(), Some("Description 0"));
        assert!(a.tags.is_empty());
    }

    #[tokio::test]
    async fn enrich_paces_every_call() {
        let fixture = Fixture::happy();
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut config = test_config();
        config.pipeline.request_delay_ms = 100;
        let ctx = fixture.paced_context(&config, sleeper.clone());

        enrich(&env_for(&ctx, test_date()), articles(2)).await.unwrap();
        // summary + tags for two articles: four calls, three gaps
        assert_eq!(fixture.completion.calls.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.total(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn enrich_keeps_existing_summary() {
        let fixture = Fixture::happy();
        let ctx = fixture.context(&test_config());
        let mut state = articles(1);
        state.articles[0].summary = Some("Existing".into());

        let state = enrich(&env_for(&ctx, test_date()), state).await.unwrap();
        assert_eq!(state.articles[0].summary.as_deref(), Some("Existing"));
        assert_eq!(fixture.completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn moderation_removes_flagged() {
        let fixture = Fixture::happy();
        fixture.moderation.set(|text| {
            let mut verdict = ModerationVerdict::default();
            verdict.flags.insert("violence".into(), text.contains("Story 1"));
            Ok(verdict)
        });
        let ctx = fixture.context(&test_config());

        let state = moderate(&env_for(&ctx, test_date()), articles(3)).await.unwrap();
        let titles: Vec<&str> = state.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Story 0", "Story 2"]);
        assert!(state.articles.iter().all(|a| a.moderation_passed == Some(true)));
    }

    #[tokio::test]
    async fn moderation_fails_open() {
        let fixture = Fixture::happy();
        fixture
            .moderation
            .set(|_| Err(BriefwireError::Provider { status: 400, message: "bad".into() }));
        let ctx = fixture.context(&test_config());

        let state = moderate(&env_for(&ctx, test_date()), articles(2)).await.unwrap();
        assert_eq!(state.articles.len(), 2);
        assert!(state.articles.iter().all(|a| a.moderation_passed.is_none()));
    }

    #[tokio::test]
    async fn enrich_fails_when_completion_breaker_opens() {
        let fixture = Fixture::happy();
        fixture.completion.fail_all();
        let ctx = fixture.context(&test_config());

        let err = enrich(&env_for(&ctx, test_date()), articles(3)).await.unwrap_err();
        assert!(err.is_circuit_open());
        // summary: three attempts, tags: two before the breaker opens
        assert_eq!(fixture.completion.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn moderation_fails_when_breaker_opens() {
        let fixture = Fixture::happy();
        fixture.moderation.set(|_| {
            Err(BriefwireError::Provider {
                status: 503,
                message: "unavailable".into(),
            })
        });
        let mut config = test_config();
        config.circuit_breaker.failure_threshold = 2;
        let ctx = fixture.context(&config);

        let err = moderate(&env_for(&ctx, test_date()), articles(3)).await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(fixture.moderation.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn embed_batches_by_smaller_limit() {
        let fixture = Fixture::happy();
        fixture.embedding.max_batch.store(3, Ordering::SeqCst);
        let mut config = test_config();
        config.pipeline.embedding_batch_size = 100;
        let ctx = fixture.context(&config);

        let state = embed(&env_for(&ctx, test_date()), articles(7)).await.unwrap();
        assert!(state.articles.iter().all(|a| a.embedding.is_some()));
        assert_eq!(fixture.embedding.batch_sizes(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn embed_failed_batch_is_skipped() {
        let fixture = Fixture::happy();
        fixture.embedding.fail_when_contains("Story 2");
        let mut config = test_config();
        config.pipeline.embedding_batch_size = 2;
        let ctx = fixture.context(&config);

        let state = embed(&env_for(&ctx, test_date()), articles(5)).await.unwrap();
        let with: Vec<bool> = state.articles.iter().map(|a| a.embedding.is_some()).collect();
        assert_eq!(with, vec![true, true, false, false, true]);
    }
}
