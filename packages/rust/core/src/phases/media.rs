//! Audio narration, podcast script, and final ranking.

use tracing::{info, instrument, warn};

use briefwire_shared::{BriefwireError, PipelinePhase, PodcastEpisode, Result, RunState};
use briefwire_validator::validate_script;

use super::PhaseEnv;
use crate::prompts;
use crate::ranking::{by_relevance, rank_articles};

/// Most stories covered by one podcast episode.
const PODCAST_MAX_ARTICLES: usize = 8;

/// Narrate the `audio_top_n` most relevant articles. Synthesis failures
/// leave the article without audio; an open breaker fails the phase.
#[instrument(skip_all, fields(phase = "audio", date = %env.date))]
pub async fn audio(env: &PhaseEnv<'_>, mut state: RunState) -> Result<RunState> {
    let ctx = env.ctx;
    let speech = &ctx.services.speech;

    let targets: Vec<String> = by_relevance(&state.articles)
        .into_iter()
        .take(ctx.settings.audio_top_n)
        .filter(|a| a.audio_url.is_none())
        .map(|a| a.id.clone())
        .collect();

    let total = targets.len();
    let mut produced = 0usize;
    for (i, id) in targets.iter().enumerate() {
        let Some(article) = state.articles.iter_mut().find(|a| &a.id == id) else {
            continue;
        };
        ctx.pacer.before(i).await;
        let text = prompts::narration(article);
        let result = ctx
            .guards
            .speech
            .call(|| speech.synthesize(&text, id))
            .await;
        env.progress.item(PipelinePhase::Audio, i + 1, total);

        match result {
            Ok(location) => {
                article.audio_url = Some(location);
                produced += 1;
            }
            Err(e) if e.is_circuit_open() => return Err(e),
            Err(e) => warn!(article_id = %id, code = e.code(), error = %e, "audio synthesis failed"),
        }
    }

    info!(produced, requested = total, "audio complete");
    Ok(state)
}

/// Script a two-host episode over the top articles.
///
/// Fails the phase when there are fewer than `podcast_min_articles`
/// articles or the script does not validate.
#[instrument(skip_all, fields(phase = "podcast", date = %env.date))]
pub async fn podcast(env: &PhaseEnv<'_>, mut state: RunState) -> Result<RunState> {
    let ctx = env.ctx;
    let min = ctx.settings.podcast_min_articles.max(1);
    if state.articles.len() < min {
        return Err(BriefwireError::insufficient(format!(
            "podcast needs at least {min} article(s), have {}",
            state.articles.len()
        )));
    }

    let picked = by_relevance(&state.articles)
        .into_iter()
        .take(PODCAST_MAX_ARTICLES.max(min))
        .collect::<Vec<_>>();
    let prompt = prompts::script(&picked);
    let article_ids: Vec<String> = picked.iter().map(|a| a.id.clone()).collect();

    let completion = &ctx.services.completion;
    let raw = ctx
        .guards
        .completion
        .call(|| completion.complete(&prompt))
        .await?;
    let lines = validate_script(raw.as_deref(), &ctx.validator_options())?;
    env.progress.item(PipelinePhase::Podcast, 1, 1);

    info!(lines = lines.len(), stories = article_ids.len(), "podcast scripted");
    state.podcast = Some(PodcastEpisode {
        title: format!("briefwire daily {}", env.date),
        lines,
        article_ids,
    });
    Ok(state)
}

/// Compute ranking scores and put the corpus in final order.
#[instrument(skip_all, fields(phase = "final", date = %env.date))]
pub async fn finalize(env: &PhaseEnv<'_>, mut state: RunState) -> Result<RunState> {
    rank_articles(&mut state.articles, env.date);
    env.progress.item(PipelinePhase::Final, 1, 1);
    info!(articles = state.articles.len(), "corpus ranked");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use briefwire_shared::{Article, ResponseErrorCode};
    use chrono::Utc;

    use super::*;
    use crate::testing::{Fixture, env_for, test_config, test_date};

    fn articles(relevance: &[f64]) -> RunState {
        let articles = relevance
            .iter()
            .enumerate()
            .map(|(i, &r)| {
                Article::new(
                    format!("Story {i}"),
                    format!("https://news.test/{i}"),
                    "news",
                    "d",
                    r,
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
    async fn audio_for_top_n() {
        let fixture = Fixture::happy();
        let mut config = test_config();
        config.pipeline.audio_top_n = 2;
        let ctx = fixture.context(&config);

        let state = audio(&env_for(&ctx, test_date()), articles(&[0.1, 0.9, 0.5]))
            .await
            .unwrap();
        let with_audio: Vec<&str> = state
            .articles
            .iter()
            .filter(|a| a.audio_url.is_some())
            .map(|a| a.title.as_str())
            .collect();
        assert_eq!(with_audio, vec!["Story 1", "Story 2"]);
        assert_eq!(fixture.speech.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn audio_fails_open() {
        let fixture = Fixture::happy();
        fixture.speech.fail_all();
        let ctx = fixture.context(&test_config());

        let state = audio(&env_for(&ctx, test_date()), articles(&[0.5, 0.6]))
            .await
            .unwrap();
        assert!(state.articles.iter().all(|a| a.audio_url.is_none()));
    }

    #[tokio::test]
    async fn audio_fails_when_breaker_opens() {
        let fixture = Fixture::happy();
        fixture.speech.fail_all();
        let mut config = test_config();
        config.circuit_breaker.failure_threshold = 2;
        let ctx = fixture.context(&config);

        let err = audio(&env_for(&ctx, test_date()), articles(&[0.5, 0.6, 0.7]))
            .await
            .unwrap_err();
        assert!(matches!(err, BriefwireError::CircuitOpen { .. }));
        assert_eq!(fixture.speech.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn podcast_requires_minimum_articles() {
        let fixture = Fixture::happy();
        let ctx = fixture.context(&test_config());

        let err = podcast(&env_for(&ctx, test_date()), articles(&[0.5, 0.6]))
            .await
            .unwrap_err();
        assert!(matches!(err, BriefwireError::InsufficientInput { .. }));
        assert_eq!(fixture.completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn podcast_scripts_episode() {
        let fixture = Fixture::happy();
        let ctx = fixture.context(&test_config());

        let state = podcast(&env_for(&ctx, test_date()), articles(&[0.2, 0.9, 0.5]))
            .await
            .unwrap();
        let episode = state.podcast.unwrap();
        assert_eq!(episode.lines.len(), 2);
        assert_eq!(episode.article_ids[0], Article::id_for_url("https://news.test/1"));
        assert_eq!(episode.title, "briefwire daily 2024-06-10");
    }

    #[tokio::test]
    async fn podcast_fails_closed_on_bad_script() {
        let fixture = Fixture::happy();
        fixture.completion.override_script("not a script");
        let ctx = fixture.context(&test_config());

        let err = podcast(&env_for(&ctx, test_date()), articles(&[0.2, 0.9, 0.5]))
            .await
            .unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseErrorCode::ParseError));
    }

    #[tokio::test]
    async fn finalize_ranks() {
        let fixture = Fixture::happy();
        let ctx = fixture.context(&test_config());
        let state = finalize(&env_for(&ctx, test_date()), articles(&[0.2, 0.9]))
            .await
            .unwrap();
        assert_eq!(state.articles[0].title, "Story 1");
        assert!(state.articles.iter().all(|a| a.ranking_score.is_some()));
    }
}
