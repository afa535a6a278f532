//! CLI command definitions, routing, and tracing setup.

use std::collections::HashSet;
use std::time::Duration;

use briefwire_core::{PhaseContext, ProgressReporter, RunReport, Sequencer, run_status};
use briefwire_index::{
    ArticleIndex, build_article_index, filter_by_date_range, filter_by_source, filter_by_tags,
    find_similar_articles, search_articles, top_articles,
};
use briefwire_providers::Services;
use briefwire_shared::{
    AppConfig, Article, PipelinePhase, RunDate, RunState, init_config, load_config,
    validate_api_key,
};
use briefwire_storage::{CheckpointManager, open_store};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// briefwire: a resumable daily AI news briefing.
#[derive(Parser)]
#[command(
    name = "briefwire",
    version,
    about = "Scrape, enrich and publish a daily AI news briefing with resumable checkpoints.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline for a date, resuming from existing checkpoints.
    Run {
        /// Run date (YYYY-MM-DD, defaults to today in UTC).
        #[arg(long)]
        date: Option<RunDate>,

        /// Delete the date's checkpoints first and run every phase.
        #[arg(long)]
        fresh: bool,
    },

    /// Show which phases have checkpoints for a date.
    Status {
        /// Run date (YYYY-MM-DD, defaults to today in UTC).
        #[arg(long)]
        date: Option<RunDate>,
    },

    /// Query the article corpus of a run.
    Search {
        /// Run date whose latest checkpoint is searched.
        #[arg(long)]
        date: Option<RunDate>,

        /// Case-insensitive text to find in title, description or summary.
        #[arg(short, long)]
        query: Option<String>,

        /// Keep articles carrying any of these tags (repeatable).
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Keep articles from this source only.
        #[arg(long)]
        source: Option<String>,

        /// Earliest article date (inclusive).
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Latest article date (inclusive).
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Maximum number of results.
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List articles closest to one article by embedding.
    Similar {
        /// Article id.
        #[arg(long)]
        id: String,

        /// Run date whose latest checkpoint is searched.
        #[arg(long)]
        date: Option<RunDate>,

        /// Maximum number of results.
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "briefwire=info",
        1 => "briefwire=debug",
        _ => "briefwire=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { date, fresh } => cmd_run(date.unwrap_or_else(RunDate::today), fresh).await,
        Command::Status { date } => cmd_status(date.unwrap_or_else(RunDate::today)).await,
        Command::Search {
            date,
            query,
            tags,
            source,
            from,
            to,
            limit,
            json,
        } => {
            let filters = SearchFilters {
                query,
                tags,
                source,
                from,
                to,
                limit,
            };
            cmd_search(date.unwrap_or_else(RunDate::today), &filters, json).await
        }
        Command::Similar {
            id,
            date,
            limit,
            json,
        } => cmd_similar(date.unwrap_or_else(RunDate::today), &id, limit, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_run(date: RunDate, fresh: bool) -> Result<()> {
    // Fail on a missing key before any phase runs
    let config = load_config()?;
    validate_api_key(&config)?;

    let checkpoints = CheckpointManager::new(open_store(&config).await?);
    if fresh {
        let removed = checkpoints.clear(date).await?;
        info!(%date, removed, "cleared checkpoints");
    }

    let services = Services::from_config(&config)?;
    let ctx = PhaseContext::from_config(&config, services)?;
    let sequencer = Sequencer::new(checkpoints, ctx);

    info!(%date, sources = config.sources.len(), "running pipeline");

    let reporter = CliProgress::new();
    let report = match sequencer.run(date, &reporter).await {
        Ok(report) => report,
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    println!();
    println!("  Briefing complete for {date}");
    println!("  Run:      {}", report.run_id);
    println!("  Articles: {}", report.state.articles.len());
    println!("  Executed: {}", phase_list(&report.executed));
    println!("  Resumed:  {}", phase_list(&report.resumed));
    if let Some(episode) = &report.state.podcast {
        println!("  Podcast:  {} ({} lines)", episode.title, episode.lines.len());
    }
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_status(date: RunDate) -> Result<()> {
    let config = load_config()?;
    let checkpoints = CheckpointManager::new(open_store(&config).await?);
    let status = run_status(&checkpoints, date).await?;

    println!();
    println!("  Date:      {date}");
    println!("  Completed: {}", phase_list(&status.completed));
    println!(
        "  Next:      {}",
        status.next.map_or("(complete)", |p| p.as_str())
    );
    println!();

    Ok(())
}

fn phase_list(phases: &[PipelinePhase]) -> String {
    if phases.is_empty() {
        return "-".to_string();
    }
    phases
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase_started(&self, phase: PipelinePhase) {
        self.spinner.set_message(phase.as_str());
    }

    fn phase_resumed(&self, phase: PipelinePhase) {
        self.spinner
            .println(format!("  {:<8} resumed from checkpoint", phase.as_str()));
    }

    fn phase_completed(&self, phase: PipelinePhase, state: &RunState) {
        self.spinner.println(format!(
            "  {:<8} done ({} articles)",
            phase.as_str(),
            state.articles.len()
        ));
    }

    fn item(&self, phase: PipelinePhase, current: usize, total: usize) {
        self.spinner
            .set_message(format!("{phase} [{current}/{total}]"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Corpus queries
// ---------------------------------------------------------------------------

/// Filters for `briefwire search`; every filter given must match.
#[derive(Debug, Default)]
pub(crate) struct SearchFilters {
    pub query: Option<String>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: usize,
}

/// Load the most advanced checkpoint snapshot of `date` into an index.
async fn load_index(config: &AppConfig, date: RunDate) -> Result<ArticleIndex> {
    let checkpoints = CheckpointManager::new(open_store(config).await?);
    let Some(phase) = checkpoints.latest_phase(date).await? else {
        return Err(eyre!(
            "no checkpoints for {date}; run `briefwire run --date {date}` first"
        ));
    };
    let state = checkpoints
        .load::<RunState>(date, phase)
        .await?
        .ok_or_else(|| eyre!("checkpoint {date}_{phase} could not be read"))?;

    info!(%date, %phase, articles = state.articles.len(), "loaded corpus");
    Ok(build_article_index(state.articles))
}

fn narrow<'a>(keep: &mut Option<HashSet<&'a str>>, hits: Vec<&'a Article>) {
    let ids: HashSet<&str> = hits.into_iter().map(|a| a.id.as_str()).collect();
    *keep = Some(match keep.take() {
        Some(current) => current.intersection(&ids).copied().collect(),
        None => ids,
    });
}

/// Apply `filters` and return matches in rank order, at most `limit`.
pub(crate) fn select_articles<'a>(
    index: &'a ArticleIndex,
    filters: &SearchFilters,
) -> Vec<&'a Article> {
    let mut keep = None;
    if let Some(query) = &filters.query {
        narrow(&mut keep, search_articles(index, query));
    }
    if !filters.tags.is_empty() {
        narrow(&mut keep, filter_by_tags(index, filters.tags.as_slice()));
    }
    if let Some(source) = &filters.source {
        narrow(&mut keep, filter_by_source(index, source));
    }
    if filters.from.is_some() || filters.to.is_some() {
        narrow(&mut keep, filter_by_date_range(index, filters.from, filters.to));
    }

    let ranked = top_articles(index, index.len());
    match keep {
        Some(keep) => ranked
            .into_iter()
            .filter(|a| keep.contains(a.id.as_str()))
            .take(filters.limit)
            .collect(),
        None => ranked.into_iter().take(filters.limit).collect(),
    }
}

fn print_article(score: f64, article: &Article) {
    println!("  {score:>5.3}  {}  {}", article.id, article.title);
    println!("         [{}] {}", article.source, article.url);
}

async fn cmd_search(date: RunDate, filters: &SearchFilters, json: bool) -> Result<()> {
    let config = load_config()?;
    let index = load_index(&config, date).await?;
    let hits = select_articles(&index, filters);

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    println!();
    if hits.is_empty() {
        println!("  No matching articles among {}.", index.len());
    }
    for article in &hits {
        print_article(
            article.ranking_score.unwrap_or(article.relevance_score),
            article,
        );
    }
    println!();
    Ok(())
}

async fn cmd_similar(date: RunDate, id: &str, limit: usize, json: bool) -> Result<()> {
    let config = load_config()?;
    let index = load_index(&config, date).await?;
    let Some(target) = index.get(id) else {
        return Err(eyre!("no article with id '{id}' in the {date} corpus"));
    };
    if target.embedding.is_none() {
        return Err(eyre!("article '{id}' has no embedding"));
    }

    let similar = find_similar_articles(&index, id, limit);
    if json {
        println!("{}", serde_json::to_string_pretty(&similar)?);
        return Ok(());
    }

    println!();
    println!("  Similar to: {}", target.title);
    for scored in &similar {
        print_article(scored.score, scored.article);
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search_flags() {
        let cli = Cli::parse_from([
            "briefwire", "search", "--date", "2024-06-10", "--tag", "llm", "--tag", "safety",
            "--from", "2024-06-01",
        ]);
        match cli.command {
            Command::Search {
                date, tags, from, ..
            } => {
                assert_eq!(date, Some("2024-06-10".parse().unwrap()));
                assert_eq!(tags, vec!["llm", "safety"]);
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 6, 1));
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn rejects_bad_run_date() {
        assert!(Cli::try_parse_from(["briefwire", "run", "--date", "June 10"]).is_err());
    }

    fn corpus() -> ArticleIndex {
        let day = |d| Utc.with_ymd_and_hms(2024, 6, d, 8, 0, 0).unwrap();
        let mut a = Article::new("Chip export rules", "https://a.test/1", "wire", "policy", 0.9, day(9));
        a.add_tags(["policy", "hardware"]);
        let mut b = Article::new("New open model", "https://b.test/2", "blog", "weights", 0.7, day(10));
        b.add_tags(["open-source", "llm"]);
        let mut c = Article::new("GPU shortage", "https://a.test/3", "wire", "chips", 0.5, day(10));
        c.add_tags(["hardware"]);
        build_article_index(vec![a, b, c])
    }

    fn titles(hits: &[&Article]) -> Vec<String> {
        hits.iter().map(|a| a.title.clone()).collect()
    }

    #[test]
    fn no_filters_returns_top_ranked() {
        let index = corpus();
        let filters = SearchFilters {
            limit: 2,
            ..SearchFilters::default()
        };
        assert_eq!(
            titles(&select_articles(&index, &filters)),
            vec!["Chip export rules", "New open model"]
        );
    }

    #[test]
    fn filters_intersect() {
        let index = corpus();
        let filters = SearchFilters {
            tags: vec!["Hardware".into()],
            from: NaiveDate::from_ymd_opt(2024, 6, 10),
            limit: 10,
            ..SearchFilters::default()
        };
        assert_eq!(titles(&select_articles(&index, &filters)), vec!["GPU shortage"]);

        let filters = SearchFilters {
            query: Some("model".into()),
            source: Some("wire".into()),
            limit: 10,
            ..SearchFilters::default()
        };
        assert!(select_articles(&index, &filters).is_empty());
    }
}
