mod cache;
mod config;
mod coordinator;
mod github;
mod report;
mod stats;

use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cache::CacheStore;
use coordinator::{Coordinator, Phase, ProgressSink, SearchRequest};
use github::{parse_repo_ref, EngineError, GitHubClient};

/// agent-stats — reports how an automated coding agent is performing inside
/// a GitHub repository: PR counts, merge rate, response-time distribution,
/// and an optional comparison against human authors.
#[derive(Parser, Debug)]
#[command(name = "agent-stats", version, about)]
struct Cli {
    /// Repository in OWNER/REPO form (e.g., rust-lang/cargo)
    repo: String,

    /// Agent login the statistics are about (falls back to [agent].login in
    /// .agent-stats.toml)
    #[arg(short, long)]
    agent: Option<String>,

    /// Start of the created-at window, YYYY-MM-DD (default: 30 days ago)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// End of the created-at window, YYYY-MM-DD (default: today)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Also compare agent response times against other authors
    #[arg(long)]
    compare: bool,

    /// Skip cache reads for this run (the result is still written back)
    #[arg(long)]
    no_cache: bool,

    /// GitHub token (overrides .agent-stats.toml and GITHUB_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Optional output file path for a markdown report
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Logs phase changes and page progress to stderr via tracing.
struct LogProgress;

impl ProgressSink for LogProgress {
    fn phase(&self, phase: Phase) {
        info!(%phase, "phase");
    }

    fn pages(&self, fetched: u64, total: u64) {
        debug!(fetched, total, "page progress");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load()?;

    let repo_ref = parse_repo_ref(&cli.repo)?;
    let agent_login = cli
        .agent
        .or(config.agent.login.clone())
        .ok_or(EngineError::InvalidInput(
            "no agent login given; pass --agent or set [agent].login in .agent-stats.toml"
                .to_string(),
        ))?;

    let to = cli.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = cli.from.unwrap_or(to - Duration::days(30));
    if from > to {
        return Err(EngineError::InvalidInput(format!(
            "date range is inverted: {from} is after {to}"
        ))
        .into());
    }

    let token = cli.token.or_else(|| config.github_token());
    let client = GitHubClient::new(token);
    let authenticated = client.has_token();
    debug!(authenticated, "GitHub client ready");

    let cache_store = match &config.cache.dir {
        Some(dir) => Some(CacheStore::new(dir.clone())),
        None => CacheStore::open_default(),
    };
    if cache_store.is_none() {
        debug!("no usable cache directory; running uncached");
    }

    let request = SearchRequest {
        owner: repo_ref.owner,
        repo: repo_ref.repo,
        agent_login,
        from,
        to,
        compare: cli.compare,
        bypass_cache_read: cli.no_cache,
    };

    info!(owner = %request.owner, repo = %request.repo, agent = %request.agent_login, "searching");
    let coordinator = Coordinator::new(client, cache_store, authenticated);
    let results = coordinator.search(&request, &LogProgress).await?;
    info!(
        total = results.counts.total,
        merged = results.counts.merged,
        from_cache = results.from_cache,
        "search complete"
    );

    let built = report::build(results, &request);
    report::output(&built, cli.output.as_deref())?;

    Ok(())
}
