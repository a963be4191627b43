use anyhow::{anyhow, Result};
use clap::Parser;
use linkrank_core::{CrawlConfig, EngineConfig, SearchEngine, Store};
use linkrank_crawler::Crawler;
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "linkrank-crawler")]
#[command(about = "Crawl pages breadth-first into a linkrank store, respecting robots.txt")]
struct Cli {
    /// Path to a file with seed URLs (one per line)
    #[arg(long)]
    seeds: String,
    /// Store directory
    #[arg(long, default_value = "./data/linkrank")]
    db: String,
    /// Number of breadth-first levels to crawl
    #[arg(long, default_value_t = 3)]
    depth: usize,
    /// Concurrent fetches per level
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// User-Agent string to use for robots.txt and crawling
    #[arg(long, default_value = "linkrank-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
    /// Only follow links that stay on the page's host
    #[arg(long, default_value_t = false)]
    same_host_only: bool,
    /// Fetch pages regardless of robots.txt
    #[arg(long, default_value_t = false)]
    ignore_robots: bool,
    /// Rebuild PageRank once the crawl finishes
    #[arg(long, default_value_t = false)]
    rank: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let mut seeds: Vec<Url> = Vec::new();
    for line in BufReader::new(File::open(&args.seeds)?).lines() {
        let s = line?.trim().to_string();
        if s.is_empty() || s.starts_with('#') { continue; }
        match Url::parse(&s).or_else(|_| Url::parse(&format!("https://{}", s))) {
            Ok(u) => seeds.push(u),
            Err(e) => tracing::warn!(seed = %s, error = %e, "skipping invalid seed"),
        }
    }
    if seeds.is_empty() { return Err(anyhow!("no valid seeds")); }

    let config = CrawlConfig {
        max_depth: args.depth,
        concurrency: args.concurrency,
        timeout_secs: args.timeout_secs,
        user_agent: args.user_agent,
        same_host_only: args.same_host_only,
        respect_robots: !args.ignore_robots,
        ..CrawlConfig::default()
    };
    tracing::info!(seeds = seeds.len(), depth = config.max_depth, concurrency = config.concurrency, db = %args.db, "starting crawl");

    let store = Store::open(&args.db)?;
    let crawler = Crawler::new(store.clone(), config)?;
    let summary = crawler.crawl(&seeds, crawler.config().max_depth).await?;
    tracing::info!(
        levels = summary.levels,
        fetched = summary.fetched,
        indexed = summary.indexed,
        skipped = summary.skipped,
        failed = summary.failed,
        edges = summary.edges,
        "crawl complete"
    );

    if args.rank {
        let engine = SearchEngine::new(store, EngineConfig::default());
        let rank = engine.config().rank;
        engine.rebuild_rank(&rank)?;
    }
    Ok(())
}
