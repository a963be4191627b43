use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linkrank_core::{EngineConfig, Indexer, RankConfig, SearchEngine, Store, StoreIndexer};
use linkrank_crawler::extract::{parse_page, resolve_link};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A pre-fetched page. `html` is parsed for text and links; `text` is indexed as-is.
#[derive(Debug, Deserialize)]
struct InputPage {
    url: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    links: Vec<InputLink>,
}

#[derive(Debug, Deserialize)]
struct InputLink {
    url: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Serialize)]
struct IngestSummary {
    pages: usize,
    indexed: usize,
    edges: usize,
}

#[derive(Parser)]
#[command(name = "linkrank-indexer")]
#[command(about = "Ingest pages and operate a linkrank store", long_about = None)]
struct Cli {
    /// Store directory
    #[arg(long, global = true, default_value = "./data/linkrank")]
    db: String,
    /// Engine config JSON (rank, weights, network, top_n)
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index pages from JSON/JSONL files or a directory of them
    Ingest {
        #[arg(long)]
        input: String,
    },
    /// Recompute PageRank for every document
    Rank {
        #[arg(long)]
        iterations: Option<usize>,
        #[arg(long)]
        damping: Option<f64>,
        #[arg(long)]
        base: Option<f64>,
    },
    /// Run a ranked query
    Query {
        text: String,
        #[arg(long)]
        top: Option<usize>,
    },
    /// Record that `selected` was chosen among `candidates` for a query
    Feedback {
        #[arg(long)]
        query: String,
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
        #[arg(long)]
        selected: String,
    },
    /// Feedback network activation for each candidate
    Personalize {
        #[arg(long)]
        query: String,
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
    },
    /// Document, term, edge and hidden node counts
    Stats,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path).with_context(|| format!("loading config {path}"))?,
        None => EngineConfig::default(),
    };
    let store = Store::open(&cli.db).with_context(|| format!("opening store {}", cli.db))?;

    match cli.command {
        Commands::Ingest { input } => {
            let summary = ingest(&store, Path::new(&input))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Rank { iterations, damping, base } => {
            let defaults = config.rank;
            let rank = RankConfig {
                iterations: iterations.unwrap_or(defaults.iterations),
                damping: damping.unwrap_or(defaults.damping),
                base: base.unwrap_or(defaults.base),
            };
            rank.validate()?;
            let engine = SearchEngine::new(store.clone(), config);
            let summary = engine.rebuild_rank(&rank)?;
            let at = time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_default();
            store.put_meta("last_rank_at", &at)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Query { text, top } => {
            let top = top.unwrap_or(config.top_n);
            let engine = SearchEngine::new(store, config);
            for hit in engine.query(&text, top)? {
                println!("{:.6}\t{}", hit.score, hit.url);
            }
        }
        Commands::Feedback { query, candidates, selected } => {
            let engine = SearchEngine::new(store.clone(), config);
            engine.submit_feedback(&query, &candidates, &selected)?;
            store.flush()?;
        }
        Commands::Personalize { query, candidates } => {
            let engine = SearchEngine::new(store, config);
            for (url, activation) in engine.personalized_query(&query, &candidates)? {
                println!("{activation:.6}\t{url}");
            }
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
        }
    }
    Ok(())
}

fn ingest(store: &Store, input: &Path) -> Result<IngestSummary> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        anyhow::bail!("input {} does not exist", input.display());
    }

    let indexer = StoreIndexer::new(store.clone());
    let mut summary = IngestSummary::default();
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            ingest_jsonl(&file, &indexer, &mut summary)?;
        } else {
            ingest_json(&file, &indexer, &mut summary)?;
        }
        // one commit per input file
        store.flush()?;
    }
    tracing::info!(pages = summary.pages, indexed = summary.indexed, edges = summary.edges, "ingest complete");
    Ok(summary)
}

fn ingest_jsonl(file: &Path, indexer: &StoreIndexer, summary: &mut IngestSummary) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let page: InputPage = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?;
        ingest_page(page, indexer, summary)?;
    }
    Ok(())
}

fn ingest_json(file: &Path, indexer: &StoreIndexer, summary: &mut IngestSummary) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                ingest_page(serde_json::from_value(v)?, indexer, summary)?;
            }
        }
        serde_json::Value::Object(_) => ingest_page(serde_json::from_value(json)?, indexer, summary)?,
        _ => tracing::warn!(file = %file.display(), "expected a JSON object or array"),
    }
    Ok(())
}

fn ingest_page(page: InputPage, indexer: &StoreIndexer, summary: &mut IngestSummary) -> Result<()> {
    let Ok(base) = Url::parse(&page.url) else {
        tracing::warn!(url = %page.url, "skipping page with invalid url");
        return Ok(());
    };
    let mut links = Vec::new();
    let mut text = page.text.unwrap_or_default();
    if let Some(html) = page.html {
        let parsed = parse_page(&html, &base);
        if text.is_empty() {
            text = parsed.text;
        }
        links.extend(parsed.links.into_iter().map(|l| (l.url, l.text)));
    }
    links.extend(page.links.into_iter().filter_map(|l| Some((resolve_link(&base, &l.url)?, l.text))));

    let (doc, written) = indexer.index_url(base.as_str(), &text)?;
    summary.pages += 1;
    if !written {
        return Ok(());
    }
    summary.indexed += 1;
    for (target, anchor) in links {
        let to = indexer.store().document_id(target.as_str())?;
        if indexer.add_link(doc, to, &anchor)?.is_some() {
            summary.edges += 1;
        }
    }
    Ok(())
}
