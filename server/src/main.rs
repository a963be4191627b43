use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use linkrank_core::{EngineConfig, SearchEngine, Store};
use linkrank_server::build_app;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Store directory path
    #[arg(long, default_value = "./data/linkrank")]
    db: String,
    /// Engine config JSON
    #[arg(long)]
    config: Option<String>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path).with_context(|| format!("loading config {path}"))?,
        None => EngineConfig::default(),
    };
    let store = Store::open(&args.db).with_context(|| format!("opening store {}", args.db))?;
    let app: Router = build_app(SearchEngine::new(store, config));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, db = %args.db, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
