use anyhow::{Context, Result};
use clap::Parser;
use seek_core::{AdvancedRanker, InvertedIndex, JsonDocumentStore, JsonFileStore, Ranker, Tokenizer};
use seek_crawler::{CrawlConfig, Crawler};
use seek_search::{LocalSearch, MemoryCache, SearchConfig, SearchManager, SearchMode};
use seek_server::{build_app, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index JSON file
    #[arg(long, default_value = "./data/index.json")]
    index: PathBuf,
    /// Document metadata JSON file
    #[arg(long, default_value = "./data/documents.json")]
    docs: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Seconds between background index flushes
    #[arg(long, default_value_t = 60)]
    flush_secs: u64,
    /// Default search mode (local, external, hybrid); overrides SEARCH_MODE
    #[arg(long)]
    mode: Option<SearchMode>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let tokenizer = Arc::new(Tokenizer::default());
    let index = Arc::new(InvertedIndex::open(Arc::new(JsonFileStore::new(&args.index)))?);
    let documents = Arc::new(JsonDocumentStore::open(&args.docs));
    let ranker = Arc::new(Ranker::new(index.clone(), tokenizer.clone()));
    let local = LocalSearch::new(AdvancedRanker::new(ranker.clone())).with_documents(documents.clone());

    let mut config = SearchConfig::from_env();
    if let Some(mode) = args.mode {
        config.default_mode = mode;
    }
    let search = SearchManager::new(config).with_local(local).with_cache(Arc::new(MemoryCache::default()));
    let crawler = Crawler::new(CrawlConfig::default(), tokenizer, index.clone())?.with_documents(documents);

    let state = AppState {
        search: Arc::new(search),
        ranker,
        index: index.clone(),
        crawler: Arc::new(crawler),
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    };
    index.start_auto_flush(Duration::from_secs(args.flush_secs.max(1)));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, build_app(state)).with_graceful_shutdown(shutdown_signal()).await?;

    index.stop_auto_flush();
    index.flush().with_context(|| format!("final flush to {}", args.index.display()))?;
    Ok(())
}
