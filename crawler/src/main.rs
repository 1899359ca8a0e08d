use anyhow::{anyhow, Context, Result};
use clap::Parser;
use seek_core::{InvertedIndex, JsonDocumentStore, JsonFileStore, Tokenizer};
use seek_crawler::{CrawlConfig, Crawler};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "seek-crawler")]
#[command(about = "Crawl seed URLs into the search index, respecting robots.txt")]
struct Cli {
    /// Path to a file with seed URLs (one per line, # comments allowed)
    #[arg(long)]
    seeds: PathBuf,
    /// Index JSON file, created or extended
    #[arg(long, default_value = "./data/index.json")]
    index: PathBuf,
    /// Document metadata JSON file
    #[arg(long, default_value = "./data/documents.json")]
    docs: PathBuf,
    /// Link hops to follow from the seeds
    #[arg(long, default_value_t = 1)]
    depth: usize,
    /// Maximum number of pages to index
    #[arg(long, default_value_t = 100)]
    max_pages: usize,
    /// Concurrent fetches
    #[arg(long, default_value_t = 10)]
    workers: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    /// User-Agent for robots.txt and page fetches
    #[arg(long, default_value = "SeekBot/0.1 (+https://example.com/bot)")]
    user_agent: String,
    /// Follow links to other hosts too
    #[arg(long)]
    all_domains: bool,
    /// Do not fetch or honour robots.txt
    #[arg(long)]
    ignore_robots: bool,
}

fn read_seeds(path: &PathBuf) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut seeds = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        seeds.push(s.to_string());
    }
    Ok(seeds)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let seeds = read_seeds(&args.seeds)?;
    if seeds.is_empty() {
        return Err(anyhow!("no seeds in {}", args.seeds.display()));
    }

    let tokenizer = Arc::new(Tokenizer::default());
    let index = Arc::new(InvertedIndex::open(Arc::new(JsonFileStore::new(&args.index)))?);
    let documents = Arc::new(JsonDocumentStore::open(&args.docs));
    let config = CrawlConfig {
        max_workers: args.workers,
        timeout: Duration::from_secs(args.timeout_secs),
        user_agent: args.user_agent,
        same_domain_only: !args.all_domains,
        respect_robots: !args.ignore_robots,
        ..Default::default()
    };
    let crawler = Arc::new(Crawler::new(config, tokenizer, index.clone())?.with_documents(documents));

    let report = crawler.crawl(&seeds, args.depth, args.max_pages).await;
    index.flush().with_context(|| format!("writing {}", args.index.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
