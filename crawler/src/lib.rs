//! Concurrent, depth-bounded crawler feeding the shared inverted index.
//!
//! Each depth level is fetched by at most `max_workers` concurrent tasks. The
//! coordinating task owns the visited set and the budget counters, so marking
//! a URL visited and scheduling it happen in one place and no URL is fetched
//! twice however many pages link to it.

pub mod page;
pub mod robots;

use anyhow::{anyhow, Context, Result};
use page::{extract, netloc, Page};
use parking_lot::Mutex;
use reqwest::{header, Client, Response, StatusCode};
use robots::RobotsCache;
use seek_core::{DocumentStore, InvertedIndex, Tokenizer};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::task::JoinSet;
use tokio::time::sleep;
use url::Url;

/// Statuses worth another attempt.
const RETRY_STATUSES: [StatusCode; 6] = [
    StatusCode::FORBIDDEN,
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_workers: usize,
    pub timeout: Duration,
    pub user_agent: String,
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    pub max_body_bytes: usize,
    pub same_domain_only: bool,
    pub respect_robots: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            timeout: Duration::from_secs(10),
            user_agent: "SeekBot/0.1 (+https://example.com/bot)".to_string(),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            max_body_bytes: 2 * 1024 * 1024,
            same_domain_only: true,
            respect_robots: true,
        }
    }
}

/// Outcome of one `crawl()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    /// Pages fetched, parsed and indexed.
    pub crawled: usize,
    /// Fetches that failed after retries.
    pub errors: usize,
    /// Non-HTML, oversized or robots-excluded URLs.
    pub skipped: usize,
    /// Fetches scheduled, seeds included.
    pub requested: usize,
    pub last_crawl: String,
}

/// Totals across every `crawl()` on this crawler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlerStats {
    pub crawled: usize,
    pub errors: usize,
    pub skipped: usize,
    pub last_crawl: Option<String>,
    pub max_workers: usize,
}

#[derive(Debug)]
enum Outcome {
    /// `landed` is the post-redirect URL when it differs from the requested one.
    Indexed { links: Vec<Url>, landed: Option<Url> },
    Skipped(&'static str),
    Failed,
}

/// Per-job bookkeeping. Invariant: `crawled + pending <= max_pages`.
struct JobState {
    visited: HashSet<Url>,
    next: Vec<Url>,
    crawled: usize,
    pending: usize,
    errors: usize,
    skipped: usize,
    requested: usize,
    max_pages: usize,
}

impl JobState {
    fn has_budget(&self) -> bool { self.crawled + self.pending < self.max_pages }

    /// Mark `url` visited and queue it for the next level. False if it was
    /// already seen or the budget is spent.
    fn schedule(&mut self, url: Url) -> bool {
        if !self.has_budget() || !self.visited.insert(url.clone()) {
            return false;
        }
        self.pending += 1;
        self.requested += 1;
        self.next.push(url);
        true
    }
}

pub struct Crawler {
    client: Client,
    config: CrawlConfig,
    tokenizer: Arc<Tokenizer>,
    index: Arc<InvertedIndex>,
    documents: Option<Arc<dyn DocumentStore>>,
    robots: RobotsCache,
    totals: Mutex<CrawlerStats>,
}

impl Crawler {
    pub fn new(config: CrawlConfig, tokenizer: Arc<Tokenizer>, index: Arc<InvertedIndex>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .context("building http client")?;
        let totals = CrawlerStats { max_workers: config.max_workers, ..Default::default() };
        Ok(Self {
            client,
            config,
            tokenizer,
            index,
            documents: None,
            robots: RobotsCache::default(),
            totals: Mutex::new(totals),
        })
    }

    /// Record title/snippet metadata for every indexed page.
    pub fn with_documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn config(&self) -> &CrawlConfig { &self.config }

    pub fn statistics(&self) -> CrawlerStats { self.totals.lock().clone() }

    /// Crawl from `seeds`, following links up to `max_depth` hops and indexing
    /// at most `max_pages` documents. Per-URL failures are counted, never
    /// returned.
    pub async fn crawl(self: &Arc<Self>, seeds: &[String], max_depth: usize, max_pages: usize) -> CrawlReport {
        let last_crawl = time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        let mut job = JobState {
            visited: HashSet::new(),
            next: Vec::new(),
            crawled: 0,
            pending: 0,
            errors: 0,
            skipped: 0,
            requested: 0,
            max_pages,
        };
        for seed in seeds {
            match parse_seed(seed) {
                Ok(url) => {
                    job.schedule(url);
                }
                Err(e) => {
                    tracing::warn!(seed = %seed, error = %e, "invalid seed");
                    job.errors += 1;
                }
            }
        }
        tracing::info!(seeds = job.requested, max_depth, max_pages, workers = self.config.max_workers, "crawl started");

        let mut depth = 0;
        while !job.next.is_empty() {
            let level = std::mem::take(&mut job.next);
            tracing::debug!(depth, urls = level.len(), "crawling level");
            self.crawl_level(&mut job, level, depth, max_depth).await;
            depth += 1;
        }

        let report = CrawlReport {
            crawled: job.crawled,
            errors: job.errors,
            skipped: job.skipped,
            requested: job.requested,
            last_crawl: last_crawl.clone(),
        };
        {
            let mut totals = self.totals.lock();
            totals.crawled += report.crawled;
            totals.errors += report.errors;
            totals.skipped += report.skipped;
            totals.last_crawl = Some(last_crawl);
        }
        tracing::info!(
            crawled = report.crawled,
            errors = report.errors,
            skipped = report.skipped,
            requested = report.requested,
            "crawl finished"
        );
        report
    }

    async fn crawl_level(self: &Arc<Self>, job: &mut JobState, level: Vec<Url>, depth: usize, max_depth: usize) {
        let workers = self.config.max_workers.max(1);
        let mut queue = level.into_iter();
        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        loop {
            while tasks.len() < workers {
                let Some(url) = queue.next() else { break };
                let crawler = Arc::clone(self);
                tasks.spawn(async move { crawler.visit(url).await });
            }
            let Some(joined) = tasks.join_next().await else { break };
            job.pending -= 1;
            match joined {
                Ok(Outcome::Indexed { links, landed }) => {
                    job.crawled += 1;
                    if let Some(landed) = landed {
                        job.visited.insert(landed);
                    }
                    if depth < max_depth {
                        for link in links {
                            if !job.has_budget() {
                                break;
                            }
                            job.schedule(link);
                        }
                    }
                }
                Ok(Outcome::Skipped(_)) => job.skipped += 1,
                Ok(Outcome::Failed) => job.errors += 1,
                Err(e) => {
                    tracing::error!(error = %e, "crawl task panicked");
                    job.errors += 1;
                }
            }
        }
    }

    async fn visit(self: Arc<Self>, url: Url) -> Outcome {
        if self.config.respect_robots {
            let rules = self.robots.rules_for(&self.client, &url).await;
            if !rules.allows(url.path()) {
                tracing::debug!(url = %url, "disallowed by robots.txt");
                return Outcome::Skipped("robots");
            }
            if let Some(delay) = rules.crawl_delay {
                sleep(delay).await;
            }
        }

        let resp = match self.fetch(&url).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "fetch failed");
                return Outcome::Failed;
            }
        };
        if !is_html(&resp) {
            tracing::debug!(url = %url, "skipping non-html response");
            return Outcome::Skipped("content-type");
        }
        if resp.content_length().is_some_and(|len| len > self.config.max_body_bytes as u64) {
            tracing::debug!(url = %url, "skipping oversized response");
            return Outcome::Skipped("too-large");
        }
        let mut base = resp.url().clone();
        base.set_fragment(None);
        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "reading body failed");
                return Outcome::Failed;
            }
        };
        if bytes.len() > self.config.max_body_bytes {
            tracing::debug!(url = %url, "skipping oversized response");
            return Outcome::Skipped("too-large");
        }

        let page = extract(&String::from_utf8_lossy(&bytes), &base);
        let links = self.follow(&base, &page);
        let landed = (base != url).then(|| base.clone());
        let crawler = Arc::clone(&self);
        let doc_url = url.clone();
        match tokio::task::spawn_blocking(move || crawler.store(&doc_url, &page)).await {
            Ok(()) => {
                tracing::info!(url = %url, links = links.len(), "crawled");
                Outcome::Indexed { links, landed }
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "indexing failed");
                Outcome::Failed
            }
        }
    }

    /// Links eligible for the next level; `from` is the post-redirect URL the
    /// links were resolved against.
    fn follow(&self, from: &Url, page: &Page) -> Vec<Url> {
        let origin = netloc(from);
        page.links
            .iter()
            .filter(|link| !self.config.same_domain_only || netloc(link) == origin)
            .cloned()
            .collect()
    }

    /// Index the page under its URL and record its metadata.
    fn store(&self, url: &Url, page: &Page) {
        let id = url.as_str();
        self.index.index_document(id, &self.tokenizer.tokenize(&page.text));
        let Some(documents) = &self.documents else { return };
        let title = if page.title.is_empty() { id } else { page.title.as_str() };
        if let Err(e) = documents.add_document(id, id, title, &page.snippet(), page.text.chars().count()) {
            tracing::warn!(url = %id, error = %e, "document metadata not stored");
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Response> {
        let mut attempt = 0;
        loop {
            let retry = attempt < self.config.max_retries;
            match self.client.get(url.clone()).send().await {
                Ok(resp) if retry && RETRY_STATUSES.contains(&resp.status()) => {
                    tracing::debug!(url = %url, status = resp.status().as_u16(), attempt, "retrying");
                }
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => return Err(anyhow!("http status {}", resp.status())),
                Err(e) if retry && (e.is_timeout() || e.is_connect()) => {
                    tracing::debug!(url = %url, error = %e, attempt, "retrying");
                }
                Err(e) => return Err(e.into()),
            }
            sleep(self.backoff(attempt)).await;
            attempt += 1;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration { self.config.backoff_base.saturating_mul(1u32 << attempt.min(16)) }
}

fn parse_seed(seed: &str) -> Result<Url> {
    let seed = seed.trim();
    let mut url = Url::parse(seed).or_else(|_| Url::parse(&format!("https://{seed}"))).with_context(|| format!("bad url {seed}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("unsupported scheme {}", url.scheme()));
    }
    url.set_fragment(None);
    Ok(url)
}

/// A missing Content-Type counts as HTML.
fn is_html(resp: &Response) -> bool {
    match resp.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(ct) => {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "text/html" || mime == "application/xhtml+xml"
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_normalized() {
        assert_eq!(parse_seed("example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(parse_seed("http://a.example/p#top").unwrap().as_str(), "http://a.example/p");
        assert!(parse_seed("ftp://a.example/").is_err());
    }

    #[test]
    fn budget_counts_pending_work() {
        let mut job = JobState {
            visited: HashSet::new(),
            next: Vec::new(),
            crawled: 1,
            pending: 0,
            errors: 0,
            skipped: 0,
            requested: 0,
            max_pages: 3,
        };
        let url = |p: &str| Url::parse(&format!("http://a.example/{p}")).unwrap();
        assert!(job.schedule(url("a")));
        assert!(!job.schedule(url("a")));
        assert!(job.schedule(url("b")));
        assert!(!job.schedule(url("c")));
        assert_eq!(job.next.len(), 2);
        assert_eq!(job.requested, 2);
    }

    #[test]
    fn backoff_doubles() {
        let tokenizer = Arc::new(Tokenizer::default());
        let index = Arc::new(InvertedIndex::new(Arc::new(seek_core::JsonFileStore::new("unused.json"))));
        let config = CrawlConfig { backoff_base: Duration::from_millis(100), ..Default::default() };
        let crawler = Crawler::new(config, tokenizer, index).unwrap();
        assert_eq!(crawler.backoff(0), Duration::from_millis(100));
        assert_eq!(crawler.backoff(3), Duration::from_millis(800));
    }
}
