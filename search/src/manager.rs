//! Search orchestration: cache lookaside, concurrent fan-out to the local
//! index and external sources, blending, filtering and statistics.

use crate::blend::{self, weight_external, weight_local};
use crate::cache::SearchCache;
use crate::config::SearchConfig;
use crate::error::{SearchError, SourceError};
use crate::filter::apply_filters;
use crate::local::LocalSearch;
use crate::model::{ResponseMetadata, SearchMode, SearchOptions, SearchResponse, SearchResult, LOCAL_SOURCE};
use crate::source::{ExternalHit, ExternalSearch};
use futures::future::join_all;
use parking_lot::Mutex;
use seek_core::{validate_query, ParsedQuery, QueryParser, Tokenizer};
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: usize,
    /// Merged over filters written in the query text.
    pub filters: BTreeMap<String, String>,
    /// None means the configured default.
    pub mode: Option<SearchMode>,
    pub options: SearchOptions,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: 10,
            filters: BTreeMap::new(),
            mode: None,
            options: SearchOptions::default(),
        }
    }

    pub fn max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }

    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    pub fn options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchStats {
    pub total_searches: u64,
    pub local_searches: u64,
    pub external_searches: u64,
    pub hybrid_searches: u64,
    pub cache_hits: u64,
    /// Mean over searches that were executed rather than served from cache.
    pub avg_response_ms: f64,
    /// Percentage of searches answered from cache.
    pub cache_hit_rate: f64,
}

#[derive(Default)]
struct Counters {
    stats: SearchStats,
    executed: u64,
}

type SourceOutcome = (String, Result<Vec<ExternalHit>, SourceError>);

pub struct SearchManager {
    config: SearchConfig,
    parser: QueryParser,
    local: Option<Arc<LocalSearch>>,
    sources: Vec<Arc<dyn ExternalSearch>>,
    cache: Option<Arc<dyn SearchCache>>,
    counters: Mutex<Counters>,
}

impl SearchManager {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            parser: QueryParser::new(Arc::new(Tokenizer::default())),
            local: None,
            sources: Vec::new(),
            cache: None,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Queries are parsed with the local index's tokenizer so terms match.
    pub fn with_local(mut self, local: LocalSearch) -> Self {
        self.parser = QueryParser::new(local.tokenizer().clone());
        self.local = Some(Arc::new(local));
        self
    }

    pub fn with_source(mut self, source: Arc<dyn ExternalSearch>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn SearchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &SearchConfig { &self.config }

    pub fn local(&self) -> Option<&Arc<LocalSearch>> { self.local.as_ref() }

    pub fn source(&self, name: &str) -> Result<&Arc<dyn ExternalSearch>, SearchError> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| SearchError::UnknownSource(name.to_string()))
    }

    pub fn source_names(&self) -> Vec<String> { self.sources.iter().map(|s| s.name().to_string()).collect() }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn stats(&self) -> SearchStats {
        let counters = self.counters.lock();
        let mut stats = counters.stats.clone();
        if stats.total_searches > 0 {
            stats.cache_hit_rate = stats.cache_hits as f64 / stats.total_searches as f64 * 100.0;
        }
        stats
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        filters: &BTreeMap<String, String>,
        mode: Option<SearchMode>,
    ) -> Result<SearchResponse, SearchError> {
        let request = SearchRequest {
            query: query.to_string(),
            max_results,
            filters: filters.clone(),
            mode,
            options: SearchOptions::default(),
        };
        self.execute(&request).await
    }

    /// Run one search. Only a malformed query is an error; source failures
    /// are reported in the response metadata.
    pub async fn execute(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        validate_query(&request.query)?;
        let started = Instant::now();
        let mode = request.mode.unwrap_or(self.config.default_mode);
        let max_results = request.max_results;

        let mut parsed = self.parser.parse(&request.query);
        for (name, value) in &request.filters {
            parsed.filters.insert(name.to_lowercase(), value.clone());
        }
        let key = cache_key(&request.query, &parsed.filters, mode, max_results, &request.options);
        self.counters.lock().stats.total_searches += 1;

        if let Some(cache) = &self.cache {
            if let Some(mut hit) = cache.get(&key) {
                self.counters.lock().stats.cache_hits += 1;
                tracing::info!(query = %request.query, mode = %mode, "cache hit");
                hit.metadata.cached = true;
                return Ok(hit);
            }
        }

        let parsed = Arc::new(parsed);
        let (local, external) = match mode {
            SearchMode::Local => (self.run_local(parsed.clone(), max_results).await, Vec::new()),
            SearchMode::External => (None, self.run_external(&request.query, max_results, &request.options).await),
            SearchMode::Hybrid => tokio::join!(
                self.run_local(parsed.clone(), max_results),
                self.run_external(&request.query, max_results, &request.options)
            ),
        };

        let mut metadata = ResponseMetadata { mode, ..Default::default() };
        let local_configured = local.is_some();
        let local = match local {
            Some(Ok(results)) => Some(results),
            Some(Err(e)) => {
                tracing::warn!(query = %request.query, error = %e, "local search failed");
                metadata.failed_sources.push(LOCAL_SOURCE.to_string());
                None
            }
            None => None,
        };
        let attempted = local_configured || !external.is_empty();
        let mut external_lists = Vec::new();
        for (name, outcome) in external {
            match outcome {
                Ok(hits) => {
                    metadata.external_count += hits.len();
                    external_lists.push(weight_external(&name, hits, self.config.freshness_boost));
                }
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "external source failed");
                    metadata.failed_sources.push(name);
                }
            }
        }
        metadata.local_count = local.as_ref().map_or(0, Vec::len);

        if local.is_none() && external_lists.is_empty() {
            metadata.error = Some(if attempted {
                "all search sources failed".to_string()
            } else {
                format!("no search sources configured for {mode} mode")
            });
            let response = self.respond(&request.query, Vec::new(), metadata, started);
            tracing::error!(query = %request.query, mode = %mode, "search failed");
            return Ok(response);
        }

        let blended = match mode {
            SearchMode::Local => local.unwrap_or_default(),
            SearchMode::External => blend::blend(external_lists, self.config.deduplicate),
            SearchMode::Hybrid => {
                let mut local = local.unwrap_or_default();
                weight_local(&mut local, self.config.local_boost);
                let mut lists = vec![local];
                lists.extend(external_lists);
                blend::blend(lists, self.config.deduplicate)
            }
        };
        let mut results = apply_filters(blended, &parsed.filters);
        results.truncate(max_results);

        let cacheable = metadata.failed_sources.is_empty();
        let response = self.respond(&request.query, results, metadata, started);
        if let (Some(cache), true) = (&self.cache, cacheable) {
            cache.set(&key, response.clone(), self.config.cache_ttl);
        }
        tracing::info!(
            query = %request.query,
            mode = %mode,
            results = response.total,
            elapsed_ms = response.metadata.response_time_ms,
            "search completed"
        );
        Ok(response)
    }

    /// Try the primary source, then the fallback, then the local index.
    pub async fn search_with_fallback(
        &self,
        query: &str,
        max_results: usize,
        options: &SearchOptions,
    ) -> Result<SearchResponse, SearchError> {
        validate_query(query)?;
        let started = Instant::now();
        self.counters.lock().stats.total_searches += 1;
        let parsed = Arc::new(self.parser.parse(query));
        let mut failed: Vec<String> = Vec::new();

        let mut chain: Vec<&str> = Vec::new();
        for name in [&self.config.primary_source, &self.config.fallback_source].into_iter().flatten() {
            if !chain.contains(&name.as_str()) {
                chain.push(name.as_str());
            }
        }

        for name in chain {
            let outcome = match self.source(name) {
                Ok(source) => self.call_source(source, query, max_results, options).await,
                Err(e) => Err(SourceError::Unavailable(e.to_string())),
            };
            match outcome {
                Ok(hits) => {
                    let metadata = ResponseMetadata {
                        mode: SearchMode::External,
                        external_count: hits.len(),
                        failed_sources: failed,
                        ..Default::default()
                    };
                    let mut results = apply_filters(weight_external(name, hits, self.config.freshness_boost), &parsed.filters);
                    results.truncate(max_results);
                    tracing::info!(query = %query, source = %name, results = results.len(), "search served");
                    return Ok(self.respond(query, results, metadata, started));
                }
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "search engine failed, trying next");
                    failed.push(name.to_string());
                }
            }
        }

        if let Some(Ok(local)) = self.run_local(parsed.clone(), max_results).await {
            tracing::info!(query = %query, results = local.len(), "all search engines failed, serving local results");
            let metadata = ResponseMetadata {
                mode: SearchMode::Local,
                local_count: local.len(),
                failed_sources: failed,
                ..Default::default()
            };
            let mut results = apply_filters(local, &parsed.filters);
            results.truncate(max_results);
            return Ok(self.respond(query, results, metadata, started));
        }

        tracing::error!(query = %query, "all search engines failed");
        let metadata = ResponseMetadata {
            mode: SearchMode::External,
            failed_sources: failed,
            error: Some("all search engines failed".to_string()),
            ..Default::default()
        };
        Ok(self.respond(query, Vec::new(), metadata, started))
    }

    /// None when no local index is configured.
    async fn run_local(&self, parsed: Arc<ParsedQuery>, max_results: usize) -> Option<Result<Vec<SearchResult>, String>> {
        let local = self.local.clone()?;
        let filtered = !parsed.filters.is_empty();
        let task = tokio::task::spawn_blocking(move || local.search(&parsed, max_results, filtered));
        Some(match timeout(self.config.source_timeout, task).await {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("timed out".to_string()),
        })
    }

    async fn run_external(&self, query: &str, max_results: usize, options: &SearchOptions) -> Vec<SourceOutcome> {
        let calls = self.sources.iter().map(|source| async move {
            let outcome = self.call_source(source, query, max_results, options).await;
            (source.name().to_string(), outcome)
        });
        join_all(calls).await
    }

    /// Each call runs as its own task; on timeout the task is abandoned and
    /// its eventual result discarded.
    async fn call_source(
        &self,
        source: &Arc<dyn ExternalSearch>,
        query: &str,
        max_results: usize,
        options: &SearchOptions,
    ) -> Result<Vec<ExternalHit>, SourceError> {
        let source = Arc::clone(source);
        let query = query.to_string();
        let options = options.clone();
        let task = tokio::spawn(async move { source.search(&query, max_results, &options).await });
        match timeout(self.config.source_timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Err(SourceError::Other(e.to_string())),
            Err(_) => Err(SourceError::Timeout),
        }
    }

    fn respond(&self, query: &str, results: Vec<SearchResult>, mut metadata: ResponseMetadata, started: Instant) -> SearchResponse {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metadata.blended_count = results.len();
        metadata.response_time_ms = elapsed_ms;
        metadata.timestamp = time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        self.record(metadata.mode, elapsed_ms);
        SearchResponse { query: query.to_string(), total: results.len(), results, metadata }
    }

    fn record(&self, mode: SearchMode, elapsed_ms: f64) {
        let mut counters = self.counters.lock();
        counters.executed += 1;
        let n = counters.executed as f64;
        let stats = &mut counters.stats;
        match mode {
            SearchMode::Local => stats.local_searches += 1,
            SearchMode::External => stats.external_searches += 1,
            SearchMode::Hybrid => stats.hybrid_searches += 1,
        }
        stats.avg_response_ms += (elapsed_ms - stats.avg_response_ms) / n;
    }
}

/// Deterministic key over everything that shapes the response, including
/// the options forwarded to external sources.
pub fn cache_key(
    query: &str,
    filters: &BTreeMap<String, String>,
    mode: SearchMode,
    max_results: usize,
    options: &SearchOptions,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(query.as_bytes());
    for (name, value) in filters {
        hasher.update(format!("|{name}={value}"));
    }
    hasher.update(format!("|{mode}|{max_results}"));
    hasher.update(format!(
        "|safe={}|region={}|period={:?}|site={:?}|type={:?}",
        options.safe_search, options.region, options.time_period, options.site, options.file_type
    ));
    format!("search:{:x}", hasher.finalize())
}
