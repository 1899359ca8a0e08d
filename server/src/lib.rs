use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use seek_core::{InvertedIndex, Ranker, RankerStats};
use seek_crawler::{CrawlReport, Crawler, CrawlerStats};
use seek_search::{SearchManager, SearchMode, SearchRequest, SearchResponse, SearchStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Upper bound on `k`.
pub const MAX_RESULTS: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    pub mode: Option<String>,
    pub site: Option<String>,
    pub filetype: Option<String>,
    pub ext: Option<String>,
    pub date: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub lang: Option<String>,
    pub domain: Option<String>,
}
fn default_k() -> usize { 10 }

impl SearchParams {
    fn filters(&self) -> BTreeMap<String, String> {
        let pairs = [
            ("site", &self.site),
            ("filetype", &self.filetype),
            ("ext", &self.ext),
            ("date", &self.date),
            ("before", &self.before),
            ("after", &self.after),
            ("lang", &self.lang),
            ("domain", &self.domain),
        ];
        pairs
            .into_iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.to_string(), v.clone())))
            .collect()
    }
}

#[derive(Deserialize)]
pub struct CrawlParams {
    pub urls: Vec<String>,
    #[serde(default = "default_depth")]
    pub max_depth: usize,
    #[serde(default = "default_pages")]
    pub max_pages: usize,
}
fn default_depth() -> usize { 1 }
fn default_pages() -> usize { 100 }

#[derive(Serialize)]
pub struct IndexStats {
    pub terms: usize,
    pub documents: usize,
    pub auto_flush: bool,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub search: SearchStats,
    pub ranker: RankerStats,
    pub crawler: CrawlerStats,
    pub index: IndexStats,
}

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchManager>,
    pub ranker: Arc<Ranker>,
    pub index: Arc<InvertedIndex>,
    pub crawler: Arc<Crawler>,
    pub admin_token: Option<String>,
}

/// CORS from a comma-separated origin list, or any origin when unset/empty.
pub fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origins: Vec<_> = allow_origin
        .unwrap_or("")
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(std::env::var("CORS_ALLOW_ORIGIN").ok().as_deref());
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/stats", get(stats_handler))
        .route("/crawl", post(crawl_handler))
        .route("/index/flush", post(flush_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let mut request = SearchRequest::new(params.q.clone()).max_results(params.k.clamp(1, MAX_RESULTS));
    request.filters = params.filters();
    if let Some(mode) = &params.mode {
        let mode: SearchMode = mode.parse().map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;
        request = request.mode(mode);
    }

    let mut response = state
        .search
        .execute(&request)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let raw_terms = highlight_words(&params.q);
    for result in &mut response.results {
        result.snippet = highlight_terms(&result.snippet, &raw_terms);
    }
    Ok(Json(response))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        search: state.search.stats(),
        ranker: state.ranker.statistics(),
        crawler: state.crawler.statistics(),
        index: IndexStats {
            terms: state.index.term_count(),
            documents: state.index.document_count(),
            auto_flush: state.index.auto_flush_running(),
        },
    })
}

async fn crawl_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<CrawlParams>,
) -> Result<Json<CrawlReport>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    if params.urls.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "no urls given".into()));
    }
    let report = state.crawler.crawl(&params.urls, params.max_depth, params.max_pages).await;
    state.search.clear_cache();
    Ok(Json(report))
}

async fn flush_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<IndexStats>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let index = state.index.clone();
    tokio::task::spawn_blocking(move || index.flush())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            tracing::error!(error = %e, "index flush failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("flush failed: {e}"))
        })?;
    Ok(Json(IndexStats {
        terms: state.index.term_count(),
        documents: state.index.document_count(),
        auto_flush: state.index.auto_flush_running(),
    }))
}

/// Query words worth highlighting: no operators, filters or prefixes.
fn highlight_words(q: &str) -> Vec<String> {
    q.split_whitespace()
        .filter(|w| !w.contains(':') && !matches!(*w, "AND" | "OR" | "NOT") && !w.starts_with('-'))
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else {
            continue;
        };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlighting_skips_operators_and_filters() {
        assert_eq!(highlight_words(r#"+rust "async io" site:docs.rs -java OR tokio"#), vec!["rust", "async", "io", "tokio"]);
        assert_eq!(highlight_terms("Rust and rust", &["rust".to_string()]), "<em>Rust</em> and <em>rust</em>");
    }
}
