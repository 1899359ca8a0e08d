use crate::source::ExternalHit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag carried by results from the local index.
pub const LOCAL_SOURCE: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Local,
    External,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Local => "local",
            SearchMode::External => "external",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(SearchMode::Local),
            "external" | "api" | "serpapi" => Ok(SearchMode::External),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(format!("unknown search mode `{other}`")),
        }
    }
}

/// Hints forwarded to external sources; the local index ignores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub safe_search: bool,
    pub region: String,
    /// `d`, `w`, `m` or `y`.
    pub time_period: Option<String>,
    pub site: Option<String>,
    pub file_type: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { safe_search: true, region: "wt-wt".to_string(), time_period: None, site: None, file_type: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// `host[:port]` of `url`, empty when it does not parse.
    pub domain: String,
    pub score: f64,
    /// `local` or the external source name.
    pub source: String,
    /// Rank within the originating source's list.
    pub blend_position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SearchResult {
    pub fn from_hit(hit: ExternalHit, source: &str, position: usize, score: f64) -> Self {
        Self {
            domain: crate::blend::domain_of(&hit.url),
            title: hit.title,
            url: hit.url,
            snippet: hit.snippet,
            score,
            source: source.to_string(),
            blend_position: position,
            published_date: hit.published_date,
            language: hit.language,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub mode: SearchMode,
    pub local_count: usize,
    pub external_count: usize,
    pub blended_count: usize,
    /// Sources that errored or timed out, `local` included.
    pub failed_sources: Vec<String>,
    pub response_time_ms: f64,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub metadata: ResponseMetadata,
}

impl SearchResponse {
    pub fn empty(query: &str, mode: SearchMode, error: impl Into<String>) -> Self {
        Self {
            query: query.to_string(),
            results: Vec::new(),
            total: 0,
            metadata: ResponseMetadata { mode, error: Some(error.into()), ..Default::default() },
        }
    }

    pub fn is_error(&self) -> bool { self.metadata.error.is_some() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_with_legacy_alias() {
        assert_eq!("Hybrid".parse::<SearchMode>(), Ok(SearchMode::Hybrid));
        assert_eq!("serpapi".parse::<SearchMode>(), Ok(SearchMode::External));
        assert!("fastest".parse::<SearchMode>().is_err());
    }

    #[test]
    fn results_serialize_without_empty_optionals() {
        let hit = ExternalHit::new("T", "https://Docs.Example.com/x", "s");
        let json = serde_json::to_string(&SearchResult::from_hit(hit, "web", 0, 1.0)).unwrap();
        assert!(json.contains(r#""domain":"docs.example.com""#));
        assert!(!json.contains("published_date"));
    }
}
