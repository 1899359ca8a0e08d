//! Capability implemented by every external search backend.

use crate::error::SourceError;
use crate::model::SearchOptions;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// One organic result as reported by an external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl ExternalHit {
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self { title: title.into(), url: url.into(), snippet: snippet.into(), published_date: None, language: None }
    }
}

pub trait ExternalSearch: Send + Sync {
    /// Name used for result tagging and primary/fallback selection.
    fn name(&self) -> &str;

    /// Best-first hits for `query`, at most `max_results`.
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
        options: &'a SearchOptions,
    ) -> BoxFuture<'a, Result<Vec<ExternalHit>, SourceError>>;
}
