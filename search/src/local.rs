//! Local-index leg of a search: advanced ranking plus metadata hydration.

use crate::blend::domain_of;
use crate::model::{SearchResult, LOCAL_SOURCE};
use seek_core::{AdvancedRanker, DocumentStore, ParsedQuery, Tokenizer};
use std::sync::Arc;

/// Extra candidates ranked when result filters may discard some.
const FILTER_OVERFETCH: usize = 5;

pub struct LocalSearch {
    ranker: AdvancedRanker,
    documents: Option<Arc<dyn DocumentStore>>,
}

impl LocalSearch {
    pub fn new(ranker: AdvancedRanker) -> Self { Self { ranker, documents: None } }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn tokenizer(&self) -> &Arc<Tokenizer> { self.ranker.ranker().tokenizer() }

    pub fn ranker(&self) -> &AdvancedRanker { &self.ranker }

    /// Ranked local results with raw BM25-based scores.
    pub fn search(&self, parsed: &ParsedQuery, max_results: usize, filtered: bool) -> Vec<SearchResult> {
        let top_k = if filtered { max_results.saturating_mul(FILTER_OVERFETCH) } else { max_results };
        self.ranker
            .rank_parsed(parsed, top_k)
            .into_iter()
            .enumerate()
            .map(|(i, (doc_id, score))| self.hydrate(doc_id, score, i))
            .collect()
    }

    fn hydrate(&self, doc_id: String, score: f64, position: usize) -> SearchResult {
        let meta = self.documents.as_ref().and_then(|d| d.get_document(&doc_id));
        let (url, title, snippet) = match meta {
            Some(m) => (m.url, m.title, m.snippet),
            None => (doc_id.clone(), doc_id, String::new()),
        };
        SearchResult {
            domain: domain_of(&url),
            title,
            url,
            snippet,
            score,
            source: LOCAL_SOURCE.to_string(),
            blend_position: position,
            published_date: None,
            language: None,
        }
    }
}
