//! BM25 ranking over the shared inverted index.
//!
//! Per-document lengths and the corpus average are cached and rebuilt when the
//! index generation changes or `invalidate()` is called.

use crate::error::ParamError;
use crate::index::{InvertedIndex, PostingList, Postings};
use crate::tokenizer::Tokenizer;
use crate::DocId;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Document-length normalization, 0 = none, 1 = full.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: 1.5, b: 0.75 } }
}

impl Bm25Params {
    pub fn new(k1: f64, b: f64) -> Result<Self, ParamError> {
        if !(0.0..=3.0).contains(&k1) {
            return Err(ParamError::K1OutOfRange(k1));
        }
        if !(0.0..=1.0).contains(&b) {
            return Err(ParamError::BOutOfRange(b));
        }
        Ok(Self { k1, b })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankerStats {
    pub total_documents: usize,
    pub average_document_length: f64,
    pub total_terms: usize,
    pub params: Bm25Params,
}

pub(crate) struct CorpusStats {
    generation: u64,
    doc_lengths: HashMap<DocId, u64>,
    avg_len: f64,
}

impl CorpusStats {
    fn compute(terms: &Postings, generation: u64) -> Self {
        let mut doc_lengths: HashMap<DocId, u64> = HashMap::new();
        for p in terms.values().flatten() {
            *doc_lengths.entry(p.doc_id.clone()).or_insert(0) += u64::from(p.freq);
        }
        let avg_len = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.values().sum::<u64>() as f64 / doc_lengths.len() as f64
        };
        Self { generation, doc_lengths, avg_len }
    }

    pub(crate) fn total_docs(&self) -> usize { self.doc_lengths.len() }

    fn doc_len(&self, doc_id: &str) -> u64 { self.doc_lengths.get(doc_id).copied().unwrap_or(0) }
}

/// Saturated, length-normalized term-frequency component of BM25.
pub fn bm25_tf(tf: f64, doc_len: f64, avg_len: f64, params: Bm25Params) -> f64 {
    if avg_len <= 0.0 {
        return 0.0;
    }
    let norm = 1.0 - params.b + params.b * (doc_len / avg_len);
    tf * (params.k1 + 1.0) / (tf + params.k1 * norm)
}

/// `ln((N - df + 0.5) / (df + 0.5) + 1)`, never negative.
pub fn bm25_idf(total_docs: usize, df: usize) -> f64 {
    let (n, df) = (total_docs as f64, df as f64);
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln().max(0.0)
}

/// Scoring view over one locked read of the index.
pub(crate) struct Scorer<'a> {
    pub(crate) terms: &'a Postings,
    pub(crate) stats: &'a CorpusStats,
    pub(crate) params: Bm25Params,
}

impl Scorer<'_> {
    pub(crate) fn idf(&self, term: &str) -> f64 {
        bm25_idf(self.stats.total_docs(), self.terms.get(term).map_or(0, PostingList::len))
    }

    fn score_with_idf(&self, idf: f64, doc_id: &str, tf: u32) -> f64 {
        idf * bm25_tf(f64::from(tf), self.stats.doc_len(doc_id) as f64, self.stats.avg_len, self.params)
    }

    pub(crate) fn tf(&self, term: &str, doc_id: &str) -> Option<u32> {
        self.terms.get(term)?.freq(doc_id)
    }

    pub(crate) fn contains(&self, term: &str, doc_id: &str) -> bool { self.tf(term, doc_id).is_some() }

    /// BM25 contribution of `term` to `doc_id`; zero when absent.
    pub(crate) fn doc_score(&self, term: &str, doc_id: &str) -> f64 {
        self.tf(term, doc_id).map_or(0.0, |tf| self.score_with_idf(self.idf(term), doc_id, tf))
    }
}

/// Accumulates scores keeping first-seen order, so equal scores rank in
/// discovery order after a stable sort.
#[derive(Default)]
pub(crate) struct ScoreBoard {
    order: Vec<(DocId, f64)>,
    slots: HashMap<DocId, usize>,
}

impl ScoreBoard {
    pub(crate) fn add(&mut self, doc_id: &str, score: f64) {
        match self.slots.get(doc_id) {
            Some(&i) => self.order[i].1 += score,
            None => {
                self.slots.insert(doc_id.to_string(), self.order.len());
                self.order.push((doc_id.to_string(), score));
            }
        }
    }

    pub(crate) fn into_ranked(self, top_k: usize) -> Vec<(DocId, f64)> {
        let mut ranked = self.order;
        sort_desc(&mut ranked);
        ranked.truncate(top_k);
        ranked
    }
}

pub(crate) fn sort_desc(results: &mut [(DocId, f64)]) {
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
}

pub struct Ranker {
    index: Arc<InvertedIndex>,
    tokenizer: Arc<Tokenizer>,
    params: RwLock<Bm25Params>,
    stats: Mutex<Option<Arc<CorpusStats>>>,
}

impl Ranker {
    pub fn new(index: Arc<InvertedIndex>, tokenizer: Arc<Tokenizer>) -> Self {
        Self::with_params(index, tokenizer, Bm25Params::default())
    }

    pub fn with_params(index: Arc<InvertedIndex>, tokenizer: Arc<Tokenizer>, params: Bm25Params) -> Self {
        Self { index, tokenizer, params: RwLock::new(params), stats: Mutex::new(None) }
    }

    pub fn tokenizer(&self) -> &Arc<Tokenizer> { &self.tokenizer }

    pub fn index(&self) -> &Arc<InvertedIndex> { &self.index }

    pub fn params(&self) -> Bm25Params { *self.params.read() }

    /// Rank documents for free text, best first.
    pub fn rank(&self, query: &str, top_k: usize) -> Vec<(DocId, f64)> {
        let tokens = self.tokenizer.tokenize(query);
        self.rank_tokens(&tokens, top_k)
    }

    pub fn rank_tokens(&self, tokens: &[String], top_k: usize) -> Vec<(DocId, f64)> {
        if tokens.is_empty() {
            return Vec::new();
        }
        self.with_scorer(|scorer| {
            if scorer.stats.total_docs() == 0 {
                return Vec::new();
            }
            let mut board = ScoreBoard::default();
            for term in tokens {
                let Some(postings) = scorer.terms.get(term) else { continue };
                let idf = scorer.idf(term);
                for p in postings {
                    board.add(&p.doc_id, scorer.score_with_idf(idf, &p.doc_id, p.freq));
                }
            }
            board.into_ranked(top_k)
        })
    }

    /// Classic length-normalized TF-IDF, kept for comparison with BM25.
    pub fn rank_tfidf(&self, query: &str, top_k: usize) -> Vec<(DocId, f64)> {
        let tokens = self.tokenizer.tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        self.with_scorer(|scorer| {
            let n = scorer.stats.total_docs();
            if n == 0 {
                return Vec::new();
            }
            let mut board = ScoreBoard::default();
            for term in &tokens {
                let Some(postings) = scorer.terms.get(term).filter(|p| !p.is_empty()) else { continue };
                let idf = (n as f64 / postings.len() as f64).ln();
                for p in postings {
                    let len = scorer.stats.doc_len(&p.doc_id).max(1) as f64;
                    board.add(&p.doc_id, f64::from(p.freq) / len * idf);
                }
            }
            board.into_ranked(top_k)
        })
    }

    /// Drop cached corpus statistics; the next query rebuilds them.
    pub fn invalidate(&self) { *self.stats.lock() = None; }

    pub fn tune(&self, k1: f64, b: f64) -> Result<(), ParamError> {
        *self.params.write() = Bm25Params::new(k1, b)?;
        self.invalidate();
        Ok(())
    }

    pub fn statistics(&self) -> RankerStats {
        self.with_scorer(|scorer| RankerStats {
            total_documents: scorer.stats.total_docs(),
            average_document_length: (scorer.stats.avg_len * 100.0).round() / 100.0,
            total_terms: scorer.terms.len(),
            params: scorer.params,
        })
    }

    /// Run `f` against a consistent read of the index and fresh statistics.
    pub(crate) fn with_scorer<R>(&self, f: impl FnOnce(&Scorer<'_>) -> R) -> R {
        let terms = self.index.read();
        let generation = self.index.generation();
        let stats = {
            let mut cached = self.stats.lock();
            match cached.as_ref() {
                Some(s) if s.generation == generation => s.clone(),
                _ => {
                    let fresh = Arc::new(CorpusStats::compute(&terms, generation));
                    *cached = Some(fresh.clone());
                    fresh
                }
            }
        };
        let scorer = Scorer { terms: &terms, stats: &stats, params: self.params() };
        f(&scorer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::IndexStore;
    use crate::IndexSnapshot;

    struct NullStore;

    impl IndexStore for NullStore {
        fn save(&self, _: &IndexSnapshot) -> anyhow::Result<()> { Ok(()) }
        fn load(&self) -> anyhow::Result<IndexSnapshot> { Ok(IndexSnapshot::new()) }
    }

    fn ranker_with(docs: &[(&str, &str)]) -> Ranker {
        let tokenizer = Arc::new(Tokenizer::default());
        let index = Arc::new(InvertedIndex::new(Arc::new(NullStore)));
        for (id, text) in docs {
            index.index_document(id, &tokenizer.tokenize(text));
        }
        Ranker::new(index, tokenizer)
    }

    #[test]
    fn higher_frequency_ranks_first() {
        let ranker = ranker_with(&[("d1", "python python"), ("d2", "python")]);
        let ranked = ranker.rank("python", 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "d1");
        assert_eq!(ranked[1].0, "d2");
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn empty_query_or_corpus_is_empty() {
        assert!(ranker_with(&[("d1", "rust")]).rank("", 10).is_empty());
        assert!(ranker_with(&[]).rank("rust", 10).is_empty());
    }

    #[test]
    fn tf_component_is_monotonic() {
        let params = Bm25Params::default();
        let mut prev = 0.0;
        for tf in 1..50 {
            let s = bm25_tf(f64::from(tf), 100.0, 80.0, params);
            assert!(s >= prev, "tf={tf} decreased the score");
            prev = s;
        }
    }

    #[test]
    fn idf_is_never_negative() {
        assert!(bm25_idf(3, 3) >= 0.0);
        assert!(bm25_idf(10, 1) > bm25_idf(10, 9));
    }

    #[test]
    fn top_k_truncates() {
        let ranker = ranker_with(&[("a", "rust"), ("b", "rust lang"), ("c", "rust book")]);
        assert_eq!(ranker.rank("rust", 2).len(), 2);
    }

    #[test]
    fn statistics_follow_index_changes() {
        let ranker = ranker_with(&[("a", "rust systems")]);
        assert_eq!(ranker.statistics().total_documents, 1);
        ranker.index().index_document("b", &["rust".to_string()]);
        assert_eq!(ranker.statistics().total_documents, 2);
        ranker.invalidate();
        assert_eq!(ranker.statistics().total_documents, 2);
    }

    #[test]
    fn tune_validates_ranges() {
        let ranker = ranker_with(&[]);
        assert_eq!(ranker.tune(4.0, 0.5), Err(ParamError::K1OutOfRange(4.0)));
        assert_eq!(ranker.tune(1.2, 1.5), Err(ParamError::BOutOfRange(1.5)));
        ranker.tune(1.2, 0.5).unwrap();
        assert_eq!(ranker.params(), Bm25Params { k1: 1.2, b: 0.5 });
    }

    #[test]
    fn tfidf_prefers_rarer_terms() {
        let ranker = ranker_with(&[("a", "common rare"), ("b", "common"), ("c", "common")]);
        let ranked = ranker.rank_tfidf("common rare", 10);
        assert_eq!(ranked[0].0, "a");
    }
}
