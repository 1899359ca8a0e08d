//! Boolean, phrase and wildcard ranking on top of BM25.

use crate::query::{ParsedQuery, QueryParser};
use crate::ranker::{sort_desc, Ranker, Scorer};
use crate::DocId;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

/// Score added when every term of a quoted phrase occurs in a document.
pub const PHRASE_BONUS: f64 = 10.0;
/// Multiplier on the BM25 score of `+term` / `a AND b` operands.
pub const MUST_HAVE_WEIGHT: f64 = 1.5;

pub struct AdvancedRanker {
    ranker: Arc<Ranker>,
    parser: QueryParser,
}

impl AdvancedRanker {
    pub fn new(ranker: Arc<Ranker>) -> Self {
        let parser = QueryParser::new(ranker.tokenizer().clone());
        Self { ranker, parser }
    }

    pub fn ranker(&self) -> &Arc<Ranker> { &self.ranker }

    pub fn parser(&self) -> &QueryParser { &self.parser }

    /// Parse and rank; plain queries go straight to BM25.
    pub fn rank(&self, query: &str, top_k: usize) -> Vec<(DocId, f64)> {
        let parsed = self.parser.parse(query);
        self.rank_parsed(&parsed, top_k)
    }

    pub fn rank_parsed(&self, parsed: &ParsedQuery, top_k: usize) -> Vec<(DocId, f64)> {
        tracing::debug!(query = %parsed.original, plan = %parsed.explain(), "ranking");
        if parsed.is_simple() {
            return self.ranker.rank_tokens(&parsed.terms, top_k);
        }

        let tokenizer = self.ranker.tokenizer();
        let phrases: Vec<Vec<String>> = parsed
            .phrases
            .iter()
            .map(|p| tokenizer.tokenize(p))
            .filter(|terms| !terms.is_empty())
            .collect();

        self.ranker.with_scorer(|scorer| {
            let wildcards: Vec<String> = parsed.wildcards.iter().flat_map(|w| expand_wildcard(scorer, w)).collect();
            let candidates = candidates(scorer, parsed, &phrases, &wildcards);

            let mut scored: Vec<(DocId, f64)> = candidates
                .into_iter()
                .filter_map(|doc| {
                    let score = score_document(scorer, &doc, parsed, &phrases, &wildcards);
                    (score > 0.0).then_some((doc, score))
                })
                .collect();
            sort_desc(&mut scored);
            scored.truncate(top_k);
            scored
        })
    }
}

/// Union of postings for every positive term, minus excluded documents, in
/// first-seen order.
fn candidates(scorer: &Scorer<'_>, parsed: &ParsedQuery, phrases: &[Vec<String>], wildcards: &[String]) -> Vec<DocId> {
    let excluded: HashSet<&str> = parsed
        .must_not_have
        .iter()
        .filter_map(|t| scorer.terms.get(t))
        .flatten()
        .map(|p| p.doc_id.as_str())
        .collect();

    let positive = parsed
        .terms
        .iter()
        .chain(&parsed.must_have)
        .chain(&parsed.should_have)
        .chain(phrases.iter().flatten())
        .chain(wildcards);

    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for term in positive {
        for p in scorer.terms.get(term).into_iter().flatten() {
            let id = p.doc_id.as_str();
            if !excluded.contains(id) && seen.insert(id) {
                out.push(p.doc_id.clone());
            }
        }
    }
    out
}

fn score_document(scorer: &Scorer<'_>, doc: &str, parsed: &ParsedQuery, phrases: &[Vec<String>], wildcards: &[String]) -> f64 {
    if !parsed.must_have.iter().all(|t| scorer.contains(t, doc)) {
        return 0.0;
    }
    if parsed.must_not_have.iter().any(|t| scorer.contains(t, doc)) {
        return 0.0;
    }

    let mut score: f64 = parsed.terms.iter().map(|t| scorer.doc_score(t, doc)).sum();
    score += parsed.must_have.iter().map(|t| scorer.doc_score(t, doc) * MUST_HAVE_WEIGHT).sum::<f64>();

    // Co-presence only: term adjacency is not checked because the index keeps
    // no positions, so "fox quick" also satisfies the phrase "quick fox".
    for terms in phrases {
        if terms.iter().all(|t| scorer.contains(t, doc)) {
            score += PHRASE_BONUS;
        }
    }

    score += parsed.should_have.iter().map(|t| scorer.doc_score(t, doc)).fold(0.0, f64::max);
    score += wildcards.iter().map(|t| scorer.doc_score(t, doc)).sum::<f64>();
    score
}

/// Vocabulary terms matching a `*` glob.
fn expand_wildcard(scorer: &Scorer<'_>, pattern: &str) -> Vec<String> {
    let Some(re) = glob_to_regex(pattern) else { return Vec::new() };
    scorer.terms.keys().filter(|t| re.is_match(t)).cloned().collect()
}

pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let body: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Regex::new(&format!("^{}$", body.join(".*"))).ok()
}
