//! Weighting, ordering and domain de-duplication of mixed result lists.

use crate::model::{SearchResult, LOCAL_SOURCE};
use crate::source::ExternalHit;
use std::cmp::Ordering;
use std::collections::HashSet;

/// `host[:port]`, lowercased; empty when `url` does not parse.
pub fn domain_of(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else { return String::new() };
    match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

/// Scale local scores by `boost` and tag them as local.
pub fn weight_local(results: &mut [SearchResult], boost: f64) {
    for (i, r) in results.iter_mut().enumerate() {
        r.score *= boost;
        r.source = LOCAL_SOURCE.to_string();
        r.blend_position = i;
    }
}

/// Score external hits by position decay, `(1 - i/len) * boost`.
pub fn weight_external(source: &str, hits: Vec<ExternalHit>, boost: f64) -> Vec<SearchResult> {
    let len = hits.len() as f64;
    hits.into_iter()
        .enumerate()
        .map(|(i, hit)| {
            let score = (1.0 - i as f64 / len) * boost;
            SearchResult::from_hit(hit, source, i, score)
        })
        .collect()
}

/// Stable descending sort by score.
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Drop results whose domain was already emitted, in the current order.
///
/// Local results never displace each other: a local page is dropped only
/// when an external result for its domain ranked above it. External results
/// are dropped against any earlier domain. Results without a domain are
/// always kept.
pub fn dedup_domains(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut seen_external: HashSet<String> = HashSet::new();
    results
        .into_iter()
        .filter(|r| {
            if r.domain.is_empty() {
                return true;
            }
            if r.source == LOCAL_SOURCE {
                if seen_external.contains(&r.domain) {
                    return false;
                }
                seen.insert(r.domain.clone());
                true
            } else if seen.insert(r.domain.clone()) {
                seen_external.insert(r.domain.clone());
                true
            } else {
                false
            }
        })
        .collect()
}

/// Merge weighted lists best-first, dropping lower-scored duplicates of a
/// domain when `deduplicate` is set.
pub fn blend(lists: Vec<Vec<SearchResult>>, deduplicate: bool) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = lists.into_iter().flatten().collect();
    sort_by_score(&mut merged);
    if deduplicate {
        merged = dedup_domains(merged);
    }
    merged
}
