use seek_core::{AdvancedRanker, InvertedIndex, JsonFileStore, Ranker, Tokenizer, TokenizerConfig};
use std::sync::Arc;
use tempfile::tempdir;

fn build(dir: &std::path::Path) -> (Arc<InvertedIndex>, Arc<Tokenizer>) {
    let tokenizer = Arc::new(Tokenizer::new(TokenizerConfig { stemming: false, ..Default::default() }));
    let store = Arc::new(JsonFileStore::new(dir.join("index.json")));
    (Arc::new(InvertedIndex::open(store).unwrap()), tokenizer)
}

#[test]
fn persisted_index_ranks_the_same_after_reload() {
    let dir = tempdir().unwrap();
    let (index, tokenizer) = build(dir.path());
    let pages = [
        ("https://a.example/", "rust ownership and borrowing explained"),
        ("https://b.example/", "rust async runtime internals with tokio"),
        ("https://c.example/", "gardening tips for spring"),
    ];
    for (url, text) in pages {
        index.index_document(url, &tokenizer.tokenize(text));
    }
    index.flush().unwrap();
    let before = Ranker::new(index, tokenizer.clone()).rank("rust tokio", 10);

    let (reloaded, _) = build(dir.path());
    let after = Ranker::new(reloaded, tokenizer).rank("rust tokio", 10);
    assert_eq!(before, after);
    assert_eq!(after[0].0, "https://b.example/");
    assert_eq!(after.len(), 2);
}

#[test]
fn advanced_queries_honor_exclusions_across_the_pipeline() {
    let dir = tempdir().unwrap();
    let (index, tokenizer) = build(dir.path());
    index.index_document("x", &tokenizer.tokenize("rust web framework axum"));
    index.index_document("y", &tokenizer.tokenize("rust web framework actix"));
    let advanced = AdvancedRanker::new(Arc::new(Ranker::new(index, tokenizer)));

    let ranked = advanced.rank("rust web -actix", 10);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].0, "x");
}
