use criterion::{criterion_group, criterion_main, Criterion};
use seek_core::{InvertedIndex, IndexSnapshot, IndexStore, Ranker, Tokenizer};
use std::sync::Arc;

const TEXT: &str = "Search engines crawl the web, tokenize every page they fetch, and build an \
inverted index mapping each normalized term to the documents containing it. At query time the \
same normalization runs over the user's words and BM25 combines term frequency, inverse document \
frequency and document length into a single relevance score. Café, naïve and résumé fold to ASCII.";

struct NullStore;

impl IndexStore for NullStore {
    fn save(&self, _: &IndexSnapshot) -> anyhow::Result<()> { Ok(()) }
    fn load(&self) -> anyhow::Result<IndexSnapshot> { Ok(IndexSnapshot::new()) }
}

fn bench_tokenize(c: &mut Criterion) {
    let tokenizer = Tokenizer::default();
    let text = TEXT.repeat(20);
    c.bench_function("tokenize_paragraphs", |b| b.iter(|| tokenizer.tokenize(&text)));
}

fn bench_rank(c: &mut Criterion) {
    let tokenizer = Arc::new(Tokenizer::default());
    let index = Arc::new(InvertedIndex::new(Arc::new(NullStore)));
    let sentences: Vec<&str> = TEXT.split('.').collect();
    for i in 0..500 {
        let text = sentences[i % sentences.len()];
        index.index_document(&format!("doc{i}"), &tokenizer.tokenize(text));
    }
    let ranker = Ranker::new(index, tokenizer);
    c.bench_function("bm25_rank", |b| b.iter(|| ranker.rank("inverted index relevance score", 10)));
}

criterion_group!(benches, bench_tokenize, bench_rank);
criterion_main!(benches);
