use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod advanced;
pub mod docstore;
pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod ranker;
pub mod tokenizer;

pub use advanced::AdvancedRanker;
pub use docstore::{DocumentMeta, DocumentStore, JsonDocumentStore, MemoryDocumentStore};
pub use error::{ParamError, QueryError};
pub use index::{InvertedIndex, PostingList};
pub use persist::{IndexStore, JsonFileStore};
pub use query::{validate_query, ParsedQuery, QueryParser, SUPPORTED_FILTERS};
pub use ranker::{Bm25Params, Ranker, RankerStats};
pub use tokenizer::{Tokenizer, TokenizerConfig};

/// Documents are identified by their (fragment-stripped) URL.
pub type DocId = String;

/// Persisted form of the index; ordered so flushed files are stable.
pub type IndexSnapshot = BTreeMap<String, Vec<Posting>>;

/// One (document, term frequency) entry. Serialized as `[docId, freq]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(DocId, u32)", into = "(DocId, u32)")]
pub struct Posting {
    pub doc_id: DocId,
    pub freq: u32,
}

impl Posting {
    pub fn new(doc_id: impl Into<DocId>, freq: u32) -> Self {
        Self { doc_id: doc_id.into(), freq }
    }
}

impl From<(DocId, u32)> for Posting {
    fn from((doc_id, freq): (DocId, u32)) -> Self { Self { doc_id, freq } }
}

impl From<Posting> for (DocId, u32) {
    fn from(p: Posting) -> Self { (p.doc_id, p.freq) }
}
