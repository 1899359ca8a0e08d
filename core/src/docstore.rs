//! Per-document metadata recorded by the crawler and read back when
//! presenting local results.

use crate::persist::{read_json_or_default, write_json_atomic};
use crate::DocId;
use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

const MAX_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub content_length: usize,
    pub crawl_count: u32,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

pub trait DocumentStore: Send + Sync {
    fn add_document(&self, id: &str, url: &str, title: &str, snippet: &str, content_length: usize) -> Result<()>;
    fn get_document(&self, id: &str) -> Option<DocumentMeta>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
}

fn upsert(docs: &mut HashMap<DocId, DocumentMeta>, id: &str, url: &str, title: &str, snippet: &str, content_length: usize) {
    let crawl_count = docs.get(id).map_or(0, |d| d.crawl_count) + 1;
    let timestamp = time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    docs.insert(
        id.to_string(),
        DocumentMeta {
            url: url.to_string(),
            title: title.to_string(),
            snippet: snippet.chars().take(MAX_SNIPPET_CHARS).collect(),
            content_length,
            crawl_count,
            timestamp,
        },
    );
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<DocId, DocumentMeta>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self { Self::default() }
}

impl DocumentStore for MemoryDocumentStore {
    fn add_document(&self, id: &str, url: &str, title: &str, snippet: &str, content_length: usize) -> Result<()> {
        upsert(&mut self.docs.write(), id, url, title, snippet, content_length);
        Ok(())
    }

    fn get_document(&self, id: &str) -> Option<DocumentMeta> { self.docs.read().get(id).cloned() }

    fn len(&self) -> usize { self.docs.read().len() }
}

/// JSON-file backed store, rewritten atomically on every add.
pub struct JsonDocumentStore {
    path: PathBuf,
    docs: RwLock<HashMap<DocId, DocumentMeta>>,
}

impl JsonDocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let docs: HashMap<DocId, DocumentMeta> = read_json_or_default(&path);
        tracing::info!(path = %path.display(), documents = docs.len(), "document store loaded");
        Self { path, docs: RwLock::new(docs) }
    }
}

impl DocumentStore for JsonDocumentStore {
    fn add_document(&self, id: &str, url: &str, title: &str, snippet: &str, content_length: usize) -> Result<()> {
        let mut docs = self.docs.write();
        upsert(&mut docs, id, url, title, snippet, content_length);
        write_json_atomic(&self.path, &*docs)
    }

    fn get_document(&self, id: &str) -> Option<DocumentMeta> { self.docs.read().get(id).cloned() }

    fn len(&self) -> usize { self.docs.read().len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn re_adding_bumps_crawl_count_and_truncates_snippet() {
        let store = MemoryDocumentStore::new();
        let long = "x".repeat(500);
        store.add_document("u", "u", "T", &long, 500).unwrap();
        store.add_document("u", "u", "T2", &long, 500).unwrap();
        let meta = store.get_document("u").unwrap();
        assert_eq!(meta.crawl_count, 2);
        assert_eq!(meta.title, "T2");
        assert_eq!(meta.snippet.chars().count(), MAX_SNIPPET_CHARS);
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("documents.json");
        let store = JsonDocumentStore::open(&path);
        store.add_document("https://a.example/", "https://a.example/", "A", "alpha", 5).unwrap();
        drop(store);
        let reopened = JsonDocumentStore::open(&path);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get_document("https://a.example/").unwrap().title, "A");
    }
}
