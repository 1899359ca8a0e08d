use crate::persist::IndexStore;
use crate::{DocId, IndexSnapshot, Posting};
use anyhow::Result;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// term -> postings, at most one posting per document.
pub type Postings = HashMap<String, PostingList>;

/// One term's postings in first-indexed order, with a doc -> slot map so
/// per-document lookups and merges do not scan the list.
#[derive(Debug, Clone, Default)]
pub struct PostingList {
    entries: Vec<Posting>,
    slots: HashMap<DocId, usize>,
}

impl PostingList {
    /// Add `freq` to the document's posting, creating it if absent.
    pub fn add(&mut self, doc_id: &str, freq: u32) {
        match self.slots.get(doc_id) {
            Some(&i) => self.entries[i].freq += freq,
            None => {
                self.slots.insert(doc_id.to_string(), self.entries.len());
                self.entries.push(Posting::new(doc_id, freq));
            }
        }
    }

    pub fn freq(&self, doc_id: &str) -> Option<u32> { self.slots.get(doc_id).map(|&i| self.entries[i].freq) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, Posting> { self.entries.iter() }

    pub fn to_vec(&self) -> Vec<Posting> { self.entries.clone() }
}

impl<'a> IntoIterator for &'a PostingList {
    type Item = &'a Posting;
    type IntoIter = std::slice::Iter<'a, Posting>;

    fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

/// Duplicate documents in the input are merged by summing frequencies.
impl FromIterator<Posting> for PostingList {
    fn from_iter<I: IntoIterator<Item = Posting>>(iter: I) -> Self {
        let mut list = Self::default();
        for p in iter {
            list.add(&p.doc_id, p.freq);
        }
        list
    }
}

/// How long `stop_auto_flush` waits for an in-progress flush to finish.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

struct AutoFlush {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Shared, thread-safe inverted index.
///
/// All mutation goes through one lock that is held only for the in-memory
/// merge; persistence snapshots under the lock and writes after releasing it.
pub struct InvertedIndex {
    terms: RwLock<Postings>,
    generation: AtomicU64,
    store: Arc<dyn IndexStore>,
    flusher: Mutex<Option<AutoFlush>>,
}

impl InvertedIndex {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self::from_postings(store, Postings::new())
    }

    /// Load the persisted snapshot from `store`.
    pub fn open(store: Arc<dyn IndexStore>) -> Result<Self> {
        let snapshot = store.load()?;
        let terms: Postings = snapshot.into_iter().map(|(term, list)| (term, list.into_iter().collect())).collect();
        tracing::info!(terms = terms.len(), "index loaded");
        Ok(Self::from_postings(store, terms))
    }

    fn from_postings(store: Arc<dyn IndexStore>, terms: Postings) -> Self {
        Self {
            terms: RwLock::new(terms),
            generation: AtomicU64::new(0),
            store,
            flusher: Mutex::new(None),
        }
    }

    /// Merge one document's tokens. Repeated calls for the same document add
    /// to the existing frequencies.
    pub fn index_document(&self, doc_id: &str, tokens: &[String]) {
        if tokens.is_empty() {
            return;
        }
        let mut tf: HashMap<&str, u32> = HashMap::new();
        for token in tokens {
            *tf.entry(token.as_str()).or_insert(0) += 1;
        }

        let mut terms = self.terms.write();
        for (term, freq) in tf {
            terms.entry(term.to_string()).or_default().add(doc_id, freq);
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Persist a consistent snapshot through the configured store.
    pub fn flush(&self) -> Result<()> {
        let snapshot = self.snapshot();
        let terms = snapshot.len();
        self.store.save(&snapshot)?;
        tracing::debug!(terms, "index flushed");
        Ok(())
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        let terms = self.terms.read();
        terms.iter().map(|(t, p)| (t.clone(), p.to_vec())).collect()
    }

    pub fn postings(&self, term: &str) -> Vec<Posting> {
        self.terms.read().get(term).map(PostingList::to_vec).unwrap_or_default()
    }

    pub fn vocabulary(&self) -> Vec<String> {
        self.terms.read().keys().cloned().collect()
    }

    pub fn term_count(&self) -> usize { self.terms.read().len() }

    pub fn document_count(&self) -> usize {
        let terms = self.terms.read();
        let docs: HashSet<&str> = terms.values().flatten().map(|p| p.doc_id.as_str()).collect();
        docs.len()
    }

    pub fn clear(&self) {
        let mut terms = self.terms.write();
        terms.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Bumped on every mutation.
    pub fn generation(&self) -> u64 { self.generation.load(Ordering::Acquire) }

    /// Read access for scoring; hold the guard only for in-memory work.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Postings> { self.terms.read() }

    /// Flush every `interval` on a background thread until stopped. Failures are
    /// logged and the timer keeps running. No-op if a flusher is already running.
    pub fn start_auto_flush(self: &Arc<Self>, interval: Duration) {
        let mut slot = self.flusher.lock();
        if slot.as_ref().is_some_and(|f| !f.handle.is_finished()) {
            return;
        }
        let (stop, rx) = mpsc::channel::<()>();
        let index: Weak<Self> = Arc::downgrade(self);
        let spawned = thread::Builder::new().name("index-flush".into()).spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let Some(index) = index.upgrade() else { break };
                    if let Err(e) = index.flush() {
                        tracing::warn!(error = %e, "auto-flush failed");
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        match spawned {
            Ok(handle) => {
                tracing::info!(interval_ms = interval.as_millis() as u64, "auto-flush started");
                *slot = Some(AutoFlush { stop, handle });
            }
            Err(e) => tracing::error!(error = %e, "could not spawn auto-flush thread"),
        }
    }

    /// Signal the flusher and wait a bounded time for it to exit.
    /// Returns `false` if the thread was still busy and got detached.
    pub fn stop_auto_flush(&self) -> bool {
        let Some(AutoFlush { stop, handle }) = self.flusher.lock().take() else {
            return true;
        };
        stop.send(()).ok();
        let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("auto-flush thread did not stop in time, detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        handle.join().is_ok()
    }

    pub fn auto_flush_running(&self) -> bool {
        self.flusher.lock().as_ref().is_some_and(|f| !f.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JsonFileStore;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    struct NullStore;

    impl IndexStore for NullStore {
        fn save(&self, _: &IndexSnapshot) -> Result<()> { Ok(()) }
        fn load(&self) -> Result<IndexSnapshot> { Ok(IndexSnapshot::new()) }
    }

    struct FailingStore {
        calls: AtomicUsize,
    }

    impl IndexStore for FailingStore {
        fn save(&self, _: &IndexSnapshot) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("disk full")
        }
        fn load(&self) -> Result<IndexSnapshot> { Ok(IndexSnapshot::new()) }
    }

    fn toks(words: &[&str]) -> Vec<String> { words.iter().map(|w| w.to_string()).collect() }

    #[test]
    fn repeated_indexing_sums_frequencies() {
        let index = InvertedIndex::new(Arc::new(NullStore));
        index.index_document("d1", &toks(&["rust", "rust", "fast"]));
        index.index_document("d1", &toks(&["rust", "safe"]));
        assert_eq!(index.postings("rust"), vec![Posting::new("d1", 3)]);
        assert_eq!(index.postings("safe"), vec![Posting::new("d1", 1)]);
        assert_eq!(index.document_count(), 1);
    }

    #[test]
    fn concurrent_indexing_keeps_one_posting_per_doc() {
        let index = Arc::new(InvertedIndex::new(Arc::new(NullStore)));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = index.clone();
                thread::spawn(move || {
                    index.index_document(&format!("doc{}", i % 4), &toks(&["alpha", "alpha", "beta"]));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let alpha = index.postings("alpha");
        assert_eq!(alpha.len(), 4);
        assert!(alpha.iter().all(|p| p.freq == 4));
        assert!(index.postings("beta").iter().all(|p| p.freq == 2));
    }

    #[test]
    fn posting_list_merges_by_document() {
        let mut list = PostingList::default();
        list.add("a", 2);
        list.add("b", 1);
        list.add("a", 3);
        assert_eq!(list.to_vec(), vec![Posting::new("a", 5), Posting::new("b", 1)]);
        assert_eq!(list.freq("a"), Some(5));
        assert_eq!(list.freq("c"), None);

        let loaded: PostingList = vec![Posting::new("x", 1), Posting::new("x", 4)].into_iter().collect();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.freq("x"), Some(5));
    }

    #[test]
    fn common_terms_index_in_linear_time() {
        let index = InvertedIndex::new(Arc::new(NullStore));
        let started = Instant::now();
        for i in 0..20_000 {
            index.index_document(&format!("doc{i}"), &toks(&["common", "word"]));
        }
        assert_eq!(index.postings("common").len(), 20_000);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn generation_moves_on_mutation_only() {
        let index = InvertedIndex::new(Arc::new(NullStore));
        let g0 = index.generation();
        index.index_document("d", &[]);
        assert_eq!(index.generation(), g0);
        index.index_document("d", &toks(&["x"]));
        assert!(index.generation() > g0);
    }

    #[test]
    fn flush_then_open_round_trips() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("index.json")));
        let index = InvertedIndex::new(store.clone());
        index.index_document("https://a.example/", &toks(&["alpha", "beta", "alpha"]));
        index.index_document("https://b.example/", &toks(&["beta"]));
        index.flush().unwrap();

        let reopened = InvertedIndex::open(store).unwrap();
        assert_eq!(reopened.snapshot(), index.snapshot());
    }

    #[test]
    fn explicit_flush_surfaces_errors() {
        let index = InvertedIndex::new(Arc::new(FailingStore { calls: AtomicUsize::new(0) }));
        assert!(index.flush().is_err());
    }

    #[test]
    fn auto_flush_persists_and_stops() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("index.json")));
        let index = Arc::new(InvertedIndex::new(store.clone()));
        index.start_auto_flush(Duration::from_millis(20));
        index.index_document("bg", &toks(&["gamma"]));
        thread::sleep(Duration::from_millis(200));
        assert!(index.stop_auto_flush());
        assert!(!index.auto_flush_running());
        assert!(store.load().unwrap().contains_key("gamma"));
    }

    #[test]
    fn auto_flush_survives_failures() {
        let store = Arc::new(FailingStore { calls: AtomicUsize::new(0) });
        let index = Arc::new(InvertedIndex::new(store.clone()));
        index.start_auto_flush(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(150));
        assert!(index.auto_flush_running());
        assert!(index.stop_auto_flush());
        assert!(store.calls.load(Ordering::SeqCst) >= 2);
    }
}
