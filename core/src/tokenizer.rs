use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","will","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Default English stop-word list.
pub fn default_stop_words() -> HashSet<String> {
    STOPWORDS.iter().map(|w| w.to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    pub stemming: bool,
    /// `None` disables stop-word removal entirely.
    pub stop_words: Option<HashSet<String>>,
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self { stemming: true, stop_words: Some(default_stop_words()), min_len: 2, max_len: 50 }
    }
}

impl TokenizerConfig {
    pub fn with_extra_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = self.stop_words.get_or_insert_with(HashSet::new);
        set.extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
        self
    }

    pub fn without_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(set) = self.stop_words.as_mut() {
            for w in words {
                set.remove(&w.as_ref().to_lowercase());
            }
        }
        self
    }
}

/// Text → token pipeline: fold, split, drop stop words, stem, length filter.
pub struct Tokenizer {
    config: TokenizerConfig,
    stemmer: Option<Stemmer>,
}

impl Default for Tokenizer {
    fn default() -> Self { Self::new(TokenizerConfig::default()) }
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let stemmer = config.stemming.then(|| Stemmer::create(Algorithm::English));
        Self { config, stemmer }
    }

    pub fn config(&self) -> &TokenizerConfig { &self.config }

    /// Tokenize text into normalized terms, in document order.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let folded = fold(text);
        let mut tokens = Vec::new();
        for mat in WORD.find_iter(&folded) {
            let word = mat.as_str();
            if self.is_stopword(word) {
                continue;
            }
            let term = self.stem(word);
            let len = term.chars().count();
            if len < self.config.min_len || len > self.config.max_len {
                continue;
            }
            tokens.push(term);
        }
        tokens
    }

    /// Normalize one query word the way indexed terms are normalized, without
    /// stop-word or length filtering.
    pub fn normalize_term(&self, word: &str) -> Option<String> {
        let folded = fold(word);
        let joined: String = WORD.find_iter(&folded).map(|m| m.as_str()).collect();
        if joined.is_empty() {
            return None;
        }
        Some(self.stem(&joined))
    }

    fn is_stopword(&self, word: &str) -> bool {
        self.config.stop_words.as_ref().is_some_and(|set| set.contains(word))
    }

    fn stem(&self, word: &str) -> String {
        match &self.stemmer {
            Some(stemmer) => stemmer.stem(word).into_owned(),
            None => word.to_string(),
        }
    }
}

/// Lowercase and strip diacritics (é -> e) via NFKD decomposition.
fn fold(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase()
}
