//! Query language: `name:value` filters, `"phrases"`, `wild*cards`,
//! `NOT x`, `a AND b`, `a OR b`, `+must`, `-exclude`, then free text.
//!
//! Stages run in that order and each consumes what it matched, so later
//! stages never see text claimed by an earlier one.

use crate::error::QueryError;
use crate::tokenizer::Tokenizer;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Filter names understood by `name:value` syntax.
pub const SUPPORTED_FILTERS: &[&str] = &["site", "filetype", "ext", "date", "before", "after", "lang"];

lazy_static! {
    static ref FILTER: Regex = Regex::new(r"(\w+):(\S+)").expect("valid regex");
    static ref PHRASE: Regex = Regex::new(r#""([^"]+)""#).expect("valid regex");
    static ref WILDCARD: Regex = Regex::new(r#"^[^\s"+-][^\s"]*$"#).expect("valid regex");
    static ref WORD: Regex = Regex::new(r"^\w+$").expect("valid regex");
    static ref PREFIXED: Regex = Regex::new(r"^([+-])(\w+)\W*$").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedQuery {
    pub original: String,
    pub terms: Vec<String>,
    pub phrases: Vec<String>,
    pub must_have: Vec<String>,
    pub must_not_have: Vec<String>,
    pub should_have: Vec<String>,
    pub wildcards: Vec<String>,
    pub filters: BTreeMap<String, String>,
}

impl ParsedQuery {
    /// True when only plain terms are present.
    pub fn is_simple(&self) -> bool {
        self.phrases.is_empty()
            && self.wildcards.is_empty()
            && self.filters.is_empty()
            && self.must_have.is_empty()
            && self.must_not_have.is_empty()
            && self.should_have.is_empty()
    }

    pub fn explain(&self) -> String {
        if self.is_simple() {
            return format!("Simple search for: {}", self.terms.join(" "));
        }
        let mut parts = Vec::new();
        let mut push = |label: &str, items: &[String]| {
            if !items.is_empty() {
                parts.push(format!("{label}: {}", items.join(", ")));
            }
        };
        push("Search for", &self.terms);
        push("Exact phrases", &self.phrases);
        push("Must include", &self.must_have);
        push("Must NOT include", &self.must_not_have);
        push("Should include (OR)", &self.should_have);
        push("Wildcards", &self.wildcards);
        if !self.filters.is_empty() {
            let f: Vec<String> = self.filters.iter().map(|(k, v)| format!("{k}:{v}")).collect();
            parts.push(format!("Filters: {}", f.join(", ")));
        }
        parts.join(" | ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Free,
    Operator,
    MustNot,
    Must,
    Should,
}

pub struct QueryParser {
    tokenizer: Arc<Tokenizer>,
}

impl QueryParser {
    pub fn new(tokenizer: Arc<Tokenizer>) -> Self { Self { tokenizer } }

    pub fn parse(&self, text: &str) -> ParsedQuery {
        let (rest, filters) = extract_filters(text);
        let (rest, phrases) = extract_phrases(&rest);
        let (rest, wildcards) = extract_wildcards(&rest);
        let booleans = self.parse_boolean(&rest);
        let terms = self.tokenizer.tokenize(&booleans.remaining);

        ParsedQuery {
            original: text.to_string(),
            terms,
            phrases,
            must_have: booleans.must,
            must_not_have: booleans.must_not,
            should_have: booleans.should,
            wildcards,
            filters,
        }
    }

    /// Fail-fast syntax check for callers that want errors before parsing.
    pub fn validate(&self, text: &str) -> Result<(), QueryError> { validate_query(text) }

    fn parse_boolean(&self, text: &str) -> Booleans {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut roles = vec![Role::Free; tokens.len()];
        let is_word = |i: usize| WORD.is_match(tokens[i]);
        let is_op = |i: usize, op: &str| tokens[i].eq_ignore_ascii_case(op);

        for i in 0..tokens.len().saturating_sub(1) {
            if roles[i] == Role::Free && is_op(i, "NOT") && roles[i + 1] == Role::Free && is_word(i + 1) {
                roles[i] = Role::Operator;
                roles[i + 1] = Role::MustNot;
            }
        }
        for (op, role) in [("AND", Role::Must), ("OR", Role::Should)] {
            for i in 1..tokens.len().saturating_sub(1) {
                if roles[i] != Role::Free || !is_op(i, op) {
                    continue;
                }
                let operand = |r: Role| r == Role::Free || r == role;
                if operand(roles[i - 1]) && operand(roles[i + 1]) && is_word(i - 1) && is_word(i + 1) {
                    roles[i] = Role::Operator;
                    roles[i - 1] = role;
                    roles[i + 1] = role;
                }
            }
        }

        let mut out = Booleans::default();
        let mut remaining = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            match roles[i] {
                Role::Operator => {}
                Role::MustNot => self.push_term(&mut out.must_not, token),
                Role::Must => self.push_term(&mut out.must, token),
                Role::Should => self.push_term(&mut out.should, token),
                Role::Free => match PREFIXED.captures(token) {
                    Some(caps) if &caps[1] == "+" => self.push_term(&mut out.must, &caps[2]),
                    Some(caps) => self.push_term(&mut out.must_not, &caps[2]),
                    None => remaining.push(*token),
                },
            }
        }
        out.remaining = remaining.join(" ");
        out
    }

    fn push_term(&self, list: &mut Vec<String>, word: &str) {
        if let Some(term) = self.tokenizer.normalize_term(word) {
            if !list.contains(&term) {
                list.push(term);
            }
        }
    }
}

#[derive(Default)]
struct Booleans {
    must: Vec<String>,
    must_not: Vec<String>,
    should: Vec<String>,
    remaining: String,
}

/// Check quote balance and filter names.
pub fn validate_query(text: &str) -> Result<(), QueryError> {
    if text.trim().is_empty() {
        return Err(QueryError::Empty);
    }
    if text.matches('"').count() % 2 != 0 {
        return Err(QueryError::UnmatchedQuote);
    }
    for caps in FILTER.captures_iter(text) {
        let name = caps[1].to_lowercase();
        if !matches!(name.as_str(), "and" | "or" | "not") && !SUPPORTED_FILTERS.contains(&name.as_str()) {
            return Err(QueryError::UnknownFilter(name));
        }
    }
    Ok(())
}

fn extract_filters(text: &str) -> (String, BTreeMap<String, String>) {
    let mut filters = BTreeMap::new();
    let rest = FILTER.replace_all(text, |caps: &regex::Captures| {
        let name = caps[1].to_lowercase();
        if SUPPORTED_FILTERS.contains(&name.as_str()) {
            filters.insert(name, caps[2].to_string());
            " ".to_string()
        } else {
            caps[0].to_string()
        }
    });
    (rest.trim().to_string(), filters)
}

fn extract_phrases(text: &str) -> (String, Vec<String>) {
    let mut phrases = Vec::new();
    let rest = PHRASE.replace_all(text, |caps: &regex::Captures| {
        let phrase = caps[1].trim();
        if !phrase.is_empty() {
            phrases.push(phrase.to_string());
        }
        " "
    });
    (rest.trim().to_string(), phrases)
}

fn extract_wildcards(text: &str) -> (String, Vec<String>) {
    let mut wildcards = Vec::new();
    let mut kept = Vec::new();
    for token in text.split_whitespace() {
        let glob = token.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '*');
        if glob.contains('*') && WILDCARD.is_match(glob) && glob.chars().any(|c| c != '*') {
            wildcards.push(glob.to_lowercase());
        } else {
            kept.push(token);
        }
    }
    (kept.join(" "), wildcards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::TokenizerConfig;

    fn parser() -> QueryParser {
        QueryParser::new(Arc::new(Tokenizer::new(TokenizerConfig { stemming: false, ..Default::default() })))
    }

    #[test]
    fn phrase_filter_and_exclusion() {
        let q = parser().parse(r#""quick fox" site:example.com -cat"#);
        assert_eq!(q.phrases, vec!["quick fox"]);
        assert_eq!(q.filters.get("site").map(String::as_str), Some("example.com"));
        assert_eq!(q.filters.len(), 1);
        assert_eq!(q.must_not_have, vec!["cat"]);
        assert!(q.terms.is_empty());
        assert!(!q.is_simple());
    }

    #[test]
    fn plain_text_is_simple() {
        let q = parser().parse("python programming");
        assert!(q.is_simple());
        assert_eq!(q.terms, vec!["python", "programming"]);
    }

    #[test]
    fn unknown_filters_stay_in_text() {
        let q = parser().parse("color:red apples");
        assert!(q.filters.is_empty());
        assert_eq!(q.terms, vec!["color", "red", "apples"]);
    }

    #[test]
    fn boolean_operators() {
        let q = parser().parse("python AND tutorial NOT beginner");
        assert_eq!(q.must_have, vec!["python", "tutorial"]);
        assert_eq!(q.must_not_have, vec!["beginner"]);

        let q = parser().parse("python OR java");
        assert_eq!(q.should_have, vec!["python", "java"]);
        assert!(q.terms.is_empty());
    }

    #[test]
    fn chained_and_collects_every_operand() {
        let q = parser().parse("rust AND tokio AND serde");
        assert_eq!(q.must_have, vec!["rust", "tokio", "serde"]);
    }

    #[test]
    fn plus_minus_prefixes() {
        let q = parser().parse("+python -java tutorial e-mail");
        assert_eq!(q.must_have, vec!["python"]);
        assert_eq!(q.must_not_have, vec!["java"]);
        assert_eq!(q.terms, vec!["tutorial", "mail"]);
    }

    #[test]
    fn boolean_operands_are_stemmed_like_indexed_terms() {
        let q = QueryParser::new(Arc::new(Tokenizer::default())).parse("+Running");
        assert_eq!(q.must_have, vec!["run"]);
    }

    #[test]
    fn wildcards_are_extracted_before_booleans() {
        let q = parser().parse("pyth* tutorial *script");
        assert_eq!(q.wildcards, vec!["pyth*", "*script"]);
        assert_eq!(q.terms, vec!["tutorial"]);
    }

    #[test]
    fn wildcards_keep_punctuation_inside_the_glob() {
        let q = parser().parse("c++* node.js*, -java*");
        assert_eq!(q.wildcards, vec!["c++*", "node.js*"]);
        assert_eq!(q.must_not_have, vec!["java"]);
    }

    #[test]
    fn phrase_removal_does_not_glue_words() {
        let q = parser().parse(r#"alpha"quoted words"omega"#);
        assert_eq!(q.phrases, vec!["quoted words"]);
        assert_eq!(q.terms, vec!["alpha", "omega"]);
    }

    #[test]
    fn validation() {
        assert_eq!(validate_query("  "), Err(QueryError::Empty));
        assert_eq!(validate_query(r#""open phrase"#), Err(QueryError::UnmatchedQuote));
        assert_eq!(validate_query("color:red"), Err(QueryError::UnknownFilter("color".into())));
        assert_eq!(validate_query("site:rust-lang.org lang:en"), Ok(()));
    }

    #[test]
    fn explain_lists_components() {
        let q = parser().parse("+rust site:docs.rs");
        let text = q.explain();
        assert!(text.contains("Must include: rust"));
        assert!(text.contains("Filters: site:docs.rs"));
    }
}
