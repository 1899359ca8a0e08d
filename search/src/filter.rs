//! `name:value` result filters applied after blending.

use crate::model::SearchResult;
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

/// Filters this module knows how to apply.
pub const RESULT_FILTERS: &[&str] = &["site", "filetype", "ext", "date", "before", "after", "lang", "domain"];

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Site(String),
    /// `site:*.edu`
    SiteSuffix(String),
    FileType(String),
    Year(i32),
    YearMonth(i32, Month),
    Day(Date),
    Before(Date),
    After(Date),
    Lang(String),
    Domain(String),
}

impl Filter {
    /// None for unknown names and unparsable values.
    fn parse(name: &str, value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        let filter = match name {
            "site" => match value.strip_prefix("*.") {
                Some(suffix) => Filter::SiteSuffix(suffix.to_string()),
                None => Filter::Site(value),
            },
            "filetype" | "ext" => {
                let ext = value.trim_start_matches('.');
                Filter::FileType(format!(".{ext}"))
            }
            "date" => parse_date_spec(&value)?,
            "before" => Filter::Before(parse_day(&value)?),
            "after" => Filter::After(parse_day(&value)?),
            "lang" => Filter::Lang(value),
            "domain" => Filter::Domain(format!(".{}", value.trim_start_matches('.'))),
            _ => return None,
        };
        Some(filter)
    }

    fn matches(&self, r: &SearchResult) -> bool {
        match self {
            Filter::Site(site) => r.domain.contains(site.as_str()),
            Filter::SiteSuffix(suffix) => r.url.to_lowercase().ends_with(suffix.as_str()) || r.domain.contains(suffix.as_str()),
            Filter::FileType(ext) => url_path(&r.url).ends_with(ext.as_str()),
            Filter::Year(y) => published(r).is_some_and(|d| d.year() == *y),
            Filter::YearMonth(y, m) => published(r).is_some_and(|d| d.year() == *y && d.month() == *m),
            Filter::Day(day) => published(r) == Some(*day),
            Filter::Before(cutoff) => published(r).is_some_and(|d| d < *cutoff),
            Filter::After(cutoff) => published(r).is_some_and(|d| d > *cutoff),
            Filter::Lang(lang) => r.language.as_deref().unwrap_or("en").eq_ignore_ascii_case(lang),
            Filter::Domain(tld) => host(&r.domain).ends_with(tld.as_str()),
        }
    }
}

/// Keep only results matching every recognised filter. Unknown names and
/// malformed values are ignored with a warning.
pub fn apply_filters(mut results: Vec<SearchResult>, filters: &BTreeMap<String, String>) -> Vec<SearchResult> {
    for (name, value) in filters {
        let name = name.to_lowercase();
        let Some(filter) = Filter::parse(&name, value) else {
            tracing::warn!(filter = %name, value = %value, "ignoring filter");
            continue;
        };
        results.retain(|r| filter.matches(r));
        tracing::debug!(filter = %name, value = %value, remaining = results.len(), "filter applied");
    }
    results
}

fn parse_date_spec(spec: &str) -> Option<Filter> {
    let parts: Vec<&str> = spec.split('-').collect();
    match parts.as_slice() {
        [year] if year.len() == 4 => Some(Filter::Year(year.parse().ok()?)),
        [year, month] => {
            let month = Month::try_from(month.parse::<u8>().ok()?).ok()?;
            Some(Filter::YearMonth(year.parse().ok()?, month))
        }
        _ => Some(Filter::Day(parse_day(spec)?)),
    }
}

fn parse_day(s: &str) -> Option<Date> { Date::parse(s, format_description!("[year]-[month]-[day]")).ok() }

/// Publication day from an RFC 3339 timestamp or a leading `YYYY-MM-DD`.
fn published(r: &SearchResult) -> Option<Date> {
    let raw = r.published_date.as_deref()?.trim();
    OffsetDateTime::parse(raw, &Rfc3339)
        .map(|dt| dt.date())
        .ok()
        .or_else(|| raw.get(..10).and_then(parse_day))
}

fn url_path(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(u) => u.path().to_lowercase(),
        Err(_) => url.to_lowercase(),
    }
}

fn host(domain: &str) -> &str { domain.split(':').next().unwrap_or(domain) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ExternalHit;

    fn result(url: &str, published: Option<&str>) -> SearchResult {
        let mut hit = ExternalHit::new("t", url, "s");
        hit.published_date = published.map(str::to_string);
        SearchResult::from_hit(hit, "web", 0, 1.0)
    }

    fn sample() -> Vec<SearchResult> {
        vec![
            result("https://github.com/python/cpython", Some("2024-01-15")),
            result("https://docs.python.org/3/tutorial.pdf", Some("2023-12-01")),
            result("https://stackoverflow.com/questions/python", Some("2024-02-20T08:00:00Z")),
            result("https://en.wikipedia.org/wiki/Python", Some("2024-01-01")),
            result("https://cs.stanford.edu/python", None),
        ]
    }

    fn urls(results: &[SearchResult]) -> Vec<&str> { results.iter().map(|r| r.url.as_str()).collect() }

    fn apply(pairs: &[(&str, &str)]) -> Vec<SearchResult> {
        let filters = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        apply_filters(sample(), &filters)
    }

    #[test]
    fn site_and_wildcard_site() {
        assert_eq!(urls(&apply(&[("site", "github.com")])), vec!["https://github.com/python/cpython"]);
        assert_eq!(apply(&[("site", "*.org")]).len(), 2);
    }

    #[test]
    fn filetype_with_or_without_dot() {
        assert_eq!(apply(&[("filetype", "pdf")]).len(), 1);
        assert_eq!(apply(&[("ext", ".PDF")]).len(), 1);
    }

    #[test]
    fn date_granularities() {
        assert_eq!(apply(&[("date", "2024")]).len(), 3);
        assert_eq!(urls(&apply(&[("date", "2024-02")])), vec!["https://stackoverflow.com/questions/python"]);
        assert_eq!(urls(&apply(&[("date", "2023-12-01")])), vec!["https://docs.python.org/3/tutorial.pdf"]);
    }

    #[test]
    fn before_and_after_are_exclusive() {
        assert_eq!(apply(&[("after", "2024-01-01")]).len(), 2);
        assert_eq!(apply(&[("before", "2024-01-01")]).len(), 1);
        assert_eq!(apply(&[("site", "*.org"), ("after", "2024-01-01")]).len(), 0);
    }

    #[test]
    fn domain_and_language() {
        assert_eq!(urls(&apply(&[("domain", "edu")])), vec!["https://cs.stanford.edu/python"]);
        assert_eq!(apply(&[("lang", "en")]).len(), 5);
        assert!(apply(&[("lang", "es")]).is_empty());
    }

    #[test]
    fn unknown_or_malformed_filters_are_ignored() {
        assert_eq!(apply(&[("color", "red")]).len(), 5);
        assert_eq!(apply(&[("before", "last-week")]).len(), 5);
    }
}
