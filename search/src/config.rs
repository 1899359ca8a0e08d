use crate::model::SearchMode;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub default_mode: SearchMode,
    /// Multiplier on local BM25 scores when blending.
    pub local_boost: f64,
    /// Multiplier on external position scores when blending.
    pub freshness_boost: f64,
    /// Keep only the best-scored result per domain.
    pub deduplicate: bool,
    pub cache_ttl: Duration,
    /// Per-source budget; late sources are left out of the response.
    pub source_timeout: Duration,
    pub primary_source: Option<String>,
    pub fallback_source: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_mode: SearchMode::Hybrid,
            local_boost: 1.2,
            freshness_boost: 1.1,
            deduplicate: true,
            cache_ttl: Duration::from_secs(3600),
            source_timeout: Duration::from_secs(10),
            primary_source: Some("google".to_string()),
            fallback_source: Some("serpapi".to_string()),
        }
    }
}

impl SearchConfig {
    /// Defaults overlaid with `SEARCH_MODE`, `HYBRID_*`, `CACHE_TTL_SEARCH`,
    /// `PRIMARY_SEARCH_ENGINE` and `FALLBACK_SEARCH_ENGINE`.
    pub fn from_env() -> Self { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        overlay(&lookup, "SEARCH_MODE", &mut config.default_mode);
        overlay(&lookup, "HYBRID_LOCAL_BOOST", &mut config.local_boost);
        overlay(&lookup, "HYBRID_FRESHNESS_BOOST", &mut config.freshness_boost);
        overlay(&lookup, "HYBRID_DEDUPLICATE", &mut config.deduplicate);
        let mut ttl_secs = config.cache_ttl.as_secs();
        overlay(&lookup, "CACHE_TTL_SEARCH", &mut ttl_secs);
        config.cache_ttl = Duration::from_secs(ttl_secs);
        if let Some(primary) = lookup("PRIMARY_SEARCH_ENGINE") {
            config.primary_source = non_empty(primary);
        }
        if let Some(fallback) = lookup("FALLBACK_SEARCH_ENGINE") {
            config.fallback_source = non_empty(fallback);
        }
        config
    }
}

fn overlay<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else { return };
    match raw.trim().to_ascii_lowercase().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable setting"),
    }
}

fn non_empty(s: String) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("SEARCH_MODE", "local"),
            ("HYBRID_LOCAL_BOOST", "2.5"),
            ("HYBRID_DEDUPLICATE", "False"),
            ("CACHE_TTL_SEARCH", "60"),
            ("FALLBACK_SEARCH_ENGINE", ""),
        ]
        .into_iter()
        .collect();
        let config = SearchConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.default_mode, SearchMode::Local);
        assert_eq!(config.local_boost, 2.5);
        assert!(!config.deduplicate);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.primary_source.as_deref(), Some("google"));
        assert_eq!(config.fallback_source, None);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = SearchConfig::from_lookup(|k| (k == "HYBRID_FRESHNESS_BOOST").then(|| "lots".to_string()));
        assert_eq!(config.freshness_boost, 1.1);
    }
}
