//! robots.txt rules for the `*` user-agent group, cached per origin.

use parking_lot::RwLock;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Robots {
    allows: Vec<String>,
    disallows: Vec<String>,
    pub crawl_delay: Option<Duration>,
}

impl Robots {
    /// Longest matching prefix wins; ties go to Allow.
    pub fn allows(&self, path: &str) -> bool {
        let longest = |rules: &[String]| rules.iter().filter(|r| path.starts_with(r.as_str())).map(String::len).max();
        match (longest(&self.allows), longest(&self.disallows)) {
            (Some(a), Some(d)) => a >= d,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }
}

pub fn parse_robots(txt: &str) -> Robots {
    let mut active = false;
    let mut robots = Robots::default();
    for line in txt.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "user-agent" => active = value == "*",
            // An empty Disallow allows everything.
            "allow" | "disallow" if !active || value.is_empty() => {}
            "allow" => robots.allows.push(value.to_string()),
            "disallow" => robots.disallows.push(value.to_string()),
            "crawl-delay" if active => {
                if let Ok(secs) = value.parse::<f64>() {
                    if secs.is_finite() && secs >= 0.0 {
                        robots.crawl_delay = Some(Duration::from_secs_f64(secs));
                    }
                }
            }
            _ => {}
        }
    }
    robots
}

/// Rules keyed by `scheme://host:port`. Unreachable or non-2xx robots.txt
/// means no restrictions.
#[derive(Default)]
pub struct RobotsCache {
    rules: RwLock<HashMap<String, Arc<Robots>>>,
}

impl RobotsCache {
    pub async fn rules_for(&self, client: &Client, url: &Url) -> Arc<Robots> {
        let origin = url.origin().ascii_serialization();
        let cached = self.rules.read().get(&origin).cloned();
        if let Some(rules) = cached {
            return rules;
        }
        let robots_url = format!("{origin}/robots.txt");
        let txt = match client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            Ok(_) => String::new(),
            Err(e) => {
                tracing::debug!(url = %robots_url, error = %e, "robots.txt unavailable");
                String::new()
            }
        };
        let parsed = Arc::new(parse_robots(&txt));
        self.rules.write().entry(origin).or_insert(parsed).clone()
    }

    pub fn len(&self) -> usize { self.rules.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_wildcard_group_applies() {
        let robots = parse_robots("User-agent: googlebot\nDisallow: /\n\nUser-agent: *\nDisallow: /private\nCrawl-delay: 1.5\n");
        assert!(robots.allows("/public"));
        assert!(!robots.allows("/private/page"));
        assert_eq!(robots.crawl_delay, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn longest_match_wins() {
        let robots = parse_robots("User-agent: *\nDisallow: /docs\nAllow: /docs/public\n");
        assert!(robots.allows("/docs/public/index.html"));
        assert!(!robots.allows("/docs/internal"));
    }

    #[test]
    fn empty_disallow_permits_everything() {
        let robots = parse_robots("User-agent: *\nDisallow:\n");
        assert!(robots.allows("/anything"));
        assert!(parse_robots("").allows("/"));
    }

    #[test]
    fn comments_are_ignored() {
        let robots = parse_robots("User-agent: * # all\nDisallow: /tmp # scratch\n");
        assert!(!robots.allows("/tmp/x"));
    }
}
