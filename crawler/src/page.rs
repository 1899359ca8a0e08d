//! HTML text, title and link extraction.

use lazy_static::lazy_static;
use scraper::{Html, Selector};
use url::Url;

/// Words kept for the stored snippet.
pub const SNIPPET_WORDS: usize = 50;

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref LINK: Selector = Selector::parse("a[href]").expect("valid selector");
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub title: String,
    /// Visible text, whitespace-collapsed.
    pub text: String,
    /// Absolute http(s) links with fragments removed, in document order.
    pub links: Vec<Url>,
}

impl Page {
    pub fn snippet(&self) -> String {
        self.text.split_whitespace().take(SNIPPET_WORDS).collect::<Vec<_>>().join(" ")
    }
}

pub fn extract(body: &str, base: &Url) -> Page {
    let doc = Html::parse_document(body);

    let title = doc
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    let mut words: Vec<&str> = Vec::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node.ancestors().any(|a| {
            a.value().as_element().is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    let links = doc
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|mut u| {
            u.set_fragment(None);
            u
        })
        .collect();

    Page { title, text: words.join(" "), links }
}

/// `host[:port]`, the part of the URL compared for same-domain checks.
pub fn netloc(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<html><head><title> Rust
        Book </title><style>body { color: red }</style></head>
        <body><h1>Ownership</h1><script>var hidden = 1;</script>
        <p>Borrowing <b>rules</b></p>
        <a href="/ch01#intro">one</a>
        <a href="https://other.example/x">other</a>
        <a href="mailto:me@example.com">mail</a>
        <a href="ch02.html">two</a></body></html>"#;

    #[test]
    fn extracts_title_text_and_links() {
        let base = Url::parse("https://doc.example/book/index.html").unwrap();
        let page = extract(HTML, &base);
        assert_eq!(page.title, "Rust Book");
        assert!(page.text.contains("Ownership Borrowing rules"));
        assert!(!page.text.contains("hidden"));
        assert!(!page.text.contains("color"));
        let links: Vec<&str> = page.links.iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            vec!["https://doc.example/ch01", "https://other.example/x", "https://doc.example/book/ch02.html"]
        );
    }

    #[test]
    fn snippet_is_bounded() {
        let body = format!("<p>{}</p>", "word ".repeat(120));
        let page = extract(&body, &Url::parse("http://a.example/").unwrap());
        assert_eq!(page.snippet().split(' ').count(), SNIPPET_WORDS);
    }

    #[test]
    fn netloc_keeps_explicit_ports_only() {
        assert_eq!(netloc(&Url::parse("https://a.example:8443/x").unwrap()).as_deref(), Some("a.example:8443"));
        assert_eq!(netloc(&Url::parse("https://a.example:443/x").unwrap()).as_deref(), Some("a.example"));
        assert_eq!(
            netloc(&Url::parse("http://a.example/").unwrap()),
            netloc(&Url::parse("https://a.example/").unwrap())
        );
    }
}
