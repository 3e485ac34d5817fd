use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use scraper::{ElementRef, Selector};

use super::PageFetcher;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/98.0.4758.102 Safari/537.36";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Every non-blank text node, trimmed, joined with `separator`.
pub fn joined_text(element: ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(inner_text)
        .filter(|text| !text.is_empty())
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

pub fn has_class(element: &ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Resolves root-relative (`/path`) and scheme-relative (`//host/path`) hrefs
/// against `base`; anything else is returned as found.
pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if !href.starts_with('/') {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Blocking fetcher that presents itself like a desktop browser.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .context("unable to build http client")?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch_html(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .with_context(|| format!("request failed for {url}"))?;
        let response = response
            .error_for_status()
            .with_context(|| format!("non-success status for {url}"))?;
        response
            .text()
            .with_context(|| format!("unable to read response body for {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn absolute_url_resolves_root_relative_paths() {
        let base = "https://events.example.edu/";
        assert_eq!(
            absolute_url(base, Some("/event/seminar-a".to_string())).as_deref(),
            Some("https://events.example.edu/event/seminar-a")
        );
        assert_eq!(
            absolute_url(base, Some("https://cdn.example.com/a.png".to_string())).as_deref(),
            Some("https://cdn.example.com/a.png")
        );
        assert_eq!(
            absolute_url(base, Some("//cdn.example.com/a.png".to_string())).as_deref(),
            Some("https://cdn.example.com/a.png")
        );
        assert_eq!(absolute_url(base, Some("  ".to_string())), None);
        assert_eq!(absolute_url(base, None), None);
    }

    #[test]
    fn joined_text_keeps_paragraph_breaks() {
        let html = Html::parse_fragment(
            "<div id=\"d\"><p> First  line. </p>\n<p></p><p>Second <b>bold</b></p></div>",
        );
        let selector = Selector::parse("#d").unwrap();
        let el = html.select(&selector).next().unwrap();
        assert_eq!(joined_text(el, "\n"), "First  line.\nSecond\nbold");
        assert_eq!(inner_text(el), "First line. Second bold");
    }
}
