//! Fetching pages and the sub-resources they reference
//!
//! One probe run walks a single page: GET the page itself, pull every
//! recognized tag/attribute reference out of the returned HTML, fetch
//! the references that point at page resources (stylesheets, images,
//! scripts and the like) and sum everything up into an
//! [Accumulator]. Navigational links (anchors, areas, form targets)
//! are counted in the tag statistics but never followed.
//!
//! Everything is sequential and blocking. A slow remote simply makes
//! the cycle slow, which is fine for a cron-triggered probe.

// We do not want to write unsafe code
#![forbid(unsafe_code)]

use crate::cache::{Accumulator, CacheKey, Category};
use anyhow::{Context, Result};
use log::{debug, trace, warn};
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use url::Url;

/// Per-request connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-request total timeout, connect plus read.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// How many redirects a single request may follow.
const MAX_REDIRECTS: usize = 5;

/// The tag/attribute pairs we look at in fetched pages.
///
/// `follow` marks references to page resources, which get fetched and
/// measured. The navigational ones only show up in the tag counts.
const TAG_ATTRS: &[(&str, &str, bool)] = &[
    ("a", "href", false),
    ("area", "href", false),
    ("form", "action", false),
    ("link", "href", true),
    ("img", "src", true),
    ("script", "src", true),
    ("iframe", "src", true),
    ("frame", "src", true),
    ("embed", "src", true),
    ("input", "src", true),
];

/// One reference extracted from a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedRef {
    /// Tag name, e.g. "img"
    pub tag: &'static str,
    /// Attribute name the target came from, e.g. "src"
    pub attr: &'static str,
    /// The raw attribute value, unresolved
    pub target: String,
    /// Whether this reference is a page resource we fetch
    pub follow: bool,
}

/// Pull all known tag/attribute references out of an HTML document.
pub fn extract_refs(html: &str) -> Vec<ExtractedRef> {
    let document = Html::parse_document(html);
    let mut refs = Vec::new();
    for &(tag, attr, follow) in TAG_ATTRS {
        // Static selectors, the expect can not trigger
        let selector =
            Selector::parse(&format!("{tag}[{attr}]")).expect("selector table entry is valid CSS");
        for element in document.select(&selector) {
            if let Some(target) = element.value().attr(attr) {
                refs.push(ExtractedRef {
                    tag,
                    attr,
                    target: target.to_string(),
                    follow,
                });
            }
        }
    }
    refs
}

/// What one GET produced.
///
/// There is no error variant on purpose: a transport failure is
/// recorded as a synthetic status 500 with an empty body, and the
/// normal counting just proceeds.
#[derive(Clone, Debug)]
struct FetchedPage {
    /// Wall-clock seconds the request took
    elapsed: f64,
    /// Response body length in bytes
    size: u64,
    /// HTTP status code
    status: u16,
    /// Media type from the Content-Type header, lowercased, parameters
    /// stripped
    content_type: Option<String>,
    /// The body itself, for link extraction
    body: String,
}

/// The web probe, wrapping a blocking HTTP client.
#[derive(Debug)]
pub struct Probe {
    client: Client,
}

impl Probe {
    /// Set up the probe with fixed timeouts and redirect cap.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("munin-http-load/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Could not build HTTP client")?;
        Ok(Self { client })
    }

    /// GET one URL, timing it.
    fn get(&self, url: &Url) -> FetchedPage {
        trace!("Fetching {url}");
        let start = Instant::now();
        match self.client.get(url.clone()).send() {
            Ok(response) => {
                let status = response.status().as_u16();
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|ct| {
                        ct.split(';').next().unwrap_or(ct).trim().to_lowercase()
                    });
                // Reading the body is part of the measured load time
                let bytes = response.bytes().unwrap_or_default();
                let elapsed = start.elapsed().as_secs_f64();
                debug!(
                    "{url}: status {status}, {} bytes in {elapsed:.3}s",
                    bytes.len()
                );
                FetchedPage {
                    elapsed,
                    size: bytes.len() as u64,
                    status,
                    content_type,
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                }
            }
            Err(e) => {
                // No retry, no separate error path: count it as a 500
                warn!("Fetching {url} failed: {e}");
                FetchedPage {
                    elapsed: start.elapsed().as_secs_f64(),
                    size: 0,
                    status: 500,
                    content_type: None,
                    body: String::new(),
                }
            }
        }
    }

    /// Record the per-host statistics of one fetch.
    fn record(acc: &mut Accumulator, host: &str, page: &FetchedPage) {
        acc.add(CacheKey::new(Category::Size, host), page.size as f64);
        acc.add(CacheKey::new(Category::Loadtime, host), page.elapsed);
        acc.add(
            CacheKey::new(Category::Response, format!("{host}_{}", page.status)),
            1.0,
        );
        if let Some(content_type) = &page.content_type {
            acc.add(
                CacheKey::new(Category::Type, format!("{host}_{content_type}")),
                1.0,
            );
        }
    }

    /// Probe one page: fetch it, fetch its resources, sum it all up.
    ///
    /// A root URL that does not even parse yields an empty
    /// accumulator, everything after that is counted no matter how it
    /// went.
    pub fn probe_url(&self, raw_url: &str) -> Accumulator {
        let mut acc = Accumulator::default();

        let root = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Not probing unparseable URL {raw_url:?}: {e}");
                return acc;
            }
        };
        let host = root.host_str().unwrap_or("unknown").to_string();

        let page = self.get(&root);
        Self::record(&mut acc, &host, &page);
        acc.add(CacheKey::new(Category::Elements, host.as_str()), 1.0);

        for reference in extract_refs(&page.body) {
            // Tag frequency counts everything, followed or not
            acc.add(
                CacheKey::new(Category::Tags, format!("{}-{}", reference.tag, reference.attr)),
                1.0,
            );
            if !reference.follow {
                continue;
            }

            // Resolve relative references against the page URL
            let resolved = match root.join(&reference.target) {
                Ok(url) => url,
                Err(e) => {
                    debug!("Skipping unresolvable target {:?}: {e}", reference.target);
                    continue;
                }
            };
            // A resolved URL without a host (data:, mailto:, ...) is
            // attributed to the page host
            let sub_host = resolved
                .host_str()
                .map(str::to_string)
                .unwrap_or_else(|| host.clone());

            let sub = self.get(&resolved);
            Self::record(&mut acc, &sub_host, &sub);
            acc.add(CacheKey::new(Category::Elements, sub_host), 1.0);
        }

        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <link rel="stylesheet" href="/style.css">
        <script src="/app.js"></script>
        </head><body>
        <a href="/about">About</a>
        <a href="http://other.example/">Elsewhere</a>
        <img src="logo.png">
        <form action="/search"><input type="image" src="go.png"></form>
        </body></html>"#;

    #[test]
    fn test_selector_table_parses() {
        for &(tag, attr, _) in TAG_ATTRS {
            assert!(Selector::parse(&format!("{tag}[{attr}]")).is_ok());
        }
    }

    #[test]
    fn test_extract_refs() {
        let refs = extract_refs(PAGE);

        let count = |tag: &str, attr: &str| {
            refs.iter()
                .filter(|r| r.tag == tag && r.attr == attr)
                .count()
        };
        assert_eq!(count("a", "href"), 2);
        assert_eq!(count("link", "href"), 1);
        assert_eq!(count("script", "src"), 1);
        assert_eq!(count("img", "src"), 1);
        assert_eq!(count("form", "action"), 1);
        assert_eq!(count("input", "src"), 1);

        // Navigational references are never followed
        assert!(refs
            .iter()
            .filter(|r| r.tag == "a" || r.tag == "form" || r.tag == "area")
            .all(|r| !r.follow));
        // Resource references are
        assert!(refs
            .iter()
            .filter(|r| r.tag == "link" || r.tag == "img" || r.tag == "script")
            .all(|r| r.follow));
    }

    #[test]
    fn test_extract_refs_keeps_raw_target() {
        let refs = extract_refs(r#"<img src="logo.png">"#);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "logo.png");
    }

    #[test]
    fn test_extract_refs_empty_document() {
        assert!(extract_refs("").is_empty());
        assert!(extract_refs("plain text, no markup").is_empty());
    }

    #[test]
    fn test_probe_unparseable_url() {
        let probe = Probe::new().unwrap();
        let acc = probe.probe_url("not a url");
        assert!(acc.is_empty());
    }
}
