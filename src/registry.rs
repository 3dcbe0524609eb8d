//! The list of URLs the http_load plugin watches
//!
//! Munin addresses one (URL, category) pair per plugin instance, so
//! every URL needs a stable identifier that survives being embedded in
//! a symlink name. We derive it by keeping only the word characters of
//! the URL itself, which is stable across invocations as long as the
//! URL line does not change.

// We do not want to write unsafe code
#![forbid(unsafe_code)]

use log::{debug, trace};
use std::{collections::BTreeMap, fs, path::Path};

/// Derive the instance identifier for a URL.
///
/// Keeps ASCII alphanumerics and underscores, drops everything else.
///
/// # Examples
/// ```
/// # use munin_http_load::registry::url_id;
/// assert_eq!(url_id("http://example.com/"), "httpexamplecom");
/// ```
pub fn url_id(url: &str) -> String {
    url.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// The set of monitored URLs, keyed by their derived identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrlRegistry {
    urls: BTreeMap<String, String>,
}

impl UrlRegistry {
    /// Load the registry from a newline-delimited URL list.
    ///
    /// Trailing whitespace per line is trimmed, lines whose identifier
    /// comes out empty are skipped and a later line with the same
    /// identifier wins over an earlier one. URLs are not validated
    /// here, a nonsense line simply produces a probe that fails later.
    /// A missing or unreadable file yields an empty registry.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("Could not read URL list {}: {e}", path.display());
                return Self::default();
            }
        };

        let mut urls = BTreeMap::new();
        for line in content.lines() {
            let url = line.trim_end();
            let id = url_id(url);
            if id.is_empty() {
                trace!("Skipping URL list line without identifier: {url:?}");
                continue;
            }
            urls.insert(id, url.to_string());
        }
        trace!("Loaded {} URLs from {}", urls.len(), path.display());
        Self { urls }
    }

    /// True if no URL is configured.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Number of configured URLs.
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Look up the URL for an identifier.
    pub fn get(&self, id: &str) -> Option<&str> {
        self.urls.get(id).map(String::as_str)
    }

    /// Iterate over (identifier, URL) pairs, ordered by identifier.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.urls.iter().map(|(id, url)| (id.as_str(), url.as_str()))
    }
}
