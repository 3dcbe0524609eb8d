//! Measurement cache for the http_load plugin
//!
//! The `cron` cycle may take a long time (it talks to the network),
//! while munin-node expects `config` and value output within seconds.
//! The two sides meet in flat cache files below the plugin state
//! directory, one file per (URL identifier, category) pair, holding
//! `<key> <value>` lines.
//!
//! A key that was seen in an earlier cycle never disappears from the
//! cache. If the current cycle produced no fresh value for it, it is
//! carried along with the sentinel value `unknown`, so munin keeps the
//! data series alive and simply shows a gap.

// We do not want to write unsafe code
#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use log::{debug, trace};
use std::{
    collections::HashMap,
    fmt, fs,
    path::Path,
    str::FromStr,
};

/// Sentinel value for cache keys that got no fresh value this cycle.
pub const UNKNOWN: &str = "unknown";

/// A measurement dimension, one graph per category and URL.
///
/// Variants are declared in the lexicographic order of their names, so
/// the derived [Ord] matches sorting the rendered key strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Number of loaded page elements per host
    Elements,
    /// Wall-clock load time per host, in seconds
    Loadtime,
    /// HTTP response codes per host
    Response,
    /// Fetched bytes per host
    Size,
    /// Tag/attribute frequencies in the page source
    Tags,
    /// Content types per host
    Type,
}

impl Category {
    /// All categories, in rendering order.
    pub const ALL: [Category; 6] = [
        Category::Elements,
        Category::Loadtime,
        Category::Response,
        Category::Size,
        Category::Tags,
        Category::Type,
    ];

    /// The name used in cache keys and instance names.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Elements => "elements",
            Category::Loadtime => "loadtime",
            Category::Response => "response",
            Category::Size => "size",
            Category::Tags => "tags",
            Category::Type => "type",
        }
    }

    /// Upper bound for the munin `max` field directive.
    ///
    /// Generous sanity limits so a broken probe cannot draw absurd
    /// spikes, not expected operational values.
    pub fn max_bound(self) -> u64 {
        match self {
            Category::Elements => 10000,
            Category::Loadtime => 400,
            Category::Response => 10000,
            Category::Size => 50000000,
            Category::Tags => 10000,
            Category::Type => 10000,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "elements" => Ok(Category::Elements),
            "loadtime" => Ok(Category::Loadtime),
            "response" => Ok(Category::Response),
            "size" => Ok(Category::Size),
            "tags" => Ok(Category::Tags),
            "type" => Ok(Category::Type),
            _ => Err(anyhow::anyhow!("Unknown category: {s}")),
        }
    }
}

/// A typed cache key, rendered as `<category>_<subkey>`.
///
/// The subkey is the host for most categories, `<host>_<code>` for
/// [Category::Response], `<host>_<contenttype>` for [Category::Type]
/// and `<tag>-<attribute>` for [Category::Tags].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    /// The measurement dimension
    pub category: Category,
    /// The data series within the category
    pub subkey: String,
}

impl CacheKey {
    /// Build a key from category and subkey.
    pub fn new(category: Category, subkey: impl Into<String>) -> Self {
        Self {
            category,
            subkey: subkey.into(),
        }
    }

    /// Parse the `<category>_<subkey>` form, as stored in cache files.
    ///
    /// Returns None for anything that does not carry a known category
    /// and a non-empty subkey.
    pub fn parse(s: &str) -> Option<Self> {
        let (category, subkey) = s.split_once('_')?;
        let category = Category::from_str(category).ok()?;
        if subkey.is_empty() {
            return None;
        }
        Some(Self::new(category, subkey))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.category, self.subkey)
    }
}

/// Per-cycle accumulator, summing measurements before they are merged
/// into a [Cache]. Thrown away after the merge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Accumulator {
    values: HashMap<CacheKey, f64>,
}

impl Accumulator {
    /// Add an amount to a key, starting from 0 for new keys.
    pub fn add(&mut self, key: CacheKey, amount: f64) {
        *self.values.entry(key).or_insert(0.0) += amount;
    }

    /// The accumulated value for a key, if any.
    pub fn get(&self, key: &CacheKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Number of distinct keys seen this cycle.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing was accumulated.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all (key, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, f64)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }

    /// The subset of entries belonging to one category. Used to merge
    /// one probe run into the per-category cache files.
    pub fn of_category(&self, category: Category) -> Accumulator {
        Accumulator {
            values: self
                .values
                .iter()
                .filter(|(k, _)| k.category == category)
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }
}

/// Render an accumulated value for the cache file.
///
/// Counters and sizes stay integers, load times keep millisecond
/// precision.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as u64)
    } else {
        format!("{value:.3}")
    }
}

/// The persisted measurement cache.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cache {
    entries: HashMap<CacheKey, String>,
}

impl Cache {
    /// Read a cache file.
    ///
    /// A missing or unreadable file is an empty cache, lines that do
    /// not parse as `<key> <value>` with a known category are skipped.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No cache at {}: {e}", path.display());
                return Self::default();
            }
        };

        let mut entries = HashMap::new();
        for line in content.lines() {
            // Split on the first run of whitespace
            let Some((key, value)) = line.split_once(char::is_whitespace) else {
                trace!("Skipping cache line without value: {line:?}");
                continue;
            };
            let Some(key) = CacheKey::parse(key) else {
                trace!("Skipping cache line with unparseable key: {line:?}");
                continue;
            };
            let value = value.trim_start();
            if value.is_empty() {
                trace!("Skipping cache line with empty value: {line:?}");
                continue;
            }
            entries.insert(key, value.to_string());
        }
        Self { entries }
    }

    /// Merge one cycle of fresh data into the cache.
    ///
    /// Every key already present is first reset to [UNKNOWN], then the
    /// accumulator values overwrite or insert. The key set only ever
    /// grows.
    pub fn merge(&mut self, fresh: &Accumulator) {
        for value in self.entries.values_mut() {
            *value = UNKNOWN.to_string();
        }
        for (key, value) in fresh.iter() {
            self.entries.insert(key.clone(), format_value(value));
        }
    }

    /// Rewrite the cache file, one `<key> <value>` line per entry.
    ///
    /// Plain overwrite, no locking. Concurrent cycles against the same
    /// file are expected to be ruled out by cron scheduling.
    pub fn store(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(&format!("{key} {value}\n"));
        }
        fs::write(path, out).with_context(|| format!("Could not write cache {}", path.display()))
    }

    /// The stored value for a key.
    pub fn get(&self, key: &CacheKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Insert a value directly. Mostly useful for tests.
    pub fn insert(&mut self, key: CacheKey, value: impl Into<String>) {
        self.entries.insert(key, value.into());
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys of one category, sorted by their rendered form.
    pub fn keys_of_category(&self, category: Category) -> Vec<&CacheKey> {
        let mut keys: Vec<&CacheKey> = self
            .entries
            .keys()
            .filter(|k| k.category == category)
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_key_roundtrip() {
        let key = CacheKey::parse("response_a.com_200").unwrap();
        assert_eq!(key.category, Category::Response);
        assert_eq!(key.subkey, "a.com_200");
        assert_eq!(key.to_string(), "response_a.com_200");

        assert!(CacheKey::parse("bogus_a.com").is_none());
        assert!(CacheKey::parse("size_").is_none());
        assert!(CacheKey::parse("size").is_none());
    }

    #[test]
    fn test_merge() {
        // Prior cache holds size and loadtime for a.com
        let mut cache = Cache::default();
        cache.insert(CacheKey::new(Category::Size, "a.com"), "100");
        cache.insert(CacheKey::new(Category::Loadtime, "a.com"), "1.5");

        // This cycle only produced a size
        let mut fresh = Accumulator::default();
        fresh.add(CacheKey::new(Category::Size, "a.com"), 150.0);
        cache.merge(&fresh);

        // Fresh value overwrote, stale key went unknown, nothing vanished
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&CacheKey::new(Category::Size, "a.com")), Some("150"));
        assert_eq!(
            cache.get(&CacheKey::new(Category::Loadtime, "a.com")),
            Some(UNKNOWN)
        );
    }

    #[test]
    fn test_merge_keeps_all_keys() {
        let mut cache = Cache::default();
        for host in ["a.com", "b.com", "c.com"] {
            cache.insert(CacheKey::new(Category::Size, host), "1");
        }
        let mut fresh = Accumulator::default();
        fresh.add(CacheKey::new(Category::Size, "b.com"), 2.0);
        fresh.add(CacheKey::new(Category::Size, "d.com"), 3.0);
        cache.merge(&fresh);

        // Union of both key sets
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(&CacheKey::new(Category::Size, "a.com")), Some(UNKNOWN));
        assert_eq!(cache.get(&CacheKey::new(Category::Size, "b.com")), Some("2"));
        assert_eq!(cache.get(&CacheKey::new(Category::Size, "c.com")), Some(UNKNOWN));
        assert_eq!(cache.get(&CacheKey::new(Category::Size, "d.com")), Some("3"));
    }

    #[test]
    fn test_load_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("size.cache");

        let mut cache = Cache::default();
        cache.insert(CacheKey::new(Category::Size, "a.com"), "100");
        cache.insert(CacheKey::new(Category::Loadtime, "a.com"), "1.500");
        cache.store(&path).unwrap();

        let reloaded = Cache::load(&path);
        assert_eq!(reloaded, cache);
    }

    #[test]
    fn test_load_skips_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.cache");
        std::fs::write(
            &path,
            "size_a.com 100\nnovalue\nbogus_a.com 1\nloadtime_b.com\t2.5\n",
        )
        .unwrap();

        let cache = Cache::load(&path);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&CacheKey::new(Category::Size, "a.com")), Some("100"));
        // Tab counts as the whitespace separator too
        assert_eq!(
            cache.get(&CacheKey::new(Category::Loadtime, "b.com")),
            Some("2.5")
        );
    }

    #[test]
    fn test_load_skips_empty_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.cache");
        // Key followed by whitespace only carries no value, such lines
        // must not survive into the cache
        std::fs::write(&path, "size_a.com \nsize_b.com \t \nsize_c.com 3\n").unwrap();

        let cache = Cache::load(&path);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&CacheKey::new(Category::Size, "a.com")), None);
        assert_eq!(cache.get(&CacheKey::new(Category::Size, "b.com")), None);
        assert_eq!(cache.get(&CacheKey::new(Category::Size, "c.com")), Some("3"));
    }

    #[test]
    fn test_load_missing_file() {
        let cache = Cache::load(Path::new("/nonexistent/dir/no.cache"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_accumulator_sums() {
        let mut acc = Accumulator::default();
        let key = CacheKey::new(Category::Elements, "a.com");
        acc.add(key.clone(), 1.0);
        acc.add(key.clone(), 1.0);
        assert_eq!(acc.get(&key), Some(2.0));
    }

    #[test]
    fn test_accumulator_of_category() {
        let mut acc = Accumulator::default();
        acc.add(CacheKey::new(Category::Size, "a.com"), 100.0);
        acc.add(CacheKey::new(Category::Loadtime, "a.com"), 0.5);
        let sizes = acc.of_category(Category::Size);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes.get(&CacheKey::new(Category::Size, "a.com")), Some(100.0));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(150.0), "150");
        assert_eq!(format_value(1.5), "1.500");
        assert_eq!(format_value(0.0), "0");
    }
}
