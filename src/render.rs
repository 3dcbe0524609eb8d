//! Turning a measurement cache into munin output
//!
//! Two modes, matching the two read-only plugin invocations: graph
//! metadata for `config` and the current values for a plain fetch.
//! Both operate on one category of one cache.

// We do not want to write unsafe code
#![forbid(unsafe_code)]

use crate::cache::{Cache, Category};
use anyhow::Result;
use std::io::{BufWriter, Write};

/// Munin field name length limit we truncate to.
const FIELD_NAME_MAX: usize = 19;

/// Derive a munin field name from a subkey.
///
/// Keeps word characters only and truncates to [FIELD_NAME_MAX].
/// Idempotent: running it on its own output changes nothing.
pub fn field_name(subkey: &str) -> String {
    subkey
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(FIELD_NAME_MAX)
        .collect()
}

/// Title and value axis label per category.
fn graph_labels(category: Category) -> (&'static str, &'static str) {
    match category {
        Category::Elements => ("Page elements", "elements"),
        Category::Loadtime => ("Page load time", "seconds"),
        Category::Response => ("Response codes", "responses"),
        Category::Size => ("Page size", "bytes"),
        Category::Tags => ("Tag frequency", "tags"),
        Category::Type => ("Content types", "responses"),
    }
}

/// Write the munin graph configuration for one category.
///
/// One data series per subkey in the cache. The first series is drawn
/// as a filled area, the rest stack on top, enumerated in reverse
/// lexicographic key order so the output is stable between runs.
pub fn write_config<W: Write>(
    handle: &mut BufWriter<W>,
    cache: &Cache,
    category: Category,
    what: &str,
) -> Result<()> {
    let (title, vlabel) = graph_labels(category);
    writeln!(handle, "graph_title {title} for {what}")?;
    writeln!(handle, "graph_args --base 1000 -l 0")?;
    writeln!(handle, "graph_vlabel {vlabel}")?;
    writeln!(handle, "graph_category webserver")?;

    let mut keys = cache.keys_of_category(category);
    keys.reverse();
    for (i, key) in keys.iter().enumerate() {
        let field = field_name(&key.subkey);
        if field.is_empty() {
            continue;
        }
        writeln!(handle, "{field}.label {}", key.subkey)?;
        writeln!(handle, "{field}.min 0")?;
        writeln!(handle, "{field}.max {}", category.max_bound())?;
        // First series fills, the others stack on it
        if i == 0 {
            writeln!(handle, "{field}.draw AREA")?;
        } else {
            writeln!(handle, "{field}.draw STACK")?;
        }
    }
    Ok(())
}

/// Write the current values for one category, forward lexicographic
/// key order. The `unknown` sentinel goes out as stored, munin reads
/// that as a gap.
pub fn write_values<W: Write>(
    handle: &mut BufWriter<W>,
    cache: &Cache,
    category: Category,
) -> Result<()> {
    for key in cache.keys_of_category(category) {
        let field = field_name(&key.subkey);
        if field.is_empty() {
            continue;
        }
        if let Some(value) = cache.get(key) {
            writeln!(handle, "{field}.value {value}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut BufWriter<Vec<u8>>) -> Result<()>,
    {
        let mut handle = BufWriter::new(Vec::new());
        f(&mut handle).unwrap();
        handle.flush().unwrap();
        let (writer, _) = handle.into_parts();
        String::from_utf8(writer).unwrap()
    }

    #[test]
    fn test_field_name() {
        assert_eq!(field_name("a.com"), "acom");
        assert_eq!(field_name("a.com_200"), "acom_200");
        // Bounded to 19 characters
        let long = field_name("www.a-very-long-hostname.example.com");
        assert_eq!(long.len(), 19);
        assert_eq!(long, "wwwaverylonghostnam");
        // Idempotent
        assert_eq!(field_name(&long), long);
        assert_eq!(field_name(&field_name("a.com")), field_name("a.com"));
    }

    #[test]
    fn test_write_config_stacking() {
        let mut cache = Cache::default();
        cache.insert(CacheKey::new(Category::Size, "a.com"), "100");
        cache.insert(CacheKey::new(Category::Size, "b.com"), "200");
        // Other categories must not leak into this graph
        cache.insert(CacheKey::new(Category::Loadtime, "a.com"), "1.5");

        let output = render(|h| write_config(h, &cache, Category::Size, "http://a.com/"));

        assert!(output.contains("graph_title Page size for http://a.com/\n"));
        assert!(output.contains("graph_vlabel bytes\n"));
        // Reverse lexicographic order: b.com first, drawn as AREA
        assert!(output.contains("bcom.label b.com\nbcom.min 0\nbcom.max 50000000\nbcom.draw AREA\n"));
        assert!(output.contains("acom.label a.com\nacom.min 0\nacom.max 50000000\nacom.draw STACK\n"));
        assert!(!output.contains("loadtime"));
    }

    #[test]
    fn test_write_values_order() {
        let mut cache = Cache::default();
        cache.insert(CacheKey::new(Category::Size, "b.com"), "200");
        cache.insert(CacheKey::new(Category::Size, "a.com"), "unknown");

        let output = render(|h| write_values(h, &cache, Category::Size));

        // Forward lexicographic order, sentinel passed through
        assert_eq!(output, "acom.value unknown\nbcom.value 200\n");
    }

    #[test]
    fn test_write_values_empty_cache() {
        let cache = Cache::default();
        let output = render(|h| write_values(h, &cache, Category::Tags));
        assert!(output.is_empty());
    }
}
