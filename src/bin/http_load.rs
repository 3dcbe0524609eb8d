//! http_load - Munin wildcard plugin graphing web page load statistics
//!
//! Expects to be symlinked per instance as
//! `http_load_<identifier>_<category>`, where the identifier names a
//! URL from the configured URL list and the category is one of
//! elements, loadtime, response, size, tags or type.
//!
//! The actual probing happens out of band: a cron job runs
//! `http_load cron` (optionally `cron verbose`), which fetches every
//! configured page plus its resources and rewrites the per-instance
//! cache files. The munin-triggered invocations only read those.
//!
//! The URL list location comes from the `urls_file` environment
//! variable, falling back to `http_load.urls` in the plugin state
//! directory.
// SPDX-License-Identifier:  LGPL-3.0-only

#![warn(missing_docs)]

use anyhow::Result;
use log::{debug, warn, LevelFilter};
use munin_http_load::{
    cache::{Cache, Category},
    probe::Probe,
    registry::UrlRegistry,
    render, Config, MuninPlugin,
};
use simple_logger::SimpleLogger;
use std::{
    env,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

/// The struct for our plugin, carrying the parsed instance identity
/// and the URL registry.
#[derive(Debug)]
struct HttpLoadPlugin {
    /// Which (URL identifier, category) this invocation renders, if
    /// the invoking name carried one
    instance: Option<(String, Category)>,

    /// The configured URLs
    registry: UrlRegistry,

    /// Where the cache files live
    statedir: PathBuf,
}

/// Split an invoking name like `http_load_httpacom_size` into the URL
/// identifier and the category.
///
/// The category is the last underscore-separated part, everything
/// between the plugin prefix and that is the identifier (identifiers
/// may themselves contain underscores, categories never do).
fn parse_instance(name: &str) -> Option<(String, Category)> {
    let rest = name.strip_prefix("http_load_")?;
    let (id, category) = rest.rsplit_once('_')?;
    if id.is_empty() {
        return None;
    }
    let category = Category::from_str(category).ok()?;
    Some((id.to_string(), category))
}

/// The file name we were invoked as.
fn own_name() -> Option<String> {
    let arg0 = env::args().next()?;
    Some(Path::new(&arg0).file_name()?.to_str()?.to_string())
}

impl HttpLoadPlugin {
    /// Set up the plugin: find the URL list, load it, parse our own
    /// name for the instance identity.
    fn new(config: &Config) -> Self {
        let urls_file = env::var("urls_file")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config.plugin_statedir.join("http_load.urls"));
        let registry = UrlRegistry::load(&urls_file);
        let instance = own_name().as_deref().and_then(parse_instance);
        Self {
            instance,
            registry,
            statedir: config.plugin_statedir.clone(),
        }
    }

    /// The cache file for one (identifier, category) pair.
    fn cache_path(&self, id: &str, category: Category) -> PathBuf {
        self.statedir
            .join(format!("munin.http_load.{id}.{category}.cache"))
    }
}

impl MuninPlugin for HttpLoadPlugin {
    fn config<W: Write>(&self, handle: &mut BufWriter<W>) -> Result<()> {
        let Some((id, category)) = &self.instance else {
            warn!("Not invoked as http_load_<id>_<category>, no config to print");
            return Ok(());
        };
        let cache = Cache::load(&self.cache_path(id, *category));
        // Title with the URL if we still know it, the id otherwise
        let what = self.registry.get(id).unwrap_or(id);
        render::write_config(handle, &cache, *category, what)
    }

    fn fetch<W: Write>(&self, handle: &mut BufWriter<W>) -> Result<()> {
        let Some((id, category)) = &self.instance else {
            warn!("Not invoked as http_load_<id>_<category>, no values to print");
            return Ok(());
        };
        let cache = Cache::load(&self.cache_path(id, *category));
        render::write_values(handle, &cache, *category)
    }

    /// One probe cycle: walk every configured URL, then fold the fresh
    /// numbers into the per-category cache files. Keys that got no
    /// fresh value go stale as `unknown`, they never disappear.
    fn acquire(&mut self, _config: &Config) -> Result<()> {
        let probe = Probe::new()?;
        for (id, url) in self.registry.iter() {
            debug!("Probing {url} ({id})");
            let acc = probe.probe_url(url);
            debug!("Probe of {url} yielded {} keys", acc.len());
            for category in Category::ALL {
                let path = self.cache_path(id, category);
                let mut cache = Cache::load(&path);
                cache.merge(&acc.of_category(category));
                cache.store(&path)?;
            }
        }
        Ok(())
    }

    fn suggest<W: Write>(&self, handle: &mut BufWriter<W>) -> Result<()> {
        for (id, _url) in self.registry.iter() {
            for category in Category::ALL {
                writeln!(handle, "{id}_{category}")?;
            }
        }
        Ok(())
    }

    /// We can configure ourselves as soon as at least one URL is
    /// listed.
    fn check_autoconf(&self) -> bool {
        !self.registry.is_empty()
    }
}

fn main() -> Result<()> {
    // `cron verbose` wants diagnostics on stdout, everything else
    // should stay quiet
    let verbose = env::args().any(|arg| arg == "verbose");
    SimpleLogger::new()
        .with_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init()
        .unwrap();
    debug!("http_load started");

    // Set our config
    let config = Config::new(String::from("http_load"));

    let mut plugin = HttpLoadPlugin::new(&config);
    debug!("Plugin: {:#?}", plugin);

    // Get running
    let rc = plugin.start(config)?;
    std::process::exit(rc);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instance() {
        assert_eq!(
            parse_instance("http_load_httpacom_size"),
            Some((String::from("httpacom"), Category::Size))
        );
        // Identifiers may carry underscores, the category is always
        // the last part
        assert_eq!(
            parse_instance("http_load_httpacommy_page_loadtime"),
            Some((String::from("httpacommy_page"), Category::Loadtime))
        );
    }

    #[test]
    fn test_parse_instance_rejects() {
        // No prefix
        assert_eq!(parse_instance("other_plugin_size"), None);
        // Unknown category
        assert_eq!(parse_instance("http_load_httpacom_bogus"), None);
        // Missing identifier
        assert_eq!(parse_instance("http_load_size"), None);
        assert_eq!(parse_instance("http_load_"), None);
    }

    #[test]
    fn test_autoconf_needs_urls() {
        // Without any configured URL the plugin must answer no, which
        // start() turns into exit code 1
        let plugin = HttpLoadPlugin {
            instance: None,
            registry: UrlRegistry::default(),
            statedir: PathBuf::from("/tmp"),
        };
        assert!(!plugin.check_autoconf());
        assert_eq!(plugin.autoconf(), 1);

        let mut urls = tempfile::NamedTempFile::new().unwrap();
        writeln!(urls, "http://a.com/").unwrap();
        let plugin = HttpLoadPlugin {
            instance: None,
            registry: UrlRegistry::load(urls.path()),
            statedir: PathBuf::from("/tmp"),
        };
        assert!(plugin.check_autoconf());
        assert_eq!(plugin.autoconf(), 0);
    }

    #[test]
    fn test_cache_path() {
        let plugin = HttpLoadPlugin {
            instance: None,
            registry: UrlRegistry::default(),
            statedir: PathBuf::from("/tmp"),
        };
        assert_eq!(
            plugin.cache_path("httpacom", Category::Size),
            PathBuf::from("/tmp/munin.http_load.httpacom.size.cache")
        );
    }
}
