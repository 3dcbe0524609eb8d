//! munin-http-load - Munin plugins graphing web page load statistics
//!
//! SPDX-License-Identifier: LGPL-3.0-only
//!
//! # About
//! Two munin plugins built on a small shared plugin framework:
//!
//! - **http_load**: a wildcard plugin probing a list of web pages. A
//!   periodic `cron` invocation fetches every configured page plus the
//!   sub-resources it references and aggregates size, load time,
//!   element counts, response codes, content types and tag frequencies
//!   into per-instance cache files. The usual munin `config`/value
//!   invocations only read those caches, so answering munin-node stays
//!   fast no matter how slow the probed sites are.
//! - **ftp_logins**: counts successful and failed logins in an FTP
//!   server logfile.
//!
//! # Usage
//! Implement [MuninPlugin] for a struct carrying whatever state your
//! plugin needs, write out the functions `config` and `fetch`, and
//! call [MuninPlugin::start] on it. Plugins that gather data out of
//! band additionally implement [MuninPlugin::acquire], which runs when
//! the plugin is invoked with the `cron` argument.
//!
//! # Example
//! ```no_run
//! use anyhow::Result;
//! use munin_http_load::MuninPlugin;
//! use std::io::{BufWriter, Write};
//!
//! // Our plugin struct
//! #[derive(Debug)]
//! struct ExamplePlugin;
//!
//! impl MuninPlugin for ExamplePlugin {
//!     // Write out munin config. handle is setup as a bufwriter to stdout.
//!     fn config<W: Write>(&self, handle: &mut BufWriter<W>) -> Result<()> {
//!         writeln!(handle, "graph_title Example")?;
//!         writeln!(handle, "graph_category other")?;
//!         writeln!(handle, "example.label example")?;
//!         Ok(())
//!     }
//!
//!     // Fetch and display data
//!     fn fetch<W: Write>(&self, handle: &mut BufWriter<W>) -> Result<()> {
//!         writeln!(handle, "example.value 42")?;
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let mut example = ExamplePlugin;
//!     let rc = example.simple_start(String::from("example"))?;
//!     std::process::exit(rc);
//! }
//! ```
//!
//! # Logging
//! This crate uses the default [log] crate to output log messages of
//! level trace, debug or warn. If you want to see them, select a log
//! framework you like and ensure its level will display them. The
//! shipped binaries use simple_logger and raise the level when invoked
//! as `cron verbose`.

// Tell us if we forget to document things
#![warn(missing_docs)]
// We do not want to write unsafe code
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod probe;
pub mod registry;
pub mod render;
pub use crate::config::Config;

use anyhow::Result;
use log::trace;
use std::{
    env,
    io::{self, BufWriter, Write},
};

/// Defines a Munin Plugin and the needed functions
pub trait MuninPlugin {
    /// Write out a munin config, read the [Developing
    /// plugins](http://guide.munin-monitoring.org/en/latest/develop/plugins/index.html)
    /// guide from munin for everything you can print out here.
    ///
    /// Note that munin expects this to appear on stdout, so the
    /// plugin gives you a handle to write to, which is setup as a
    /// [std::io::BufWriter] to stdout. The [std::io::BufWriter]
    /// capacity defaults to 8192 bytes, but if you need more, its
    /// size can be set using [Config::config_size].
    fn config<W: Write>(&self, handle: &mut BufWriter<W>) -> Result<()>;

    /// Fetch delivers actual data to munin. This is called whenever
    /// the plugin is called without an argument - or, munin-node being
    /// lenient there, with any argument the plugin does not recognize.
    /// If the [config::Config::dirtyconfig] setting is true
    /// (auto-detected from environment set by munin), this will also
    /// be called right after having called [MuninPlugin::config].
    ///
    /// The size of the BufWriter is configurable from [Config::fetch_size].
    fn fetch<W: Write>(&self, handle: &mut BufWriter<W>) -> Result<()>;

    /// Acquire data and store it for later fetching.
    ///
    /// Acquire is called whenever the plugin is invoked with the
    /// `cron` argument, which is expected to happen from an external
    /// cron job. It should gather data, however slow that may be, and
    /// store it somewhere [MuninPlugin::fetch] can read it, usually a
    /// cache file below [Config::plugin_statedir].
    ///
    /// The default does nothing, which suits plugins that gather their
    /// data directly in [MuninPlugin::fetch].
    fn acquire(&mut self, config: &Config) -> Result<()> {
        trace!(
            "Default acquire, nothing to gather for {}",
            config.plugin_name
        );
        Ok(())
    }

    /// List the plugin instance names this plugin can be symlinked as,
    /// one per line, for munins `suggest` mode.
    ///
    /// The default suggests nothing, fitting plugins that are not
    /// wildcard plugins.
    fn suggest<W: Write>(&self, _handle: &mut BufWriter<W>) -> Result<()> {
        Ok(())
    }

    /// Check whatever is neccessary to decide if the plugin can
    /// auto-configure itself.
    ///
    /// If this function is not overwritten, it defaults to false.
    fn check_autoconf(&self) -> bool {
        false
    }

    /// Tell munin if the plugin supports autoconf.
    ///
    /// Munin expects a simple yes or no on stdout, so we just print
    /// it, depending on the return value of
    /// [MuninPlugin::check_autoconf]. Answering no also sets the exit
    /// code to 1, so `munin-node-configure` can tell the two apart
    /// without parsing output.
    fn autoconf(&self) -> i32 {
        if self.check_autoconf() {
            println!("yes");
            0
        } else {
            println!("no");
            1
        }
    }

    /// A simplified start, only need a name, for the rest, defaults are fine.
    ///
    /// This is just a tiny bit of "being lazy is good" and will
    /// create the [Config] with the given name, then call the real
    /// start function.
    fn simple_start(&mut self, name: String) -> Result<i32> {
        trace!("Simple Start, setting up config");
        let config = Config::new(name);
        trace!("Plugin: {:#?}", config);

        self.start(config)
    }

    /// The main plugin function, this will deal with parsing
    /// commandline arguments and doing what is expected of the plugin
    /// (present config, fetch values, gather data, whatever).
    ///
    /// Returns the exit code the process should finish with.
    fn start(&mut self, config: Config) -> Result<i32> {
        trace!("Plugin start");
        trace!("My plugin config: {config:#?}");

        // Store arguments for (possible) later use
        let args: Vec<String> = env::args().collect();

        // Now go over the args and see what we are supposed to do
        match args.get(1).map(String::as_str) {
            Some("config") => {
                // We want to write a possibly large amount to stdout, take and lock it
                let stdout = io::stdout();
                {
                    // Buffered writer, to gather multiple small writes together
                    let mut handle = BufWriter::with_capacity(config.config_size, stdout.lock());
                    self.config(&mut handle)?;
                    // And flush the handle, so it can also deal with possible errors
                    handle.flush()?;
                }
                // If munin supports dirtyconfig, send the data now
                if config.dirtyconfig {
                    trace!("Munin supports dirtyconfig, sending data now");
                    let mut handle = BufWriter::with_capacity(config.fetch_size, stdout.lock());
                    self.fetch(&mut handle)?;
                    handle.flush()?;
                }
            }
            Some("autoconf") => {
                return Ok(self.autoconf());
            }
            Some("suggest") => {
                let stdout = io::stdout();
                let mut handle = BufWriter::with_capacity(config.config_size, stdout.lock());
                self.suggest(&mut handle)?;
                handle.flush()?;
            }
            Some("cron") => {
                trace!("Called cron to gather data");
                self.acquire(&config)?;
            }
            other => {
                // No argument, or one we do not know: munin wants data
                if let Some(arg) = other {
                    trace!("Unsupported argument: {arg}, assuming fetch");
                }
                // We want to write a possibly large amount to stdout, take and lock it
                let stdout = io::stdout();
                // Buffered writer, to gather multiple small writes together
                let mut handle = BufWriter::with_capacity(config.fetch_size, stdout.lock());
                self.fetch(&mut handle)?;
                // And flush the handle, so it can also deal with possible errors
                handle.flush()?;
            }
        }
        Ok(0)
    }
}
