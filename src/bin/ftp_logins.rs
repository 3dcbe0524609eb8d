//! ftp_logins - Count successful and failed FTP logins for munin
//!
//! Scrapes the FTP servers logfile for its login result lines. The
//! logfile location can be set with the `logfile` environment variable
//! from the plugin configuration, the default fits vsftpd.
// SPDX-License-Identifier:  LGPL-3.0-only

#![warn(missing_docs)]

use anyhow::Result;
use log::{debug, LevelFilter};
use munin_http_load::MuninPlugin;
use simple_logger::SimpleLogger;
use std::{
    env, fs,
    io::{BufWriter, Write},
    path::PathBuf,
};

/// Log line marker for a successful login.
const OK_PATTERN: &str = "OK LOGIN";
/// Log line marker for a failed login.
const FAIL_PATTERN: &str = "FAIL LOGIN";

/// The struct for our plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FtpLoginsPlugin {
    /// The logfile we count login lines in
    logfile: PathBuf,
}

impl Default for FtpLoginsPlugin {
    fn default() -> Self {
        Self {
            logfile: env::var("logfile")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/log/vsftpd.log")),
        }
    }
}

impl FtpLoginsPlugin {
    /// Count successful and failed login lines.
    ///
    /// A missing or unreadable logfile counts as zero of each, the
    /// counter graph then simply stays flat.
    fn counts(&self) -> (usize, usize) {
        let content = fs::read_to_string(&self.logfile).unwrap_or_default();
        let ok = content.lines().filter(|l| l.contains(OK_PATTERN)).count();
        let fail = content.lines().filter(|l| l.contains(FAIL_PATTERN)).count();
        (ok, fail)
    }
}

impl MuninPlugin for FtpLoginsPlugin {
    fn config<W: Write>(&self, handle: &mut BufWriter<W>) -> Result<()> {
        writeln!(handle, "graph_title FTP logins")?;
        writeln!(handle, "graph_args --base 1000 -l 0")?;
        writeln!(handle, "graph_vlabel logins / ${{graph_period}}")?;
        writeln!(handle, "graph_category ftp")?;
        // The log only ever grows, so both values are derives
        writeln!(handle, "logins.label successful")?;
        writeln!(handle, "logins.type DERIVE")?;
        writeln!(handle, "logins.min 0")?;
        writeln!(handle, "failed.label failed")?;
        writeln!(handle, "failed.type DERIVE")?;
        writeln!(handle, "failed.min 0")?;
        Ok(())
    }

    fn fetch<W: Write>(&self, handle: &mut BufWriter<W>) -> Result<()> {
        let (ok, fail) = self.counts();
        writeln!(handle, "logins.value {ok}")?;
        writeln!(handle, "failed.value {fail}")?;
        Ok(())
    }

    /// Auto-configuration works when the logfile is there.
    fn check_autoconf(&self) -> bool {
        self.logfile.exists()
    }
}

fn main() -> Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .init()
        .unwrap();
    debug!("ftp_logins started");

    let mut plugin = FtpLoginsPlugin {
        ..Default::default()
    };
    debug!("Plugin: {:#?}", plugin);

    // Get running
    let rc = plugin.simple_start(String::from("ftp_logins"))?;
    std::process::exit(rc);
}
