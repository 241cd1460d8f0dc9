use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::warn;

use crate::error::{FileCityError, Result};
use crate::lsof::{LsofSettings, DEFAULT_INTERVAL};
use crate::sandbox::is_readable;

#[derive(Parser, Debug)]
#[command(name = "filecity", about = "Serve a sandboxed directory tree to the FileCity client")]
pub struct Cli {
    /// Restrict browsing to this directory (default: the user's home directory)
    #[arg(long, env = "FILECITY_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Host interface to bind
    #[arg(long, env = "FILECITY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "FILECITY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Enable auto-reload (default: FILECITY_RELOAD, on)
    #[arg(long, overrides_with = "no_reload")]
    pub reload: bool,

    /// Disable auto-reload
    #[arg(long, overrides_with = "reload")]
    pub no_reload: bool,

    /// Enable lsof-based process monitoring (default: FILECITY_LSOF_ENABLED, on)
    #[arg(long, overrides_with = "no_lsof")]
    pub lsof_enabled: bool,

    /// Disable lsof-based process monitoring
    #[arg(long, overrides_with = "lsof_enabled")]
    pub no_lsof: bool,

    /// Milliseconds between lsof polls (minimum 500)
    #[arg(long, env = "FILECITY_LSOF_INTERVAL_MS", default_value_t = DEFAULT_INTERVAL.as_millis() as u64)]
    pub lsof_interval_ms: u64,

    /// lsof executable, looked up on PATH when not absolute
    #[arg(long, env = "FILECITY_LSOF_BINARY", default_value = "lsof")]
    pub lsof_binary: PathBuf,

    /// Directory holding the client's static assets
    #[arg(long, env = "FILECITY_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// JSON file storing favourites
    #[arg(long, env = "FILECITY_FAVOURITES_FILE", default_value = "data/favourites.json")]
    pub favourites_file: PathBuf,

    /// Also write logs to this file
    #[arg(long, env = "FILECITY_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FileCityConfig {
    pub root_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub reload: bool,
    pub lsof_requested: bool,
    /// Present only when monitoring was requested and the binary exists.
    pub lsof: Option<LsofSettings>,
    pub static_dir: PathBuf,
    pub favourites_file: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl FileCityConfig {
    pub fn lsof_enabled(&self) -> bool {
        self.lsof.is_some()
    }
}

impl Cli {
    /// Resolve flags, environment fallbacks and host probing into a config.
    pub fn into_config(self) -> Result<FileCityConfig> {
        let root_dir = determine_root_dir(self.root_dir.as_deref())?;
        let reload = flag_pair(self.reload, self.no_reload, "FILECITY_RELOAD", true);
        let lsof_requested =
            flag_pair(self.lsof_enabled, self.no_lsof, "FILECITY_LSOF_ENABLED", true);

        let lsof = if lsof_requested {
            match which::which(&self.lsof_binary) {
                Ok(binary) => Some(LsofSettings::new(
                    binary,
                    Duration::from_millis(self.lsof_interval_ms),
                )),
                Err(_) => {
                    warn!(
                        "lsof-based monitoring requested but {} is not available on this system; feature disabled",
                        self.lsof_binary.display()
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(FileCityConfig {
            root_dir,
            host: self.host,
            port: self.port,
            reload,
            lsof_requested,
            lsof,
            static_dir: self.static_dir,
            favourites_file: self.favourites_file,
            log_file: self.log_file,
        })
    }
}

/// `--flag` wins over `--no-flag` only when given last (clap handles the
/// override); with neither, the environment decides.
fn flag_pair(on: bool, off: bool, env: &str, default: bool) -> bool {
    if on {
        true
    } else if off {
        false
    } else {
        env_bool(env, default)
    }
}

pub fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => parse_bool(&value),
        Err(_) => default,
    }
}

pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "t" | "yes" | "y" | "on"
    )
}

/// Use the configured root when it is usable, otherwise warn and fall back
/// to the home directory.
pub fn determine_root_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(configured) = configured {
        match resolve_root_dir(configured) {
            Ok(root) => return Ok(root),
            Err(e) => warn!("{}; falling back to the user's home directory", e),
        }
    }
    let home = dirs::home_dir()
        .ok_or_else(|| FileCityError::Config("cannot determine the home directory".to_string()))?;
    resolve_root_dir(&home)
}

/// Expand `~`, canonicalize, and require a readable directory.
pub fn resolve_root_dir(path: &Path) -> Result<PathBuf> {
    let candidate = expand_tilde(path);
    let resolved = std::fs::canonicalize(&candidate).map_err(|_| {
        FileCityError::Config(format!(
            "configured root directory '{}' does not exist",
            candidate.display()
        ))
    })?;
    if !resolved.is_dir() {
        return Err(FileCityError::Config(format!(
            "configured root directory '{}' is not a directory",
            candidate.display()
        )));
    }
    if !is_readable(&resolved) {
        return Err(FileCityError::Config(format!(
            "configured root directory '{}' is not readable",
            candidate.display()
        )));
    }
    Ok(resolved)
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
