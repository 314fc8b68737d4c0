//! Settings for the `yarapipe` binary.
//!
//! Read from `.yarapiperc` files with TOML syntax:
//!
//! - **Global**: `~/.yarapiperc`
//! - **Local**: `.yarapiperc` in the working directory or any parent; overrides global
//!
//! ```toml
//! yara_path = "/opt/yara/bin/yara"
//! yarac_path = "/opt/yara/bin/yarac"
//! timeout = 120
//! threads = 4
//! colored = true
//! json = false
//! ```
//!
//! Command-line flags override both files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use yarapipe_exec::DEFAULT_SCAN_TIMEOUT;

pub const CONFIG_FILE_NAME: &str = ".yarapiperc";

/// All fields optional so a file only overrides what it names.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    yara_path: Option<PathBuf>,
    yarac_path: Option<PathBuf>,
    /// Seconds.
    timeout: Option<u64>,
    /// 0 = one per core.
    threads: Option<usize>,
    colored: Option<bool>,
    json: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub yara_path: Option<PathBuf>,
    pub yarac_path: Option<PathBuf>,
    pub timeout: Duration,
    pub threads: usize,
    pub colored: bool,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            yara_path: None,
            yarac_path: None,
            timeout: DEFAULT_SCAN_TIMEOUT,
            threads: 0,
            colored: true,
            json: false,
        }
    }
}

impl Config {
    /// Defaults, then `~/.yarapiperc`, then the nearest local
    /// `.yarapiperc` above `start_dir`.
    pub fn load(start_dir: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(global) = Self::find_global_config() {
            config.apply(read_file(&global)?);
        }

        if let Some(local) = Self::find_local_config(start_dir)
            && Some(&local) != Self::find_global_config().as_ref()
        {
            config.apply(read_file(&local)?);
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.apply(read_file(path)?);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).context("Invalid configuration")?;
        let mut config = Self::default();
        config.apply(file);
        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) {
        if file.yara_path.is_some() {
            self.yara_path = file.yara_path;
        }
        if file.yarac_path.is_some() {
            self.yarac_path = file.yarac_path;
        }
        if let Some(secs) = file.timeout {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(threads) = file.threads {
            self.threads = threads;
        }
        if let Some(colored) = file.colored {
            self.colored = colored;
        }
        if let Some(json) = file.json {
            self.json = json;
        }
    }

    /// Command-line flags win over any file.
    pub fn merge_cli_args(&mut self, timeout: Option<u64>, json: bool, no_color: bool) {
        if let Some(secs) = timeout {
            self.timeout = Duration::from_secs(secs);
        }
        if json {
            self.json = true;
        }
        if no_color {
            self.colored = false;
        }
    }

    pub fn find_global_config() -> Option<PathBuf> {
        let path = dirs::home_dir()?.join(CONFIG_FILE_NAME);
        path.is_file().then_some(path)
    }

    pub fn find_local_config(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
        let mut dir = start_dir.as_ref().canonicalize().ok()?;
        loop {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }
}

fn read_file(path: &Path) -> Result<ConfigFile> {
    debug!("reading config {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
