use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::resolver::{DEFAULT_GROUP_PATH, DEFAULT_PASSWD_PATH};
use crate::top::sort::SORT_BY_DEFAULT;
use crate::top::TopConfig;

/// Top-level configuration for the flowtop agent.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Top-K sampler parameters.
    #[serde(default)]
    pub top: TopSection,

    /// uid/gid name resolution parameters.
    #[serde(default)]
    pub resolver: ResolverSection,
}

/// Top-K sampler parameters, in the host framework's string-typed form.
#[derive(Debug, Clone, Deserialize)]
pub struct TopSection {
    /// Maximum rows per emitted snapshot. Default: 20.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Sampling interval. Default: 1s.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Comma-separated sort columns; a leading `-` selects descending
    /// order. Default: "-sent,-received".
    #[serde(default = "default_sort_by")]
    pub sort_by: String,

    /// Only report connections of this process. 0 = all processes.
    #[serde(default)]
    pub target_pid: u32,

    /// Only report connections of this IP family ("4" or "6"). Empty = all.
    #[serde(default)]
    pub target_family: String,
}

/// uid/gid resolution parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSection {
    /// Enable uid/gid -> name enrichment. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host passwd-format file. Default: /etc/passwd.
    #[serde(default = "default_passwd_path")]
    pub passwd_path: String,

    /// Host group-format file. Default: /etc/group.
    #[serde(default = "default_group_path")]
    pub group_path: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_rows() -> usize {
    20
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_sort_by() -> String {
    SORT_BY_DEFAULT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_passwd_path() -> String {
    DEFAULT_PASSWD_PATH.to_string()
}

fn default_group_path() -> String {
    DEFAULT_GROUP_PATH.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            top: TopSection::default(),
            resolver: ResolverSection::default(),
        }
    }
}

impl Default for TopSection {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            interval: default_interval(),
            sort_by: default_sort_by(),
            target_pid: 0,
            target_family: String::new(),
        }
    }
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            enabled: true,
            passwd_path: default_passwd_path(),
            group_path: default_group_path(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate all sections. Configuration failures surface here, before
    /// anything starts.
    pub fn validate(&self) -> Result<()> {
        // TopConfig construction performs the sampler parameter checks.
        self.top.to_top_config()?;
        Ok(())
    }
}

impl TopSection {
    /// Build the validated sampler configuration.
    pub fn to_top_config(&self) -> Result<TopConfig> {
        TopConfig::new(
            self.max_rows,
            self.interval,
            &self.sort_by,
            self.target_pid,
            &self.target_family,
        )
    }
}
