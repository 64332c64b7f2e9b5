// ABOUTME: Configuration types and parsing for rollout.yml.
// ABOUTME: Handles YAML parsing, defaults, and per-environment override merging.

mod deserialize;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::tags::DEFAULT_DATE_FORMAT;
use crate::types::EnvName;
use deserialize::{deserialize_cutoff, deserialize_umask};

pub use deserialize::parse_cutoff;

pub const CONFIG_FILENAME: &str = "rollout.yml";
pub const CONFIG_FILENAME_ALT: &str = "rollout.yaml";
pub const CONFIG_FILENAME_DIR: &str = "deploy/rollout.yml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Environment used when the command line names none.
    #[serde(default)]
    pub environment: Option<EnvName>,

    #[serde(default = "default_date_format")]
    pub date_format: String,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_hooks_dir")]
    pub hooks_dir: PathBuf,

    #[serde(default)]
    pub deploy_file: Option<PathBuf>,

    #[serde(default)]
    pub block_file: Option<PathBuf>,

    #[serde(default, deserialize_with = "deserialize_umask")]
    pub umask: Option<u32>,

    #[serde(default)]
    pub can_make_tags: bool,

    #[serde(default, deserialize_with = "deserialize_cutoff")]
    pub ignore_older_than: Option<NaiveDate>,

    #[serde(default = "default_stale_lock_after", with = "humantime_serde")]
    pub stale_lock_after: Duration,

    #[serde(default)]
    pub notify: Option<NotifyConfig>,

    #[serde(default)]
    pub environments: HashMap<String, EnvironmentOverrides>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// argv of a command that reads the announcement on stdin.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentOverrides {
    #[serde(default)]
    pub block_file: Option<PathBuf>,

    #[serde(default, deserialize_with = "deserialize_umask")]
    pub umask: Option<u32>,

    #[serde(default)]
    pub can_make_tags: Option<bool>,

    #[serde(default)]
    pub notify: Option<NotifyConfig>,

    #[serde(default)]
    pub date_format: Option<String>,
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_hooks_dir() -> PathBuf {
    PathBuf::from("deploy")
}

fn default_stale_lock_after() -> Duration {
    Duration::from_secs(60 * 60)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: None,
            date_format: default_date_format(),
            remote: default_remote(),
            hooks_dir: default_hooks_dir(),
            deploy_file: None,
            block_file: None,
            umask: None,
            can_make_tags: false,
            ignore_older_than: None,
            stale_lock_after: default_stale_lock_after(),
            notify: None,
            environments: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            Error::Yaml(source) => Error::InvalidConfig(format!("{}: {}", path.display(), source)),
            other => other,
        })
    }

    /// First config file found under `dir`.
    pub fn find(dir: &Path) -> Option<PathBuf> {
        [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ]
        .into_iter()
        .find(|path| path.is_file())
    }

    /// Load the config of a deployment root; no config file means defaults.
    pub fn discover(dir: &Path) -> Result<Self> {
        match Self::find(dir) {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            None => Ok(Config::default()),
        }
    }

    /// Config with the overrides of `name` applied. Unknown names get the base config.
    pub fn for_environment(&self, name: &EnvName) -> Config {
        let mut merged = self.clone();
        let Some(overrides) = self.environments.get(name.as_str()) else {
            return merged;
        };

        if let Some(ref block_file) = overrides.block_file {
            merged.block_file = Some(block_file.clone());
        }
        if overrides.umask.is_some() {
            merged.umask = overrides.umask;
        }
        if let Some(can_make_tags) = overrides.can_make_tags {
            merged.can_make_tags = can_make_tags;
        }
        if overrides.notify.is_some() {
            merged.notify = overrides.notify.clone();
        }
        if let Some(ref date_format) = overrides.date_format {
            merged.date_format = date_format.clone();
        }

        merged
    }
}
