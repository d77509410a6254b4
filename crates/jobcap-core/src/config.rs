//! Runner configuration: file, environment and computed defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capacity::{CapacityHint, local_cpus};
use crate::error::{Result, RunnerError};

/// Environment variable overriding the concurrency cap.
pub const ENV_MAX_PARALLEL: &str = "MAX_PARALLEL";

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Explicit concurrency cap. Takes precedence over every computed value.
    pub max_parallel: Option<usize>,
    /// Whether to ask the docker daemon for its CPU count
    pub probe_docker: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            probe_docker: true,
        }
    }
}

/// Parse a concurrency override. Only positive integers are accepted.
pub fn parse_max_parallel(value: &str) -> Option<usize> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|num| *num > 0)
}

/// Returns the value of the environment variable if it is non-empty, otherwise `default`.
pub fn env_or(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_owned(),
    }
}

impl RunnerConfig {
    /// Get the default config directory path (`~/.jobcap`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| RunnerError::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".jobcap"))
    }

    /// Get the default config file path (`~/.jobcap/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, falling back to defaults when absent.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load_or_default() -> Result<Self> {
        let Ok(config_path) = Self::config_path() else {
            return Ok(Self::default());
        };

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|error| {
            RunnerError::Config(format!("Failed to read config {}: {error}", path.display()))
        })?;
        let config: Self = toml::from_str(&contents)?;

        if config.max_parallel == Some(0) {
            return Err(RunnerError::Config(
                "max_parallel must be a positive integer".to_owned(),
            ));
        }

        tracing::debug!(
            "Loaded config from {:?}: max_parallel={:?}, probe_docker={}",
            path,
            config.max_parallel,
            config.probe_docker
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                RunnerError::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| RunnerError::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# jobcap configuration\n\
                      # max_parallel overrides the computed concurrency cap\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| RunnerError::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Apply `MAX_PARALLEL` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| env::var(name).ok())
    }

    /// Apply overrides using the given variable lookup.
    ///
    /// Unset, unparsable or non-positive values leave the config untouched.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_PARALLEL) {
            match parse_max_parallel(&raw) {
                Some(num) => self.max_parallel = Some(num),
                None => tracing::warn!("Ignoring invalid {ENV_MAX_PARALLEL}={raw:?}"),
            }
        }
        self
    }

    /// Whether an external hint would influence the cap at all.
    pub fn wants_hint(&self) -> bool {
        self.max_parallel.is_none() && self.probe_docker
    }

    /// Compute the concurrency cap on this machine.
    pub fn resolve_capacity(&self, hint: Option<CapacityHint>) -> usize {
        self.resolve_capacity_with(local_cpus(), hint)
    }

    /// Compute the concurrency cap given the local processor count.
    ///
    /// An explicit override wins. Otherwise the smaller of the local count and the
    /// hint is used, and the local count alone when no hint is available.
    pub fn resolve_capacity_with(&self, local: usize, hint: Option<CapacityHint>) -> usize {
        if let Some(num) = self.max_parallel.filter(|num| *num > 0) {
            return num;
        }

        let local = local.max(1);
        match hint {
            Some(hint) if hint.cpus > 0 => local.min(hint.cpus),
            _ => local,
        }
    }
}
