use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

/// Base URL of the hosted location-data service, used when none is
/// configured.
pub const DEFAULT_SERVICE_URL: &str = "https://crio-location-selector.onrender.com";

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Base URL of the location service; the hosted instance when unset.
    pub service_url: Option<String>,

    /// Optional per-request timeout in seconds. A fetch with no timeout that
    /// never resolves leaves its level loading indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// The service base URL to use, falling back to the hosted instance.
    pub fn service_url(&self) -> &str {
        self.service_url.as_deref().unwrap_or(DEFAULT_SERVICE_URL)
    }

    pub fn set_service_url(&mut self, url: Option<String>) {
        self.service_url = url;
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn set_request_timeout_secs(&mut self, secs: Option<u64>) {
        self.request_timeout_secs = secs;
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "location-picker", "location-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
