use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Name of the per-user config file looked up in `$HOME`
pub const USER_CONFIG_FILE: &str = ".queuesnoop.json";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Network interface to capture from
    pub interface: String,

    /// Queue server port to capture traffic for
    pub port: u16,

    /// Bytes captured per packet
    pub snaplen: u32,

    /// Packets captured per host
    pub count: u64,

    /// Login used for ssh/scp, if different from the local user
    pub ssh_user: Option<String>,

    /// Directory on remote hosts where captures are written
    pub remote_dir: String,

    /// Directory where captures are stored locally (temporary directory if unset)
    pub output_dir: Option<PathBuf>,

    /// Host pipelines run concurrently
    pub jobs: usize,

    /// Percentiles reported when enqueue sizes are tracked
    pub percentiles: Vec<f64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interface: "any".to_string(),
            port: 22133,
            snaplen: 1500,
            count: 10000,
            ssh_user: None,
            remote_dir: "/tmp".to_string(),
            output_dir: None,
            jobs: 4,
            percentiles: vec![50.0, 90.0, 99.0],
        }
    }
}

impl AppConfig {
    /// Load configuration from an explicit path, or from `$HOME/.queuesnoop.json` if it exists.
    ///
    /// An explicit path must exist; a missing default file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => {
                    debug!("No user config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Parse a JSON config file
    pub fn from_file(path: &Path) -> AppResult<Self> {
        info!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(path)
            .map_err(|e| AppError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let config: AppConfig = serde_json::from_str(&text)
            .map_err(|e| AppError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(USER_CONFIG_FILE))
    }

    /// Reject values no capture could run with
    pub fn validate(&self) -> AppResult<()> {
        if self.jobs == 0 {
            return Err(AppError::ConfigError("jobs must be at least 1".to_string()));
        }
        if self.count == 0 {
            return Err(AppError::ConfigError("count must be at least 1".to_string()));
        }
        if self.interface.is_empty() {
            return Err(AppError::ConfigError("interface must not be empty".to_string()));
        }
        Ok(())
    }

    /// `user@host` when an ssh user is configured
    pub fn ssh_destination(&self, host: &str) -> String {
        match &self.ssh_user {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        }
    }
}
