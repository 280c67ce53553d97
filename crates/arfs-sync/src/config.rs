//! Where snapshots live on disk.
//!
//! `--state-dir` or `ARFS_STATE_DIR` wins; otherwise the platform data
//! directory (e.g. `~/.local/share/arfs-sync`).

use std::path::PathBuf;

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "ARFS_STATE_DIR";

/// Directory name used under the platform data directory.
const APP_DIR: &str = "arfs-sync";

/// Runtime configuration for the native store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one snapshot file per drive
    pub state_dir: PathBuf,
}

impl Config {
    /// Use `state_dir` if given (supports ~ for home directory), otherwise
    /// the platform data directory.
    pub fn resolve(state_dir: Option<&str>) -> Result<Self, ConfigError> {
        let state_dir = match state_dir {
            Some(path) if !path.trim().is_empty() => expand_tilde(path.trim()),
            _ => default_state_dir()?,
        };
        Ok(Self { state_dir })
    }
}

fn default_state_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or(ConfigError::NoDataDir)
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No platform data directory found; set {STATE_DIR_ENV} or pass --state-dir")]
    NoDataDir,
}
