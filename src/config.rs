//! Configuration
//!
//! Settings live in `<config_dir>/prompt-gallery/config.toml`. Every field is
//! optional; anything missing falls back to its default. A malformed file is
//! reported and ignored.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::state::view::PAGE_SIZE;

/// Directory name used under the platform config/data directories
pub const APP_DIR: &str = "prompt-gallery";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the catalog database lives
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Name of the storage slot holding the entries
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Entries per page in listings
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Where exported files are written
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Give up on remote image fetches after this many seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

fn default_storage_key() -> String {
    "prompt-gallery-entries".to_string()
}

fn default_page_size() -> usize {
    PAGE_SIZE
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage_key: default_storage_key(),
            page_size: default_page_size(),
            export_dir: default_export_dir(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Default location of the config file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push(APP_DIR);
            path.push("config.toml");
            path
        })
    }

    /// Load from `path` (or the default location), falling back to defaults
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::config_path() {
                Some(p) => p,
                None => return Self::default(),
            },
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read config, using defaults");
                return Self::default();
            }
        };

        match Self::from_toml(&text) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed config, using defaults");
                Self::default()
            }
        }
    }

    /// Parse a config document; a zero page size is replaced by the default
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let mut config: AppConfig = toml::from_str(text)?;
        if config.page_size == 0 {
            config.page_size = PAGE_SIZE;
        }
        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = AppConfig::from_toml("page_size = 24\nstorage_key = \"test\"\n").unwrap();
        assert_eq!(config.page_size, 24);
        assert_eq!(config.storage_key, "test");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_zero_page_size_falls_back() {
        assert_eq!(AppConfig::from_toml("page_size = 0").unwrap().page_size, PAGE_SIZE);
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.toml");
        assert_eq!(AppConfig::load(Some(&missing)), AppConfig::default());

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "page_size = \"many\"").unwrap();
        assert_eq!(AppConfig::load(Some(&broken)), AppConfig::default());

        let good = dir.path().join("good.toml");
        fs::write(&good, "export_dir = \"/tmp/out\"").unwrap();
        assert_eq!(AppConfig::load(Some(&good)).export_dir, PathBuf::from("/tmp/out"));
    }
}
