use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::RomsiftError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub download: DownloadConfig,
    pub grid: GridConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the read-only catalog database. Empty = platform data dir.
    pub catalog_db: String,
    /// Path to the writable profile database. Empty = platform data dir.
    pub profile_db: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Mirror base URL; `{name}.zip` and `{name}/{disk}.chd` are appended.
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub page_size: u32,
}

impl AppConfig {
    /// Load config: user file (if exists), otherwise built-in defaults.
    pub fn load() -> Result<Self, RomsiftError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            let user_str = std::fs::read_to_string(&user_path)
                .map_err(|e| RomsiftError::Config(e.to_string()))?;
            toml::from_str(&user_str).map_err(|e| RomsiftError::Config(e.to_string()))
        } else {
            toml::from_str(DEFAULT_CONFIG).map_err(|e| RomsiftError::Config(e.to_string()))
        }
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), RomsiftError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RomsiftError::Config(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Resolved catalog database path.
    pub fn catalog_db_path(&self) -> PathBuf {
        if self.storage.catalog_db.is_empty() {
            Self::data_file("catalog.db")
        } else {
            PathBuf::from(&self.storage.catalog_db)
        }
    }

    /// Resolved profile database path, creating the data dir if needed.
    pub fn profile_db_path(&self) -> Result<PathBuf, RomsiftError> {
        let path = if self.storage.profile_db.is_empty() {
            Self::data_file("profiles.db")
        } else {
            PathBuf::from(&self.storage.profile_db)
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn data_file(name: &str) -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "romsift")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The compiled-in defaults must always deserialize; load() relies
    // on it when no user file exists.
    #[test]
    fn test_default_config_parses() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.grid.page_size, 100);
        assert_eq!(config.download.timeout_secs, 30);
        assert!(config.download.base_url.ends_with('/'));
    }

    #[test]
    fn test_roundtrip() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.grid.page_size, config.grid.page_size);
        assert_eq!(deserialized.download.base_url, config.download.base_url);
    }
}
