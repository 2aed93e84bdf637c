use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const CONFIG_ENV: &str = "BATCH_RENAMER_CONFIG";

/// Persisted preferences: the last root folder and default extension filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub last_folder: Option<PathBuf>,
    #[serde(default)]
    pub exclude_exts: Vec<String>,
}

impl AppConfig {
    /// `$BATCH_RENAMER_CONFIG` if set, else `<config dir>/batch_renamer/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        if let Some(raw) = std::env::var_os(CONFIG_ENV) {
            if !raw.is_empty() {
                return Some(PathBuf::from(raw));
            }
        }
        dirs::config_dir().map(|d| d.join("batch_renamer").join("config.toml"))
    }

    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Falls back to defaults on a missing or unreadable file.
    pub fn load_from(path: &Path) -> Self {
        let Ok(contents) = fs::read_to_string(path) else {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring malformed config");
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Err(err) = self.save_to(&path) {
            let message = format!("{err:#}");
            warn!(error = %message, "failed to save config");
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, text)
            .with_context(|| format!("failed to write config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let config = AppConfig::load_from(&dir.path().join("nope.toml"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn save_then_load_keeps_last_folder() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let config = AppConfig {
            last_folder: Some(PathBuf::from("/photos/2024")),
            exclude_exts: vec!["xml".to_string()],
        };
        config.save_to(&path).expect("save config");
        assert_eq!(AppConfig::load_from(&path), config);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "last_folder = [").expect("write");
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn exclude_exts_is_optional() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "last_folder = \"/data\"\n").expect("write");
        let config = AppConfig::load_from(&path);
        assert_eq!(config.last_folder, Some(PathBuf::from("/data")));
        assert!(config.exclude_exts.is_empty());
    }
}
