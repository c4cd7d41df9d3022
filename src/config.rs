use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::manifest::DEFAULT_MANIFEST_VERSION;

pub const DEFAULT_CONFIG_FILE: &str = "connector-builder.toml";
pub const ENV_MANIFEST_VERSION: &str = "CONNECTOR_BUILDER_MANIFEST_VERSION";
pub const ENV_LOG: &str = "CONNECTOR_BUILDER_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Version stamped on exported manifests.
    pub manifest_version: String,
    /// `tracing-subscriber` filter directive.
    pub log_filter: String,
    pub yaml: YamlSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YamlSettings {
    pub blank_line_between_sections: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manifest_version: DEFAULT_MANIFEST_VERSION.to_string(),
            log_filter: "warn".to_string(),
            yaml: YamlSettings::default(),
        }
    }
}

impl Default for YamlSettings {
    fn default() -> Self {
        Self {
            blank_line_between_sections: true,
        }
    }
}

impl Settings {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid settings")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("unable to read settings: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Loads `explicit` if given, else `connector-builder.toml` from the
    /// working directory when it exists, then applies environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        };
        let mut settings = match &path {
            Some(path) => {
                debug!(path = %path.display(), "loading settings");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok());
        Ok(settings)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(version) = lookup(ENV_MANIFEST_VERSION).filter(|v| !v.trim().is_empty()) {
            self.manifest_version = version;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let settings = Settings::from_toml_str("log_filter = \"debug\"\n").expect("parse");
        assert_eq!(settings.log_filter, "debug");
        assert_eq!(settings.manifest_version, DEFAULT_MANIFEST_VERSION);
        assert!(settings.yaml.blank_line_between_sections);
    }

    #[test]
    fn env_overrides_win_and_blank_values_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_env(|name| match name {
            ENV_MANIFEST_VERSION => Some("7.0.0".to_string()),
            ENV_LOG => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(settings.manifest_version, "7.0.0");
        assert_eq!(settings.log_filter, "warn");
    }
}
