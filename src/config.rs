//! Persisted user preferences.
//!
//! Stored as TOML under the platform config directory
//! (`~/.config/fleetforge/config.toml` on Linux). Every field is optional;
//! command-line flags override whatever is stored here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings that survive between invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Root directory of the orchestration agent installation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_path: Option<String>,
    /// Object-storage bucket used for location references and uploads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Directory of user templates shadowing the built-in ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<String>,
    /// Publish endpoint used by `--upload` when `--to` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Preferences {
    /// Location of the preferences file, when a config dir exists at all.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fleetforge").join("config.toml"))
    }

    /// Load from the default location. Missing or unparseable files fall back
    /// to defaults; a parse failure is logged, never fatal.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(raw) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!("ignoring malformed preferences at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let rendered = toml::to_string_pretty(self).context("failed to serialize preferences")?;
        fs::write(path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Root path with `~` expanded, when configured.
    pub fn expanded_root_path(&self) -> Option<String> {
        self.root_path.as_deref().map(expand)
    }

    /// Template directory with `~` expanded, when configured.
    pub fn expanded_template_dir(&self) -> Option<PathBuf> {
        self.template_dir.as_deref().map(|d| PathBuf::from(expand(d)))
    }
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}
