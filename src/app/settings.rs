//! Widget settings file
//!
//! Optional TOML file with presentation and storage settings. Every key has a default, so a
//! partial file (or no file at all) is fine:
//!
//! ```toml
//! theme = "dark"
//! style_class = "dashboard"
//! render_height = 800
//! bridge_timeout_secs = 30
//! history_file = "/var/lib/apiviz/history.json"
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::app::bridge::{is_valid_bridge_timeout, BRIDGE_TIMEOUT};
use crate::app::config::{Theme, WidgetConfig, DEFAULT_RENDER_HEIGHT};
use crate::app::history::FileHistoryBackend;

/// File name inside the config directory
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSettings {
    pub theme: Theme,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_class: Option<String>,
    pub render_height: u32,
    pub bridge_timeout_secs: u64,
    /// Overrides the default history location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_file: Option<PathBuf>,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            style_class: None,
            render_height: DEFAULT_RENDER_HEIGHT,
            bridge_timeout_secs: BRIDGE_TIMEOUT.as_secs(),
            history_file: None,
        }
    }
}

impl WidgetSettings {
    /// `<config dir>/apiviz/settings.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "", "apiviz").map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid settings file {:?}", path))
    }

    /// Load `path` (or the default location); a missing or unreadable file yields defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Self::default(),
            },
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::load(&path) {
            Ok(settings) => {
                log_debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                log_warn!("Using default settings: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, content).with_context(|| format!("Failed to write settings file {:?}", path))
    }

    /// Configured bridge wait; an out-of-range value falls back to [`BRIDGE_TIMEOUT`]
    pub fn bridge_timeout(&self) -> Duration {
        let timeout = Duration::from_secs(self.bridge_timeout_secs);
        if is_valid_bridge_timeout(timeout) {
            timeout
        } else {
            log_warn!(
                "Ignoring bridge_timeout_secs = {}, using {}s",
                self.bridge_timeout_secs,
                BRIDGE_TIMEOUT.as_secs()
            );
            BRIDGE_TIMEOUT
        }
    }

    /// Layer these settings onto `config`
    pub fn apply(&self, config: WidgetConfig) -> WidgetConfig {
        let mut config = config
            .with_theme(self.theme)
            .with_render_height(self.render_height)
            .with_bridge_timeout(self.bridge_timeout());
        if let Some(class) = &self.style_class {
            config = config.with_style_class(class.clone());
        }
        if let Some(history_file) = &self.history_file {
            config = config.with_history_backend(Arc::new(FileHistoryBackend::new(history_file)));
        }
        config
    }
}
