//! Widget configuration
//!
//! [`WidgetConfig`] is the programmatic contract between a host and [`crate::VizWidget`]. It is
//! supplied once and validated at construction: a missing mount target, a missing callback or
//! an empty API description fails fast with a [`ConfigError`] and nothing is initialized.

#![warn(clippy::all, rust_2018_idioms)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::app::bridge::{
    is_valid_bridge_timeout, BRIDGE_TIMEOUT, MAX_BRIDGE_TIMEOUT, MIN_BRIDGE_TIMEOUT,
};
use crate::app::history::{FileHistoryBackend, HistoryBackend, MemoryHistoryBackend};
use crate::app::sandbox::{RenderSurface, SurfaceRegistry};
use crate::app::widget::{CompletionProvider, DataFetcher, WidgetFault};

/// Default height of the render area in pixels
pub const DEFAULT_RENDER_HEIGHT: u32 = 600;

/// Color theme of the widget chrome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    /// Follow the host's preference
    #[default]
    Auto,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Auto => "auto",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "auto" => Ok(Theme::Auto),
            other => Err(ConfigError::InvalidTheme(other.to_string())),
        }
    }
}

/// Called with every runtime fault the widget enters the error state for
pub type FaultCallback = Arc<dyn Fn(&WidgetFault) + Send + Sync>;

/// Called with `(artifact, prompt)` when the UI exports a history entry
pub type PublishCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Where the widget renders
#[derive(Clone)]
pub enum MountTarget {
    /// A surface handed over directly
    Surface(Arc<dyn RenderSurface>),
    /// A surface looked up by name when the widget is created
    Named {
        name: String,
        registry: SurfaceRegistry,
    },
}

/// Configuration faults, all fatal at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MountTargetMissing,
    MountTargetNotFound(String),
    MissingCompletionProvider,
    MissingDataFetcher,
    EmptyApiDescription,
    InvalidRenderHeight(u32),
    InvalidBridgeTimeout(Duration),
    InvalidTheme(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MountTargetMissing => write!(f, "No mount target configured"),
            ConfigError::MountTargetNotFound(name) => {
                write!(f, "Mount target '{}' could not be resolved", name)
            }
            ConfigError::MissingCompletionProvider => {
                write!(f, "A completion provider is required")
            }
            ConfigError::MissingDataFetcher => write!(f, "A data fetcher is required"),
            ConfigError::EmptyApiDescription => write!(f, "The API description must not be empty"),
            ConfigError::InvalidRenderHeight(height) => {
                write!(f, "Render height must be positive, got {}", height)
            }
            ConfigError::InvalidBridgeTimeout(timeout) => write!(
                f,
                "Bridge timeout must be between {}s and {}s, got {:?}",
                MIN_BRIDGE_TIMEOUT.as_secs(),
                MAX_BRIDGE_TIMEOUT.as_secs(),
                timeout
            ),
            ConfigError::InvalidTheme(theme) => {
                write!(f, "Unknown theme '{}' (expected light, dark or auto)", theme)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Widget configuration as supplied by the host
///
/// Every field is optional at this level so hosts can assemble it incrementally;
/// [`WidgetConfig::validate`] decides what is actually required.
#[derive(Clone, Default)]
pub struct WidgetConfig {
    pub mount: Option<MountTarget>,
    pub api_description: String,
    pub completion: Option<Arc<dyn CompletionProvider>>,
    pub fetcher: Option<Arc<dyn DataFetcher>>,
    pub on_fault: Option<FaultCallback>,
    pub on_publish: Option<PublishCallback>,
    pub theme: Theme,
    pub style_class: Option<String>,
    pub render_height: Option<u32>,
    pub bridge_timeout: Option<Duration>,
    pub history_backend: Option<Arc<dyn HistoryBackend>>,
}

impl WidgetConfig {
    pub fn new(api_description: impl Into<String>) -> Self {
        Self {
            api_description: api_description.into(),
            ..Default::default()
        }
    }

    pub fn with_surface(mut self, surface: Arc<dyn RenderSurface>) -> Self {
        self.mount = Some(MountTarget::Surface(surface));
        self
    }

    pub fn with_named_surface(mut self, name: impl Into<String>, registry: &SurfaceRegistry) -> Self {
        self.mount = Some(MountTarget::Named {
            name: name.into(),
            registry: registry.clone(),
        });
        self
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionProvider>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn DataFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn on_fault(mut self, callback: impl Fn(&WidgetFault) + Send + Sync + 'static) -> Self {
        self.on_fault = Some(Arc::new(callback));
        self
    }

    pub fn on_publish(mut self, callback: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.on_publish = Some(Arc::new(callback));
        self
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_style_class(mut self, class: impl Into<String>) -> Self {
        self.style_class = Some(class.into());
        self
    }

    pub fn with_render_height(mut self, height: u32) -> Self {
        self.render_height = Some(height);
        self
    }

    pub fn with_bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = Some(timeout);
        self
    }

    pub fn with_history_backend(mut self, backend: Arc<dyn HistoryBackend>) -> Self {
        self.history_backend = Some(backend);
        self
    }

    /// Check every invariant and resolve the mount target
    pub fn validate(self) -> Result<ResolvedConfig, ConfigError> {
        let surface = match self.mount {
            None => return Err(ConfigError::MountTargetMissing),
            Some(MountTarget::Surface(surface)) => surface,
            Some(MountTarget::Named { name, registry }) => registry
                .resolve(&name)
                .ok_or(ConfigError::MountTargetNotFound(name))?,
        };

        let completion = self.completion.ok_or(ConfigError::MissingCompletionProvider)?;
        let fetcher = self.fetcher.ok_or(ConfigError::MissingDataFetcher)?;

        if self.api_description.trim().is_empty() {
            return Err(ConfigError::EmptyApiDescription);
        }

        let render_height = self.render_height.unwrap_or(DEFAULT_RENDER_HEIGHT);
        if render_height == 0 {
            return Err(ConfigError::InvalidRenderHeight(render_height));
        }

        let bridge_timeout = self.bridge_timeout.unwrap_or(BRIDGE_TIMEOUT);
        if !is_valid_bridge_timeout(bridge_timeout) {
            return Err(ConfigError::InvalidBridgeTimeout(bridge_timeout));
        }

        let history_backend = match self.history_backend {
            Some(backend) => backend,
            None => default_history_backend(),
        };

        Ok(ResolvedConfig {
            surface,
            api_description: self.api_description,
            completion,
            fetcher,
            on_fault: self.on_fault,
            on_publish: self.on_publish,
            theme: self.theme,
            style_class: self.style_class.filter(|class| !class.trim().is_empty()),
            render_height,
            bridge_timeout,
            history_backend,
        })
    }
}

fn default_history_backend() -> Arc<dyn HistoryBackend> {
    match FileHistoryBackend::default_location() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            log_warn!("No data directory for history, keeping it in memory: {:#}", e);
            Arc::new(MemoryHistoryBackend::default())
        }
    }
}

/// Configuration after validation; only the widget consumes this
pub struct ResolvedConfig {
    pub(crate) surface: Arc<dyn RenderSurface>,
    pub(crate) api_description: String,
    pub(crate) completion: Arc<dyn CompletionProvider>,
    pub(crate) fetcher: Arc<dyn DataFetcher>,
    pub(crate) on_fault: Option<FaultCallback>,
    pub(crate) on_publish: Option<PublishCallback>,
    pub(crate) theme: Theme,
    pub(crate) style_class: Option<String>,
    pub(crate) render_height: u32,
    pub(crate) bridge_timeout: Duration,
    pub(crate) history_backend: Arc<dyn HistoryBackend>,
}

impl ResolvedConfig {
    pub fn render_height(&self) -> u32 {
        self.render_height
    }

    pub fn bridge_timeout(&self) -> Duration {
        self.bridge_timeout
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }
}
