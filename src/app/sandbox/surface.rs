//! Render surfaces - where a sandboxed context physically lives
//!
//! A surface is the host's isolated execution area: an iframe in a browser embedding, a
//! webview window, or the in-process surface used by headless hosts. The sandbox mounts at
//! most one document on it at a time.

#![warn(clippy::all, rust_2018_idioms)]

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{SandboxContextId, SandboxDocument};
use crate::app::bridge::BridgeMessage;
use crate::app::config::Theme;

/// Host-side render area for sandboxed documents
///
/// Implementations must replace any existing content on [`RenderSurface::mount`], deliver
/// [`RenderSurface::post`] only to the named context, and route messages coming out of a
/// context back to the widget tagged with that context's id.
pub trait RenderSurface: Send + Sync {
    /// Activate a document, replacing whatever is mounted
    fn mount(&self, document: &SandboxDocument) -> anyhow::Result<()>;

    /// Deliver a host message into a mounted context
    fn post(&self, context: &SandboxContextId, message: &BridgeMessage) -> anyhow::Result<()>;

    /// Destroy a context, leaving the surface empty
    fn teardown(&self, context: &SandboxContextId);

    /// Restyle the surrounding chrome
    fn apply_theme(&self, _theme: Theme, _style_class: Option<&str>) {}
}

/// Named surfaces a host can mount widgets onto, e.g. `"#sales-chart"`
#[derive(Clone, Default)]
pub struct SurfaceRegistry {
    surfaces: Arc<RwLock<HashMap<String, Arc<dyn RenderSurface>>>>,
}

impl SurfaceRegistry {
    pub fn register(&self, name: impl Into<String>, surface: Arc<dyn RenderSurface>) {
        self.surfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), surface);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.surfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn RenderSurface>> {
        self.surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::sandbox::InProcessSurface;

    #[test]
    fn test_registry_resolves_registered_names() {
        let registry = SurfaceRegistry::default();
        registry.register("#b", Arc::new(InProcessSurface::new()));
        registry.register("#a", Arc::new(InProcessSurface::new()));

        assert!(registry.resolve("#a").is_some());
        assert!(registry.resolve("#missing").is_none());
        assert_eq!(registry.names(), vec!["#a".to_string(), "#b".to_string()]);

        assert!(registry.unregister("#a"));
        assert!(registry.resolve("#a").is_none());
    }
}
