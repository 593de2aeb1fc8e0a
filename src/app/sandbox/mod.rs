//! Render Sandbox
//!
//! Owns exactly one isolated execution context at a time on a host-supplied
//! [`RenderSurface`]. Every render:
//! 1. sanitizes the generator output (code fences stripped, whitespace trimmed)
//! 2. rejects blank output
//! 3. injects the bridge script ahead of any generated script, stamped with a fresh
//!    context id
//! 4. injects [`CONTENT_SECURITY_POLICY`] at the top of the document
//! 5. tears down the previous context and mounts the new document under that id
//!
//! Clearing tears the surface down to empty rather than hiding it.

#![warn(clippy::all, rust_2018_idioms)]

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::app::bridge::{bridge_script_tag, BridgeMessage, CONTEXT_STAMP_FIELD};
use crate::app::config::Theme;

mod in_process;
mod shell;
mod surface;

pub use in_process::{InProcessSurface, SandboxOutbound};
pub use shell::{deliver_script, framed_shell};
pub use surface::{RenderSurface, SurfaceRegistry};

/// Capabilities granted to the sandboxed document: scripts only. Same-origin access,
/// storage, forms, popups and top-level navigation are all denied.
pub const SANDBOX_POLICY: &str = "allow-scripts";

/// Content policy every mounted document carries
///
/// Inline and CDN scripts and styles may load; network APIs (`fetch`, XHR, WebSockets,
/// beacons), forms, frames and remote images are refused, leaving `fetchData` as the only
/// way out.
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; \
script-src 'unsafe-inline' 'unsafe-eval' https:; \
style-src 'unsafe-inline' https:; \
img-src data: blob:; \
font-src data:; \
connect-src 'none'; \
frame-src 'none'; \
form-action 'none'; \
base-uri 'none'";

static LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```[ \t]*(?:html)?[ \t]*(?:\r?\n|$)").expect("valid regex"));
static TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```\s*$").expect("valid regex"));
static HEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head\s*>").expect("valid regex"));
static BODY_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<body(?:\s[^>]*)?>").expect("valid regex"));
static HEAD_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("valid regex"));
static HTML_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<html(?:\s[^>]*)?>").expect("valid regex"));
static DOCTYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^<!doctype[^>]*>").expect("valid regex"));

/// Strip a leading fence (optionally tagged `html`) and a trailing fence, then trim
///
/// Idempotent: a clean artifact comes back unchanged.
pub fn sanitize_artifact(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_leading = LEADING_FENCE.replace(trimmed, "");
    let without_trailing = TRAILING_FENCE.replace(&without_leading, "");
    without_trailing.trim().to_string()
}

/// Insert `script` before the first `</head>`, else after the first `<body>` tag, else in
/// front of the whole document
pub fn inject_bridge(artifact: &str, script: &str) -> String {
    let insert_at = HEAD_CLOSE
        .find(artifact)
        .map(|m| m.start())
        .or_else(|| BODY_OPEN.find(artifact).map(|m| m.end()));

    match insert_at {
        Some(index) => {
            let mut document = String::with_capacity(artifact.len() + script.len());
            document.push_str(&artifact[..index]);
            document.push_str(script);
            document.push_str(&artifact[index..]);
            document
        }
        None => format!("{}{}", script, artifact),
    }
}

/// Insert the [`CONTENT_SECURITY_POLICY`] meta element after the opening `<head>`, else after
/// the opening `<html>`, else after a leading doctype, else in front of the whole document
pub fn inject_policy(document: &str) -> String {
    let meta = format!(
        "<meta http-equiv=\"Content-Security-Policy\" content=\"{}\">",
        CONTENT_SECURITY_POLICY
    );
    let insert_at = HEAD_OPEN
        .find(document)
        .or_else(|| HTML_OPEN.find(document))
        .or_else(|| DOCTYPE.find(document))
        .map(|m| m.end());

    match insert_at {
        Some(index) => format!("{}{}{}", &document[..index], meta, &document[index..]),
        None => format!("{}{}", meta, document),
    }
}

/// The document a surface mounts for a sanitized `artifact`: bridge stamped with `context`,
/// then the content policy
pub fn build_document(artifact: &str, context: &SandboxContextId, bridge_timeout: Duration) -> String {
    inject_policy(&inject_bridge(artifact, &bridge_script_tag(bridge_timeout, context)))
}

/// Identity of one mounted context; bridge messages are only accepted from the current one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxContextId(String);

impl SandboxContextId {
    pub fn generate() -> Self {
        Self(format!("ctx_{}", Uuid::new_v4().simple()))
    }

    /// Wrap an id reported back by a surface
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Context a raw bridge message was stamped with by the injected script
    pub fn stamped_on(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        value
            .get(CONTEXT_STAMP_FIELD)?
            .as_str()
            .map(Self::from_raw)
    }
}

impl fmt::Display for SandboxContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a surface needs to activate one context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxDocument {
    pub context_id: SandboxContextId,
    /// Artifact with the bridge already injected
    pub html: String,
    /// Render area height in pixels
    pub height: u32,
    /// Sandbox attribute set, see [`SANDBOX_POLICY`]
    pub policy: &'static str,
    /// Wait bound the injected bridge uses for data requests
    pub bridge_timeout: Duration,
}

/// Why a render did not happen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Nothing left after sanitizing
    EmptyArtifact,
    /// The surface refused the document
    Surface(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::EmptyArtifact => write!(f, "Generated artifact is empty"),
            RenderError::Surface(msg) => write!(f, "Render surface failed: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

/// A successfully mounted artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub context_id: SandboxContextId,
    /// Sanitized artifact, without the bridge
    pub artifact: String,
}

/// Single-context owner of a render surface
pub struct RenderSandbox {
    surface: Arc<dyn RenderSurface>,
    active: Option<SandboxContextId>,
    render_height: u32,
    bridge_timeout: Duration,
}

impl RenderSandbox {
    pub fn new(surface: Arc<dyn RenderSurface>, render_height: u32, bridge_timeout: Duration) -> Self {
        Self {
            surface,
            active: None,
            render_height,
            bridge_timeout,
        }
    }

    /// Sanitize, inject and mount `raw`, replacing whatever was mounted before
    ///
    /// Blank output is rejected before anything is torn down.
    pub fn render(&mut self, raw: &str) -> Result<RenderedArtifact, RenderError> {
        let artifact = sanitize_artifact(raw);
        if artifact.is_empty() {
            return Err(RenderError::EmptyArtifact);
        }

        let context_id = SandboxContextId::generate();
        let html = build_document(&artifact, &context_id, self.bridge_timeout);
        self.teardown();

        let document = SandboxDocument {
            context_id,
            html,
            height: self.render_height,
            policy: SANDBOX_POLICY,
            bridge_timeout: self.bridge_timeout,
        };
        self.surface
            .mount(&document)
            .map_err(|e| RenderError::Surface(format!("{:#}", e)))?;

        trace_debug!(
            "Mounted context {} ({} bytes)",
            document.context_id,
            document.html.len()
        );
        self.active = Some(document.context_id.clone());

        Ok(RenderedArtifact {
            context_id: document.context_id,
            artifact,
        })
    }

    /// Tear the surface down to empty
    pub fn clear(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(context) = self.active.take() {
            trace_debug!("Tearing down context {}", context);
            self.surface.teardown(&context);
        }
    }

    pub fn active_context(&self) -> Option<&SandboxContextId> {
        self.active.as_ref()
    }

    /// Whether `origin` is the context this sandbox currently owns
    pub fn is_current(&self, origin: &SandboxContextId) -> bool {
        self.active.as_ref() == Some(origin)
    }

    /// Send a host message into the current context; messages for other contexts are dropped
    pub fn post(&self, origin: &SandboxContextId, message: &BridgeMessage) -> anyhow::Result<bool> {
        if !self.is_current(origin) {
            return Ok(false);
        }
        self.surface.post(origin, message)?;
        Ok(true)
    }

    pub fn apply_theme(&self, theme: Theme, style_class: Option<&str>) {
        self.surface.apply_theme(theme, style_class);
    }
}
