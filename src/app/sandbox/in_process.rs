//! In-process render surface
//!
//! Hosts a context without a browser engine: the "sandboxed code" is whatever Rust holds the
//! context's [`BridgeClient`]. Headless hosts use it to drive generated dashboards through
//! the same bridge a webview uses, and the test suite uses it to observe mounts.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::anyhow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::{RenderSurface, SandboxContextId, SandboxDocument};
use crate::app::bridge::{BridgeClient, BridgeMessage};
use crate::app::config::Theme;

/// Sandbox-to-host message stream of one mounted context
pub struct SandboxOutbound {
    pub context_id: SandboxContextId,
    pub receiver: mpsc::UnboundedReceiver<BridgeMessage>,
}

struct MountedContext {
    document: SandboxDocument,
    client: Arc<BridgeClient>,
}

#[derive(Default)]
struct SurfaceState {
    mounted: Option<MountedContext>,
    outbound: Option<SandboxOutbound>,
    mount_count: usize,
    theme: Option<(Theme, Option<String>)>,
}

/// Surface whose contexts run in the host process
#[derive(Default)]
pub struct InProcessSurface {
    state: Mutex<SurfaceState>,
}

impl InProcessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bridge client of the mounted context
    pub fn client(&self) -> Option<Arc<BridgeClient>> {
        self.lock().mounted.as_ref().map(|m| m.client.clone())
    }

    /// Document of the mounted context
    pub fn document(&self) -> Option<SandboxDocument> {
        self.lock().mounted.as_ref().map(|m| m.document.clone())
    }

    /// Take the message stream of the mounted context, once per mount
    pub fn take_outbound(&self) -> Option<SandboxOutbound> {
        self.lock().outbound.take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().mounted.is_none()
    }

    /// Number of documents mounted over the surface's lifetime
    pub fn mount_count(&self) -> usize {
        self.lock().mount_count
    }

    pub fn theme(&self) -> Option<(Theme, Option<String>)> {
        self.lock().theme.clone()
    }
}

impl RenderSurface for InProcessSurface {
    fn mount(&self, document: &SandboxDocument) -> anyhow::Result<()> {
        let (client, receiver) = BridgeClient::channel(document.bridge_timeout);
        let mut state = self.lock();

        if let Some(previous) = state.mounted.take() {
            previous.client.close();
        }
        state.mounted = Some(MountedContext {
            document: document.clone(),
            client: Arc::new(client),
        });
        state.outbound = Some(SandboxOutbound {
            context_id: document.context_id.clone(),
            receiver,
        });
        state.mount_count += 1;
        Ok(())
    }

    fn post(&self, context: &SandboxContextId, message: &BridgeMessage) -> anyhow::Result<()> {
        let client = {
            let state = self.lock();
            match state.mounted.as_ref() {
                Some(mounted) if &mounted.document.context_id == context => mounted.client.clone(),
                _ => return Err(anyhow!("Context {} is not mounted", context)),
            }
        };
        client.deliver(message.clone());
        Ok(())
    }

    fn teardown(&self, context: &SandboxContextId) {
        let mut state = self.lock();
        let is_mounted = state
            .mounted
            .as_ref()
            .is_some_and(|m| &m.document.context_id == context);
        if is_mounted {
            if let Some(mounted) = state.mounted.take() {
                mounted.client.close();
            }
            state.outbound = None;
        }
    }

    fn apply_theme(&self, theme: Theme, style_class: Option<&str>) {
        self.lock().theme = Some((theme, style_class.map(str::to_string)));
    }
}
