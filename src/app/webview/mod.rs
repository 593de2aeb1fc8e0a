//! Webview render surface
//!
//! Hosts artifacts in a `wry` webview inside a `tao` window. The window owns the event loop,
//! so [`WebviewSurface`] only forwards surface operations to it as user events:
//!
//! ```text
//! VizWidget ─► WebviewSurface ─► EventLoopProxy ─► event loop ─► WebView::load_html(shell)
//!                                                              └► WebView::evaluate_script
//! framed document ─► shell ─► window.ipc.postMessage ─► ipc handler ─► on_message(context, raw)
//! ```
//!
//! Documents are loaded inside [`framed_shell`], so the sandbox policy applies as an iframe
//! `sandbox` attribute on top of the document's content policy. IPC messages are attributed
//! to the context stamped on them by the bridge script; unstamped messages and messages from
//! any context but the mounted one are dropped.

use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tao::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowBuilder,
};
use wry::WebViewBuilder;

use crate::app::bridge::BridgeMessage;
use crate::app::sandbox::{
    deliver_script, framed_shell, RenderSurface, SandboxContextId, SandboxDocument,
};

/// Operations forwarded to the window's event loop
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    Mount {
        context_id: SandboxContextId,
        html: String,
    },
    Post {
        context_id: SandboxContextId,
        script: String,
    },
    Teardown {
        context_id: SandboxContextId,
    },
    Exit,
}

/// Event loop carrying [`SurfaceEvent`]s
pub fn surface_event_loop() -> EventLoop<SurfaceEvent> {
    EventLoopBuilder::<SurfaceEvent>::with_user_event().build()
}

/// [`RenderSurface`] backed by a webview window
pub struct WebviewSurface {
    proxy: Mutex<EventLoopProxy<SurfaceEvent>>,
}

impl WebviewSurface {
    pub fn new(event_loop: &EventLoop<SurfaceEvent>) -> Self {
        Self {
            proxy: Mutex::new(event_loop.create_proxy()),
        }
    }

    fn send(&self, event: SurfaceEvent) -> Result<()> {
        self.proxy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send_event(event)
            .map_err(|_| anyhow!("Webview event loop has exited"))
    }

    /// Ask the window to close
    pub fn close(&self) {
        if self.send(SurfaceEvent::Exit).is_err() {
            tracing::debug!("Webview already closed");
        }
    }
}

impl RenderSurface for WebviewSurface {
    fn mount(&self, document: &SandboxDocument) -> Result<()> {
        self.send(SurfaceEvent::Mount {
            context_id: document.context_id.clone(),
            html: framed_shell(document),
        })
    }

    fn post(&self, context: &SandboxContextId, message: &BridgeMessage) -> Result<()> {
        self.send(SurfaceEvent::Post {
            context_id: context.clone(),
            script: deliver_script(message),
        })
    }

    fn teardown(&self, context: &SandboxContextId) {
        let event = SurfaceEvent::Teardown {
            context_id: context.clone(),
        };
        if let Err(e) = self.send(event) {
            tracing::debug!("Teardown of {} skipped: {}", context, e);
        }
    }
}

/// Open the window and run the event loop until it closes
///
/// `on_message` receives every raw IPC message sent by the mounted context, together with
/// that context's id. Never returns on success.
pub fn run_webview<F>(event_loop: EventLoop<SurfaceEvent>, title: &str, on_message: F) -> Result<()>
where
    F: Fn(SandboxContextId, String) + 'static,
{
    tracing::info!("Opening webview window '{}'", title);

    let window = WindowBuilder::new()
        .with_title(title)
        .build(&event_loop)
        .context("Failed to create webview window")?;

    let current: Arc<Mutex<Option<SandboxContextId>>> = Arc::new(Mutex::new(None));
    let ipc_context = current.clone();

    let builder = WebViewBuilder::new()
        .with_html("")
        .with_ipc_handler(move |request: wry::http::Request<String>| {
            let raw = request.body();
            let Some(sender) = SandboxContextId::stamped_on(raw) else {
                tracing::debug!("Unstamped IPC message dropped");
                return;
            };
            let is_mounted = ipc_context
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                == Some(&sender);
            if is_mounted {
                on_message(sender, raw.clone());
            } else {
                tracing::debug!("IPC message from replaced context {} dropped", sender);
            }
        });

    #[cfg(any(
        target_os = "windows",
        target_os = "macos",
        target_os = "ios",
        target_os = "android"
    ))]
    let webview = builder.build(&window)?;

    #[cfg(not(any(
        target_os = "windows",
        target_os = "macos",
        target_os = "ios",
        target_os = "android"
    )))]
    let webview = {
        use tao::platform::unix::WindowExtUnix;
        use wry::WebViewBuilderExtUnix;
        let vbox = window
            .default_vbox()
            .context("Window has no GTK container")?;
        builder.build_gtk(vbox)?
    };

    tracing::info!("Webview ready");

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        match event {
            Event::UserEvent(SurfaceEvent::Mount { context_id, html }) => {
                tracing::debug!("Loading context {} ({} bytes)", context_id, html.len());
                *current.lock().unwrap_or_else(PoisonError::into_inner) = Some(context_id);
                if let Err(e) = webview.load_html(&html) {
                    tracing::warn!("Failed to load artifact: {}", e);
                }
            }
            Event::UserEvent(SurfaceEvent::Post { context_id, script }) => {
                let is_current = current
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_ref()
                    == Some(&context_id);
                if !is_current {
                    return;
                }
                if let Err(e) = webview.evaluate_script(&script) {
                    tracing::warn!("Failed to post bridge message: {}", e);
                }
            }
            Event::UserEvent(SurfaceEvent::Teardown { context_id }) => {
                let mut mounted = current.lock().unwrap_or_else(PoisonError::into_inner);
                if mounted.as_ref() == Some(&context_id) {
                    *mounted = None;
                    if let Err(e) = webview.load_html("") {
                        tracing::warn!("Failed to clear webview: {}", e);
                    }
                }
            }
            Event::UserEvent(SurfaceEvent::Exit)
            | Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                tracing::info!("Webview window closing");
                *control_flow = ControlFlow::Exit;
            }
            _ => {}
        }
    });
}
