//! Visualization Widget
//!
//! [`VizWidget`] composes the session machine, prompt builder, render sandbox and history
//! store into the public object a host embeds.
//!
//! # Flow
//!
//! ```text
//! set_input ─► generate_visualization
//!                 │ begin_generation (fresh | improvement)
//!                 ▼
//!              prompt ─► CompletionProvider::complete ─► (stale? drop)
//!                                                           │
//!                      RenderSandbox::render ◄──────────────┘
//!                         │ ok: displaying + history      │ blank/failed: error + on_fault
//!                         ▼
//!              sandbox ── API_REQUEST ──► handle_message ─► DataFetcher::fetch
//!                      ◄─ API_RESPONSE ──┘
//!                      ── IFRAME_ERROR ─► error + on_fault
//! ```
//!
//! Every public operation resolves normally; faults are reported through state, the status
//! line, widget events and the optional fault callback. The widget lock is never held across
//! a host call.

#![warn(clippy::all, rust_2018_idioms)]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::app::api_overview::ApiOverview;
use crate::app::bridge::BridgeMessage;
use crate::app::config::{ConfigError, FaultCallback, PublishCallback, Theme, WidgetConfig};
use crate::app::history::{HistoryEntry, HistoryStore};
use crate::app::prompts::{build_fresh_prompt, build_improvement_prompt};
use crate::app::sandbox::{RenderError, RenderSandbox, SandboxContextId, SandboxOutbound};
use crate::app::session::{
    ConversationContext, GenerationMode, PendingGeneration, SessionMachine, SessionState,
};

pub mod events;
pub mod fault;
pub mod host;

pub use events::{StatusLevel, StatusMessage, WidgetEvent, EVENT_CHANNEL_CAPACITY};
pub use fault::WidgetFault;
pub use host::{completion_fn, fetcher_fn, CompletionProvider, DataFetcher};

/// Mutable per-widget state, guarded by one lock
struct WidgetInner {
    session: SessionMachine,
    sandbox: RenderSandbox,
    history: HistoryStore,
    input: String,
    status: Option<StatusMessage>,
    theme: Theme,
    style_class: Option<String>,
    destroyed: bool,
}

struct WidgetShared {
    api_description: String,
    overview: Option<ApiOverview>,
    completion: Arc<dyn CompletionProvider>,
    fetcher: Arc<dyn DataFetcher>,
    on_fault: Option<FaultCallback>,
    on_publish: Option<PublishCallback>,
    events: broadcast::Sender<WidgetEvent>,
    shutdown: CancellationToken,
    inner: Mutex<WidgetInner>,
}

/// Embeddable visualization widget
///
/// Cheap to clone; clones are handles to the same widget. Separate `create` calls produce
/// fully independent widgets.
#[derive(Clone)]
pub struct VizWidget {
    shared: Arc<WidgetShared>,
}

impl VizWidget {
    /// Validate `config` and initialize the widget
    ///
    /// Fails without touching the surface or the history store if the configuration is
    /// incomplete.
    pub fn create(config: WidgetConfig) -> Result<Self, ConfigError> {
        let resolved = config.validate()?;

        let history = HistoryStore::load(resolved.history_backend.clone());
        let overview = ApiOverview::parse(&resolved.api_description);
        if overview.is_none() {
            trace_debug!("API description has no endpoint overview");
        }

        let sandbox = RenderSandbox::new(
            resolved.surface.clone(),
            resolved.render_height,
            resolved.bridge_timeout,
        );
        sandbox.apply_theme(resolved.theme, resolved.style_class.as_deref());

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        log_info!(
            "Visualization widget created ({} history entries, render height {}px)",
            history.len(),
            resolved.render_height
        );

        Ok(Self {
            shared: Arc::new(WidgetShared {
                api_description: resolved.api_description,
                overview,
                completion: resolved.completion,
                fetcher: resolved.fetcher,
                on_fault: resolved.on_fault,
                on_publish: resolved.on_publish,
                events,
                shutdown: CancellationToken::new(),
                inner: Mutex::new(WidgetInner {
                    session: SessionMachine::new(),
                    sandbox,
                    history,
                    input: String::new(),
                    status: None,
                    theme: resolved.theme,
                    style_class: resolved.style_class,
                    destroyed: false,
                }),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, WidgetInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: WidgetEvent) {
        // No subscribers is not an error
        let _ = self.shared.events.send(event);
    }

    fn emit_state(&self, from: SessionState, to: SessionState) {
        if from != to {
            trace_debug!("Widget state {} -> {}", from, to);
            self.emit(WidgetEvent::StateChanged { from, to });
        }
    }

    fn set_status(&self, inner: &mut WidgetInner, status: Option<StatusMessage>) {
        if inner.status != status {
            inner.status = status.clone();
            self.emit(WidgetEvent::Status(status));
        }
    }

    fn emit_history(&self, inner: &WidgetInner) {
        self.emit(WidgetEvent::HistoryChanged {
            len: inner.history.len(),
            active: inner.session.active_entry(),
        });
    }

    /// Log and hand a fault to the host; the widget lock must not be held
    fn report_fault(&self, fault: &WidgetFault) {
        log_error!("Widget fault ({}): {}", fault.kind(), fault);
        if let Some(callback) = &self.shared.on_fault {
            callback(fault);
        }
    }

    // ========== Session operations ==========

    /// Replace the pending user text
    pub fn set_input(&self, text: impl Into<String>) {
        self.lock().input = text.into();
    }

    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    /// Generate from the current input
    ///
    /// Blank input and calls made while a generation is in flight only update the status.
    pub async fn generate_visualization(&self) {
        let input = self.input();
        self.run_generation(&input).await;
    }

    /// Repeat the most recent request
    pub async fn retry(&self) {
        let last_request = self.lock().session.last_request().map(str::to_string);
        match last_request {
            Some(request) => self.run_generation(&request).await,
            None => {
                let mut inner = self.lock();
                self.set_status(&mut inner, Some(StatusMessage::warning("Nothing to retry yet")));
            }
        }
    }

    async fn run_generation(&self, request: &str) {
        let Some((pending, prompt)) = self.begin(request) else {
            return;
        };

        log_info!(
            "Requesting {:?} generation ({} prompt bytes)",
            pending.mode,
            prompt.len()
        );
        let outcome = self.shared.completion.complete(&prompt).await;

        if let Some(fault) = self.finish(&pending, outcome) {
            self.report_fault(&fault);
        }
    }

    /// Accept `request` and build its prompt, or explain on the status line why not
    fn begin(&self, request: &str) -> Option<(PendingGeneration, String)> {
        let mut inner = self.lock();
        if inner.destroyed {
            return None;
        }

        let before = inner.session.state();
        let pending = match inner.session.begin_generation(request) {
            Ok(pending) => pending,
            Err(rejection) => {
                trace_debug!("Submission rejected: {}", rejection);
                self.set_status(&mut inner, Some(StatusMessage::warning(rejection.to_string())));
                return None;
            }
        };

        let prompt = match pending.mode {
            GenerationMode::Fresh => build_fresh_prompt(&pending.request, &self.shared.api_description),
            GenerationMode::Improvement => build_improvement_prompt(
                &pending.request,
                &self.shared.api_description,
                inner.session.context(),
            ),
        };

        self.emit_state(before, inner.session.state());
        let status = match pending.mode {
            GenerationMode::Fresh => "Generating visualization...",
            GenerationMode::Improvement => "Improving visualization...",
        };
        self.set_status(&mut inner, Some(StatusMessage::info(status)));

        Some((pending, prompt))
    }

    /// Apply a completion outcome; returns the fault to report, if any
    fn finish(
        &self,
        pending: &PendingGeneration,
        outcome: anyhow::Result<String>,
    ) -> Option<WidgetFault> {
        let mut inner = self.lock();
        if inner.destroyed || !inner.session.is_current(pending) {
            trace_debug!("Discarding completion for superseded request '{}'", pending.request);
            return None;
        }

        let rendered = match outcome {
            Err(e) => Err(WidgetFault::Completion(format!("{:#}", e))),
            Ok(raw) => inner.sandbox.render(&raw).map_err(|e| match e {
                RenderError::EmptyArtifact => WidgetFault::EmptyResponse,
                RenderError::Surface(msg) => WidgetFault::Render(msg),
            }),
        };

        let before = inner.session.state();
        match rendered {
            Ok(rendered) => {
                inner
                    .session
                    .complete_generation(pending, &rendered.artifact);
                self.record_history(&mut inner, pending.mode, &rendered.artifact);
                self.emit_state(before, inner.session.state());
                self.set_status(&mut inner, None);
                self.emit(WidgetEvent::Rendered {
                    context_id: rendered.context_id,
                    mode: Some(pending.mode),
                });
                log_info!("✅ Visualization displayed ({} bytes)", rendered.artifact.len());
                None
            }
            Err(fault) => {
                inner.session.fail_generation(pending);
                self.emit_state(before, inner.session.state());
                self.set_status(&mut inner, Some(StatusMessage::error(fault.to_string())));
                Some(fault)
            }
        }
    }

    /// Store the new artifact: in place for an improvement of the active entry, otherwise
    /// as a new active entry at the front
    fn record_history(&self, inner: &mut WidgetInner, mode: GenerationMode, artifact: &str) {
        let prompt = inner
            .session
            .context()
            .original_prompt()
            .unwrap_or_default()
            .to_string();
        let entry = HistoryEntry::new(prompt, artifact);

        let replaced = match (mode, inner.session.active_entry()) {
            (GenerationMode::Improvement, Some(index)) => inner.history.replace(index, entry.clone()),
            _ => false,
        };
        if !replaced {
            inner.history.save(entry);
            inner.session.set_active_entry(Some(0));
        }
        self.emit_history(inner);
    }

    /// Tear the visualization down and forget the conversation
    pub fn clear_visualization(&self) {
        let mut inner = self.lock();
        if inner.destroyed {
            return;
        }
        let before = inner.session.state();
        inner.session.clear();
        inner.sandbox.clear();
        self.emit_state(before, inner.session.state());
        self.set_status(&mut inner, None);
        self.emit_history(&inner);
        trace_info!("Visualization cleared");
    }

    pub fn set_theme(&self, theme: Theme) {
        let mut inner = self.lock();
        if inner.destroyed || inner.theme == theme {
            return;
        }
        inner.theme = theme;
        inner.sandbox.apply_theme(theme, inner.style_class.as_deref());
        self.emit(WidgetEvent::ThemeChanged(theme));
    }

    pub fn set_style_class(&self, class: Option<String>) {
        let mut inner = self.lock();
        if inner.destroyed {
            return;
        }
        inner.style_class = class.filter(|c| !c.trim().is_empty());
        inner.sandbox.apply_theme(inner.theme, inner.style_class.as_deref());
    }

    /// Tear everything down; later completions, bridge traffic and operations are no-ops
    pub fn destroy(&self) {
        {
            let mut inner = self.lock();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            inner.session.clear();
            inner.sandbox.clear();
        }
        self.shared.shutdown.cancel();
        self.emit(WidgetEvent::Destroyed);
        log_info!("Visualization widget destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    pub fn state(&self) -> SessionState {
        self.lock().session.state()
    }

    pub fn status(&self) -> Option<StatusMessage> {
        self.lock().status.clone()
    }

    pub fn theme(&self) -> Theme {
        self.lock().theme
    }

    /// Sanitized artifact currently held by the conversation
    pub fn current_artifact(&self) -> Option<String> {
        self.lock().session.context().artifact().map(str::to_string)
    }

    pub fn conversation(&self) -> ConversationContext {
        self.lock().session.context().clone()
    }

    /// Context id of the mounted artifact
    pub fn active_context(&self) -> Option<SandboxContextId> {
        self.lock().sandbox.active_context().cloned()
    }

    /// Endpoint overview parsed from the API description, if it had one
    pub fn api_overview(&self) -> Option<&ApiOverview> {
        self.shared.overview.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.shared.events.subscribe()
    }

    // ========== History ==========

    /// Newest-first copy of the history
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().history.entries().to_vec()
    }

    pub fn active_history_entry(&self) -> Option<usize> {
        self.lock().session.active_entry()
    }

    /// Whether history changes still reach durable storage
    pub fn history_is_persistent(&self) -> bool {
        self.lock().history.is_persistent()
    }

    /// Display history entry `index` without a completion call and adopt it as the
    /// conversation. Returns false for an unknown index.
    pub fn select_history_entry(&self, index: usize) -> bool {
        let fault = {
            let mut inner = self.lock();
            if inner.destroyed {
                return false;
            }
            let Some(entry) = inner.history.get(index).cloned() else {
                self.set_status(&mut inner, Some(StatusMessage::warning("History entry not found")));
                return false;
            };

            let before = inner.session.state();
            match inner.sandbox.render(&entry.html) {
                Ok(rendered) => {
                    inner.session.select_entry(index, &entry);
                    self.emit_state(before, inner.session.state());
                    self.set_status(&mut inner, None);
                    self.emit(WidgetEvent::Rendered {
                        context_id: rendered.context_id,
                        mode: None,
                    });
                    self.emit_history(&inner);
                    trace_info!("Selected history entry {}: {}", index, entry.title(40));
                    None
                }
                Err(e) => {
                    let fault = WidgetFault::Render(e.to_string());
                    inner.session.clear();
                    inner.session.fail();
                    self.emit_state(before, inner.session.state());
                    self.set_status(&mut inner, Some(StatusMessage::error(fault.to_string())));
                    Some(fault)
                }
            }
        };

        match fault {
            Some(fault) => {
                self.report_fault(&fault);
                false
            }
            None => true,
        }
    }

    /// Delete history entry `index`; the displayed visualization stays as it is
    pub fn delete_history_entry(&self, index: usize) -> Option<HistoryEntry> {
        let mut inner = self.lock();
        if inner.destroyed {
            return None;
        }
        let removed = inner.history.remove(index)?;
        inner.session.on_entry_removed(index);
        self.emit_history(&inner);
        Some(removed)
    }

    pub fn clear_history(&self) {
        let mut inner = self.lock();
        if inner.destroyed {
            return;
        }
        inner.history.clear();
        inner.session.set_active_entry(None);
        self.emit_history(&inner);
    }

    /// Hand history entry `index` to the publish callback as `(artifact, prompt)`
    ///
    /// Returns false if the index is unknown or no publish callback is configured.
    pub fn publish_history_entry(&self, index: usize) -> bool {
        let Some(callback) = self.shared.on_publish.clone() else {
            return false;
        };
        let Some(entry) = self.lock().history.get(index).cloned() else {
            return false;
        };
        callback(&entry.html, &entry.prompt);
        true
    }

    // ========== Bridge ==========

    /// Act on one message from the sandbox context `origin`
    ///
    /// Messages from anything but the currently mounted context are ignored.
    pub async fn handle_message(&self, origin: &SandboxContextId, message: BridgeMessage) {
        if !self.is_current_origin(origin) {
            trace_debug!(
                "Ignoring {} from superseded context {}",
                message.kind(),
                origin
            );
            return;
        }

        match message {
            BridgeMessage::ApiRequest { request_id, url } => {
                self.relay_request(origin, request_id, url).await;
            }
            BridgeMessage::SandboxFault { message, stack } => {
                self.sandbox_fault(origin, message, stack);
            }
            BridgeMessage::ApiResponse { request_id, .. } => {
                trace_debug!("Ignoring host-bound response {}", request_id);
            }
        }
    }

    /// Parse and handle a raw JSON message; unknown shapes are dropped
    ///
    /// A message stamped with a context other than `origin` is dropped as well.
    pub async fn handle_raw_message(&self, origin: &SandboxContextId, raw: &str) {
        if let Some(sender) = SandboxContextId::stamped_on(raw) {
            if &sender != origin {
                trace_debug!("Dropping message stamped {} delivered as {}", sender, origin);
                return;
            }
        }
        if let Some(message) = BridgeMessage::parse(raw) {
            self.handle_message(origin, message).await;
        }
    }

    /// Pump one context's outbound messages until the context or the widget goes away
    ///
    /// Each message is handled on its own task so slow fetches don't block each other.
    pub async fn serve_sandbox(&self, outbound: SandboxOutbound) {
        let SandboxOutbound {
            context_id,
            mut receiver,
        } = outbound;
        let shutdown = self.shared.shutdown.clone();
        trace_debug!("Serving sandbox context {}", context_id);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = receiver.recv() => match message {
                    Some(message) => {
                        let widget = self.clone();
                        let origin = context_id.clone();
                        tokio::spawn(async move {
                            widget.handle_message(&origin, message).await;
                        });
                    }
                    None => break,
                },
            }
        }
        trace_debug!("Stopped serving sandbox context {}", context_id);
    }

    fn is_current_origin(&self, origin: &SandboxContextId) -> bool {
        let inner = self.lock();
        !inner.destroyed && inner.sandbox.is_current(origin)
    }

    async fn relay_request(&self, origin: &SandboxContextId, request_id: String, url: String) {
        trace_debug!("Relaying bridge request {} for {}", request_id, url);
        let outcome = match self.shared.fetcher.fetch(&url).await {
            Ok(data) => Ok(data),
            Err(e) => {
                log_warn!("Data fetch for {} failed: {:#}", url, e);
                Err(e.to_string())
            }
        };

        let inner = self.lock();
        if inner.destroyed {
            return;
        }
        let response = BridgeMessage::response(request_id, outcome);
        match inner.sandbox.post(origin, &response) {
            Ok(true) => {}
            Ok(false) => {
                trace_debug!("Context {} was replaced before its response", origin);
            }
            Err(e) => {
                log_warn!("Failed to deliver bridge response to {}: {:#}", origin, e);
            }
        }
    }

    fn sandbox_fault(&self, origin: &SandboxContextId, message: String, stack: Option<String>) {
        if let Some(stack) = &stack {
            trace_debug!("Sandbox {} stack: {}", origin, stack);
        }
        let fault = WidgetFault::Sandbox { message, stack };
        {
            let mut inner = self.lock();
            let before = inner.session.state();
            inner.session.fail();
            self.emit_state(before, inner.session.state());
            self.set_status(&mut inner, Some(StatusMessage::error(fault.to_string())));
        }
        self.report_fault(&fault);
    }
}
