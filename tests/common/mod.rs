//! Shared fixtures for the widget integration tests

#![allow(dead_code)]

use apiviz::app::config::WidgetConfig;
use apiviz::app::history::{HistoryEntry, MemoryHistoryBackend};
use apiviz::app::sandbox::InProcessSurface;
use apiviz::app::widget::{completion_fn, fetcher_fn, CompletionProvider, DataFetcher, WidgetFault};
use apiviz::VizWidget;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const API_DESCRIPTION: &str =
    r#"{"paths": {"/api/x": {"get": {"summary": "Sample data"}}, "/api/users": {"get": {}}}}"#;

pub const CHART: &str = "<html><body>chart</body></html>";

/// Completion provider that records every prompt and answers from a script of replies
#[derive(Clone, Default)]
pub struct ScriptedCompletion {
    pub prompts: Arc<Mutex<Vec<String>>>,
    replies: Arc<Mutex<Vec<anyhow::Result<String>>>>,
}

impl ScriptedCompletion {
    pub fn replying(replies: Vec<anyhow::Result<String>>) -> Self {
        let mut replies = replies;
        replies.reverse();
        Self {
            prompts: Arc::default(),
            replies: Arc::new(Mutex::new(replies)),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }

    pub fn provider(&self) -> Arc<dyn CompletionProvider> {
        let prompts = self.prompts.clone();
        let replies = self.replies.clone();
        completion_fn(move |prompt| {
            prompts.lock().unwrap().push(prompt);
            let reply = replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(CHART.to_string()));
            async move { reply }
        })
    }
}

/// Completion provider that blocks until released
#[derive(Clone, Default)]
pub struct GatedCompletion {
    pub gate: Arc<Notify>,
    pub calls: Arc<Mutex<usize>>,
}

impl GatedCompletion {
    pub fn provider(&self, reply: &str) -> Arc<dyn CompletionProvider> {
        let gate = self.gate.clone();
        let calls = self.calls.clone();
        let reply = reply.to_string();
        completion_fn(move |_prompt| {
            *calls.lock().unwrap() += 1;
            let gate = gate.clone();
            let reply = reply.clone();
            async move {
                gate.notified().await;
                Ok(reply)
            }
        })
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

/// Fetcher answering `{"a": 1}` for `/api/x` and failing everything else
pub fn sample_fetcher(calls: Arc<Mutex<Vec<String>>>) -> Arc<dyn DataFetcher> {
    fetcher_fn(move |url| {
        calls.lock().unwrap().push(url.clone());
        async move {
            if url == "/api/x" {
                Ok::<Value, anyhow::Error>(json!({"a": 1}))
            } else {
                Err(anyhow::anyhow!("HTTP 404 Not Found for {}", url))
            }
        }
    })
}

pub struct Harness {
    pub widget: VizWidget,
    pub surface: Arc<InProcessSurface>,
    pub backend: Arc<MemoryHistoryBackend>,
    pub faults: Arc<Mutex<Vec<WidgetFault>>>,
    pub fetches: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn new(completion: Arc<dyn CompletionProvider>) -> Self {
        Self::with_backend(completion, Arc::new(MemoryHistoryBackend::default()))
    }

    pub fn with_history(completion: Arc<dyn CompletionProvider>, entries: &[HistoryEntry]) -> Self {
        let record = serde_json::to_string(entries).unwrap();
        Self::with_backend(completion, Arc::new(MemoryHistoryBackend::with_record(record)))
    }

    fn with_backend(completion: Arc<dyn CompletionProvider>, backend: Arc<MemoryHistoryBackend>) -> Self {
        let surface = Arc::new(InProcessSurface::new());
        let faults = Arc::new(Mutex::new(Vec::new()));
        let fetches = Arc::new(Mutex::new(Vec::new()));

        let fault_sink = faults.clone();
        let widget = VizWidget::create(
            WidgetConfig::new(API_DESCRIPTION)
                .with_surface(surface.clone())
                .with_completion(completion)
                .with_fetcher(sample_fetcher(fetches.clone()))
                .with_history_backend(backend.clone())
                .on_fault(move |fault| fault_sink.lock().unwrap().push(fault.clone())),
        )
        .expect("valid widget config");

        Self {
            widget,
            surface,
            backend,
            faults,
            fetches,
        }
    }

    pub async fn submit(&self, text: &str) {
        self.widget.set_input(text);
        self.widget.generate_visualization().await;
    }

    pub fn faults(&self) -> Vec<WidgetFault> {
        self.faults.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

pub fn entries(prompts: &[&str]) -> Vec<HistoryEntry> {
    prompts
        .iter()
        .map(|prompt| HistoryEntry::new(*prompt, format!("<html><body>{}</body></html>", prompt)))
        .collect()
}
