//! Session State Machine
//!
//! Tracks one widget's session:
//!
//! ```text
//!            submit               ok, non-empty
//!   Idle ───────────► Generating ──────────────► Displaying
//!                      │    ▲                        │
//!        failed/blank  │    │ submit (improvement)   │ sandbox fault
//!                      ▼    │◄───────────────────────┘
//!                     Error ┘ submit (fresh unless an artifact is held)
//!
//!   any ──clear──► Idle          any ──select history entry──► Displaying
//! ```
//!
//! Every accepted submission and every clear/select bumps an epoch; a completion that
//! returns for an older epoch is stale and must be discarded by the caller.

#![warn(clippy::all, rust_2018_idioms)]

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::app::history::HistoryEntry;

/// Lifecycle state of a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Generating,
    Displaying,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Generating => "generating",
            SessionState::Displaying => "displaying",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Which prompt template a submission uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Fresh,
    Improvement,
}

/// Original request, improvements made since, and the artifact they produced
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationContext {
    original_prompt: Option<String>,
    improvements: Vec<String>,
    artifact: Option<String>,
}

impl ConversationContext {
    /// Begin a new conversation from a fresh generation
    pub fn start(&mut self, prompt: impl Into<String>, artifact: impl Into<String>) {
        self.original_prompt = Some(prompt.into());
        self.improvements.clear();
        self.artifact = Some(artifact.into());
    }

    pub fn record_improvement(&mut self, prompt: impl Into<String>, artifact: impl Into<String>) {
        self.improvements.push(prompt.into());
        self.artifact = Some(artifact.into());
    }

    /// Take over a history entry as the conversation's starting point
    pub fn adopt(&mut self, entry: &HistoryEntry) {
        self.start(entry.prompt.clone(), entry.html.clone());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn original_prompt(&self) -> Option<&str> {
        self.original_prompt.as_deref()
    }

    pub fn improvements(&self) -> &[String] {
        &self.improvements
    }

    pub fn artifact(&self) -> Option<&str> {
        self.artifact.as_deref()
    }

    pub fn has_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    /// Original request followed by every improvement, oldest first
    pub fn requests(&self) -> Vec<&str> {
        self.original_prompt
            .iter()
            .chain(self.improvements.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Why a submission was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    EmptyRequest,
    AlreadyGenerating,
}

impl fmt::Display for SubmitRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitRejection::EmptyRequest => {
                write!(f, "Please describe the visualization you would like to see")
            }
            SubmitRejection::AlreadyGenerating => {
                write!(f, "A visualization is already being generated")
            }
        }
    }
}

/// Ticket for one accepted submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGeneration {
    pub epoch: u64,
    pub mode: GenerationMode,
    pub request: String,
}

/// State, conversation context and active history selection of one widget
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
    context: ConversationContext,
    active_entry: Option<usize>,
    last_request: Option<String>,
    epoch: u64,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// History index the current conversation is stored at
    pub fn active_entry(&self) -> Option<usize> {
        self.active_entry
    }

    /// Most recent accepted request, for retries
    pub fn last_request(&self) -> Option<&str> {
        self.last_request.as_deref()
    }

    /// Improvement iff an artifact is held and the session is displaying it, or errored
    /// while it was still the active context
    pub fn generation_mode(&self) -> GenerationMode {
        let improvable = matches!(self.state, SessionState::Displaying | SessionState::Error);
        if improvable && self.context.has_artifact() {
            GenerationMode::Improvement
        } else {
            GenerationMode::Fresh
        }
    }

    /// Accept a user request and move to `Generating`
    pub fn begin_generation(&mut self, request: &str) -> Result<PendingGeneration, SubmitRejection> {
        let request = request.trim();
        if request.is_empty() {
            return Err(SubmitRejection::EmptyRequest);
        }
        if self.state == SessionState::Generating {
            return Err(SubmitRejection::AlreadyGenerating);
        }

        let mode = self.generation_mode();
        self.epoch += 1;
        self.state = SessionState::Generating;
        self.last_request = Some(request.to_string());

        Ok(PendingGeneration {
            epoch: self.epoch,
            mode,
            request: request.to_string(),
        })
    }

    /// Whether `pending` is still the generation the session waits for
    pub fn is_current(&self, pending: &PendingGeneration) -> bool {
        self.state == SessionState::Generating && self.epoch == pending.epoch
    }

    /// Record a successful generation; false if `pending` is stale
    pub fn complete_generation(&mut self, pending: &PendingGeneration, artifact: &str) -> bool {
        if !self.is_current(pending) {
            return false;
        }
        match pending.mode {
            GenerationMode::Fresh => {
                self.context.start(pending.request.clone(), artifact);
                self.active_entry = None;
            }
            GenerationMode::Improvement => {
                self.context
                    .record_improvement(pending.request.clone(), artifact);
            }
        }
        self.state = SessionState::Displaying;
        true
    }

    /// Record a failed generation; the context is kept for retries. False if stale.
    pub fn fail_generation(&mut self, pending: &PendingGeneration) -> bool {
        if !self.is_current(pending) {
            return false;
        }
        self.state = SessionState::Error;
        true
    }

    /// Runtime fault reported by the displayed artifact
    ///
    /// Ignored while generating: the faulting artifact is about to be replaced and the
    /// pending generation must stay current.
    pub fn fail(&mut self) -> bool {
        if self.state == SessionState::Generating {
            return false;
        }
        self.state = SessionState::Error;
        true
    }

    /// Back to `Idle`, dropping the conversation and any in-flight generation
    pub fn clear(&mut self) {
        self.epoch += 1;
        self.state = SessionState::Idle;
        self.context.reset();
        self.active_entry = None;
    }

    /// Display a history entry directly, adopting it as the conversation
    pub fn select_entry(&mut self, index: usize, entry: &HistoryEntry) {
        self.epoch += 1;
        self.state = SessionState::Displaying;
        self.context.adopt(entry);
        self.active_entry = Some(index);
    }

    pub fn set_active_entry(&mut self, index: Option<usize>) {
        self.active_entry = index;
    }

    /// Keep the active index pointing at the same entry after `removed` was deleted
    pub fn on_entry_removed(&mut self, removed: usize) {
        self.active_entry = match self.active_entry {
            Some(active) if active == removed => None,
            Some(active) if active > removed => Some(active - 1),
            other => other,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn displaying(machine: &mut SessionMachine, prompt: &str, artifact: &str) {
        let pending = machine.begin_generation(prompt).unwrap();
        assert!(machine.complete_generation(&pending, artifact));
    }

    #[test]
    fn test_idle_submission_is_fresh() {
        let mut machine = SessionMachine::new();
        let pending = machine.begin_generation("  chart of users ").unwrap();

        assert_eq!(pending.mode, GenerationMode::Fresh);
        assert_eq!(pending.request, "chart of users");
        assert_eq!(machine.state(), SessionState::Generating);
    }

    #[test]
    fn test_blank_submission_is_rejected() {
        let mut machine = SessionMachine::new();
        assert_eq!(machine.begin_generation(" \n "), Err(SubmitRejection::EmptyRequest));
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_submission_while_generating_is_rejected() {
        let mut machine = SessionMachine::new();
        let first = machine.begin_generation("one").unwrap();
        assert_eq!(machine.begin_generation("two"), Err(SubmitRejection::AlreadyGenerating));
        assert!(machine.is_current(&first));
    }

    #[test]
    fn test_displaying_submission_is_improvement() {
        let mut machine = SessionMachine::new();
        displaying(&mut machine, "users", "<p>v1</p>");

        let pending = machine.begin_generation("make it blue").unwrap();
        assert_eq!(pending.mode, GenerationMode::Improvement);
        assert!(machine.complete_generation(&pending, "<p>v2</p>"));

        assert_eq!(machine.context().requests(), vec!["users", "make it blue"]);
        assert_eq!(machine.context().artifact(), Some("<p>v2</p>"));
    }

    #[test]
    fn test_failed_fresh_generation_retries_fresh() {
        let mut machine = SessionMachine::new();
        let pending = machine.begin_generation("users").unwrap();
        assert!(machine.fail_generation(&pending));
        assert_eq!(machine.state(), SessionState::Error);

        assert_eq!(machine.generation_mode(), GenerationMode::Fresh);
        assert_eq!(machine.last_request(), Some("users"));
    }

    #[test]
    fn test_failed_improvement_keeps_context_for_retry() {
        let mut machine = SessionMachine::new();
        displaying(&mut machine, "users", "<p>v1</p>");
        let pending = machine.begin_generation("add legend").unwrap();
        machine.fail_generation(&pending);

        assert_eq!(machine.state(), SessionState::Error);
        assert_eq!(machine.context().artifact(), Some("<p>v1</p>"));
        assert_eq!(machine.generation_mode(), GenerationMode::Improvement);
    }

    #[test]
    fn test_clear_discards_context_and_stales_pending() {
        let mut machine = SessionMachine::new();
        displaying(&mut machine, "users", "<p>v1</p>");
        let pending = machine.begin_generation("more").unwrap();

        machine.clear();

        assert_eq!(machine.state(), SessionState::Idle);
        assert!(!machine.context().has_artifact());
        assert!(!machine.complete_generation(&pending, "<p>late</p>"));
        assert_eq!(machine.state(), SessionState::Idle);
        assert_eq!(machine.generation_mode(), GenerationMode::Fresh);
    }

    #[test]
    fn test_sandbox_fault_does_not_stale_pending_generation() {
        let mut machine = SessionMachine::new();
        displaying(&mut machine, "users", "<p>v1</p>");
        assert!(machine.fail());
        assert_eq!(machine.state(), SessionState::Error);

        let pending = machine.begin_generation("fix it").unwrap();
        assert!(!machine.fail());
        assert!(machine.complete_generation(&pending, "<p>v2</p>"));
    }

    #[test]
    fn test_select_entry_adopts_context() {
        let mut machine = SessionMachine::new();
        let entry = HistoryEntry::new("sales by month", "<p>sales</p>");

        machine.select_entry(1, &entry);

        assert_eq!(machine.state(), SessionState::Displaying);
        assert_eq!(machine.context().original_prompt(), Some("sales by month"));
        assert!(machine.context().improvements().is_empty());
        assert_eq!(machine.active_entry(), Some(1));
        assert_eq!(machine.generation_mode(), GenerationMode::Improvement);
    }

    #[test]
    fn test_active_entry_follows_history_edits() {
        let mut machine = SessionMachine::new();
        machine.set_active_entry(Some(2));

        machine.on_entry_removed(3);
        assert_eq!(machine.active_entry(), Some(2));
        machine.on_entry_removed(0);
        assert_eq!(machine.active_entry(), Some(1));
        machine.on_entry_removed(1);
        assert_eq!(machine.active_entry(), None);
    }
}
