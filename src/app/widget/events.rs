//! Widget Event Stream
//!
//! Everything the surrounding UI glue needs to redraw: state changes, status lines, renders
//! and history changes. Delivered over a `tokio::sync::broadcast` channel owned by one
//! widget, so several widgets in one process stay independent.

#![warn(clippy::all, rust_2018_idioms)]

use serde::Serialize;

use crate::app::config::Theme;
use crate::app::sandbox::SandboxContextId;
use crate::app::session::{GenerationMode, SessionState};

/// Capacity of each widget's event channel; slow subscribers see `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// User-visible status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            text: text.into(),
        }
    }
}

/// Events emitted by a [`crate::VizWidget`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    /// Session state transition
    StateChanged {
        from: SessionState,
        to: SessionState,
    },

    /// New status line (or `None` when the status was cleared)
    Status(Option<StatusMessage>),

    /// An artifact was mounted under a fresh context
    ///
    /// `mode` is `None` for a history selection.
    Rendered {
        context_id: SandboxContextId,
        mode: Option<GenerationMode>,
    },

    /// History changed; `active` is the entry the conversation is stored at
    HistoryChanged { len: usize, active: Option<usize> },

    ThemeChanged(Theme),

    /// The widget was destroyed; no further events follow
    Destroyed,
}
