#![warn(clippy::all, rust_2018_idioms)]

use std::fmt;

/// Runtime fault that moved the widget into the error state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetFault {
    /// The completion provider failed
    Completion(String),
    /// The completion provider returned blank output
    EmptyResponse,
    /// The artifact could not be mounted
    Render(String),
    /// The displayed artifact reported an uncaught error
    Sandbox {
        message: String,
        stack: Option<String>,
    },
}

impl WidgetFault {
    /// Short machine-readable tag
    pub fn kind(&self) -> &'static str {
        match self {
            WidgetFault::Completion(_) => "completion",
            WidgetFault::EmptyResponse => "empty_response",
            WidgetFault::Render(_) => "render",
            WidgetFault::Sandbox { .. } => "sandbox",
        }
    }
}

impl fmt::Display for WidgetFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidgetFault::Completion(msg) => write!(f, "Generation failed: {}", msg),
            WidgetFault::EmptyResponse => write!(f, "Empty response from completion provider"),
            WidgetFault::Render(msg) => write!(f, "Failed to render visualization: {}", msg),
            WidgetFault::Sandbox { message, .. } => write!(f, "Visualization error: {}", message),
        }
    }
}

impl std::error::Error for WidgetFault {}
