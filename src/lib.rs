//! apiviz - natural-language API visualizations rendered in an isolated sandbox
//!
//! apiviz is an embeddable widget core: the host hands it a render surface, a language-model
//! completion function, an HTTP fetch function and an API description. A user request becomes
//! a prompt, the generated HTML document is rendered inside an isolated context, and every
//! data request the generated code makes travels back to the host over a typed bridge.
//!
//! # Architecture Overview
//!
//! - **History** ([`app::history`]): the ten most recent artifacts, persisted best-effort
//! - **Prompts** ([`app::prompts`]): fresh-generation and improvement prompt templates
//! - **Sandbox** ([`app::sandbox`]): sanitizing, bridge injection and render-surface ownership
//! - **Bridge** ([`app::bridge`]): wire messages, the injected client script and a native client
//! - **Session** ([`app::session`]): idle/generating/displaying/error and conversation context
//! - **Widget** ([`app::widget`]): the public orchestrator, [`VizWidget`]
//!
//! # Getting Started
//!
//! Build a [`app::config::WidgetConfig`] with a surface, a [`app::widget::CompletionProvider`]
//! and a [`app::widget::DataFetcher`], then call [`VizWidget::create`].

#![warn(clippy::all, rust_2018_idioms)]

// Include logging macros first
#[macro_use]
pub mod logging_macros;

pub mod app;
pub use app::VizWidget;
