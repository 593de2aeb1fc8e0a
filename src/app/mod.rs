//! Core widget modules for apiviz.
//!
//! # Module Organization
//!
//! ## Data and persistence
//! - [`history`] - bounded, newest-first artifact history with best-effort persistence
//! - [`settings`] - optional TOML settings file applied on top of [`config`]
//!
//! ## Generation
//! - [`prompts`] - fresh-generation and improvement prompt templates
//! - [`api_overview`] - best-effort endpoint list extracted from the API description
//!
//! ## Isolation
//! - [`sandbox`] - artifact sanitizing, bridge injection and render-surface ownership
//! - [`bridge`] - the sandbox/host wire protocol and its clients
//!
//! ## Orchestration
//! - [`session`] - session state machine and conversation context
//! - [`widget`] - the public [`VizWidget`] and the host callback traits
//!
//! ## Host adapters
//! - [`http_fetcher`] - `reqwest`-backed data fetcher
//! - `webview` - `wry` window surface (cargo feature `webview`)

pub mod api_overview;
pub mod bridge;
pub mod config;
pub mod history;
pub mod http_fetcher;
pub mod prompts;
pub mod sandbox;
pub mod session;
pub mod settings;
#[cfg(feature = "webview")]
pub mod webview;
pub mod widget;

pub use widget::VizWidget;
