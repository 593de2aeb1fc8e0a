//! Sandbox Bridge
//!
//! Typed message exchange between the host and a sandboxed context.
//!
//! # Architecture
//!
//! ```text
//! Sandboxed context                      Host (VizWidget)
//! ┌──────────────────┐  API_REQUEST     ┌─────────────────────────┐
//! │ fetchData(url)   ├─────────────────►│ origin check            │
//! │  one-shot waiter │                  │ DataFetcher::fetch(url) │
//! │  30 s timeout    │◄─────────────────┤ API_RESPONSE data|error │
//! │                  │  IFRAME_ERROR    │                         │
//! │ error handlers   ├─────────────────►│ error state + on_fault  │
//! └──────────────────┘                  └─────────────────────────┘
//! ```
//!
//! The browser side is [`BRIDGE_SCRIPT`], injected into every artifact before it is
//! activated. [`BridgeClient`] implements the same contract natively.
//!
//! The script stamps every outgoing message with the id of the context it was injected into
//! (the [`CONTEXT_STAMP_FIELD`] key), so a surface can tell a late message from a replaced
//! document apart from one sent by the document mounted now.

#![warn(clippy::all, rust_2018_idioms)]

use std::time::Duration;

use crate::app::sandbox::SandboxContextId;

pub mod client;
pub mod message;

pub use client::{BridgeClient, BridgeError};
pub use message::BridgeMessage;

/// How long a sandbox data request waits for its response
pub const BRIDGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Shortest wait a host may configure; anything shorter cannot cover an IPC round trip
pub const MIN_BRIDGE_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest wait a host may configure
pub const MAX_BRIDGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Whether `timeout` is an acceptable bridge wait bound
pub fn is_valid_bridge_timeout(timeout: Duration) -> bool {
    (MIN_BRIDGE_TIMEOUT..=MAX_BRIDGE_TIMEOUT).contains(&timeout)
}

/// Key the injected script stamps the sending context's id under
pub const CONTEXT_STAMP_FIELD: &str = "context";

/// Name of the data-access function available to generated code
pub const DATA_ACCESS_FUNCTION: &str = "fetchData";

/// Bridge client script (embedded)
pub const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

const TIMEOUT_PLACEHOLDER: &str = "__APIVIZ_BRIDGE_TIMEOUT_MS__";
const CONTEXT_PLACEHOLDER: &str = "__APIVIZ_CONTEXT_ID__";

/// The bridge script for `context`, wrapped in a `<script>` element, ready for injection
pub fn bridge_script_tag(timeout: Duration, context: &SandboxContextId) -> String {
    // A JSON string is a valid JS string literal; `<` is escaped so the id can't close the tag
    let context_literal = serde_json::Value::from(context.as_str())
        .to_string()
        .replace('<', "\\u003c");
    let script = BRIDGE_SCRIPT
        .replace(TIMEOUT_PLACEHOLDER, &timeout.as_millis().to_string())
        .replace(CONTEXT_PLACEHOLDER, &context_literal);
    format!("<script data-apiviz-bridge>\n{}</script>\n", script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_tag_carries_timeout_and_context() {
        let tag = bridge_script_tag(BRIDGE_TIMEOUT, &SandboxContextId::from_raw("ctx_abc"));
        assert!(tag.starts_with("<script data-apiviz-bridge>"));
        assert!(tag.contains("var TIMEOUT_MS = 30000;"));
        assert!(tag.contains(r#"var CONTEXT_ID = "ctx_abc";"#));
        assert!(!tag.contains(TIMEOUT_PLACEHOLDER));
        assert!(!tag.contains(CONTEXT_PLACEHOLDER));
    }

    #[test]
    fn test_context_id_cannot_break_out_of_script() {
        let tag = bridge_script_tag(
            BRIDGE_TIMEOUT,
            &SandboxContextId::from_raw("</script><script>alert(1)"),
        );
        assert_eq!(tag.matches("</script>").count(), 1);
        assert!(tag.contains(r#""\u003c/script>\u003cscript>alert(1)""#));
    }

    #[test]
    fn test_timeout_bounds() {
        assert!(is_valid_bridge_timeout(BRIDGE_TIMEOUT));
        assert!(is_valid_bridge_timeout(MIN_BRIDGE_TIMEOUT));
        assert!(is_valid_bridge_timeout(MAX_BRIDGE_TIMEOUT));
        assert!(!is_valid_bridge_timeout(Duration::ZERO));
        assert!(!is_valid_bridge_timeout(Duration::from_millis(999)));
        assert!(!is_valid_bridge_timeout(Duration::from_secs(301)));
    }

    #[test]
    fn test_script_speaks_the_wire_protocol() {
        assert!(BRIDGE_SCRIPT.contains(&format!("window.{} = function", DATA_ACCESS_FUNCTION)));
        for tag in ["API_REQUEST", "API_RESPONSE", "IFRAME_ERROR", "unhandledrejection"] {
            assert!(BRIDGE_SCRIPT.contains(tag), "bridge script is missing {}", tag);
        }
        assert!(BRIDGE_SCRIPT.contains(&format!("message.{} = CONTEXT_ID", CONTEXT_STAMP_FIELD)));
    }

    #[test]
    fn test_script_rejects_on_any_error_string() {
        // An empty error string still rejects, like the native client
        assert!(BRIDGE_SCRIPT.contains("if (typeof message.error === 'string')"));
        assert!(!BRIDGE_SCRIPT.contains("if (message.error)"));
    }
}
