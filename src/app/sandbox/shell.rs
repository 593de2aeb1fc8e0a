//! Framing shell for surfaces without a native sandbox
//!
//! A webview loads documents as its top-level page, where the `sandbox` attribute of an
//! iframe cannot apply. Such surfaces load [`framed_shell`] instead: a small host page that
//! mounts the document in an `<iframe sandbox srcdoc>` with the document's policy and relays
//! bridge traffic between the frame and the IPC channel.
//!
//! ```text
//! document ─ parent.postMessage ─► shell ─ window.ipc.postMessage ─► host
//! host ─ evaluate(deliver_script) ─► shell ─ frame.postMessage ─► document
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use super::SandboxDocument;
use crate::app::bridge::BridgeMessage;

const SHELL_TEMPLATE: &str = include_str!("shell.html");

/// Host page that frames `document` under its sandbox policy
pub fn framed_shell(document: &SandboxDocument) -> String {
    // srcdoc last, so placeholder-looking text inside the artifact stays as it is
    SHELL_TEMPLATE
        .replace("__APIVIZ_HEIGHT__", &document.height.to_string())
        .replace("__APIVIZ_POLICY__", &escape_attribute(document.policy))
        .replace("__APIVIZ_SRCDOC__", &escape_attribute(&document.html))
}

/// Script that hands `message` to the framed document
pub fn deliver_script(message: &BridgeMessage) -> String {
    format!("window.__apivizDeliver({});", message.to_json())
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::bridge::BRIDGE_TIMEOUT;
    use crate::app::sandbox::{SandboxContextId, SANDBOX_POLICY};

    fn document(html: &str) -> SandboxDocument {
        SandboxDocument {
            context_id: SandboxContextId::from_raw("ctx_a"),
            html: html.to_string(),
            height: 480,
            policy: SANDBOX_POLICY,
            bridge_timeout: BRIDGE_TIMEOUT,
        }
    }

    #[test]
    fn test_shell_frames_document_under_policy() {
        let shell = framed_shell(&document(r#"<p class="x">a &amp; b</p>"#));

        assert!(shell.contains(r#"sandbox="allow-scripts""#));
        assert!(shell.contains(
            r#"srcdoc="<p class=&quot;x&quot;>a &amp;amp; b</p>""#
        ));
        assert!(shell.contains("height: 480px"));
        assert!(!shell.contains("__APIVIZ_"));
    }

    #[test]
    fn test_artifact_placeholders_are_not_expanded() {
        let shell = framed_shell(&document("<p>__APIVIZ_POLICY__</p>"));
        assert!(shell.contains("srcdoc=\"<p>__APIVIZ_POLICY__</p>\""));
    }

    #[test]
    fn test_deliver_script_carries_message() {
        let message = BridgeMessage::response("req_1", Ok(serde_json::json!({"a": 1})));
        assert_eq!(
            deliver_script(&message),
            format!("window.__apivizDeliver({});", message.to_json())
        );
    }
}
