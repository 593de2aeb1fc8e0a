//! Sandbox-to-host bridge traffic through a live widget

mod common;

use apiviz::app::bridge::{BridgeError, BridgeMessage};
use apiviz::app::session::SessionState;
use apiviz::app::widget::WidgetFault;
use common::{Harness, ScriptedCompletion};
use serde_json::json;
use std::time::Duration;

async fn displaying_harness() -> Harness {
    let harness = Harness::new(ScriptedCompletion::default().provider());
    harness.submit("chart").await;
    assert_eq!(harness.widget.state(), SessionState::Displaying);
    harness
}

fn serve(harness: &Harness) -> tokio::task::JoinHandle<()> {
    let outbound = harness
        .surface
        .take_outbound()
        .expect("mounted context has an outbound stream");
    let widget = harness.widget.clone();
    tokio::spawn(async move { widget.serve_sandbox(outbound).await })
}

// ============================================================================
// Data requests
// ============================================================================

#[tokio::test]
async fn test_fetch_resolves_with_host_payload() {
    let harness = displaying_harness().await;
    let server = serve(&harness);
    let client = harness.surface.client().unwrap();

    let data = client.fetch_data("/api/x").await;

    assert_eq!(data, Ok(json!({"a": 1})));
    assert_eq!(harness.fetches.lock().unwrap().clone(), vec!["/api/x".to_string()]);

    harness.widget.destroy();
    server.await.unwrap();
}

#[tokio::test]
async fn test_fetch_failure_rejects_with_message_text() {
    let harness = displaying_harness().await;
    let server = serve(&harness);
    let client = harness.surface.client().unwrap();

    let error = client.fetch_data("/api/missing").await.unwrap_err();

    assert_eq!(
        error,
        BridgeError::Fault("HTTP 404 Not Found for /api/missing".to_string())
    );
    assert_eq!(error.to_string(), "HTTP 404 Not Found for /api/missing");
    // A failed fetch is relayed, it does not fault the session
    assert_eq!(harness.widget.state(), SessionState::Displaying);
    assert!(harness.faults().is_empty());

    harness.widget.destroy();
    server.await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_settle_their_own_waiters() {
    let harness = displaying_harness().await;
    let server = serve(&harness);
    let client = harness.surface.client().unwrap();

    let (ok, missing) = tokio::join!(client.fetch_data("/api/x"), client.fetch_data("/api/users"));

    assert_eq!(ok, Ok(json!({"a": 1})));
    assert!(matches!(missing, Err(BridgeError::Fault(ref m)) if m.contains("/api/users")));
    assert_eq!(client.pending_requests(), 0);

    harness.widget.destroy();
    server.await.unwrap();
}

#[tokio::test]
async fn test_raw_json_messages_are_accepted() {
    let harness = displaying_harness().await;
    let origin = harness.widget.active_context().unwrap();

    harness
        .widget
        .handle_raw_message(&origin, r#"{"type":"IFRAME_ERROR","message":"boom","stack":"at x"}"#)
        .await;
    harness
        .widget
        .handle_raw_message(&origin, r#"{"type":"NAVIGATE","url":"https://example.com"}"#)
        .await;

    assert_eq!(
        harness.faults(),
        vec![WidgetFault::Sandbox {
            message: "boom".to_string(),
            stack: Some("at x".to_string()),
        }]
    );
}

// ============================================================================
// Faults and origin checks
// ============================================================================

#[tokio::test]
async fn test_sandbox_fault_enters_error_and_keeps_context() {
    let completion = ScriptedCompletion::default();
    let harness = Harness::new(completion.provider());
    harness.submit("chart").await;
    let origin = harness.widget.active_context().unwrap();

    harness
        .widget
        .handle_message(
            &origin,
            BridgeMessage::SandboxFault {
                message: "Chart is not defined".to_string(),
                stack: None,
            },
        )
        .await;

    assert_eq!(harness.widget.state(), SessionState::Error);
    assert_eq!(
        harness.widget.status().unwrap().text,
        "Visualization error: Chart is not defined"
    );
    assert_eq!(harness.faults().len(), 1);

    // The artifact is still held, so the next request improves it
    harness.submit("load the chart library first").await;
    assert!(completion.prompt(1).contains("<html><body>chart</body></html>"));
    assert!(completion.prompt(1).contains("chart\nload the chart library first"));
}

#[tokio::test]
async fn test_reported_fault_travels_through_served_stream() {
    let harness = displaying_harness().await;
    let server = serve(&harness);
    let client = harness.surface.client().unwrap();

    assert!(client.report_fault("boom", Some("at render (chart.js:3)".to_string())));
    tokio::time::timeout(Duration::from_secs(1), async {
        while harness.widget.state() != SessionState::Error {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("fault reaches the widget");

    assert_eq!(
        harness.widget.status().unwrap().text,
        "Visualization error: boom"
    );
    assert_eq!(
        harness.faults(),
        vec![WidgetFault::Sandbox {
            message: "boom".to_string(),
            stack: Some("at render (chart.js:3)".to_string()),
        }]
    );

    harness.widget.destroy();
    server.await.unwrap();
}

#[tokio::test]
async fn test_superseded_context_is_ignored() {
    let harness = displaying_harness().await;
    let old_origin = harness.widget.active_context().unwrap();

    harness.submit("make it blue").await;
    assert_ne!(harness.widget.active_context(), Some(old_origin.clone()));

    harness
        .widget
        .handle_message(
            &old_origin,
            BridgeMessage::ApiRequest {
                request_id: "req_old".to_string(),
                url: "/api/x".to_string(),
            },
        )
        .await;
    harness
        .widget
        .handle_message(
            &old_origin,
            BridgeMessage::SandboxFault {
                message: "stale".to_string(),
                stack: None,
            },
        )
        .await;

    assert_eq!(harness.fetch_count(), 0);
    assert!(harness.faults().is_empty());
    assert_eq!(harness.widget.state(), SessionState::Displaying);
}

#[tokio::test]
async fn test_old_client_is_disconnected_by_rerender() {
    let harness = displaying_harness().await;
    let old_client = harness.surface.client().unwrap();

    harness.submit("again").await;

    assert_eq!(
        old_client.fetch_data("/api/x").await,
        Err(BridgeError::Disconnected)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out() {
    let harness = displaying_harness().await;
    // Nobody serves the outbound stream
    let _outbound = harness.surface.take_outbound().unwrap();
    let client = harness.surface.client().unwrap();

    let error = client.fetch_data("/api/x").await.unwrap_err();

    assert_eq!(
        error,
        BridgeError::Timeout {
            url: "/api/x".to_string(),
            after: Duration::from_secs(30),
        }
    );
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_serving_stops_on_destroy() {
    let harness = displaying_harness().await;
    let server = serve(&harness);

    harness.widget.destroy();

    tokio::time::timeout(Duration::from_secs(1), server)
        .await
        .expect("serve loop exits after destroy")
        .unwrap();
}
