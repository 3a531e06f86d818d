use std::time::Duration;

use pretty_assertions::assert_eq;
use report_app::config::{AppConfig, NodeConfig};
use report_app::ReportSession;
use report_core::{RunStatus, STREAM_CLOSED_MESSAGE};
use report_engine::{ChartKind, InputError, ReportInputs};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WORKFLOW_PATH: &str = "/v1/workflows/run";

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.endpoint = format!("{}{}", server.uri(), WORKFLOW_PATH);
    config.upstream.idle_timeout_secs = 5;
    config.nodes = [("a", 1.0), ("b", 3.0), ("c", 1.0)]
        .into_iter()
        .map(|(id, weight)| NodeConfig {
            id: id.to_string(),
            title: id.to_uppercase(),
            weight,
            phase: 0,
        })
        .collect();
    config
}

fn frame(event: &str, data: serde_json::Value) -> String {
    let record = json!({
        "event": event,
        "task_id": "task-1",
        "workflow_run_id": "run-1",
        "data": data,
    });
    format!("data: {record}\n\n")
}

async fn mount_stream(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path(WORKFLOW_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn completed_run_produces_progress_and_bundle() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    let structured = json!({
        "comparisonData": [
            {"title": "Share", "categories": ["x"], "series": [{"name": "A", "data": [1]}]}
        ]
    });
    let body = [
        frame("workflow_started", json!({})),
        frame("node_started", json!({"node_id": "a", "title": "Collect"})),
        frame("node_finished", json!({"node_id": "a", "elapsed_time": 2.0})),
        "data: {not json}\n\n".to_string(),
        frame("node_started", json!({"node_id": "b", "title": "Write"})),
        frame("node_finished", json!({"node_id": "b", "elapsed_time": 6.0})),
        frame(
            "workflow_finished",
            json!({
                "status": "succeeded",
                "outputs": {
                    "result": "```html\n<h1>Report</h1>\n```",
                    "structured_data": structured.to_string(),
                    "download_url": "https://files.example/r.docx",
                }
            }),
        ),
    ]
    .concat();
    mount_stream(&server, body).await;

    let mut session = ReportSession::from_config(&config_for(&server));
    let outcome = session
        .run(&ReportInputs::new("grid storage"))
        .await
        .expect("valid inputs");

    assert_eq!(outcome.view.status, RunStatus::Completed);
    assert_eq!(outcome.view.percentage, 80);
    assert_eq!(outcome.view.completed_nodes, 2);
    assert_eq!(outcome.view.total_nodes, 3);
    assert_eq!(outcome.view.current_node_title, None);
    assert_eq!(session.progress().state().run_id(), Some("run-1"));

    assert_eq!(outcome.bundle.document_body, "<h1>Report</h1>");
    assert_eq!(outcome.bundle.charts.len(), 1);
    assert_eq!(outcome.bundle.charts[0].id, "bar_0");
    assert_eq!(outcome.bundle.charts[0].kind, ChartKind::Bar);
    assert_eq!(
        outcome.bundle.download_url.as_deref(),
        Some("https://files.example/r.docx")
    );
    assert_eq!(&outcome.bundle, session.bundle());
}

#[tokio::test]
async fn http_failure_ends_in_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(WORKFLOW_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let mut session = ReportSession::from_config(&config_for(&server));
    let outcome = session
        .run(&ReportInputs::new("topic"))
        .await
        .expect("valid inputs");

    assert_eq!(outcome.view.status, RunStatus::Error);
    let error = outcome.view.error.expect("error message");
    assert!(error.contains("502"), "{error}");
    assert!(outcome.bundle.is_empty());
}

#[tokio::test]
async fn stream_closing_early_fails_the_run() {
    let server = MockServer::start().await;
    let body = [
        frame("workflow_started", json!({})),
        frame("node_finished", json!({"node_id": "a"})),
    ]
    .concat();
    mount_stream(&server, body).await;

    let mut session = ReportSession::from_config(&config_for(&server));
    let outcome = session
        .run(&ReportInputs::new("topic"))
        .await
        .expect("valid inputs");

    assert_eq!(outcome.view.status, RunStatus::Error);
    assert_eq!(outcome.view.error.as_deref(), Some(STREAM_CLOSED_MESSAGE));
    assert_eq!(outcome.view.percentage, 20);
}

#[tokio::test]
async fn blank_topic_never_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = ReportSession::from_config(&config_for(&server));
    let result = session.run(&ReportInputs::new("  ")).await;

    assert!(matches!(result, Err(InputError::MissingTopic)));
    assert_eq!(session.progress().status(), RunStatus::Idle);
}

#[tokio::test]
async fn cancel_keeps_applied_progress() {
    let server = MockServer::start().await;
    let body = [
        frame("workflow_started", json!({})),
        frame("node_finished", json!({"node_id": "b", "elapsed_time": 3.0})),
        frame("node_finished", json!({"node_id": "c"})),
    ]
    .concat();
    mount_stream(&server, body).await;

    let mut session = ReportSession::from_config(&config_for(&server));
    session
        .start(&ReportInputs::new("topic"))
        .expect("valid inputs");
    assert!(tokio::time::timeout(Duration::from_secs(5), session.step())
        .await
        .expect("first event"));
    assert!(session.step().await);
    session.cancel();
    assert!(!session.step().await);

    let view = session.view();
    assert_eq!(view.status, RunStatus::Error);
    assert_eq!(view.error.as_deref(), Some("cancelled"));
    assert_eq!(view.percentage, 60);

    session.reset();
    assert_eq!(session.progress().status(), RunStatus::Idle);
}
