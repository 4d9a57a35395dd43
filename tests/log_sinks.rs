#[path = "common/mod.rs"]
mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::{routing::post, Json, Router};
use common::{post_json, test_config, StubClient, StubReply};
use serde_json::Value;
use support_assistant::{app, AppState, InferenceClient, InferenceError, TelemetrySink};
use tokio::net::TcpListener;
use tower::ServiceExt;

type Received = Arc<Mutex<Vec<Value>>>;

async fn start_collector() -> (String, Received) {
    async fn ingest(State(received): State<Received>, Json(line): Json<Value>) {
        received.lock().unwrap().push(line);
    }
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/ingest", post(ingest))
        .with_state(received.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/ingest", addr), received)
}

fn read_lines(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn analysis_outcomes_are_written_to_log_file() {
    let tmp = tempfile::tempdir().unwrap();
    let log_path = tmp.path().join("assistant.jsonl");
    let mut config = test_config();
    config.sinks.log_file = Some(log_path.to_string_lossy().to_string());

    let telemetry = TelemetrySink::from_config(&config.sinks);
    let client = StubClient::new(StubReply::Fail(InferenceError::Service {
        code: "ModelErrorException".into(),
        detail: "model crashed at layer 7".into(),
    }));
    let state = AppState::with_client(
        &config,
        Some(client as Arc<dyn InferenceClient>),
        telemetry.clone(),
    );
    let app = app(state);

    let resp = app
        .clone()
        .oneshot(post_json(r#"{"ticket":"help","ticket_id":"L-1"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::BAD_GATEWAY);
    let resp = app.oneshot(post_json("{broken")).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::BAD_REQUEST);

    let lines = read_lines(&log_path);
    let failure = lines
        .iter()
        .find(|l| l["event"] == "inference_failed")
        .expect("inference failure logged");
    assert_eq!(failure["level"], "ERROR");
    assert_eq!(failure["ticket_id"], "L-1");
    assert_eq!(failure["kind"], "service_error");
    assert_eq!(failure["status"], 502);
    // Provider detail is kept in the log even though the caller never sees it.
    assert!(failure["error"]
        .as_str()
        .unwrap()
        .contains("model crashed at layer 7"));

    let rejected = lines
        .iter()
        .find(|l| l["event"] == "request_rejected")
        .expect("validation failure logged");
    assert_eq!(rejected["level"], "WARN");
    assert_eq!(rejected["error"], "Invalid JSON");
    assert_eq!(telemetry.lines_total() as usize, lines.len());
}

#[tokio::test]
async fn lines_are_forwarded_to_remote_collector() {
    let (collector_url, received) = start_collector().await;
    let mut config = test_config();
    config.sinks.collector_url = Some(collector_url);

    let telemetry = TelemetrySink::from_config(&config.sinks);
    assert!(telemetry.has_collector());
    let client = StubClient::new(StubReply::Text(r#"{"summary":"ok"}"#.into()));
    let state = AppState::with_client(
        &config,
        Some(client as Arc<dyn InferenceClient>),
        telemetry.clone(),
    );

    let resp = app(state)
        .oneshot(post_json(r#"{"ticket":"forward me","ticket_id":"R-1"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::OK);

    let mut analysed = None;
    for _ in 0..50 {
        analysed = received
            .lock()
            .unwrap()
            .iter()
            .find(|l| l["event"] == "ticket_analyzed")
            .cloned();
        if analysed.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let analysed = analysed.expect("collector received analysis event");
    assert_eq!(analysed["ticket_id"], "R-1");
    assert_eq!(analysed["structured"], true);
    assert_eq!(analysed["level"], "INFO");
    assert_eq!(telemetry.write_errors_total(), 0);
}

#[tokio::test]
async fn unreachable_collector_counts_errors_without_failing_requests() {
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = test_config();
    config.sinks.collector_url = Some(format!("http://{}/ingest", closed));
    let telemetry = TelemetrySink::from_config(&config.sinks);
    let client = StubClient::new(StubReply::Text("{}".into()));
    let state = AppState::with_client(
        &config,
        Some(client as Arc<dyn InferenceClient>),
        telemetry.clone(),
    );

    let resp = app(state)
        .oneshot(post_json(r#"{"ticket":"still works"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::OK);

    for _ in 0..50 {
        if telemetry.write_errors_total() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(telemetry.write_errors_total() > 0);
}
