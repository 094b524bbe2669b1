//! Integration tests for agentrun
//!
//! These tests drive the consumer end to end: against a mock HTTP/SSE
//! backend, against the synthetic transport, and through the `ar` binary.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentrun::config::ApiConfig;
use agentrun::consumer::{Applied, RunController, RunError, Update};
use agentrun::domain::{RunRequest, RunResult, RunStatus, UploadedFile};
use agentrun::events::StreamEvent;
use agentrun::history::RunHistory;
use agentrun::transport::{
    EventSink, HttpTransport, RunTicket, RunTransport, SyntheticTransport, TransportError,
};
use async_trait::async_trait;
use predicates::prelude::*;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(payloads: &[&str]) -> String {
    payloads.iter().map(|p| format!("data: {}\n\n", p)).collect()
}

async fn mock_run(server: &MockServer, run_id: &str, payloads: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/runs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "run_id": run_id, "status": "running" })),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/runs/{}/stream", run_id)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(payloads), "text/event-stream"))
        .mount(server)
        .await;
}

fn http_controller(server: &MockServer) -> RunController {
    let transport = HttpTransport::from_config(&ApiConfig::default(), server.uri()).expect("transport");
    RunController::new(Arc::new(transport))
}

// =============================================================================
// HTTP / SSE Transport Tests
// =============================================================================

#[tokio::test]
async fn test_http_progress_then_complete() {
    let server = MockServer::start().await;
    mock_run(
        &server,
        "run-42",
        &[
            r#"{"type":"progress","data":{"progress":10},"timestamp":"2025-01-01T00:00:00Z"}"#,
            r#"{"type":"progress","data":{"progress":50},"timestamp":"2025-01-01T00:00:01Z"}"#,
            r#"{"type":"complete","data":{"result":{"summary":"Done","artifacts":[]}},"timestamp":"2025-01-01T00:00:02Z"}"#,
        ],
    )
    .await;

    let mut controller = http_controller(&server);
    let state = controller.start(RunRequest::new("agent", "test")).await.unwrap();
    assert_eq!(state.run().run_id, "run-42");

    let state = tokio::time::timeout(Duration::from_secs(5), controller.run_until_finished())
        .await
        .expect("run should finish")
        .expect("state");
    let run = state.run();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.progress, 50);
    assert_eq!(run.result_summary.as_deref(), Some("Done"));
    assert_eq!(run.artifacts.as_deref(), Some(&[][..]));
    assert!(run.error.is_none());
    assert!(state.connection_error().is_none());
    assert_eq!(state.events().len(), 3);
}

#[tokio::test]
async fn test_http_malformed_message_is_skipped() {
    let server = MockServer::start().await;
    mock_run(
        &server,
        "run-7",
        &[
            "{not json",
            r#"{"type":"progress","data":{"progress":150},"timestamp":"2025-01-01T00:00:00Z"}"#,
            r#"{"type":"mystery","data":{},"timestamp":"2025-01-01T00:00:00Z"}"#,
            r#"{"type":"log","data":{"message":"still here"},"timestamp":"2025-01-01T00:00:01Z"}"#,
            r#"{"type":"error","data":{"error":"agent crashed"},"timestamp":"2025-01-01T00:00:02Z"}"#,
        ],
    )
    .await;

    let mut controller = http_controller(&server);
    controller.start(RunRequest::new("agent", "test")).await.unwrap();

    let mut updates = Vec::new();
    while let Some(update) = tokio::time::timeout(Duration::from_secs(5), controller.next_update())
        .await
        .expect("update should arrive")
    {
        updates.push(update);
    }

    assert_eq!(updates.len(), 2);
    assert!(matches!(updates[0], Update::Event { applied: Applied::Logged, .. }));
    assert!(matches!(updates[1], Update::Event { applied: Applied::Failed, .. }));

    let state = controller.state().unwrap();
    assert_eq!(state.run().status, RunStatus::Failed);
    assert_eq!(state.run().error.as_deref(), Some("agent crashed"));
    assert_eq!(state.run().progress, 0);
}

#[tokio::test]
async fn test_http_stream_ends_without_terminal_event() {
    let server = MockServer::start().await;
    mock_run(
        &server,
        "run-3",
        &[r#"{"type":"progress","data":{"progress":30},"timestamp":"2025-01-01T00:00:00Z"}"#],
    )
    .await;

    let mut controller = http_controller(&server);
    controller.start(RunRequest::new("agent", "test")).await.unwrap();

    let state = tokio::time::timeout(Duration::from_secs(5), controller.run_until_finished())
        .await
        .expect("stream should end")
        .unwrap();
    assert_eq!(state.run().status, RunStatus::Running);
    assert_eq!(state.run().progress, 30);
    assert!(state.connection_error().is_some());
    assert!(!controller.is_streaming());
}

#[tokio::test]
async fn test_http_submission_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/runs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
        .mount(&server)
        .await;

    let mut controller = http_controller(&server);
    let result = controller.start(RunRequest::new("agent", "test")).await;

    match result {
        Err(RunError::Submission(TransportError::ApiError { status, message })) => {
            assert_eq!(status, 500);
            assert_eq!(message, "backend down");
        }
        other => panic!("Expected submission error, got {:?}", other.map(|s| s.run().clone())),
    }
    assert!(controller.state().is_none());
}

#[tokio::test]
async fn test_http_upload_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "file_id": "file-abc",
            "name": "notes.txt",
            "size": 5,
            "content_type": "text/plain",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("notes.txt");
    std::fs::write(&file_path, "hello").unwrap();

    let controller = http_controller(&server);
    let uploaded = controller.upload(&file_path).await.unwrap();
    assert_eq!(uploaded.file_id, "file-abc");
    assert_eq!(uploaded.size, 5);

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));
}

/// Read one HTTP request (head and body); returns the head
async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < end + 4 + length {
                let n = stream.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Some(head);
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Backend whose event stream sends one event and then stays open
///
/// Returns the base URL and a receiver that fires once the client drops the
/// stream connection.
async fn open_stream_backend(run_id: &'static str, first_event: &'static str) -> (String, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (closed_tx, closed_rx) = oneshot::channel();
    let closed_tx = Arc::new(Mutex::new(Some(closed_tx)));

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                while let Some(head) = read_request(&mut stream).await {
                    if head.starts_with("POST") {
                        let body = serde_json::json!({ "run_id": run_id, "status": "running" }).to_string();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        if stream.write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                        continue;
                    }

                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\ndata: {}\n\n",
                        first_event
                    );
                    if stream.write_all(response.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = stream.flush().await;

                    // Hold the stream open until the client goes away
                    let mut chunk = [0u8; 64];
                    while let Ok(n) = stream.read(&mut chunk).await {
                        if n == 0 {
                            break;
                        }
                    }
                    if let Some(tx) = closed_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                    return;
                }
            });
        }
    });

    (base_url, closed_rx)
}

#[tokio::test]
async fn test_http_cancel_closes_live_stream() {
    let (base_url, closed_rx) = open_stream_backend(
        "run-live",
        r#"{"type":"progress","data":{"progress":10},"timestamp":"2025-01-01T00:00:00Z"}"#,
    )
    .await;

    let transport = HttpTransport::new(base_url).unwrap();
    let mut controller = RunController::new(Arc::new(transport));
    controller.start(RunRequest::new("agent", "test")).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), controller.next_update())
        .await
        .expect("first event should arrive");
    assert!(matches!(
        first,
        Some(Update::Event { applied: Applied::Progress(10), .. })
    ));
    assert!(controller.is_streaming());

    controller.cancel();
    assert!(!controller.is_streaming());
    assert!(controller.next_update().await.is_none());

    let state = controller.state().unwrap();
    assert_eq!(state.run().status, RunStatus::Running);
    assert_eq!(state.run().progress, 10);
    assert!(state.connection_error().is_none());
    assert_eq!(state.events().len(), 1);

    tokio::time::timeout(Duration::from_secs(5), closed_rx)
        .await
        .expect("cancel should close the stream connection")
        .unwrap();
}

// =============================================================================
// Synthetic Transport Tests
// =============================================================================

#[tokio::test]
async fn test_synthetic_run_completes_with_artifacts() {
    let transport = SyntheticTransport::with_delay(Duration::ZERO, Duration::ZERO);
    let mut controller = RunController::new(Arc::new(transport));
    controller
        .start(RunRequest::new("agent", "test").with_links(vec!["https://example.com".to_string()]))
        .await
        .unwrap();

    let state = tokio::time::timeout(Duration::from_secs(5), controller.run_until_finished())
        .await
        .expect("synthetic run should finish")
        .unwrap();
    let run = state.run();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.progress, 100);
    assert_eq!(run.artifacts.as_ref().map(Vec::len), Some(3));
    assert!(!run.result_summary.as_deref().unwrap_or_default().is_empty());
    assert!(run.error.is_none());
}

#[tokio::test]
async fn test_synthetic_restart_ignores_previous_run() {
    let transport = SyntheticTransport::with_delay(Duration::from_millis(5), Duration::from_millis(5));
    let mut controller = RunController::new(Arc::new(transport));

    let first = controller.start(RunRequest::new("agent", "first")).await.unwrap().run().run_id.clone();
    controller.next_update().await;
    let second = controller.start(RunRequest::new("agent", "second")).await.unwrap().run().run_id.clone();
    assert_ne!(first, second);

    let state = tokio::time::timeout(Duration::from_secs(5), controller.run_until_finished())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.run().run_id, second);
    assert_eq!(state.run().request.instructions, "second");
    assert_eq!(state.run().status, RunStatus::Completed);
}

// =============================================================================
// Cancellation Tests
// =============================================================================

/// Transport that lets the test push events and records which were accepted
#[derive(Default)]
struct SpyTransport {
    sink: Mutex<Option<EventSink>>,
    accepted: Mutex<Vec<bool>>,
}

impl SpyTransport {
    async fn push(&self, event: StreamEvent) -> bool {
        let sink = self.sink.lock().unwrap().take().expect("subscribed");
        let accepted = sink.emit(event).await;
        self.accepted.lock().unwrap().push(accepted);
        *self.sink.lock().unwrap() = Some(sink);
        accepted
    }
}

#[async_trait]
impl RunTransport for SpyTransport {
    async fn submit(&self, _request: &RunRequest, sink: EventSink) -> Result<RunTicket, TransportError> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(RunTicket {
            run_id: "run-spy".to_string(),
            status: RunStatus::Running,
        })
    }

    async fn upload(&self, _path: &Path) -> Result<UploadedFile, TransportError> {
        Err(TransportError::StreamClosed)
    }

    fn name(&self) -> &'static str {
        "spy"
    }
}

#[tokio::test]
async fn test_cancel_allows_zero_deliveries_afterwards() {
    let spy = Arc::new(SpyTransport::default());
    let mut controller = RunController::new(spy.clone());
    controller.start(RunRequest::new("agent", "test")).await.unwrap();

    assert!(spy.push(StreamEvent::progress(20, None)).await);
    assert!(matches!(
        controller.next_update().await,
        Some(Update::Event { applied: Applied::Progress(20), .. })
    ));

    controller.cancel();

    assert!(!spy.push(StreamEvent::progress(60, None)).await);
    assert!(
        !spy
            .push(StreamEvent::complete(RunResult {
                summary: "Done".to_string(),
                artifacts: vec![],
            }))
            .await
    );

    let accepted = spy.accepted.lock().unwrap().clone();
    assert_eq!(accepted, vec![true, false, false]);

    assert!(controller.next_update().await.is_none());
    let run = controller.state().unwrap().run();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.progress, 20);
}

// =============================================================================
// History Tests
// =============================================================================

#[tokio::test]
async fn test_history_replays_recorded_run() {
    let temp = TempDir::new().unwrap();
    let transport = SyntheticTransport::with_delay(Duration::ZERO, Duration::ZERO);
    let mut controller = RunController::new(Arc::new(transport));
    let mut history = RunHistory::new(temp.path());

    let run_id = controller.start(RunRequest::new("agent", "test")).await.unwrap().run().run_id.clone();
    let mut recorded = 0;
    while let Some(update) = controller.next_update().await {
        if let Update::Event { event, .. } = update {
            history.record(&run_id, &event).unwrap();
            recorded += 1;
        }
    }
    history.write_snapshot(controller.state().unwrap().run()).unwrap();

    assert_eq!(history.list_runs().unwrap(), vec![run_id.clone()]);
    let entries = history.read_events(&run_id).unwrap();
    assert_eq!(entries.len(), recorded);
    assert!(entries.last().unwrap().event.is_terminal());
    let snapshot = history.read_snapshot(&run_id).unwrap().unwrap();
    assert_eq!(snapshot.status, RunStatus::Completed);
}

// =============================================================================
// CLI Tests
// =============================================================================

struct CliEnv {
    temp: TempDir,
    config_path: std::path::PathBuf,
}

impl CliEnv {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let runs_dir = temp.path().join("runs");
        let config_path = temp.path().join("agentrun.yml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            "synthetic:\n  min-delay-ms: 0\n  max-delay-ms: 0\nhistory:\n  runs-dir: {}",
            runs_dir.display()
        )
        .unwrap();
        Self { temp, config_path }
    }

    fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::new(env!("CARGO_BIN_EXE_ar"));
        cmd.arg("--config")
            .arg(&self.config_path)
            .env("XDG_DATA_HOME", self.temp.path().join("data"))
            .env("NO_COLOR", "1")
            .env_remove("AGENTRUN_API_URL")
            .timeout(Duration::from_secs(30));
        cmd
    }
}

#[test]
fn test_cli_help() {
    assert_cmd::Command::new(env!("CARGO_BIN_EXE_ar"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn test_cli_run_synthetic_text() {
    let env = CliEnv::new();
    env.command()
        .args(["run", "--agent", "researcher", "--instructions", "test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[complete]"))
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("report.md"));
}

#[test]
fn test_cli_run_json_then_history() {
    let env = CliEnv::new();
    let output = env
        .command()
        .args(["run", "--instructions", "test", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let last = stdout.lines().last().expect("final run line");
    let run: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(run["status"], "completed");
    assert_eq!(run["artifacts"].as_array().map(Vec::len), Some(3));
    let run_id = run["run_id"].as_str().unwrap().to_string();

    env.command()
        .args(["history"])
        .assert()
        .success()
        .stdout(predicate::str::contains(run_id.as_str()));

    env.command()
        .args(["history", &run_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("[complete]"))
        .stdout(predicate::str::contains("Status: completed"));
}

#[test]
fn test_cli_run_no_history() {
    let env = CliEnv::new();
    env.command()
        .args(["run", "--instructions", "test", "--no-history"])
        .assert()
        .success();

    env.command()
        .args(["history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No recorded runs"));
}

#[test]
fn test_cli_run_uploads_files() {
    let env = CliEnv::new();
    let input = env.temp.path().join("input.csv");
    std::fs::write(&input, "a,b\n1,2\n").unwrap();

    env.command()
        .args(["run", "--instructions", "test", "--file"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded input.csv"));
}

#[test]
fn test_cli_upload_json() {
    let env = CliEnv::new();
    let input = env.temp.path().join("notes.md");
    std::fs::write(&input, "# notes\n").unwrap();

    env.command()
        .arg("upload")
        .arg(&input)
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"file_id\": \"file-"))
        .stdout(predicate::str::contains("text/markdown"));
}

#[test]
fn test_cli_history_unknown_run_fails() {
    let env = CliEnv::new();
    env.command()
        .args(["history", "run-missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No history for run run-missing"));
}
