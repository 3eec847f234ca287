//! End-to-end tests against in-process stub servers.
//!
//! A stub control plane answers the resource REST surface (create, NDJSON
//! watch, delete) and a stub agent answers the in-sandbox HTTP surface, so
//! the full lifecycle runs over real sockets without a cluster.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::json;
use skerry_core::{Error, RestControlPlane, Sandbox, SandboxClient, SandboxSpec};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct StubPlane {
    ndjson: String,
    create_denied: bool,
    delete_404: bool,
    creates: AtomicUsize,
    watches: AtomicUsize,
    deletes: AtomicUsize,
}

async fn serve_plane(plane: Arc<StubPlane>) -> String {
    let app = Router::new()
        .route(
            "/apis/sandbox.skerry.dev/v1/namespaces/:ns/sandboxes",
            post(plane_create).get(plane_watch),
        )
        .route(
            "/apis/sandbox.skerry.dev/v1/namespaces/:ns/sandboxes/:name",
            axum::routing::delete(plane_delete),
        )
        .with_state(plane);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn plane_create(State(plane): State<Arc<StubPlane>>) -> Response {
    plane.creates.fetch_add(1, Ordering::SeqCst);
    if plane.create_denied {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "sandbox class not allowed" })),
        )
            .into_response();
    }
    Json(json!({
        "apiVersion": "sandbox.skerry.dev/v1",
        "kind": "Sandbox",
        "metadata": { "name": "sbx-abc" }
    }))
    .into_response()
}

async fn plane_watch(State(plane): State<Arc<StubPlane>>) -> Response {
    plane.watches.fetch_add(1, Ordering::SeqCst);
    // Fragmented chunks force the client to reassemble event lines.
    let chunks: Vec<Result<Bytes, std::io::Error>> = plane
        .ndjson
        .as_bytes()
        .chunks(7)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Body::from_stream(futures::stream::iter(chunks)).into_response()
}

async fn plane_delete(
    State(plane): State<Arc<StubPlane>>,
    Path((_ns, _name)): Path<(String, String)>,
) -> Response {
    plane.deletes.fetch_add(1, Ordering::SeqCst);
    if plane.delete_404 {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "not found" })),
        )
            .into_response();
    }
    Json(json!({ "status": "Success" })).into_response()
}

#[derive(Default)]
struct StubAgent {
    fail_execute: bool,
    commands: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

async fn serve_agent(agent: Arc<StubAgent>) -> SocketAddr {
    let app = Router::new()
        .route("/", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/execute", post(agent_execute))
        .route("/upload", post(agent_upload))
        .route("/download/*path", get(agent_download))
        .with_state(agent);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn agent_execute(
    State(agent): State<Arc<StubAgent>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    agent
        .commands
        .lock()
        .unwrap()
        .push(body["command"].as_str().unwrap_or_default().to_string());
    if agent.fail_execute {
        return (StatusCode::INTERNAL_SERVER_ERROR, "agent crashed").into_response();
    }
    Json(json!({ "stdout": "ok\n", "stderr": "", "exit_code": 0 })).into_response()
}

async fn agent_upload(
    State(agent): State<Arc<StubAgent>>,
    mut multipart: Multipart,
) -> Json<serde_json::Value> {
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.unwrap();
            agent.uploads.lock().unwrap().push((name, data.to_vec()));
        }
    }
    Json(json!({ "message": "File uploaded successfully." }))
}

async fn agent_download(Path(path): Path<String>) -> Response {
    if path == "out/report.json" {
        (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            r#"{"rows":2}"#,
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "File not found" })),
        )
            .into_response()
    }
}

/// Two status updates: ready without an endpoint, then ready with one.
fn ndjson_ready_events(address: &str, port: u16) -> String {
    let first = json!({
        "type": "ADDED",
        "object": {
            "metadata": { "name": "sbx-abc" },
            "status": {
                "phase": "Pending",
                "conditions": [ { "type": "Ready", "status": "True" } ]
            }
        }
    });
    let second = json!({
        "type": "MODIFIED",
        "object": {
            "metadata": { "name": "sbx-abc" },
            "status": {
                "phase": "Running",
                "conditions": [ { "type": "Ready", "status": "True" } ],
                "address": address,
                "port": port
            }
        }
    });
    format!("{first}\n{second}\n")
}

async fn open_sandbox(base_url: String) -> Sandbox {
    let client = SandboxClient::new(Arc::new(RestControlPlane::new(base_url)));
    let spec = SandboxSpec::builder()
        .class_name("python-3.12")
        .ready_timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    client.open(spec).await.expect("open should succeed")
}

#[tokio::test]
async fn test_open_reports_generated_name_and_endpoint() {
    let plane = Arc::new(StubPlane {
        ndjson: ndjson_ready_events("10.0.0.5", 8080),
        ..StubPlane::default()
    });
    let base_url = serve_plane(plane.clone()).await;

    let mut sandbox = open_sandbox(base_url).await;
    assert_eq!(sandbox.name(), Some("sbx-abc"));
    assert_eq!(format!("{}", sandbox.endpoint().unwrap()), "10.0.0.5:8080");
    assert_eq!(plane.creates.load(Ordering::SeqCst), 1);
    assert_eq!(plane.watches.load(Ordering::SeqCst), 1);

    sandbox.close().await.unwrap();
    assert_eq!(plane.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_execute_roundtrip() {
    let agent = Arc::new(StubAgent::default());
    let addr = serve_agent(agent.clone()).await;
    let plane = Arc::new(StubPlane {
        ndjson: ndjson_ready_events(&addr.ip().to_string(), addr.port()),
        ..StubPlane::default()
    });
    let base_url = serve_plane(plane.clone()).await;

    let mut sandbox = open_sandbox(base_url).await;
    assert!(sandbox.ping().await);

    let result = sandbox.run("echo ok").await.unwrap();
    assert_eq!(result.stdout, "ok\n");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_code, 0);
    assert!(result.success());
    assert_eq!(agent.commands.lock().unwrap().as_slice(), ["echo ok"]);

    sandbox.close().await.unwrap();
    assert_eq!(plane.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_file_transfer_roundtrip() {
    let agent = Arc::new(StubAgent::default());
    let addr = serve_agent(agent.clone()).await;
    let plane = Arc::new(StubPlane {
        ndjson: ndjson_ready_events(&addr.ip().to_string(), addr.port()),
        ..StubPlane::default()
    });
    let base_url = serve_plane(plane.clone()).await;

    let mut sandbox = open_sandbox(base_url).await;

    // Directory components must be stripped before the upload goes out.
    sandbox
        .write_file("local/staging/data.txt", b"hello agent")
        .await
        .unwrap();
    {
        let uploads = agent.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "data.txt");
        assert_eq!(uploads[0].1, b"hello agent");
    }

    let report = sandbox.read_file("out/report.json").await.unwrap();
    assert_eq!(&report[..], br#"{"rows":2}"#);

    let err = sandbox.read_file("missing.txt").await.unwrap_err();
    assert!(matches!(err, Error::Transfer(_)));
    assert!(err.to_string().contains("File not found"));

    sandbox.close().await.unwrap();
}

#[tokio::test]
async fn test_body_error_then_close_deletes_once() {
    let agent = Arc::new(StubAgent {
        fail_execute: true,
        ..StubAgent::default()
    });
    let addr = serve_agent(agent.clone()).await;
    let plane = Arc::new(StubPlane {
        ndjson: ndjson_ready_events(&addr.ip().to_string(), addr.port()),
        ..StubPlane::default()
    });
    let base_url = serve_plane(plane.clone()).await;

    let mut sandbox = open_sandbox(base_url).await;
    let err = sandbox.run("echo ok").await.unwrap_err();
    assert!(matches!(err, Error::Execution(_)));
    assert!(err.to_string().contains("500"));

    sandbox.close().await.unwrap();
    assert_eq!(plane.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_operations_after_close_reach_no_agent() {
    let agent = Arc::new(StubAgent::default());
    let addr = serve_agent(agent.clone()).await;
    let plane = Arc::new(StubPlane {
        ndjson: ndjson_ready_events(&addr.ip().to_string(), addr.port()),
        ..StubPlane::default()
    });
    let base_url = serve_plane(plane.clone()).await;

    let mut sandbox = open_sandbox(base_url).await;
    sandbox.close().await.unwrap();

    let err = sandbox.run("echo ok").await.unwrap_err();
    assert!(matches!(err, Error::NotReady(_)));
    assert!(agent.commands.lock().unwrap().is_empty());
    assert!(agent.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_watch_ending_early_times_out_and_cleans_up() {
    // The stub closes the watch stream without ever reporting readiness.
    let plane = Arc::new(StubPlane::default());
    let base_url = serve_plane(plane.clone()).await;

    let client = SandboxClient::new(Arc::new(RestControlPlane::new(base_url)));
    let spec = SandboxSpec::builder()
        .class_name("python-3.12")
        .ready_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let err = client.open(spec).await.unwrap_err();

    assert!(matches!(err, Error::ReadyTimeout { .. }));
    assert_eq!(plane.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_tolerates_plane_not_found() {
    let plane = Arc::new(StubPlane {
        ndjson: ndjson_ready_events("10.0.0.5", 8080),
        delete_404: true,
        ..StubPlane::default()
    });
    let base_url = serve_plane(plane.clone()).await;

    let mut sandbox = open_sandbox(base_url).await;
    sandbox.close().await.unwrap();
    assert_eq!(plane.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_denied_declaration_surfaces_and_skips_cleanup() {
    let plane = Arc::new(StubPlane {
        create_denied: true,
        ..StubPlane::default()
    });
    let base_url = serve_plane(plane.clone()).await;

    let client = SandboxClient::new(Arc::new(RestControlPlane::new(base_url)));
    let err = client
        .open(SandboxSpec::new("python-3.12"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Declaration(_)));
    assert!(err.to_string().contains("sandbox class not allowed"));
    assert_eq!(plane.deletes.load(Ordering::SeqCst), 0);
}
