//! HTTP surface of the skerry agent.
//!
//! ## Endpoints
//!
//! - `GET /` - Health check
//! - `POST /execute` - Run a command, returns stdout/stderr/exit code
//! - `POST /upload` - Multipart upload, field name `file`
//! - `GET /download/{path}` - Fetch a file from the working directory

use crate::config::AgentConfig;
use crate::exec::{run_command, ExecResult};
use crate::fs::{open_file, save_upload};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

/// Body of an execute request.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
}

/// Build the HTTP router for the agent.
///
/// The returned router can be served directly with axum or composed
/// into a larger application.
pub fn build_router(config: Arc<AgentConfig>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/execute", post(execute_handler))
        // Uploads regularly exceed axum's 2 MB default body cap.
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::disable()),
        )
        .route("/download/*path", get(download_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(config)
}

/// Health check endpoint.
async fn root_handler() -> impl IntoResponse {
    tracing::trace!("health check request");
    Json(serde_json::json!({
        "status": "ok",
        "service": "skerry-agent"
    }))
}

async fn execute_handler(
    State(config): State<Arc<AgentConfig>>,
    Json(request): Json<ExecuteRequest>,
) -> Json<ExecResult> {
    Json(run_command(&request.command, &config.workdir).await)
}

async fn upload_handler(
    State(config): State<Arc<AgentConfig>>,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return message_response(
                    StatusCode::BAD_REQUEST,
                    format!("File upload failed: {e}"),
                )
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload.bin").to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                return message_response(
                    StatusCode::BAD_REQUEST,
                    format!("File upload failed: {e}"),
                )
            }
        };
        return match save_upload(&config.workdir, &file_name, &data).await {
            Ok(stored) => message_response(
                StatusCode::OK,
                format!("File '{stored}' uploaded successfully."),
            ),
            Err(e) => message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("File upload failed: {e}"),
            ),
        };
    }
    message_response(
        StatusCode::BAD_REQUEST,
        "File upload failed: no 'file' field".to_string(),
    )
}

async fn download_handler(
    State(config): State<Arc<AgentConfig>>,
    Path(path): Path<String>,
) -> Response {
    match open_file(&config.workdir, &path).await {
        Ok(Some(file)) => {
            // Streamed out chunk by chunk; the file never sits in memory whole.
            let body = Body::from_stream(ReaderStream::new(file));
            ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response()
        }
        Ok(None) => message_response(StatusCode::NOT_FOUND, "File not found".to_string()),
        Err(e) => message_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("File download failed: {e}"),
        ),
    }
}

/// JSON `{"message": ...}` body with the given status.
fn message_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}

/// Start the HTTP server.
///
/// Runs until the provided shutdown future completes.
pub async fn serve(
    config: AgentConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let addr = config.listen_addr;
    let router = build_router(Arc::new(config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
