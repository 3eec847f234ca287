//! HTTP client for the agent inside a sandbox.
//!
//! Once a sandbox is ready it exposes a small HTTP surface: command
//! execution, file upload/download, and a health probe. This client holds no
//! sandbox state; the session layer owns the readiness guard and supplies
//! the endpoint per call.

use crate::error::Error;
use crate::plane::Endpoint;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default wall-clock budget for a single command execution.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for file uploads and downloads.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for health probes.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Result from command execution inside a sandbox.
///
/// A non-zero exit code is data, not an error; interpreting it is the
/// caller's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i32,
}

impl ExecutionResult {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    command: &'a str,
}

/// Client for the agent running inside a sandbox.
#[derive(Debug, Clone, Default)]
pub struct AgentClient {
    http: reqwest::Client,
}

impl AgentClient {
    /// Create a new agent client with pooled connections.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Execute a shell command inside the sandbox.
    ///
    /// Fails only on transport or protocol errors; the command's own exit
    /// code is reported in the result.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, Error> {
        tracing::debug!(endpoint = %endpoint, command = %command, "Executing command");
        let response = self
            .http
            .post(Self::url(endpoint, "execute"))
            .json(&ExecuteRequest { command })
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;
        let response = Self::check(response, Error::Execution).await?;
        let result: ExecutionResult = response
            .json()
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;
        tracing::debug!(
            endpoint = %endpoint,
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Command completed"
        );
        Ok(result)
    }

    /// Upload a file to the sandbox.
    ///
    /// Only the base name of `path` is sent; the agent decides placement
    /// under its own working directory.
    pub async fn upload(
        &self,
        endpoint: &Endpoint,
        path: &str,
        content: Vec<u8>,
    ) -> Result<(), Error> {
        let file_name = base_name(path)?;
        tracing::debug!(
            endpoint = %endpoint,
            file_name = %file_name,
            size = content.len(),
            "Uploading file"
        );

        let part = reqwest::multipart::Part::bytes(content).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(Self::url(endpoint, "upload"))
            .multipart(form)
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Transfer(e.to_string()))?;
        Self::check(response, Error::Transfer).await?;
        Ok(())
    }

    /// Download a file from the sandbox.
    pub async fn download(&self, endpoint: &Endpoint, path: &str) -> Result<Bytes, Error> {
        tracing::debug!(endpoint = %endpoint, path = %path, "Downloading file");
        let url = Self::url(endpoint, &format!("download/{}", path.trim_start_matches('/')));
        let response = self
            .http
            .get(url)
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Transfer(e.to_string()))?;
        let response = Self::check(response, Error::Transfer).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transfer(e.to_string()))?;
        tracing::trace!(endpoint = %endpoint, size = bytes.len(), "File downloaded");
        Ok(bytes)
    }

    /// Probe the agent's health endpoint.
    pub async fn health(&self, endpoint: &Endpoint) -> Result<(), Error> {
        let response = self
            .http
            .get(Self::url(endpoint, ""))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;
        Self::check(response, Error::Execution).await?;
        Ok(())
    }

    fn url(endpoint: &Endpoint, path: &str) -> String {
        format!("http://{}/{}", endpoint, path.trim_start_matches('/'))
    }

    /// Map a non-success response to the given error variant, keeping the
    /// response body as diagnostic text.
    async fn check(
        response: reqwest::Response,
        wrap: fn(String) -> Error,
    ) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(wrap(format!("agent returned {status}: {body}")))
    }
}

/// Base name of a client-supplied path. Directory components are stripped so
/// the agent controls placement.
fn base_name(path: &str) -> Result<String, Error> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Transfer(format!("no file name in path '{path}'")))
}
