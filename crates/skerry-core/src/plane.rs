//! Control-plane client for sandbox resource declarations.
//!
//! The control plane owns sandbox resources under a custom-resource REST
//! convention: resources are created with a server-generated name, observed
//! through a filtered watch that streams newline-delimited JSON events, and
//! deleted by name. [`ControlPlane`] is the seam the lifecycle logic talks
//! through; [`RestControlPlane`] is the production implementation.

use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

/// API group of the sandbox resource.
pub const API_GROUP: &str = "sandbox.skerry.dev";

/// API version of the sandbox resource.
pub const API_VERSION: &str = "v1";

/// Resource kind submitted in manifests.
pub const KIND: &str = "Sandbox";

/// Plural resource name used in collection URLs.
pub const PLURAL: &str = "sandboxes";

/// Prefix handed to the control plane for server-side name generation.
const GENERATE_NAME_PREFIX: &str = "sbx-";

/// Errors from control-plane requests.
#[derive(Debug, Error)]
pub enum PlaneError {
    /// The named resource does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The control plane answered with a non-success status
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, kept as diagnostic text
        message: String,
    },

    /// Request could not be sent or its response not read
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The watch stream broke mid-flight
    #[error("watch stream error: {0}")]
    Stream(String),

    /// A response payload could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One event from a watch subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    /// Event kind as reported by the control plane (`ADDED`, `MODIFIED`, ...).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Resource snapshot carried by the event.
    pub object: SandboxObject,
}

/// A sandbox resource as returned by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxObject {
    /// Resource metadata.
    pub metadata: Metadata,
    /// Observed status; absent until the controller first reconciles.
    #[serde(default)]
    pub status: SandboxStatus,
}

/// Resource metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Server-assigned resource name.
    pub name: String,
}

/// Observed status of a sandbox resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxStatus {
    /// Controller-reported phase (`Pending`, `Running`). Informational only;
    /// readiness is decided by conditions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Status conditions reported by the controller.
    pub conditions: Vec<Condition>,
    /// Reachable address of the in-sandbox agent, once published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Port of the in-sandbox agent, once published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// A single status condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type (`Ready` is the one that matters here).
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Condition status string (`True`, `False`, `Unknown`).
    pub status: String,
}

impl SandboxStatus {
    /// True iff a `Ready` condition with status `True` is present.
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition_type == "Ready" && c.status == "True")
    }

    /// The agent endpoint, present only once both address and port are
    /// published. The ready condition can land before either field.
    pub fn endpoint(&self) -> Option<Endpoint> {
        match (&self.address, self.port) {
            (Some(address), Some(port)) => Some(Endpoint {
                address: address.clone(),
                port,
            }),
            _ => None,
        }
    }
}

/// Reachable address of a ready sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host address of the in-sandbox agent.
    pub address: String,
    /// Port of the in-sandbox agent.
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Stream of watch events for a single resource.
///
/// Dropping the stream closes the underlying subscription.
pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent, PlaneError>> + Send>>;

/// Client-side view of the cluster control plane.
///
/// This abstraction keeps the lifecycle logic independent of the concrete
/// API server and lets tests substitute a scripted plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Declare a new sandbox of the given class.
    ///
    /// # Returns
    /// The server-assigned resource name. No other side effect on failure.
    async fn create(&self, namespace: &str, class_name: &str) -> Result<String, PlaneError>;

    /// Open a watch subscription filtered to the named resource.
    ///
    /// `timeout` is forwarded to the server as the watch window; the stream
    /// ends when the server closes it.
    async fn watch(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<WatchStream, PlaneError>;

    /// Delete the named sandbox resource.
    ///
    /// # Errors
    /// Returns [`PlaneError::NotFound`] if the resource does not exist, so
    /// callers can treat deletion as idempotent.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), PlaneError>;
}

/// Production [`ControlPlane`] over the cluster's REST API.
///
/// The client is pre-authenticated: it carries an optional bearer token and
/// performs no credential negotiation of its own.
pub struct RestControlPlane {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestControlPlane {
    /// Create a client for the API server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Build a client from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SKERRY_API_URL` | `http://localhost:8001` |
    /// | `SKERRY_API_TOKEN` | (none) |
    pub fn from_env() -> Self {
        let base_url = std::env::var("SKERRY_API_URL")
            .unwrap_or_else(|_| "http://localhost:8001".to_string());
        let mut plane = Self::new(base_url);
        if let Ok(token) = std::env::var("SKERRY_API_TOKEN") {
            plane = plane.with_token(token);
        }
        plane
    }

    fn collection_url(&self, namespace: &str) -> String {
        format!(
            "{}/apis/{}/{}/namespaces/{}/{}",
            self.base_url, API_GROUP, API_VERSION, namespace, PLURAL
        )
    }

    fn resource_url(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.collection_url(namespace), name)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let request = self.http.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Decode a success body, or map the response to [`PlaneError::Api`].
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PlaneError> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::api_error(status, response).await);
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn api_error(status: reqwest::StatusCode, response: reqwest::Response) -> PlaneError {
        let message = response.text().await.unwrap_or_default();
        PlaneError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ControlPlane for RestControlPlane {
    async fn create(&self, namespace: &str, class_name: &str) -> Result<String, PlaneError> {
        let manifest = serde_json::json!({
            "apiVersion": format!("{API_GROUP}/{API_VERSION}"),
            "kind": KIND,
            "metadata": { "generateName": GENERATE_NAME_PREFIX },
            "spec": { "className": class_name },
        });

        let url = self.collection_url(namespace);
        tracing::debug!(%url, class_name = %class_name, "Declaring sandbox resource");
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&manifest)
            .send()
            .await?;
        let object: SandboxObject = Self::decode(response).await?;
        tracing::debug!(name = %object.metadata.name, "Sandbox resource declared");
        Ok(object.metadata.name)
    }

    async fn watch(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<WatchStream, PlaneError> {
        let url = self.collection_url(namespace);
        tracing::debug!(name = %name, timeout_secs = timeout.as_secs(), "Opening watch");
        let response = self
            .request(reqwest::Method::GET, &url)
            .query(&[
                ("watch", "true".to_string()),
                ("fieldSelector", format!("metadata.name={name}")),
                ("timeoutSeconds", timeout.as_secs().to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::api_error(status, response).await);
        }

        // One JSON event per line; blank keep-alive lines are skipped.
        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        let lines = FramedRead::new(reader, LinesCodec::new());
        let events = lines.filter_map(|line| async move {
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => {
                    Some(serde_json::from_str::<WatchEvent>(&line).map_err(PlaneError::Decode))
                }
                Err(e) => Some(Err(PlaneError::Stream(e.to_string()))),
            }
        });
        Ok(Box::pin(events))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), PlaneError> {
        let url = self.resource_url(namespace, name);
        tracing::debug!(name = %name, "Deleting sandbox resource");
        let response = self.request(reqwest::Method::DELETE, &url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PlaneError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(Self::api_error(status, response).await);
        }
        Ok(())
    }
}
