//! Sandbox session lifecycle.
//!
//! [`SandboxClient::open`] declares a sandbox resource, waits for it to
//! become reachable, and returns a live [`Sandbox`] handle. The handle owns
//! the remote resource: however the session ends, the resource is deleted
//! exactly once, and a teardown failure never masks a more specific error
//! that was already in flight.

use crate::agent::{AgentClient, ExecutionResult, DEFAULT_EXEC_TIMEOUT};
use crate::error::{Error, Result};
use crate::plane::{ControlPlane, Endpoint, PlaneError};
use crate::spec::SandboxSpec;
use crate::watch;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle state of a sandbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Resource declaration submitted to the control plane.
    Declaring,
    /// Waiting for the readiness condition and endpoint.
    Waiting,
    /// Reachable and accepting operations.
    Ready,
    /// Torn down; the handle can no longer be used.
    Closed,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declaring => write!(f, "Declaring"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Ready => write!(f, "Ready"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Entry point for opening sandbox sessions.
///
/// Cheap to clone; sessions opened from the same client share HTTP
/// connection pools but are otherwise fully independent.
#[derive(Clone)]
pub struct SandboxClient {
    plane: Arc<dyn ControlPlane>,
    agent: AgentClient,
}

impl SandboxClient {
    /// Create a client over the given control plane.
    pub fn new(plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            plane,
            agent: AgentClient::new(),
        }
    }

    /// Declare a sandbox, wait for it to become ready, and return the handle.
    ///
    /// If the declaration itself is rejected, nothing exists and nothing is
    /// cleaned up. If the wait fails after the resource was declared, the
    /// resource is deleted before the wait error is returned; a failure of
    /// that cleanup is logged, never surfaced in place of the wait error.
    pub async fn open(&self, spec: SandboxSpec) -> Result<Sandbox> {
        spec.validate()?;
        let start = std::time::Instant::now();
        tracing::info!(
            class_name = %spec.class_name,
            namespace = %spec.namespace,
            state = %SandboxState::Declaring,
            "Opening sandbox session"
        );

        let name = self
            .plane
            .create(&spec.namespace, &spec.class_name)
            .await
            .map_err(Error::Declaration)?;
        tracing::debug!(
            name = %name,
            state = %SandboxState::Waiting,
            "Sandbox declared, awaiting readiness"
        );

        let endpoint = match watch::wait_until_ready(
            self.plane.as_ref(),
            &spec.namespace,
            &name,
            spec.ready_timeout,
        )
        .await
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                // The resource exists; release it before surfacing the error.
                if let Err(td) =
                    delete_resource(self.plane.as_ref(), &spec.namespace, &name).await
                {
                    tracing::warn!(
                        name = %name,
                        error = %td,
                        "Cleanup after failed open also failed"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            name = %name,
            endpoint = %endpoint,
            elapsed_ms = start.elapsed().as_millis() as u64,
            state = %SandboxState::Ready,
            "Sandbox session open"
        );

        Ok(Sandbox {
            spec,
            plane: Arc::clone(&self.plane),
            agent: self.agent.clone(),
            instance_name: Some(name),
            endpoint: Some(endpoint),
            state: SandboxState::Ready,
            created_at: Utc::now(),
        })
    }
}

/// A live sandbox session.
///
/// Obtained from [`SandboxClient::open`]. Operations require the `Ready`
/// state; after [`close`](Sandbox::close) every operation fails with
/// [`Error::NotReady`] without touching the network. Dropping an unclosed
/// handle spawns a best-effort delete as a safety net; call `close` to
/// observe teardown errors.
pub struct Sandbox {
    spec: SandboxSpec,
    plane: Arc<dyn ControlPlane>,
    agent: AgentClient,
    instance_name: Option<String>,
    endpoint: Option<Endpoint>,
    state: SandboxState,
    created_at: DateTime<Utc>,
}

impl Sandbox {
    /// Control-plane name of this sandbox instance, until closed.
    pub fn name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    /// Namespace the resource was declared in.
    pub fn namespace(&self) -> &str {
        &self.spec.namespace
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// Agent endpoint, present while the sandbox is ready.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// The spec this sandbox was opened with.
    pub fn spec(&self) -> &SandboxSpec {
        &self.spec
    }

    /// Creation timestamp of this session.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the sandbox is ready for operations.
    pub fn is_ready(&self) -> bool {
        self.state == SandboxState::Ready && self.endpoint.is_some()
    }

    /// Run a shell command with the default timeout.
    ///
    /// A non-zero exit code is reported in the result, not as an error.
    pub async fn run(&self, command: &str) -> Result<ExecutionResult> {
        self.run_with_timeout(command, DEFAULT_EXEC_TIMEOUT).await
    }

    /// Run a shell command with an explicit timeout.
    pub async fn run_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        let endpoint = self.ensure_ready()?;
        self.agent.execute(endpoint, command, timeout).await
    }

    /// Upload a file into the sandbox.
    ///
    /// Directory components of `path` are stripped; the agent stores the
    /// file under its own working directory.
    pub async fn write_file(&self, path: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let endpoint = self.ensure_ready()?;
        self.agent
            .upload(endpoint, path, content.as_ref().to_vec())
            .await
    }

    /// Download a file from the sandbox.
    pub async fn read_file(&self, path: &str) -> Result<Bytes> {
        let endpoint = self.ensure_ready()?;
        self.agent.download(endpoint, path).await
    }

    /// Check that the agent answers its health probe.
    pub async fn ping(&self) -> bool {
        match self.ensure_ready() {
            Ok(endpoint) => self.agent.health(endpoint).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Tear down the sandbox resource.
    ///
    /// The delete call is issued at most once per session, even if it fails;
    /// an already-gone resource counts as success. Calling `close` again is
    /// a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(name) = self.instance_name.take() else {
            tracing::debug!("Close on an already-closed sandbox, nothing to do");
            return Ok(());
        };
        let start = std::time::Instant::now();
        tracing::info!(name = %name, "Closing sandbox session");
        self.endpoint = None;
        self.state = SandboxState::Closed;

        delete_resource(self.plane.as_ref(), &self.spec.namespace, &name).await?;
        tracing::info!(
            name = %name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sandbox session closed"
        );
        Ok(())
    }

    /// Ensure the sandbox is ready, returning its endpoint.
    fn ensure_ready(&self) -> Result<&Endpoint> {
        match (&self.endpoint, self.state) {
            (Some(endpoint), SandboxState::Ready) => Ok(endpoint),
            _ => Err(Error::NotReady(self.state)),
        }
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("instance_name", &self.instance_name)
            .field("namespace", &self.spec.namespace)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        let Some(name) = self.instance_name.take() else {
            return;
        };
        // Safety net for handles dropped without close().
        let plane = Arc::clone(&self.plane);
        let namespace = self.spec.namespace.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(name = %name, "Sandbox dropped without close, deleting in background");
                handle.spawn(async move {
                    if let Err(e) = delete_resource(plane.as_ref(), &namespace, &name).await {
                        tracing::error!(name = %name, error = %e, "Background sandbox delete failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    name = %name,
                    namespace = %namespace,
                    "Sandbox dropped outside a runtime, resource leaked"
                );
            }
        }
    }
}

/// Delete the resource, treating an already-gone resource as success.
async fn delete_resource(plane: &dyn ControlPlane, namespace: &str, name: &str) -> Result<()> {
    match plane.delete(namespace, name).await {
        Ok(()) => {
            tracing::debug!(name = %name, "Sandbox resource deleted");
            Ok(())
        }
        Err(PlaneError::NotFound(_)) => {
            tracing::debug!(name = %name, "Sandbox resource already gone");
            Ok(())
        }
        Err(e) => Err(Error::Teardown {
            name: name.to_string(),
            source: e,
        }),
    }
}
