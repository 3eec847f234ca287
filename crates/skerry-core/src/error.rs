//! Error types for skerry-core.

use crate::plane::PlaneError;
use crate::session::SandboxState;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for skerry-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur over the life of a sandbox session.
#[derive(Debug, Error)]
pub enum Error {
    /// Sandbox spec failed validation
    #[error("invalid sandbox spec: {0}")]
    InvalidSpec(String),

    /// Control plane rejected the resource declaration
    #[error("sandbox declaration rejected: {0}")]
    Declaration(#[source] PlaneError),

    /// Sandbox did not become ready within the deadline
    #[error("sandbox '{name}' did not become ready within {timeout:?}")]
    ReadyTimeout {
        /// Name assigned by the control plane
        name: String,
        /// Deadline that expired
        timeout: Duration,
    },

    /// Operation attempted on a sandbox that is not ready
    #[error("sandbox is not ready (state: {0})")]
    NotReady(SandboxState),

    /// Remote command could not be executed or its reply not decoded
    #[error("command execution failed: {0}")]
    Execution(String),

    /// File upload or download failed
    #[error("file transfer failed: {0}")]
    Transfer(String),

    /// Deleting the sandbox resource failed
    #[error("teardown of sandbox '{name}' failed: {source}")]
    Teardown {
        /// Name of the resource that could not be deleted
        name: String,
        /// Underlying control-plane failure
        #[source]
        source: PlaneError,
    },

    /// Control-plane transport or protocol failure
    #[error("control plane error: {0}")]
    Plane(#[from] PlaneError),
}
