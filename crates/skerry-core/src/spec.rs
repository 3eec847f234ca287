//! Sandbox declaration parameters.

use crate::error::Error;
use std::time::Duration;

/// Default wall-clock budget for a sandbox to become ready.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(180);

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Parameters for declaring a sandbox.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    /// Sandbox class the control plane should provision.
    pub class_name: String,
    /// Namespace the resource is declared in (default: `default`).
    pub namespace: String,
    /// Maximum time to wait for readiness (default: 180s).
    pub ready_timeout: Duration,
}

impl Default for SandboxSpec {
    fn default() -> Self {
        Self {
            class_name: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

impl SandboxSpec {
    /// Spec for the given class with default namespace and timeout.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    /// Create a new spec builder.
    pub fn builder() -> SandboxSpecBuilder {
        SandboxSpecBuilder::default()
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<(), Error> {
        if self.class_name.is_empty() {
            return Err(Error::InvalidSpec("class_name is required".into()));
        }
        if self.namespace.is_empty() {
            return Err(Error::InvalidSpec("namespace must not be empty".into()));
        }
        if self.ready_timeout.is_zero() {
            return Err(Error::InvalidSpec("ready_timeout must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for [`SandboxSpec`].
#[derive(Debug, Default)]
pub struct SandboxSpecBuilder {
    spec: SandboxSpec,
}

impl SandboxSpecBuilder {
    /// Set the sandbox class.
    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.spec.class_name = class_name.into();
        self
    }

    /// Set the namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.spec.namespace = namespace.into();
        self
    }

    /// Set the readiness timeout.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.spec.ready_timeout = timeout;
        self
    }

    /// Build the spec, validating all required fields.
    pub fn build(self) -> Result<SandboxSpec, Error> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}
