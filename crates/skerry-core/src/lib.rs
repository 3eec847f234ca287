//! # skerry-core
//!
//! Sandbox lifecycle manager for Skerry remote sandboxes.
//!
//! This crate declares sandbox resources against a cluster control plane,
//! waits for them to become reachable, and brokers command execution and
//! file transfer against the agent running inside the sandbox.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   skerry-core (host)                     │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐    │
//! │  │  SandboxClient  │────▶│  ControlPlane            │    │
//! │  │   - open()      │     │  (RestControlPlane)      │    │
//! │  └─────────────────┘     │  - create()              │    │
//! │           │              │  - watch() ──▶ NDJSON    │    │
//! │           ▼              │  - delete()              │    │
//! │  ┌─────────────────┐     └──────────────────────────┘    │
//! │  │    Sandbox      │                                     │
//! │  │  - run()        │     ┌──────────────────────────┐    │
//! │  │  - write_file() │────▶│  AgentClient             │    │
//! │  │  - read_file()  │     │  - execute()             │    │
//! │  │  - close()      │     │  - upload() / download() │    │
//! │  └─────────────────┘     └──────────────────────────┘    │
//! │                                     │ HTTP               │
//! └─────────────────────────────────────┼────────────────────┘
//!                                       ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                skerry-agent (in sandbox)                 │
//! │        /   /execute   /upload   /download/{path}         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use skerry_core::{RestControlPlane, SandboxClient, SandboxSpec};
//! use std::sync::Arc;
//!
//! # async fn example() -> skerry_core::Result<()> {
//! let plane = Arc::new(RestControlPlane::from_env());
//! let client = SandboxClient::new(plane);
//!
//! // Declare a sandbox and wait for it to become reachable
//! let mut sandbox = client.open(SandboxSpec::new("python-3.12")).await?;
//!
//! // Run a command; a non-zero exit code is data, not an error
//! let result = sandbox.run("python3 -V").await?;
//! println!("{} (exit {})", result.stdout.trim(), result.exit_code);
//!
//! // Move files in and out
//! sandbox.write_file("input.csv", "a,b\n1,2\n").await?;
//! let report = sandbox.read_file("out/report.json").await?;
//! println!("{} bytes", report.len());
//!
//! // Tear down; the resource is deleted even if this is skipped
//! sandbox.close().await?;
//! # Ok(())
//! # }
//! ```

mod agent;
mod error;
mod plane;
mod session;
mod spec;
mod watch;

pub use agent::{AgentClient, ExecutionResult, DEFAULT_EXEC_TIMEOUT};
pub use error::{Error, Result};
pub use plane::{
    Condition, ControlPlane, Endpoint, Metadata, PlaneError, RestControlPlane, SandboxObject,
    SandboxStatus, WatchEvent, WatchStream, API_GROUP, API_VERSION, KIND, PLURAL,
};
pub use session::{Sandbox, SandboxClient, SandboxState};
pub use spec::{SandboxSpec, SandboxSpecBuilder, DEFAULT_NAMESPACE, DEFAULT_READY_TIMEOUT};
