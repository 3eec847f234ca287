//! Readiness watching for declared sandboxes.
//!
//! A declared sandbox becomes usable in two steps that can arrive in separate
//! status updates: the controller sets a `Ready` condition, and it publishes
//! the agent's address and port. The watcher consumes the resource's watch
//! stream until both have been observed, under a hard wall-clock deadline.

use crate::error::Error;
use crate::plane::{ControlPlane, Endpoint, WatchStream};
use futures::StreamExt;
use std::time::Duration;

/// Wait until the named sandbox reports ready and reachable.
///
/// The deadline is enforced locally and covers opening the subscription as
/// well as consuming it, regardless of how long the server takes to answer
/// or keeps the stream open. Every exit path drops the stream, which closes
/// the subscription. A stream that ends before readiness counts as a
/// timeout, since server-side watch windows expire on their own schedule.
pub(crate) async fn wait_until_ready(
    plane: &dyn ControlPlane,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<Endpoint, Error> {
    let start = std::time::Instant::now();
    let wait = async {
        let stream = plane.watch(namespace, name, timeout).await?;
        consume(stream, name).await
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(Ok(Some(endpoint))) => {
            tracing::info!(
                name = %name,
                endpoint = %endpoint,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Sandbox ready"
            );
            Ok(endpoint)
        }
        Ok(Ok(None)) => {
            tracing::warn!(name = %name, "Watch stream ended before sandbox became ready");
            Err(Error::ReadyTimeout {
                name: name.to_string(),
                timeout,
            })
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            tracing::warn!(
                name = %name,
                timeout_secs = timeout.as_secs(),
                "Readiness deadline expired"
            );
            Err(Error::ReadyTimeout {
                name: name.to_string(),
                timeout,
            })
        }
    }
}

/// Consume events until ready with a published endpoint.
///
/// Returns `None` if the stream ends first.
async fn consume(mut stream: WatchStream, name: &str) -> Result<Option<Endpoint>, Error> {
    while let Some(event) = stream.next().await {
        let event = event.map_err(Error::Plane)?;
        let status = &event.object.status;
        tracing::trace!(
            name = %name,
            event_type = %event.event_type,
            phase = ?status.phase,
            "Watch event"
        );

        if !status.is_ready() {
            continue;
        }
        match status.endpoint() {
            Some(endpoint) => return Ok(Some(endpoint)),
            None => {
                // Ready can land before the endpoint is published.
                tracing::debug!(name = %name, "Ready condition set, endpoint not yet published");
            }
        }
    }
    Ok(None)
}
