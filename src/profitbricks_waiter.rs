//! Waiting for asynchronous provider work.
//!
//! Two pollers share one `WaitPolicy`:
//! - `wait_for_request` polls a request id until `DONE`, `FAILED` or the deadline.
//! - `wait_for_power_state` polls servers until their `vmState` reaches a target.
//!
//! Each iteration sleeps first, then polls. There is no backoff and no
//! cancellation: a request still in flight when the deadline elapses is
//! reported as a timeout and left to finish on the provider side.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::profitbricks_api::CloudApi;
use crate::profitbricks_error::{ProfitbricksError, RemoteContext, Result};
use crate::profitbricks_state::PowerState;
use crate::profitbricks_types::{RequestState, ResourceKind};

/// How (and whether) to wait for provider work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Skip waiting entirely when false.
    pub enabled: bool,
    /// Deadline measured from the start of a wait.
    pub timeout: Duration,
    /// Sleep between polls.
    pub poll_interval: Duration,
}

impl WaitPolicy {
    /// Poll interval used when none is configured.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Policy with the default poll interval.
    #[must_use]
    pub const fn new(enabled: bool, timeout_secs: u64) -> Self {
        Self {
            enabled,
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(true, 600)
    }
}

/// Poll a provider request until it completes.
///
/// Returns immediately when waiting is disabled or the call produced no request id.
///
/// # Errors
///
/// Returns `OperationFailed` when the request ends in `FAILED`, `Timeout` when the
/// deadline elapses first, and `Remote` when a status poll fails.
pub async fn wait_for_request<A: CloudApi + ?Sized>(
    api: &A,
    policy: &WaitPolicy,
    request_id: Option<&str>,
    operation: &str,
) -> Result<()> {
    let Some(request_id) = request_id else {
        return Ok(());
    };
    if !policy.enabled {
        return Ok(());
    }

    let start = Instant::now();
    let mut polls: u32 = 0;

    loop {
        tokio::time::sleep(policy.poll_interval).await;
        polls = polls.saturating_add(1);

        let status = api
            .request_status(request_id)
            .await
            .remote("poll request status")?;

        let state = status.metadata.status;
        if state.is_terminal() {
            if state == RequestState::Failed {
                return Err(ProfitbricksError::OperationFailed {
                    operation: operation.to_string(),
                    request_id: request_id.to_string(),
                    message: status.metadata.message,
                });
            }
            debug!(request_id, operation, polls, "request done");
            return Ok(());
        }
        debug!(request_id, operation, ?state, polls, "request pending");

        if start.elapsed() >= policy.timeout {
            return Err(ProfitbricksError::Timeout {
                operation: operation.to_string(),
                target: request_id.to_string(),
            });
        }
    }
}

/// Poll servers until every one of them reports the target power state.
///
/// # Errors
///
/// Returns `Timeout` when the deadline elapses first, `NotFound` when a server
/// disappears, and `Remote` when a poll fails.
pub async fn wait_for_power_state<A: CloudApi + ?Sized>(
    api: &A,
    policy: &WaitPolicy,
    datacenter_id: &str,
    server_ids: &[String],
    target: PowerState,
) -> Result<()> {
    if !policy.enabled || server_ids.is_empty() {
        return Ok(());
    }

    let start = Instant::now();
    let mut pending: Vec<&str> = server_ids.iter().map(String::as_str).collect();

    loop {
        tokio::time::sleep(policy.poll_interval).await;

        let mut still_pending = Vec::with_capacity(pending.len());
        for id in pending {
            let server = api
                .get_server(datacenter_id, id)
                .await
                .remote("poll server state")?
                .ok_or_else(|| ProfitbricksError::not_found(ResourceKind::Server, id))?;

            let vm_state = server.properties.vm_state.as_deref().unwrap_or_default();
            if target.matches(vm_state) {
                info!(server_id = id, vm_state, "server reached power state");
            } else {
                debug!(server_id = id, vm_state, ?target, "server not there yet");
                still_pending.push(id);
            }
        }
        pending = still_pending;

        if pending.is_empty() {
            return Ok(());
        }

        if start.elapsed() >= policy.timeout {
            return Err(ProfitbricksError::Timeout {
                operation: format!("servers to become {target}"),
                target: pending.join(", "),
            });
        }
    }
}
