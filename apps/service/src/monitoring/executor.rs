use std::sync::Arc;

use anyhow::{Result, anyhow};
use uuid::Uuid;

use super::checker::{HttpCheckRequest, HttpChecker, TcpChecker};
use super::types::{CheckOutcome, CheckStatus};
use super::validation::validate_monitor_target;
use crate::clock::Clock;
use crate::database::Database;
use crate::database::models::{Heartbeat, Monitor, MonitorType};
use crate::notify::StatusEvent;

/// What one check invocation produced: the classified outcome, and the
/// status event to fan out when the check changed the monitor's state.
#[derive(Debug)]
pub struct CheckReport {
    pub outcome: CheckOutcome,
    pub event: Option<StatusEvent>,
}

/// Executes individual checks: validates the target, runs the matching
/// probe, records the heartbeat and detects status transitions.
pub struct CheckExecutor {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    http_checker: HttpChecker,
    tcp_checker: TcpChecker,
}

impl CheckExecutor {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            db,
            clock,
            http_checker: HttpChecker::new()?,
            tcp_checker: TcpChecker::new(),
        })
    }

    /// Run one check by monitor UUID.
    ///
    /// A missing monitor or unavailable store is an error; probe failures
    /// are recorded outcomes.
    pub async fn run_check(&self, monitor_uuid: Uuid) -> Result<CheckReport> {
        let monitor = self
            .db
            .get_monitor(monitor_uuid)
            .await?
            .ok_or_else(|| anyhow!("Monitor not found: {}", monitor_uuid))?;

        self.execute(&monitor).await
    }

    /// Run one check for an already-loaded monitor.
    pub async fn execute(&self, monitor: &Monitor) -> Result<CheckReport> {
        // Defense in depth: the target was validated at write time, but a
        // probe is never launched against a malformed one.
        validate_monitor_target(monitor.monitor_type, &monitor.target)?;

        let monitor_id = monitor.id.ok_or_else(|| anyhow!("Monitor has not been persisted"))?;

        let outcome = match monitor.monitor_type {
            MonitorType::Http => {
                let request = HttpCheckRequest {
                    url: monitor.target.clone(),
                    method: monitor.http_method.clone(),
                    timeout_ms: monitor.timeout_ms,
                    headers: monitor.http_headers.clone(),
                    body: monitor.http_body.clone(),
                    expected_status: monitor.expected_status.clone(),
                    response_keyword: monitor.response_keyword.clone(),
                    response_forbidden_keyword: monitor.response_forbidden_keyword.clone(),
                };
                self.http_checker.check(&request).await
            }
            MonitorType::Tcp => self.tcp_checker.check(&monitor.target, monitor.timeout_ms).await,
        };

        let previous = self.db.latest_heartbeat(monitor_id).await?;

        let checked_at = self.clock.now();
        self.db
            .append_heartbeat(&Heartbeat {
                monitor_id,
                checked_at,
                status: outcome.status,
                latency_ms: outcome.latency_ms,
            })
            .await?;

        tracing::info!(
            monitor = %monitor.uuid,
            status = %outcome.status,
            latency_ms = ?outcome.latency_ms,
            "Check completed"
        );

        let event = transition_event(monitor, previous.as_ref(), &outcome, checked_at);

        Ok(CheckReport { outcome, event })
    }
}

/// A check is state-worthy when it changes the monitor's status. The very
/// first heartbeat only alerts when it is already `down`.
fn transition_event(
    monitor: &Monitor,
    previous: Option<&Heartbeat>,
    outcome: &CheckOutcome,
    checked_at: i64,
) -> Option<StatusEvent> {
    let changed = match previous {
        Some(previous) => previous.status != outcome.status,
        None => outcome.status == CheckStatus::Down,
    };

    changed.then(|| StatusEvent {
        monitor_uuid: monitor.uuid,
        monitor_name: monitor.name.clone(),
        status: outcome.status,
        checked_at,
        error: outcome.error.clone(),
    })
}
