//! Status roll-ups over recorded heartbeats.
//!
//! Everything here is a pure function of monitor rows and heartbeat slices;
//! callers fetch the data and inject the current time.

use serde::Serialize;
use uuid::Uuid;

use crate::database::models::{Heartbeat, Monitor};
use crate::monitoring::types::{CheckStatus, MonitorStatus};

/// Multiple of the check interval after which a monitor counts as stale and
/// after which a heartbeat stops earning uptime credit.
const STALENESS_MULTIPLIER: u64 = 2;

/// Current status of a monitor. `Paused` (inactive monitor) overrides
/// whatever the heartbeats say; no heartbeats at all means `Unknown`.
pub fn current_status(is_active: bool, latest: Option<&Heartbeat>) -> MonitorStatus {
    if !is_active {
        return MonitorStatus::Paused;
    }

    match latest {
        Some(heartbeat) => heartbeat.status.into(),
        None => MonitorStatus::Unknown,
    }
}

/// A monitor is stale when its latest heartbeat is older than the staleness
/// allowance, signaling the scheduler has stopped invoking checks. A monitor
/// that was never checked is not stale, only unknown.
pub fn is_stale(now: i64, latest_checked_at: Option<i64>, interval_sec: u64) -> bool {
    match latest_checked_at {
        Some(checked_at) => {
            now.saturating_sub(checked_at) > (STALENESS_MULTIPLIER * interval_sec) as i64
        }
        None => false,
    }
}

fn severity(status: MonitorStatus) -> u8 {
    match status {
        MonitorStatus::Down => 4,
        MonitorStatus::Maintenance => 3,
        MonitorStatus::Unknown => 2,
        MonitorStatus::Paused => 1,
        MonitorStatus::Up => 0,
    }
}

/// Worst-case roll-up: down > maintenance > unknown > paused > up. An empty
/// slice rolls up to `Up`.
pub fn aggregate_status(statuses: &[MonitorStatus]) -> MonitorStatus {
    statuses
        .iter()
        .copied()
        .max_by_key(|status| severity(*status))
        .unwrap_or(MonitorStatus::Up)
}

/// Per-status monitor counts.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub up: usize,
    pub down: usize,
    pub maintenance: usize,
    pub paused: usize,
    pub unknown: usize,
}

impl StatusSummary {
    fn record(&mut self, status: MonitorStatus) {
        match status {
            MonitorStatus::Up => self.up += 1,
            MonitorStatus::Down => self.down += 1,
            MonitorStatus::Maintenance => self.maintenance += 1,
            MonitorStatus::Paused => self.paused += 1,
            MonitorStatus::Unknown => self.unknown += 1,
        }
    }
}

/// One monitor's line on the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub uuid: Uuid,
    pub name: String,
    pub status: MonitorStatus,
    pub is_stale: bool,
    pub last_checked_at: Option<i64>,
    pub last_latency_ms: Option<u64>,
}

/// System-wide status view.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub generated_at: i64,
    pub overall_status: MonitorStatus,
    pub summary: StatusSummary,
    pub monitors: Vec<MonitorSnapshot>,
}

/// Roll up every monitor's latest heartbeat into the system view.
///
/// Monitors with zero heartbeats count as `unknown` in the summary but are
/// left out of the overall verdict, so an unchecked monitor never blocks an
/// otherwise-up system. A recorded `unknown` heartbeat does participate.
pub fn system_status(monitors: &[(Monitor, Option<Heartbeat>)], now: i64) -> SystemStatus {
    let mut summary = StatusSummary::default();
    let mut verdict_inputs = Vec::new();
    let mut snapshots = Vec::with_capacity(monitors.len());

    for (monitor, latest) in monitors {
        let status = current_status(monitor.is_active, latest.as_ref());
        summary.record(status);

        if latest.is_some() || !monitor.is_active {
            verdict_inputs.push(status);
        }

        snapshots.push(MonitorSnapshot {
            uuid: monitor.uuid,
            name: monitor.name.clone(),
            status,
            is_stale: is_stale(now, latest.as_ref().map(|hb| hb.checked_at), monitor.interval_sec),
            last_checked_at: latest.as_ref().map(|hb| hb.checked_at),
            last_latency_ms: latest.as_ref().and_then(|hb| hb.latency_ms),
        });
    }

    SystemStatus {
        generated_at: now,
        overall_status: aggregate_status(&verdict_inputs),
        summary,
        monitors: snapshots,
    }
}

/// Latency statistics over a heartbeat window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub avg_latency_ms: Option<u64>,
    pub p95_latency_ms: Option<u64>,
}

/// Average and 95th-percentile latency over `up` heartbeats only, so
/// transport failures never skew the numbers.
pub fn latency_stats(heartbeats: &[Heartbeat]) -> LatencyStats {
    let mut latencies: Vec<u64> = heartbeats
        .iter()
        .filter(|hb| hb.status == CheckStatus::Up)
        .filter_map(|hb| hb.latency_ms)
        .collect();

    if latencies.is_empty() {
        return LatencyStats { avg_latency_ms: None, p95_latency_ms: None };
    }

    let sum: u64 = latencies.iter().sum();
    let avg = (sum as f64 / latencies.len() as f64).round() as u64;

    latencies.sort_unstable();
    // Nearest-rank percentile.
    let rank = ((latencies.len() as f64) * 0.95).ceil() as usize;
    let p95 = latencies[rank.clamp(1, latencies.len()) - 1];

    LatencyStats { avg_latency_ms: Some(avg), p95_latency_ms: Some(p95) }
}

/// Uptime accounting over a time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UptimeStats {
    pub total_sec: u64,
    pub uptime_sec: u64,
    pub downtime_sec: u64,
    pub unknown_sec: u64,
    pub uptime_pct: f64,
}

/// Credit each heartbeat from its `checked_at` until the next heartbeat (or
/// the window end), capped at the staleness allowance; anything past the cap
/// and any time before the first heartbeat is unknown.
///
/// `uptime_pct` is computed over accounted time only: a window with no data
/// carries no evidence of downtime and reads 100%.
///
/// Expects `heartbeats` sorted ascending with `checked_at` inside
/// `[range_start, range_end]`, as `heartbeats_in_range` returns them.
pub fn uptime_stats(
    heartbeats: &[Heartbeat],
    range_start: i64,
    range_end: i64,
    interval_sec: u64,
) -> UptimeStats {
    let total_sec = range_end.saturating_sub(range_start).max(0) as u64;
    let credit_cap = STALENESS_MULTIPLIER * interval_sec;

    let mut uptime_sec = 0u64;
    let mut downtime_sec = 0u64;

    for (index, heartbeat) in heartbeats.iter().enumerate() {
        let span_end = match heartbeats.get(index + 1) {
            Some(next) => next.checked_at,
            None => range_end,
        };
        let span = span_end.saturating_sub(heartbeat.checked_at).max(0) as u64;
        let credited = span.min(credit_cap);

        match heartbeat.status {
            CheckStatus::Up | CheckStatus::Maintenance => uptime_sec += credited,
            CheckStatus::Down => downtime_sec += credited,
            CheckStatus::Unknown => {}
        }
    }

    let accounted = uptime_sec + downtime_sec;
    let unknown_sec = total_sec.saturating_sub(accounted);
    let uptime_pct = if accounted == 0 {
        100.0
    } else {
        100.0 * uptime_sec as f64 / accounted as f64
    };

    UptimeStats { total_sec, uptime_sec, downtime_sec, unknown_sec, uptime_pct }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::MonitorType;

    fn heartbeat(checked_at: i64, status: CheckStatus, latency_ms: Option<u64>) -> Heartbeat {
        Heartbeat { monitor_id: 1, checked_at, status, latency_ms }
    }

    fn monitor(name: &str, is_active: bool) -> Monitor {
        let mut monitor = Monitor::new(
            name.to_string(),
            MonitorType::Http,
            "https://example.com".to_string(),
            1_700_000_000,
        );
        monitor.is_active = is_active;
        monitor
    }

    #[test]
    fn test_current_status() {
        let up = heartbeat(0, CheckStatus::Up, Some(10));
        assert_eq!(current_status(true, Some(&up)), MonitorStatus::Up);
        assert_eq!(current_status(true, None), MonitorStatus::Unknown);
        // Paused overrides the heartbeat.
        assert_eq!(current_status(false, Some(&up)), MonitorStatus::Paused);
    }

    #[test]
    fn test_staleness_boundary() {
        // interval 60 → allowance 120.
        assert!(!is_stale(1000, Some(880), 60));
        assert!(is_stale(1000, Some(879), 60));
        assert!(!is_stale(1000, None, 60));
    }

    #[test]
    fn test_aggregate_ordering() {
        assert_eq!(aggregate_status(&[]), MonitorStatus::Up);
        assert_eq!(
            aggregate_status(&[MonitorStatus::Up, MonitorStatus::Paused]),
            MonitorStatus::Paused
        );
        assert_eq!(
            aggregate_status(&[MonitorStatus::Unknown, MonitorStatus::Paused]),
            MonitorStatus::Unknown
        );
        assert_eq!(
            aggregate_status(&[MonitorStatus::Maintenance, MonitorStatus::Unknown]),
            MonitorStatus::Maintenance
        );
        assert_eq!(
            aggregate_status(&[
                MonitorStatus::Up,
                MonitorStatus::Maintenance,
                MonitorStatus::Down
            ]),
            MonitorStatus::Down
        );
    }

    #[test]
    fn test_system_status_unchecked_monitor_does_not_block_up() {
        let monitors = vec![
            (monitor("checked", true), Some(heartbeat(990, CheckStatus::Up, Some(12)))),
            (monitor("never-checked", true), None),
        ];

        let status = system_status(&monitors, 1000);
        assert_eq!(status.overall_status, MonitorStatus::Up);
        assert_eq!(status.summary.unknown, 1);
        assert_eq!(status.summary.up, 1);
    }

    #[test]
    fn test_system_status_recorded_unknown_participates() {
        let monitors = vec![
            (monitor("checked", true), Some(heartbeat(990, CheckStatus::Up, Some(12)))),
            (monitor("odd", true), Some(heartbeat(990, CheckStatus::Unknown, None))),
        ];

        let status = system_status(&monitors, 1000);
        assert_eq!(status.overall_status, MonitorStatus::Unknown);
    }

    #[test]
    fn test_system_status_down_wins() {
        let monitors = vec![
            (monitor("fine", true), Some(heartbeat(990, CheckStatus::Up, Some(12)))),
            (monitor("broken", true), Some(heartbeat(995, CheckStatus::Down, None))),
            (monitor("parked", false), None),
        ];

        let status = system_status(&monitors, 1000);
        assert_eq!(status.overall_status, MonitorStatus::Down);
        assert_eq!(status.summary.paused, 1);
        assert_eq!(status.monitors.len(), 3);
    }

    #[test]
    fn test_latency_stats_excludes_failures() {
        let heartbeats = vec![
            heartbeat(0, CheckStatus::Up, Some(100)),
            heartbeat(60, CheckStatus::Up, Some(200)),
            // Down and unknown points never count, whatever they carry.
            heartbeat(120, CheckStatus::Down, Some(9000)),
            heartbeat(180, CheckStatus::Down, None),
            heartbeat(240, CheckStatus::Unknown, None),
        ];

        let stats = latency_stats(&heartbeats);
        assert_eq!(stats.avg_latency_ms, Some(150));
        assert_eq!(stats.p95_latency_ms, Some(200));
    }

    #[test]
    fn test_latency_stats_empty() {
        assert_eq!(
            latency_stats(&[heartbeat(0, CheckStatus::Down, None)]),
            LatencyStats { avg_latency_ms: None, p95_latency_ms: None }
        );
    }

    #[test]
    fn test_latency_p95_nearest_rank() {
        let heartbeats: Vec<Heartbeat> =
            (1..=100).map(|i| heartbeat(i, CheckStatus::Up, Some(i as u64))).collect();
        let stats = latency_stats(&heartbeats);
        assert_eq!(stats.p95_latency_ms, Some(95));
    }

    #[test]
    fn test_uptime_arithmetic_invariant() {
        // Window of 600s, interval 60 (cap 120).
        let heartbeats = vec![
            heartbeat(100, CheckStatus::Up, Some(10)),
            heartbeat(160, CheckStatus::Down, None),
            heartbeat(220, CheckStatus::Up, Some(12)),
        ];

        let stats = uptime_stats(&heartbeats, 0, 600, 60);
        assert_eq!(stats.total_sec, 600);
        // 0..100 unknown; 100..160 up; 160..220 down; 220..340 up (capped at 120).
        assert_eq!(stats.uptime_sec, 180);
        assert_eq!(stats.downtime_sec, 60);
        assert_eq!(
            stats.uptime_sec + stats.downtime_sec + stats.unknown_sec,
            stats.total_sec
        );
        assert!((0.0..=100.0).contains(&stats.uptime_pct));
        assert!((stats.uptime_pct - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_uptime_no_heartbeats_reads_100() {
        let stats = uptime_stats(&[], 0, 3600, 60);
        assert_eq!(stats.total_sec, 3600);
        assert_eq!(stats.unknown_sec, 3600);
        assert_eq!(stats.uptime_pct, 100.0);
    }

    #[test]
    fn test_uptime_maintenance_counts_up_and_gap_is_unknown() {
        let heartbeats = vec![heartbeat(0, CheckStatus::Maintenance, None)];

        // One heartbeat at the window start, then silence for an hour: only
        // the staleness allowance is credited.
        let stats = uptime_stats(&heartbeats, 0, 3600, 60);
        assert_eq!(stats.uptime_sec, 120);
        assert_eq!(stats.downtime_sec, 0);
        assert_eq!(stats.unknown_sec, 3480);
        assert_eq!(stats.uptime_pct, 100.0);
    }
}
