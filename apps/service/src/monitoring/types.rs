use serde::{Deserialize, Serialize};

/// Status recorded by a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
    Maintenance,
    Unknown,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
            CheckStatus::Maintenance => "maintenance",
            CheckStatus::Unknown => "unknown",
        }
    }

    /// Parse a stored status string; unrecognized values map to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "up" => CheckStatus::Up,
            "down" => CheckStatus::Down,
            "maintenance" => CheckStatus::Maintenance,
            _ => CheckStatus::Unknown,
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monitor-level status as reported to status consumers.
///
/// Extends [`CheckStatus`] with `Paused`, which is derived from the monitor
/// being inactive rather than from any heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Maintenance,
    Paused,
    Unknown,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Maintenance => "maintenance",
            MonitorStatus::Paused => "paused",
            MonitorStatus::Unknown => "unknown",
        }
    }
}

impl From<CheckStatus> for MonitorStatus {
    fn from(status: CheckStatus) -> Self {
        match status {
            CheckStatus::Up => MonitorStatus::Up,
            CheckStatus::Down => MonitorStatus::Down,
            CheckStatus::Maintenance => MonitorStatus::Maintenance,
            CheckStatus::Unknown => MonitorStatus::Unknown,
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified result of one probe invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub status: CheckStatus,

    /// Time to response. `None` whenever the probe never connected.
    pub latency_ms: Option<u64>,

    /// HTTP status code, when a response was received (HTTP checks only).
    pub http_status: Option<u16>,

    /// Error message (if the check failed).
    pub error: Option<String>,

    /// Probe attempts made. Always 1; reserved for a future retry policy.
    pub attempts: u32,
}

impl CheckOutcome {
    /// Successful probe.
    pub fn up(latency_ms: u64, http_status: Option<u16>) -> Self {
        Self {
            status: CheckStatus::Up,
            latency_ms: Some(latency_ms),
            http_status,
            error: None,
            attempts: 1,
        }
    }

    /// Failed probe with no response (timeout, transport failure).
    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Down,
            latency_ms: None,
            http_status: None,
            error: Some(error.into()),
            attempts: 1,
        }
    }

    /// Failed probe where a response was received and then rejected
    /// (unexpected status, keyword mismatch). Latency is kept.
    pub fn down_with_response(
        latency_ms: u64,
        http_status: u16,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: CheckStatus::Down,
            latency_ms: Some(latency_ms),
            http_status: Some(http_status),
            error: Some(error.into()),
            attempts: 1,
        }
    }
}
