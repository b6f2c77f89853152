use std::collections::HashMap;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::types::CheckStatus;

/// Kind of probe a monitor performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    Http,
    Tcp,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Tcp => "tcp",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "http" => Ok(MonitorType::Http),
            "tcp" => Ok(MonitorType::Tcp),
            other => Err(anyhow!("Unsupported monitor type: {}", other)),
        }
    }
}

impl std::fmt::Display for MonitorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monitor model - represents a monitoring target.
///
/// HTTP-only fields are `None` for TCP monitors; the admin surface enforces
/// this at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    pub monitor_type: MonitorType,
    pub target: String,
    pub interval_sec: u64,
    pub timeout_ms: u64,
    pub http_method: Option<String>,
    pub http_headers: Option<HashMap<String, String>>,
    pub http_body: Option<String>,
    pub expected_status: Option<Vec<u16>>,
    pub response_keyword: Option<String>,
    pub response_forbidden_keyword: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Monitor {
    /// Create a new monitor with default cadence and timeout.
    pub fn new(name: String, monitor_type: MonitorType, target: String, now: i64) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name,
            monitor_type,
            target,
            interval_sec: 60,
            timeout_ms: 10_000,
            http_method: None,
            http_headers: None,
            http_body: None,
            expected_status: None,
            response_keyword: None,
            response_forbidden_keyword: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One timestamped, classified probe result. Append-only per monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub monitor_id: i64,
    pub checked_at: i64,
    pub status: CheckStatus,
    pub latency_ms: Option<u64>,
}

/// Webhook channel configuration, stored as JSON in the channel row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChannelConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub enabled: bool,
    pub secret_ref: String,
}

/// Per-type channel configuration, keyed by the channel row's `type` column.
#[derive(Debug, Clone)]
pub enum ChannelConfig {
    Webhook(WebhookChannelConfig),
}

impl ChannelConfig {
    /// Parse a channel row's `type` and `config_json` columns.
    pub fn from_columns(channel_type: &str, config_json: &str) -> Result<Self> {
        match channel_type {
            "webhook" => {
                let config: WebhookChannelConfig = serde_json::from_str(config_json)
                    .map_err(|e| anyhow!("Invalid webhook channel config: {}", e))?;
                Ok(ChannelConfig::Webhook(config))
            }
            other => Err(anyhow!("Unsupported channel type: {}", other)),
        }
    }

    pub fn channel_type(&self) -> &'static str {
        match self {
            ChannelConfig::Webhook(_) => "webhook",
        }
    }

    pub fn to_config_json(&self) -> Result<String> {
        match self {
            ChannelConfig::Webhook(config) => Ok(serde_json::to_string(config)?),
        }
    }
}

/// Notification channel model.
#[derive(Debug, Clone)]
pub struct NotificationChannel {
    pub id: i64,
    pub name: String,
    pub config: ChannelConfig,
    pub is_active: bool,
    pub created_at: i64,
}

/// Terminal and in-flight states of a delivery ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(DeliveryStatus::Pending),
            "success" => Ok(DeliveryStatus::Success),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(anyhow!("Unknown delivery status: {}", other)),
        }
    }
}

/// Delivery ledger row. Unique per `(event_key, channel_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDelivery {
    pub event_key: String,
    pub channel_id: i64,
    pub status: DeliveryStatus,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub created_at: i64,
}

/// Terminal outcome applied to a claimed delivery row.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn success(http_status: u16) -> Self {
        Self { status: DeliveryStatus::Success, http_status: Some(http_status), error: None }
    }

    pub fn failed(http_status: Option<u16>, error: impl Into<String>) -> Self {
        Self { status: DeliveryStatus::Failed, http_status, error: Some(error.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_parse() {
        let json = r#"{
            "url": "https://hooks.example.com/alerts",
            "method": "POST",
            "headers": {"X-Team": "ops"},
            "signing": {"enabled": true, "secret_ref": "WEBHOOK_SECRET"}
        }"#;

        let ChannelConfig::Webhook(config) = ChannelConfig::from_columns("webhook", json).unwrap();
        assert_eq!(config.url, "https://hooks.example.com/alerts");
        assert_eq!(config.method.as_deref(), Some("POST"));
        assert!(config.signing.as_ref().unwrap().enabled);
        assert_eq!(config.timeout_ms, None);
    }

    #[test]
    fn test_channel_config_rejects_unknown_type() {
        assert!(ChannelConfig::from_columns("pager", "{}").is_err());
        assert!(ChannelConfig::from_columns("webhook", "not json").is_err());
    }

    #[test]
    fn test_monitor_defaults() {
        let monitor = Monitor::new(
            "api".to_string(),
            MonitorType::Http,
            "https://example.com".to_string(),
            1_700_000_000,
        );
        assert_eq!(monitor.interval_sec, 60);
        assert_eq!(monitor.timeout_ms, 10_000);
        assert!(monitor.is_active);
        assert!(monitor.http_method.is_none());
    }
}
