use serde_json::{Value, json};
use uuid::Uuid;

use crate::monitoring::types::CheckStatus;

/// A state-worthy monitor transition, ready for fan-out.
///
/// The event key is derived from the transition itself, so a retried or
/// concurrently repeated trigger claims the same ledger rows and sends at
/// most once per channel.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub monitor_uuid: Uuid,
    pub monitor_name: String,
    pub status: CheckStatus,
    pub checked_at: i64,
    pub error: Option<String>,
}

impl StatusEvent {
    pub fn event_key(&self) -> String {
        format!("monitor:{}:{}:{}", self.monitor_uuid, self.status, self.checked_at)
    }

    pub fn payload(&self) -> Value {
        json!({
            "event": format!("monitor.{}", self.status),
            "event_id": self.event_key(),
            "monitor": {
                "uuid": self.monitor_uuid,
                "name": self.monitor_name,
            },
            "status": self.status,
            "error": self.error,
            "timestamp": self.checked_at,
        })
    }
}

/// Event key and payload for an ad-hoc channel test.
pub fn test_event(channel_id: i64, now: i64) -> (String, Value) {
    let event_key = format!("test:webhook:{}:{}", channel_id, now);
    let payload = json!({
        "event": "test.ping",
        "event_id": event_key,
        "timestamp": now,
    });
    (event_key, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key_is_stable_per_transition() {
        let uuid = Uuid::new_v4();
        let event = StatusEvent {
            monitor_uuid: uuid,
            monitor_name: "api".to_string(),
            status: CheckStatus::Down,
            checked_at: 1_700_000_000,
            error: Some("HTTP 500".to_string()),
        };

        assert_eq!(event.event_key(), format!("monitor:{}:down:1700000000", uuid));

        let payload = event.payload();
        assert_eq!(payload["event"], "monitor.down");
        assert_eq!(payload["monitor"]["name"], "api");
        assert_eq!(payload["timestamp"], 1_700_000_000);
    }

    #[test]
    fn test_test_event_shape() {
        let (event_key, payload) = test_event(7, 1_700_000_000);
        assert_eq!(event_key, "test:webhook:7:1700000000");
        assert_eq!(payload["event"], "test.ping");
        assert_eq!(payload["event_id"], event_key.as_str());
    }
}
