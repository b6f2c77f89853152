use anyhow::Result;
use async_trait::async_trait;
use libsql::params;
use uuid::Uuid;

use super::models::{
    ChannelConfig, DeliveryOutcome, Heartbeat, Monitor, MonitorType, NotificationChannel,
    NotificationDelivery,
};
use crate::monitoring::types::CheckStatus;
use crate::pool::LibsqlPool;

const MONITOR_COLUMNS: &str = "id, uuid, name, type, target, interval_sec, timeout_ms, \
     http_method, http_headers_json, http_body, expected_status_json, response_keyword, \
     response_forbidden_keyword, is_active, created_at, updated_at";

const CHANNEL_COLUMNS: &str = "id, name, type, config_json, is_active, created_at";

/// Database trait for abstracting storage operations.
///
/// The engine only ever talks to this trait; `DatabaseImpl` is the libsql
/// implementation and tests may substitute their own.
#[async_trait]
pub trait Database: Send + Sync {
    /// Get a monitor by UUID.
    async fn get_monitor(&self, uuid: Uuid) -> Result<Option<Monitor>>;

    /// Get all monitors, active or not.
    async fn list_monitors(&self) -> Result<Vec<Monitor>>;

    /// Get all active monitors.
    async fn get_active_monitors(&self) -> Result<Vec<Monitor>>;

    /// Insert or update a monitor.
    async fn save_monitor(&self, monitor: &Monitor) -> Result<i64>;

    /// Append one heartbeat. Heartbeats are immutable once written.
    async fn append_heartbeat(&self, heartbeat: &Heartbeat) -> Result<i64>;

    /// Most recent heartbeat for a monitor.
    async fn latest_heartbeat(&self, monitor_id: i64) -> Result<Option<Heartbeat>>;

    /// Recent heartbeats, newest first.
    async fn recent_heartbeats(&self, monitor_id: i64, limit: usize) -> Result<Vec<Heartbeat>>;

    /// Heartbeats with `checked_at` in `[start, end]`, oldest first.
    async fn heartbeats_in_range(
        &self,
        monitor_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<Heartbeat>>;

    /// All active notification channels.
    async fn get_active_channels(&self) -> Result<Vec<NotificationChannel>>;

    /// Get a notification channel by id.
    async fn get_channel(&self, id: i64) -> Result<Option<NotificationChannel>>;

    /// Insert a notification channel.
    async fn save_channel(
        &self,
        name: &str,
        config: &ChannelConfig,
        is_active: bool,
        now: i64,
    ) -> Result<i64>;

    /// Atomically claim the right to deliver `event_key` to `channel_id`.
    ///
    /// Returns `true` when this call created the pending ledger row; `false`
    /// when a row already existed and the caller must not send.
    async fn claim_delivery(&self, event_key: &str, channel_id: i64, now: i64) -> Result<bool>;

    /// Move a claimed ledger row to its terminal state. Only the claimant
    /// calls this; a row that is no longer pending is left untouched.
    async fn finalize_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
        outcome: &DeliveryOutcome,
    ) -> Result<()>;

    /// Look up a ledger row.
    async fn lookup_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
    ) -> Result<Option<NotificationDelivery>>;
}

/// LibSQL database implementation.
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

fn monitor_from_row(row: &libsql::Row) -> Result<Monitor> {
    let uuid_str: String = row.get(1)?;
    let type_str: String = row.get(3)?;
    let headers_json: Option<String> = row.get(8)?;
    let expected_json: Option<String> = row.get(10)?;

    Ok(Monitor {
        id: Some(row.get(0)?),
        uuid: Uuid::parse_str(&uuid_str)?,
        name: row.get(2)?,
        monitor_type: MonitorType::parse(&type_str)?,
        target: row.get(4)?,
        interval_sec: row.get::<i64>(5)? as u64,
        timeout_ms: row.get::<i64>(6)? as u64,
        http_method: row.get(7)?,
        http_headers: headers_json.as_deref().map(serde_json::from_str).transpose()?,
        http_body: row.get(9)?,
        expected_status: expected_json.as_deref().map(serde_json::from_str).transpose()?,
        response_keyword: row.get(11)?,
        response_forbidden_keyword: row.get(12)?,
        is_active: row.get::<i64>(13)? != 0,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn heartbeat_from_row(row: &libsql::Row) -> Result<Heartbeat> {
    let status_str: String = row.get(1)?;
    Ok(Heartbeat {
        monitor_id: row.get(0)?,
        status: CheckStatus::parse(&status_str),
        checked_at: row.get(2)?,
        latency_ms: row.get::<Option<i64>>(3)?.map(|v| v as u64),
    })
}

fn channel_from_row(row: &libsql::Row) -> Result<NotificationChannel> {
    let type_str: String = row.get(2)?;
    let config_json: String = row.get(3)?;

    Ok(NotificationChannel {
        id: row.get(0)?,
        name: row.get(1)?,
        config: ChannelConfig::from_columns(&type_str, &config_json)?,
        is_active: row.get::<i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

fn delivery_from_row(row: &libsql::Row) -> Result<NotificationDelivery> {
    let status_str: String = row.get(2)?;
    Ok(NotificationDelivery {
        event_key: row.get(0)?,
        channel_id: row.get(1)?,
        status: super::models::DeliveryStatus::parse(&status_str)?,
        http_status: row.get::<Option<i64>>(3)?.map(|v| v as u16),
        error: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_monitor(&self, uuid: Uuid) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE uuid = ?"))
            .await?;

        let mut rows = stmt.query(params![uuid.to_string()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY id"))
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut monitors = Vec::new();

        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }

        Ok(monitors)
    }

    async fn get_active_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MONITOR_COLUMNS} FROM monitors WHERE is_active = 1 ORDER BY id"
            ))
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut monitors = Vec::new();

        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }

        Ok(monitors)
    }

    async fn save_monitor(&self, monitor: &Monitor) -> Result<i64> {
        let conn = self.get_conn().await?;

        let headers_json = monitor
            .http_headers
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let expected_json = monitor
            .expected_status
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        if let Some(id) = monitor.id {
            conn.execute(
                "UPDATE monitors SET name = ?, target = ?, interval_sec = ?, timeout_ms = ?, \
                 http_method = ?, http_headers_json = ?, http_body = ?, expected_status_json = ?, \
                 response_keyword = ?, response_forbidden_keyword = ?, is_active = ?, \
                 updated_at = ? WHERE id = ?",
                params![
                    monitor.name.clone(),
                    monitor.target.clone(),
                    monitor.interval_sec as i64,
                    monitor.timeout_ms as i64,
                    monitor.http_method.clone(),
                    headers_json,
                    monitor.http_body.clone(),
                    expected_json,
                    monitor.response_keyword.clone(),
                    monitor.response_forbidden_keyword.clone(),
                    if monitor.is_active { 1 } else { 0 },
                    monitor.updated_at,
                    id
                ],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO monitors (uuid, name, type, target, interval_sec, timeout_ms, \
                 http_method, http_headers_json, http_body, expected_status_json, \
                 response_keyword, response_forbidden_keyword, is_active, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    monitor.uuid.to_string(),
                    monitor.name.clone(),
                    monitor.monitor_type.as_str(),
                    monitor.target.clone(),
                    monitor.interval_sec as i64,
                    monitor.timeout_ms as i64,
                    monitor.http_method.clone(),
                    headers_json,
                    monitor.http_body.clone(),
                    expected_json,
                    monitor.response_keyword.clone(),
                    monitor.response_forbidden_keyword.clone(),
                    if monitor.is_active { 1 } else { 0 },
                    monitor.created_at,
                    monitor.updated_at
                ],
            )
            .await?;

            Ok(conn.last_insert_rowid())
        }
    }

    async fn append_heartbeat(&self, heartbeat: &Heartbeat) -> Result<i64> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO heartbeats (monitor_id, status, checked_at, latency_ms) \
             VALUES (?, ?, ?, ?)",
            params![
                heartbeat.monitor_id,
                heartbeat.status.as_str(),
                heartbeat.checked_at,
                heartbeat.latency_ms.map(|v| v as i64)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn latest_heartbeat(&self, monitor_id: i64) -> Result<Option<Heartbeat>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT monitor_id, status, checked_at, latency_ms FROM heartbeats \
                 WHERE monitor_id = ? ORDER BY checked_at DESC, id DESC LIMIT 1",
            )
            .await?;

        let mut rows = stmt.query(params![monitor_id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(heartbeat_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn recent_heartbeats(&self, monitor_id: i64, limit: usize) -> Result<Vec<Heartbeat>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT monitor_id, status, checked_at, latency_ms FROM heartbeats \
                 WHERE monitor_id = ? ORDER BY checked_at DESC, id DESC LIMIT ?",
            )
            .await?;

        let mut rows = stmt.query(params![monitor_id, limit as i64]).await?;
        let mut heartbeats = Vec::new();

        while let Some(row) = rows.next().await? {
            heartbeats.push(heartbeat_from_row(&row)?);
        }

        Ok(heartbeats)
    }

    async fn heartbeats_in_range(
        &self,
        monitor_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<Heartbeat>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT monitor_id, status, checked_at, latency_ms FROM heartbeats \
                 WHERE monitor_id = ? AND checked_at >= ? AND checked_at <= ? \
                 ORDER BY checked_at ASC, id ASC",
            )
            .await?;

        let mut rows = stmt.query(params![monitor_id, start, end]).await?;
        let mut heartbeats = Vec::new();

        while let Some(row) = rows.next().await? {
            heartbeats.push(heartbeat_from_row(&row)?);
        }

        Ok(heartbeats)
    }

    async fn get_active_channels(&self) -> Result<Vec<NotificationChannel>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM notification_channels \
                 WHERE is_active = 1 ORDER BY id"
            ))
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut channels = Vec::new();

        while let Some(row) = rows.next().await? {
            channels.push(channel_from_row(&row)?);
        }

        Ok(channels)
    }

    async fn get_channel(&self, id: i64) -> Result<Option<NotificationChannel>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE id = ?"
            ))
            .await?;

        let mut rows = stmt.query(params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(channel_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_channel(
        &self,
        name: &str,
        config: &ChannelConfig,
        is_active: bool,
        now: i64,
    ) -> Result<i64> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO notification_channels (name, type, config_json, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                name,
                config.channel_type(),
                config.to_config_json()?,
                if is_active { 1 } else { 0 },
                now
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn claim_delivery(&self, event_key: &str, channel_id: i64, now: i64) -> Result<bool> {
        let conn = self.get_conn().await?;

        // Insert-if-absent on the (event_key, channel_id) unique index. The
        // affected-row count tells us whether this caller won the claim.
        let affected = conn
            .execute(
                "INSERT OR IGNORE INTO notification_deliveries \
                 (event_key, channel_id, status, http_status, error, created_at) \
                 VALUES (?, ?, 'pending', NULL, NULL, ?)",
                params![event_key, channel_id, now],
            )
            .await?;

        Ok(affected > 0)
    }

    async fn finalize_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
        outcome: &DeliveryOutcome,
    ) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "UPDATE notification_deliveries SET status = ?, http_status = ?, error = ? \
             WHERE event_key = ? AND channel_id = ? AND status = 'pending'",
            params![
                outcome.status.as_str(),
                outcome.http_status.map(|v| v as i64),
                outcome.error.clone(),
                event_key,
                channel_id
            ],
        )
        .await?;

        Ok(())
    }

    async fn lookup_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
    ) -> Result<Option<NotificationDelivery>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT event_key, channel_id, status, http_status, error, created_at \
                 FROM notification_deliveries WHERE event_key = ? AND channel_id = ?",
            )
            .await?;

        let mut rows = stmt.query(params![event_key, channel_id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(delivery_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{DeliveryStatus, WebhookChannelConfig};
    use crate::database::{initialize_database, open_pool};
    use std::collections::HashMap;

    async fn open_test_db(path: &std::path::Path) -> DatabaseImpl {
        let pool = open_pool(path.to_str().unwrap()).await.unwrap();
        let conn = pool.get().await.unwrap();
        initialize_database(&conn).await.unwrap();
        drop(conn);
        DatabaseImpl::new_from_pool(pool)
    }

    fn webhook_config(url: &str) -> ChannelConfig {
        ChannelConfig::Webhook(WebhookChannelConfig {
            url: url.to_string(),
            method: None,
            headers: None,
            timeout_ms: None,
            payload_type: None,
            signing: None,
        })
    }

    #[tokio::test]
    async fn test_save_and_get_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir.path().join("test.db")).await;

        let mut monitor = Monitor::new(
            "api".to_string(),
            MonitorType::Http,
            "https://example.com/health".to_string(),
            1_700_000_000,
        );
        monitor.http_method = Some("GET".to_string());
        monitor.http_headers = Some(HashMap::from([("x-probe".to_string(), "1".to_string())]));
        monitor.expected_status = Some(vec![200, 204]);

        let id = db.save_monitor(&monitor).await.unwrap();
        assert!(id > 0);

        let loaded = db.get_monitor(monitor.uuid).await.unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.name, "api");
        assert_eq!(loaded.monitor_type, MonitorType::Http);
        assert_eq!(loaded.expected_status, Some(vec![200, 204]));
        assert_eq!(
            loaded.http_headers.unwrap().get("x-probe").map(String::as_str),
            Some("1")
        );

        assert!(db.get_monitor(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_monitor_listing() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir.path().join("test.db")).await;

        let active = Monitor::new(
            "active".to_string(),
            MonitorType::Tcp,
            "example.com:443".to_string(),
            1_700_000_000,
        );
        let mut paused = Monitor::new(
            "paused".to_string(),
            MonitorType::Tcp,
            "example.com:22".to_string(),
            1_700_000_000,
        );
        paused.is_active = false;

        db.save_monitor(&active).await.unwrap();
        db.save_monitor(&paused).await.unwrap();

        assert_eq!(db.list_monitors().await.unwrap().len(), 2);
        let active_monitors = db.get_active_monitors().await.unwrap();
        assert_eq!(active_monitors.len(), 1);
        assert_eq!(active_monitors[0].name, "active");
    }

    #[tokio::test]
    async fn test_heartbeat_append_and_queries() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir.path().join("test.db")).await;

        let monitor = Monitor::new(
            "api".to_string(),
            MonitorType::Http,
            "https://example.com".to_string(),
            1_700_000_000,
        );
        let monitor_id = db.save_monitor(&monitor).await.unwrap();

        for (offset, status, latency) in [
            (0, CheckStatus::Up, Some(40)),
            (60, CheckStatus::Up, Some(55)),
            (120, CheckStatus::Down, None),
        ] {
            db.append_heartbeat(&Heartbeat {
                monitor_id,
                checked_at: 1_700_000_000 + offset,
                status,
                latency_ms: latency,
            })
            .await
            .unwrap();
        }

        let latest = db.latest_heartbeat(monitor_id).await.unwrap().unwrap();
        assert_eq!(latest.status, CheckStatus::Down);
        assert_eq!(latest.latency_ms, None);

        let recent = db.recent_heartbeats(monitor_id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].checked_at, 1_700_000_120);

        let ranged = db
            .heartbeats_in_range(monitor_id, 1_700_000_000, 1_700_000_060)
            .await
            .unwrap();
        assert_eq!(ranged.len(), 2);
        assert_eq!(ranged[0].checked_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_channel_save_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir.path().join("test.db")).await;

        let id = db
            .save_channel("ops", &webhook_config("https://hooks.example.com/a"), true, 1_700_000_000)
            .await
            .unwrap();
        db.save_channel("muted", &webhook_config("https://hooks.example.com/b"), false, 1_700_000_000)
            .await
            .unwrap();

        let active = db.get_active_channels().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "ops");

        let channel = db.get_channel(id).await.unwrap().unwrap();
        let ChannelConfig::Webhook(config) = channel.config;
        assert_eq!(config.url, "https://hooks.example.com/a");

        assert!(db.get_channel(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_is_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir.path().join("test.db")).await;

        let channel_id = db
            .save_channel("ops", &webhook_config("https://hooks.example.com/a"), true, 1_700_000_000)
            .await
            .unwrap();

        let first = db.claim_delivery("monitor:x:down:1", channel_id, 1_700_000_000).await.unwrap();
        let second = db.claim_delivery("monitor:x:down:1", channel_id, 1_700_000_001).await.unwrap();

        assert!(first);
        assert!(!second);

        // A different channel for the same event is an independent claim.
        let other_channel = db
            .save_channel("oncall", &webhook_config("https://hooks.example.com/c"), true, 1_700_000_000)
            .await
            .unwrap();
        assert!(db.claim_delivery("monitor:x:down:1", other_channel, 1_700_000_002).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_is_unique_across_pools() {
        // Two pools over the same file model two separate service instances;
        // the unique index, not process state, must arbitrate.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db_a = open_test_db(&path).await;
        let pool_b = open_pool(path.to_str().unwrap()).await.unwrap();
        let db_b = DatabaseImpl::new_from_pool(pool_b);

        let channel_id = db_a
            .save_channel("ops", &webhook_config("https://hooks.example.com/a"), true, 1_700_000_000)
            .await
            .unwrap();

        let claims = [
            db_a.claim_delivery("monitor:y:down:5", channel_id, 1_700_000_000).await.unwrap(),
            db_b.claim_delivery("monitor:y:down:5", channel_id, 1_700_000_000).await.unwrap(),
        ];
        assert_eq!(claims.iter().filter(|claimed| **claimed).count(), 1);
    }

    #[tokio::test]
    async fn test_finalize_applies_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir.path().join("test.db")).await;

        let channel_id = db
            .save_channel("ops", &webhook_config("https://hooks.example.com/a"), true, 1_700_000_000)
            .await
            .unwrap();

        assert!(db.claim_delivery("event", channel_id, 1_700_000_000).await.unwrap());

        let pending = db.lookup_delivery("event", channel_id).await.unwrap().unwrap();
        assert_eq!(pending.status, DeliveryStatus::Pending);

        db.finalize_delivery("event", channel_id, &DeliveryOutcome::success(200)).await.unwrap();

        let done = db.lookup_delivery("event", channel_id).await.unwrap().unwrap();
        assert_eq!(done.status, DeliveryStatus::Success);
        assert_eq!(done.http_status, Some(200));

        // A second finalize finds no pending row and changes nothing.
        db.finalize_delivery("event", channel_id, &DeliveryOutcome::failed(None, "late"))
            .await
            .unwrap();
        let unchanged = db.lookup_delivery("event", channel_id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, DeliveryStatus::Success);
        assert_eq!(unchanged.error, None);
    }
}
