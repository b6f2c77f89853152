mod clock;
mod config;
mod crypto;
mod database;
mod monitoring;
mod notify;
mod pool;
mod secrets;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::database::models::{ChannelConfig, Monitor, MonitorType, WebhookChannelConfig};
use crate::database::{Database, DatabaseImpl};
use crate::monitoring::CheckExecutor;
use crate::monitoring::validation::{
    validate_check_interval, validate_check_timeout, validate_monitor_target,
};
use crate::notify::WebhookDispatcher;
use crate::secrets::EnvSecretResolver;

#[derive(Parser)]
#[command(name = "uptimer-service", version, about = "Uptime check and notification engine")]
struct Cli {
    /// Path to the config file (defaults to the XDG config location).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run database migrations and exit.
    Migrate,
    /// Run one check for a monitor and print the outcome.
    Check {
        /// UUID of the monitor to check.
        monitor: Uuid,
    },
    /// Send a test ping to a notification channel and print the delivery.
    TestChannel {
        /// Row id of the channel to test.
        channel: i64,
    },
    /// Print the system-wide status roll-up.
    Status,
    /// Print latency and uptime statistics for one monitor.
    Stats {
        /// UUID of the monitor.
        monitor: Uuid,
        /// Statistics window in seconds, ending now.
        #[arg(long, default_value_t = 86_400)]
        window_sec: u64,
    },
    /// Register a monitor.
    AddMonitor {
        #[arg(long)]
        name: String,
        #[arg(long, value_parser = MonitorType::parse)]
        r#type: MonitorType,
        #[arg(long)]
        target: String,
        #[arg(long, default_value_t = 60)]
        interval_sec: u64,
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
    /// Register a webhook notification channel.
    AddChannel {
        #[arg(long)]
        name: String,
        /// Webhook config as JSON, e.g. '{"url": "https://...", "method": "POST"}'.
        #[arg(long)]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;

    let pool = database::open_pool(&config.database.path).await?;
    {
        let conn = pool.get().await.map_err(|e| anyhow!("Failed to get connection: {}", e))?;
        database::initialize_database(&conn).await?;
    }

    let db: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Migrate => {
            // Migrations already ran on startup; nothing left to do.
            println!("Database schema is up to date");
        }
        Command::Check { monitor } => {
            let executor = CheckExecutor::new(db.clone(), clock.clone())?;
            let report = executor.run_check(monitor).await?;

            println!("{}", serde_json::to_string_pretty(&report.outcome)?);

            if let Some(event) = report.event {
                let channels = db.get_active_channels().await?;
                let dispatcher =
                    WebhookDispatcher::new(db, Arc::new(EnvSecretResolver), clock)?;
                let summary = dispatcher
                    .dispatch_to_channels(&channels, &event.event_key(), &event.payload())
                    .await;
                tracing::info!(
                    event_key = %event.event_key(),
                    sent = summary.sent,
                    skipped = summary.skipped,
                    errors = summary.errors,
                    "Status event dispatched"
                );
            }
        }
        Command::TestChannel { channel } => {
            let channel = db
                .get_channel(channel)
                .await?
                .ok_or_else(|| anyhow!("Notification channel not found: {}", channel))?;

            let (event_key, payload) = notify::test_event(channel.id, clock.now());
            let dispatcher =
                WebhookDispatcher::new(db.clone(), Arc::new(EnvSecretResolver), clock)?;
            dispatcher.dispatch_to_channel(&channel, &event_key, &payload).await?;

            let delivery = db.lookup_delivery(&event_key, channel.id).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "event_key": event_key,
                    "delivery": delivery,
                }))?
            );
        }
        Command::Status => {
            let monitors = db.list_monitors().await?;
            let mut with_latest = Vec::with_capacity(monitors.len());
            for monitor in monitors {
                let latest = match monitor.id {
                    Some(id) => db.latest_heartbeat(id).await?,
                    None => None,
                };
                with_latest.push((monitor, latest));
            }

            let system = status::system_status(&with_latest, clock.now());
            println!("{}", serde_json::to_string_pretty(&system)?);
        }
        Command::Stats { monitor, window_sec } => {
            let monitor = db
                .get_monitor(monitor)
                .await?
                .ok_or_else(|| anyhow!("Monitor not found: {}", monitor))?;
            let monitor_id =
                monitor.id.ok_or_else(|| anyhow!("Monitor has not been persisted"))?;

            let now = clock.now();
            let start = now - window_sec as i64;
            let heartbeats = db.heartbeats_in_range(monitor_id, start, now).await?;
            let recent = db.recent_heartbeats(monitor_id, 20).await?;

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "monitor": { "uuid": monitor.uuid, "name": monitor.name },
                    "window_sec": window_sec,
                    "latency": status::latency_stats(&heartbeats),
                    "uptime": status::uptime_stats(&heartbeats, start, now, monitor.interval_sec),
                    "recent_heartbeats": recent,
                }))?
            );
        }
        Command::AddMonitor { name, r#type, target, interval_sec, timeout_ms } => {
            validate_monitor_target(r#type, &target)?;
            validate_check_interval(interval_sec)?;
            validate_check_timeout(timeout_ms)?;

            let mut monitor = Monitor::new(name, r#type, target, clock.now());
            monitor.interval_sec = interval_sec;
            monitor.timeout_ms = timeout_ms;

            db.save_monitor(&monitor).await?;
            println!("{}", monitor.uuid);
        }
        Command::AddChannel { name, config } => {
            let webhook: WebhookChannelConfig = serde_json::from_str(&config)
                .map_err(|e| anyhow!("Invalid webhook channel config: {}", e))?;

            let id = db
                .save_channel(&name, &ChannelConfig::Webhook(webhook), true, clock.now())
                .await?;
            println!("{}", id);
        }
    }

    Ok(())
}
