use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::clock::Clock;
use crate::crypto::sign_webhook_body;
use crate::database::Database;
use crate::database::models::{
    ChannelConfig, DeliveryOutcome, NotificationChannel, WebhookChannelConfig,
};
use crate::secrets::SecretResolver;

const DEFAULT_TIMEOUT_MS: u64 = 5000;
const WEBHOOK_CONCURRENCY: usize = 5;

const SIGNATURE_HEADER: &str = "x-uptimer-signature";
const TIMESTAMP_HEADER: &str = "x-uptimer-timestamp";

/// Whether a dispatch produced a delivery record or was deduplicated away.
///
/// `Sent` means a ledger row exists with a terminal outcome, which may well
/// be `failed`; `Skipped` means another invocation owns this delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Sent,
    Skipped,
}

/// Result of a fan-out across channels. `errors` counts internal failures
/// (ledger unavailable); failed deliveries are finalized rows, not errors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutSummary {
    pub total: usize,
    pub sent: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum Prepared {
    Request { request: reqwest::RequestBuilder, timeout_ms: u64 },
    ConfigError(DeliveryOutcome),
}

/// Sends signed or unsigned webhook requests, at most once per
/// (event, channel), bounded in concurrency across a fan-out.
pub struct WebhookDispatcher {
    db: Arc<dyn Database>,
    secrets: Arc<dyn SecretResolver>,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(
        db: Arc<dyn Database>,
        secrets: Arc<dyn SecretResolver>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { db, secrets, clock, client })
    }

    /// Deliver one event to one channel.
    ///
    /// Claims the (event, channel) pair first; if the claim is lost the
    /// request is never built. Ledger failures are the only errors that
    /// propagate - every probe-of-the-receiver failure ends up as a
    /// finalized `failed` row.
    pub async fn dispatch_to_channel(
        &self,
        channel: &NotificationChannel,
        event_key: &str,
        payload: &Value,
    ) -> Result<DispatchStatus> {
        let now = self.clock.now();

        if !self.db.claim_delivery(event_key, channel.id, now).await? {
            return Ok(DispatchStatus::Skipped);
        }

        let ChannelConfig::Webhook(config) = &channel.config;

        let (request, timeout_ms) = match self.prepare_request(config, now, payload)? {
            Prepared::Request { request, timeout_ms } => (request, timeout_ms),
            Prepared::ConfigError(outcome) => {
                self.db.finalize_delivery(event_key, channel.id, &outcome).await?;
                return Ok(DispatchStatus::Sent);
            }
        };

        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status();
                // Response body is discarded unread.
                drop(response);

                if status.is_success() {
                    DeliveryOutcome::success(status.as_u16())
                } else {
                    DeliveryOutcome::failed(
                        Some(status.as_u16()),
                        format!("HTTP {}", status.as_u16()),
                    )
                }
            }
            Err(error) if error.is_timeout() => {
                DeliveryOutcome::failed(None, format!("Timeout after {}ms", timeout_ms))
            }
            Err(error) => DeliveryOutcome::failed(None, error.to_string()),
        };

        self.db.finalize_delivery(event_key, channel.id, &outcome).await?;
        Ok(DispatchStatus::Sent)
    }

    /// Build the outgoing request, or classify a configuration problem as a
    /// terminal outcome without touching the network.
    fn prepare_request(
        &self,
        config: &WebhookChannelConfig,
        now: i64,
        payload: &Value,
    ) -> Result<Prepared> {
        let method_name = config.method.as_deref().unwrap_or("POST").to_uppercase();
        let method = match Method::from_bytes(method_name.as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return Ok(Prepared::ConfigError(DeliveryOutcome::failed(
                    None,
                    format!("Invalid HTTP method: {}", method_name),
                )));
            }
        };

        let can_have_body = method != Method::GET && method != Method::HEAD;
        let raw_body = if can_have_body { serde_json::to_string(payload)? } else { String::new() };

        let mut headers = HeaderMap::new();
        if let Some(config_headers) = &config.headers {
            for (key, value) in config_headers {
                let name = match HeaderName::from_bytes(key.as_bytes()) {
                    Ok(name) => name,
                    Err(_) => {
                        return Ok(Prepared::ConfigError(DeliveryOutcome::failed(
                            None,
                            format!("Invalid header name: {}", key),
                        )));
                    }
                };
                let value = match HeaderValue::from_str(value) {
                    Ok(value) => value,
                    Err(_) => {
                        return Ok(Prepared::ConfigError(DeliveryOutcome::failed(
                            None,
                            format!("Invalid value for header: {}", key),
                        )));
                    }
                };
                headers.insert(name, value);
            }
        }

        if can_have_body && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            );
        }

        if let Some(signing) = &config.signing {
            if signing.enabled {
                // A missing secret must never degrade to an unsigned send.
                let Some(secret) = self.secrets.resolve(&signing.secret_ref) else {
                    return Ok(Prepared::ConfigError(DeliveryOutcome::failed(
                        None,
                        format!("Signing secret not configured: {}", signing.secret_ref),
                    )));
                };

                let signature = sign_webhook_body(&secret, now, &raw_body);
                headers.insert(TIMESTAMP_HEADER, HeaderValue::from(now));
                match HeaderValue::from_str(&signature) {
                    Ok(value) => headers.insert(SIGNATURE_HEADER, value),
                    Err(_) => {
                        return Ok(Prepared::ConfigError(DeliveryOutcome::failed(
                            None,
                            "Signature is not a valid header value".to_string(),
                        )));
                    }
                };
            }
        }

        let timeout_ms = config.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        let mut request = self
            .client
            .request(method, &config.url)
            .headers(headers)
            .timeout(Duration::from_millis(timeout_ms));

        if can_have_body {
            request = request.body(raw_body);
        }

        Ok(Prepared::Request { request, timeout_ms })
    }

    /// Fan one event out to every given channel, at most
    /// `WEBHOOK_CONCURRENCY` sends in flight.
    ///
    /// Channels are isolated from each other: a slow or erroring channel
    /// neither cancels nor blocks the rest, and the batch itself never
    /// fails - internal errors are counted and logged.
    pub async fn dispatch_to_channels(
        &self,
        channels: &[NotificationChannel],
        event_key: &str,
        payload: &Value,
    ) -> FanoutSummary {
        let mut summary = FanoutSummary { total: channels.len(), ..FanoutSummary::default() };

        if channels.is_empty() {
            return summary;
        }

        let results: Vec<Result<DispatchStatus>> = stream::iter(channels)
            .map(|channel| self.dispatch_to_channel(channel, event_key, payload))
            .buffer_unordered(WEBHOOK_CONCURRENCY)
            .collect()
            .await;

        for result in results {
            match result {
                Ok(DispatchStatus::Sent) => summary.sent += 1,
                Ok(DispatchStatus::Skipped) => summary.skipped += 1,
                Err(error) => {
                    summary.errors += 1;
                    tracing::error!("Webhook dispatch error for {}: {:#}", event_key, error);
                }
            }
        }

        if summary.errors > 0 {
            tracing::error!("notify: {}/{} webhooks failed", summary.errors, summary.total);
        }

        summary
    }
}
