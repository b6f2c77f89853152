use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::time::timeout;

use super::types::CheckOutcome;

/// One HTTP probe, fully described.
#[derive(Debug, Clone, Default)]
pub struct HttpCheckRequest {
    pub url: String,
    /// Defaults to GET.
    pub method: Option<String>,
    pub timeout_ms: u64,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<String>,
    /// Accepted response statuses. Empty or absent means any 2xx.
    pub expected_status: Option<Vec<u16>>,
    pub response_keyword: Option<String>,
    pub response_forbidden_keyword: Option<String>,
}

/// HTTP/HTTPS checker.
///
/// Owns the shared client; the per-probe deadline comes from each request.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Perform one probe and classify the outcome.
    ///
    /// Transport failures and the deadline are outcomes, not errors; nothing
    /// here propagates past the runner boundary.
    pub async fn check(&self, request: &HttpCheckRequest) -> CheckOutcome {
        let method = request.method.as_deref().unwrap_or("GET");
        let mut builder = match method.to_uppercase().as_str() {
            "GET" => self.client.get(&request.url),
            "POST" => self.client.post(&request.url),
            "PUT" => self.client.put(&request.url),
            "PATCH" => self.client.patch(&request.url),
            "DELETE" => self.client.delete(&request.url),
            "HEAD" => self.client.head(&request.url),
            other => {
                return CheckOutcome::down(format!("Unsupported HTTP method: {}", other));
            }
        };

        builder = builder.timeout(Duration::from_millis(request.timeout_ms));

        if let Some(headers) = &request.headers {
            for (key, value) in headers {
                builder = builder.header(key, value);
            }
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();

        let response = match builder.send().await {
            Ok(response) => response,
            Err(error) => {
                return CheckOutcome::down(transport_error_message(&error, request.timeout_ms));
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        let http_status = response.status().as_u16();

        let status_ok = match &request.expected_status {
            Some(expected) if !expected.is_empty() => expected.contains(&http_status),
            _ => response.status().is_success(),
        };

        if !status_ok {
            return CheckOutcome::down_with_response(
                latency_ms,
                http_status,
                format!("HTTP {}", http_status),
            );
        }

        // The body is only read when a keyword check asks for it; otherwise
        // the response is dropped unread.
        if request.response_keyword.is_some() || request.response_forbidden_keyword.is_some() {
            let body_text = match response.text().await {
                Ok(text) => text,
                Err(error) => {
                    return CheckOutcome::down(transport_error_message(
                        &error,
                        request.timeout_ms,
                    ));
                }
            };

            if let Some(keyword) = &request.response_keyword {
                if !body_text.contains(keyword) {
                    return CheckOutcome::down_with_response(
                        latency_ms,
                        http_status,
                        format!("Keyword \"{}\" not found in response", keyword),
                    );
                }
            }

            if let Some(keyword) = &request.response_forbidden_keyword {
                if body_text.contains(keyword) {
                    return CheckOutcome::down_with_response(
                        latency_ms,
                        http_status,
                        format!("Forbidden keyword \"{}\" found in response", keyword),
                    );
                }
            }
        }

        CheckOutcome::up(latency_ms, Some(http_status))
    }
}

fn transport_error_message(error: &reqwest::Error, timeout_ms: u64) -> String {
    if error.is_timeout() {
        format!("Timeout after {}ms", timeout_ms)
    } else {
        format!("HTTP request failed: {}", error)
    }
}

/// TCP port checker. Connects, observes success, closes immediately.
pub struct TcpChecker;

impl TcpChecker {
    pub fn new() -> Self {
        Self
    }

    pub async fn check(&self, target: &str, timeout_ms: u64) -> CheckOutcome {
        let start = Instant::now();

        let connect = tokio::net::TcpStream::connect(target);

        match timeout(Duration::from_millis(timeout_ms), connect).await {
            Ok(Ok(stream)) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                drop(stream);
                CheckOutcome::up(latency_ms, None)
            }
            Ok(Err(error)) => CheckOutcome::down(format!("TCP connection failed: {}", error)),
            Err(_) => CheckOutcome::down(format!("Timeout after {}ms", timeout_ms)),
        }
    }
}
