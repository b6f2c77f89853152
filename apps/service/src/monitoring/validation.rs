//! Monitor target validation.
//!
//! Runs at monitor create/update time and again before each probe, so a
//! malformed target is rejected before any network action.

use anyhow::{Result, anyhow};
use url::Url;

use crate::database::models::MonitorType;

/// Validates a monitor target based on its type.
///
/// Malformed input is an expected case and is reported as an `Err` with a
/// human-readable message, never a panic.
pub fn validate_monitor_target(monitor_type: MonitorType, target: &str) -> Result<()> {
    match monitor_type {
        MonitorType::Http => validate_http_target(target),
        MonitorType::Tcp => validate_tcp_target(target),
    }
}

/// Validate an HTTP/HTTPS target URL.
fn validate_http_target(target: &str) -> Result<()> {
    let url = Url::parse(target).map_err(|e| anyhow!("Invalid URL: {}", e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme for HTTP monitor: {}", other)),
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL has no host"));
    }

    Ok(())
}

/// Validate a TCP target in `host:port` form.
fn validate_tcp_target(target: &str) -> Result<()> {
    let parts: Vec<&str> = target.split(':').collect();

    if parts.len() != 2 || parts[0].is_empty() {
        return Err(anyhow!("TCP target must be in format host:port"));
    }

    let port: u16 = parts[1].parse().map_err(|_| anyhow!("Invalid port number"))?;

    if port == 0 {
        return Err(anyhow!("Port 0 is not valid"));
    }

    Ok(())
}

/// Validate the check interval floor.
pub fn validate_check_interval(interval_sec: u64) -> Result<()> {
    const MIN_INTERVAL_SEC: u64 = 60;

    if interval_sec < MIN_INTERVAL_SEC {
        return Err(anyhow!(
            "Check interval too short: {} seconds (minimum: {})",
            interval_sec,
            MIN_INTERVAL_SEC
        ));
    }

    Ok(())
}

/// Validate the probe timeout floor.
pub fn validate_check_timeout(timeout_ms: u64) -> Result<()> {
    const MIN_TIMEOUT_MS: u64 = 1000;

    if timeout_ms < MIN_TIMEOUT_MS {
        return Err(anyhow!(
            "Timeout too short: {}ms (minimum: {}ms)",
            timeout_ms,
            MIN_TIMEOUT_MS
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_http_target() {
        // Valid
        assert!(validate_http_target("https://example.com").is_ok());
        assert!(validate_http_target("http://example.com:8080/health?probe=1").is_ok());

        // Invalid - wrong scheme
        assert!(validate_http_target("ftp://example.com").is_err());

        // Invalid - not a URL at all
        assert!(validate_http_target("not-a-url").is_err());
        assert!(validate_http_target("").is_err());
    }

    #[test]
    fn test_validate_tcp_target() {
        // Valid
        assert!(validate_tcp_target("example.com:80").is_ok());
        assert!(validate_tcp_target("192.0.2.10:65535").is_ok());

        // Invalid - format
        assert!(validate_tcp_target("example.com").is_err());
        assert!(validate_tcp_target("example.com:").is_err());
        assert!(validate_tcp_target(":443").is_err());
        assert!(validate_tcp_target("example.com:80:90").is_err());

        // Invalid - port range
        assert!(validate_tcp_target("example.com:0").is_err());
        assert!(validate_tcp_target("example.com:65536").is_err());
        assert!(validate_tcp_target("example.com:http").is_err());
    }

    #[test]
    fn test_validate_monitor_target_dispatches_on_type() {
        assert!(validate_monitor_target(MonitorType::Http, "https://example.com").is_ok());
        assert!(validate_monitor_target(MonitorType::Http, "example.com:80").is_err());
        assert!(validate_monitor_target(MonitorType::Tcp, "example.com:80").is_ok());
        assert!(validate_monitor_target(MonitorType::Tcp, "https://example.com").is_err());
    }

    #[test]
    fn test_validate_interval_and_timeout_floors() {
        assert!(validate_check_interval(60).is_ok());
        assert!(validate_check_interval(59).is_err());
        assert!(validate_check_timeout(1000).is_ok());
        assert!(validate_check_timeout(999).is_err());
    }
}
