//! Throttling signals from Microsoft Graph
//!
//! SharePoint reports how close a caller is to its rate limit through
//! response headers, but only once more than 80% of the limit is consumed:
//!
//! - `x-ms-throttle-limit-percentage` - fraction of the limit used (0.8 .. 1.8)
//! - `x-ms-resource-unit` - resource units charged for the request
//! - `x-ms-throttle-scope` - which limit applies (tenant, app, user)
//!
//! [`RateLimitMonitor`] accumulates these for the end-of-run summary.
//! Backoff itself is owned by the sync engine; this module only parses
//! `Retry-After` and observes.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

/// Usage fraction at which a warning is logged
const ALERT_THRESHOLD: f64 = 0.8;

/// Usage fraction above which callers should slow down on their own
const SLOW_DOWN_THRESHOLD: f64 = 0.9;

/// Upper bound accepted for an HTTP-date `Retry-After`
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
struct MonitorState {
    total_requests: u64,
    throttled_requests: u64,
    usage_samples: u64,
    average_usage: f64,
    max_usage: f64,
    resource_units: u64,
    alerts: u64,
}

/// Accumulates rate-limit headers across all requests of a run
///
/// Thread safety is provided by an internal `Mutex`; observation is a few
/// arithmetic operations, so contention is negligible.
#[derive(Debug, Default)]
pub struct RateLimitMonitor {
    state: Mutex<MonitorState>,
}

/// Summary of rate-limit observations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateLimitSummary {
    pub total_requests: u64,
    pub throttled_requests: u64,
    /// `throttled_requests / total_requests`
    pub throttle_rate: f64,
    pub average_usage: f64,
    pub max_usage: f64,
    pub resource_units: u64,
    pub alerts: u64,
}

impl RateLimitMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one response
    pub fn observe(&self, status: StatusCode, headers: &HeaderMap) {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let usage = header("x-ms-throttle-limit-percentage").and_then(|v| v.trim().parse::<f64>().ok());
        let units = header("x-ms-resource-unit").and_then(|v| v.trim().parse::<u64>().ok());
        let scope = header("x-ms-throttle-scope");

        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.total_requests += 1;

        if status == StatusCode::TOO_MANY_REQUESTS {
            state.throttled_requests += 1;
        }

        if let Some(usage) = usage {
            state.usage_samples += 1;
            let n = state.usage_samples as f64;
            state.average_usage += (usage - state.average_usage) / n;
            state.max_usage = state.max_usage.max(usage);

            if usage >= 1.0 {
                if status != StatusCode::TOO_MANY_REQUESTS {
                    state.throttled_requests += 1;
                }
                warn!(usage_percent = usage * 100.0, scope, "Rate limit reached");
            } else if usage >= ALERT_THRESHOLD {
                state.alerts += 1;
                warn!(usage_percent = usage * 100.0, scope, "Approaching rate limit");
            }
        }

        if let Some(units) = units {
            state.resource_units += units;
            debug!(units, "Resource units consumed");
        }
    }

    /// Whether the observed usage is close enough to the limit that callers
    /// should pace themselves
    pub fn should_slow_down(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.max_usage >= SLOW_DOWN_THRESHOLD)
            .unwrap_or(false)
    }

    pub fn summary(&self) -> RateLimitSummary {
        let Ok(state) = self.state.lock() else {
            return RateLimitSummary::default();
        };
        RateLimitSummary {
            total_requests: state.total_requests,
            throttled_requests: state.throttled_requests,
            throttle_rate: state.throttled_requests as f64 / state.total_requests.max(1) as f64,
            average_usage: state.average_usage,
            max_usage: state.max_usage,
            resource_units: state.resource_units,
            alerts: state.alerts,
        }
    }
}

/// Parses a `Retry-After` header value into a Duration.
///
/// The header can be either:
/// - An integer number of seconds (e.g., "30")
/// - An HTTP-date (e.g., "Fri, 31 Dec 2025 23:59:59 GMT") - parsed as time from now
///
/// Returns `None` if the value cannot be parsed or the date lies in the past.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    // Integer seconds is what Graph sends in practice
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let remaining = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return remaining
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
            .map(|d| d.min(MAX_RETRY_AFTER));
    }

    warn!(value, "Could not parse Retry-After header");
    None
}

/// Reads and parses the `Retry-After` header, if present
pub fn retry_after_from(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}
