//! REST rate limiter
//!
//! Three layers must all clear before a request is sent:
//! 1. the global window budget (capacity per rolling window)
//! 2. the route's bucket budget, discovered from response headers
//! 3. the global lockout set by a 429 with global scope (kept on the window budget)
//!
//! Routes are mapped to server bucket ids lazily. Routes that report the
//! same bucket id (and the same major parameters) share one budget.

use chat_core::{BucketBudget, WindowBudget};
use dashmap::DashMap;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::route::Route;

// =============================================================================
// Header names
// =============================================================================

pub const HEADER_BUCKET: &str = "x-ratelimit-bucket";
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const HEADER_GLOBAL: &str = "x-ratelimit-global";
pub const HEADER_SCOPE: &str = "x-ratelimit-scope";

/// Used when a 429 carries no usable delay
const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Upper bound on any delay a server asks for
pub const MAX_SERVER_DELAY: Duration = Duration::from_secs(3600);

/// Convert a server-supplied delay in seconds; NaN yields `None`
fn server_delay(secs: f64) -> Option<Duration> {
    if secs.is_nan() {
        return None;
    }
    Some(
        Duration::try_from_secs_f64(secs.max(0.0))
            .map_or(MAX_SERVER_DELAY, |delay| delay.min(MAX_SERVER_DELAY)),
    )
}

/// Current instant on tokio's clock, so paused test time applies
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// What a 429 response said
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub retry_after: Duration,
    pub global: bool,
}

/// Body of a 429 response
#[derive(Debug, Deserialize)]
struct RateLimitedBody {
    /// Seconds, possibly fractional
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

/// One shared bucket: its budget plus a FIFO admission gate
#[derive(Debug, Default)]
struct BucketState {
    budget: parking_lot::Mutex<BucketBudget>,
    gate: tokio::sync::Mutex<()>,
}

/// Client-side REST rate limiter
#[derive(Debug)]
pub struct RestRateLimiter {
    global: parking_lot::Mutex<WindowBudget>,
    /// Route bucket key -> bucket identity
    routes: DashMap<String, String>,
    /// Bucket identity -> shared state
    buckets: DashMap<String, Arc<BucketState>>,
}

impl RestRateLimiter {
    /// Create a limiter with a global budget of `capacity` per `window`
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            global: parking_lot::Mutex::new(WindowBudget::new(capacity, window)),
            routes: DashMap::new(),
            buckets: DashMap::new(),
        }
    }

    /// Bucket identity a route currently maps to
    pub fn bucket_id(&self, route: &Route) -> String {
        self.routes
            .get(route.bucket_key())
            .map(|id| id.value().clone())
            .unwrap_or_else(|| route.bucket_key().to_string())
    }

    fn bucket(&self, identity: &str) -> Arc<BucketState> {
        // Clone the Arc out so no map guard outlives this call
        if let Some(state) = self.buckets.get(identity) {
            return Arc::clone(state.value());
        }
        Arc::clone(
            self.buckets
                .entry(identity.to_string())
                .or_default()
                .value(),
        )
    }

    /// Wait until the route may send, then spend one unit of every layer
    pub async fn reserve(&self, route: &Route) {
        let identity = self.bucket_id(route);
        let bucket = self.bucket(&identity);

        // Callers on the same bucket are admitted one at a time, in arrival order
        let _gate = bucket.gate.lock().await;

        loop {
            let at = now();
            let wait = {
                let mut global = self.global.lock();
                let mut budget = bucket.budget.lock();

                let wait = match (global.wait_time(at), budget.wait_time(at)) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                if wait.is_none() {
                    // Both report no wait, so neither spend can fail
                    let _ = global.try_spend(at);
                    let _ = budget.try_spend(at);
                }
                wait
            };

            match wait {
                None => {
                    tracing::trace!(route = %route, bucket = %identity, "Rate limit reserved");
                    return;
                }
                Some(wait) => {
                    tracing::debug!(
                        route = %route,
                        bucket = %identity,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limit reached, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Update the route's bucket from response headers
    pub fn observe(&self, route: &Route, headers: &HeaderMap) {
        let identity = match header_str(headers, HEADER_BUCKET) {
            Some(hash) => {
                let identity = if route.major_parameters().is_empty() {
                    hash.to_string()
                } else {
                    format!("{hash}:{}", route.major_parameters())
                };
                let previous = self
                    .routes
                    .insert(route.bucket_key().to_string(), identity.clone());
                if previous.as_deref() != Some(identity.as_str()) {
                    tracing::debug!(route = %route, bucket = %identity, "Discovered rate limit bucket");
                }
                identity
            }
            None => self.bucket_id(route),
        };

        let limit = header_parse::<u32>(headers, HEADER_LIMIT);
        let remaining = header_parse::<u32>(headers, HEADER_REMAINING);
        let reset_after = header_parse::<f64>(headers, HEADER_RESET_AFTER).and_then(server_delay);

        if let (Some(limit), Some(remaining), Some(reset_after)) = (limit, remaining, reset_after) {
            self.bucket(&identity)
                .budget
                .lock()
                .update(limit, remaining, reset_after, now());
            tracing::trace!(
                route = %route,
                bucket = %identity,
                limit,
                remaining,
                reset_after_ms = reset_after.as_millis() as u64,
                "Rate limit headers observed"
            );
        }
    }

    /// Record a 429 response and return what it asked for
    pub fn on_rate_limited(&self, route: &Route, headers: &HeaderMap, body: &str) -> RateLimitInfo {
        let parsed: Option<RateLimitedBody> = serde_json::from_str(body).ok();

        let retry_after = parsed
            .as_ref()
            .and_then(|b| b.retry_after)
            .or_else(|| header_parse::<f64>(headers, RETRY_AFTER.as_str()))
            .or_else(|| header_parse::<f64>(headers, HEADER_RESET_AFTER))
            .filter(|secs| *secs >= 0.0)
            .and_then(server_delay)
            .unwrap_or(FALLBACK_RETRY_AFTER);

        let global = parsed.as_ref().is_some_and(|b| b.global)
            || header_str(headers, HEADER_GLOBAL).is_some_and(|v| v.eq_ignore_ascii_case("true"))
            || header_str(headers, HEADER_SCOPE).is_some_and(|v| v.eq_ignore_ascii_case("global"));

        let deadline = now() + retry_after;
        if global {
            self.global.lock().lock_until(deadline);
            tracing::warn!(
                route = %route,
                retry_after_ms = retry_after.as_millis() as u64,
                "Global rate limit hit, all requests paused"
            );
        } else {
            let identity = self.bucket_id(route);
            self.bucket(&identity).budget.lock().lock_until(deadline);
            tracing::warn!(
                route = %route,
                bucket = %identity,
                retry_after_ms = retry_after.as_millis() as u64,
                "Bucket rate limit hit"
            );
        }

        RateLimitInfo {
            retry_after,
            global,
        }
    }

    /// Deadline of the global lockout, if one is active
    pub fn global_lockout(&self) -> Option<Instant> {
        self.global.lock().locked_until().filter(|deadline| *deadline > now())
    }

    /// Global sends still available in the current window
    pub fn global_remaining(&self) -> usize {
        self.global.lock().remaining(now())
    }

    /// Number of distinct bucket states
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn header_parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    header_str(headers, name).and_then(|v| v.parse().ok())
}
