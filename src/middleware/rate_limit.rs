//! Fixed-window rate limiter keyed by (client, route).
//!
//! The bucket map is the one piece of general-purpose shared mutable state
//! in the serving path; it lives in the app state and every access goes
//! through the concurrent map. No module-level singletons.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

use crate::errors::AppError;
use crate::AppState;

pub struct RateLimiter {
    buckets: DashMap<(String, String), Bucket>,
    max: u32,
    window: Duration,
}

struct Bucket {
    count: u32,
    reset_at: Instant,
}

impl RateLimiter {
    /// `max == 0` disables limiting entirely.
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            max,
            window,
        }
    }

    /// Count one request for `(client, route)`. Returns the seconds to put
    /// in `Retry-After` when the window is exhausted.
    pub fn check(&self, client: &str, route: &str) -> Result<(), u64> {
        self.check_at(client, route, Instant::now())
    }

    fn check_at(&self, client: &str, route: &str, now: Instant) -> Result<(), u64> {
        if self.max == 0 {
            return Ok(());
        }

        let mut bucket = self
            .buckets
            .entry((client.to_string(), route.to_string()))
            .or_insert_with(|| Bucket {
                count: 0,
                reset_at: now + self.window,
            });

        if now >= bucket.reset_at {
            bucket.count = 1;
            bucket.reset_at = now + self.window;
            return Ok(());
        }

        if bucket.count >= self.max {
            let remaining = bucket.reset_at.saturating_duration_since(now);
            return Err((remaining.as_secs_f64().ceil() as u64).max(1));
        }

        bucket.count += 1;
        Ok(())
    }

    /// Drop buckets whose window has fully elapsed. Optional housekeeping;
    /// correctness does not depend on it.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| now < bucket.reset_at);
    }
}

pub async fn enforce(
    State(state): State<Arc<AppState>>,
    matched_path: Option<MatchedPath>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Key on the route *pattern*, not the concrete path, so e.g. every
    // record id under one resource shares a bucket.
    let route = matched_path
        .as_ref()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let client = client_identity(req.headers(), connect_info.map(|c| c.0));

    match state.limiter.check(&client, &route) {
        Ok(()) => Ok(next.run(req).await),
        Err(retry_after) => {
            state.metrics.rate_limited_total.inc();
            tracing::warn!(client = %client, route = %route, "rate limit exceeded");
            Err(AppError::RateLimited { retry_after })
        }
    }
}

/// Prefer the first forwarded address; fall back to the transport peer.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').map(str::trim).next() {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.map(|p| p.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_window_allows_max_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("1.2.3.4", "/services", t0).is_ok());
        }
        let retry_after = limiter
            .check_at("1.2.3.4", "/services", t0 + Duration::from_secs(10))
            .unwrap_err();
        assert!(retry_after > 0);
        assert!(retry_after <= 60);
    }

    #[test]
    fn test_window_elapse_resets_bucket() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("1.2.3.4", "/services", t0).is_ok());
        }
        assert!(limiter
            .check_at("1.2.3.4", "/services", t0 + Duration::from_secs(61))
            .is_ok());
    }

    #[test]
    fn test_buckets_are_per_client_and_per_route() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.check_at("1.2.3.4", "/services", t0).is_ok());
        assert!(limiter.check_at("1.2.3.4", "/services", t0).is_err());
        // Different client, same route.
        assert!(limiter.check_at("5.6.7.8", "/services", t0).is_ok());
        // Same client, different route.
        assert!(limiter.check_at("1.2.3.4", "/:service_id/messages", t0).is_ok());
    }

    #[test]
    fn test_zero_max_disables_limiting() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        let t0 = Instant::now();
        for _ in 0..100 {
            assert!(limiter.check_at("1.2.3.4", "/services", t0).is_ok());
        }
    }

    #[test]
    fn test_client_identity_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.9.9.9, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(client_identity(&headers, Some(peer)), "9.9.9.9");
        assert_eq!(client_identity(&HeaderMap::new(), Some(peer)), "127.0.0.1");
        assert_eq!(client_identity(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_evict_expired_drops_only_elapsed_buckets() {
        let limiter = RateLimiter::new(3, Duration::from_millis(0));
        limiter.check("1.2.3.4", "/services").ok();
        limiter.evict_expired();
        assert!(limiter.buckets.is_empty());
    }
}
