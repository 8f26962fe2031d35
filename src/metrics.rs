//! Prometheus metrics for the mayfly server.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape.
//! Counters live in an instance-scoped registry owned by the app state,
//! not the global default registry.

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{opts, Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};

use crate::AppState;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub requests_total: IntCounterVec,
    pub services_created_total: IntCounter,
    pub services_renewed_total: IntCounter,
    pub services_destroyed_total: IntCounter,
    pub rate_limited_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            opts!("mayfly_requests_total", "Total HTTP requests served"),
            &["route", "status"],
        )
        .expect("failed to build mayfly_requests_total");

        let services_created_total = IntCounter::with_opts(opts!(
            "mayfly_services_created_total",
            "Services provisioned"
        ))
        .expect("failed to build mayfly_services_created_total");

        let services_renewed_total = IntCounter::with_opts(opts!(
            "mayfly_services_renewed_total",
            "Service lease renewals"
        ))
        .expect("failed to build mayfly_services_renewed_total");

        let services_destroyed_total = IntCounter::with_opts(opts!(
            "mayfly_services_destroyed_total",
            "Services destroyed by the cleanup executor"
        ))
        .expect("failed to build mayfly_services_destroyed_total");

        let rate_limited_total = IntCounter::with_opts(opts!(
            "mayfly_rate_limited_total",
            "Requests rejected by the rate limiter"
        ))
        .expect("failed to build mayfly_rate_limited_total");

        for collector in [
            Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(services_created_total.clone()),
            Box::new(services_renewed_total.clone()),
            Box::new(services_destroyed_total.clone()),
            Box::new(rate_limited_total.clone()),
        ] {
            registry
                .register(collector)
                .expect("failed to register metric");
        }

        Self {
            registry,
            requests_total,
            services_created_total,
            services_renewed_total,
            services_destroyed_total,
            rate_limited_total,
        }
    }

    /// Render the registry in the Prometheus text format.
    pub fn render(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware: count every API request by route pattern and status.
pub async fn track(
    State(state): State<Arc<AppState>>,
    matched_path: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    let route = matched_path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let resp = next.run(req).await;
    state
        .metrics
        .requests_total
        .with_label_values(&[route.as_str(), resp.status().as_str()])
        .inc();
    resp
}
