//! Mayfly — self-destructing, schema-driven micro-APIs with a TTL.
//!
//! Library crate; the binary lives in `main.rs` and integration tests in
//! `tests/` exercise the public modules re-exported here.

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod schema;
pub mod store;

use lifecycle::scheduler::CleanupScheduler;
use metrics::Metrics;
use middleware::rate_limit::RateLimiter;
use store::postgres::PgStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub db: PgStore,
    pub config: config::Config,
    pub limiter: RateLimiter,
    pub scheduler: CleanupScheduler,
    pub metrics: Metrics,
}
