use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Per-client, per-route rate limit (requests per window). 0 = disabled.
    /// Set via MAYFLY_RATE_LIMIT. Default: 60.
    pub rate_limit_max: u32,
    /// Window in seconds for the rate limit.
    /// Set via MAYFLY_RATE_LIMIT_WINDOW. Default: 60.
    pub rate_limit_window_secs: u64,
    /// How often the reaper sweeps for expired services whose cleanup job
    /// was lost (e.g. across a restart). Set via MAYFLY_REAPER_INTERVAL.
    pub reaper_interval_secs: u64,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    Ok(Config {
        port: std::env::var("MAYFLY_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/mayfly".into()),
        rate_limit_max: std::env::var("MAYFLY_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60),
        rate_limit_window_secs: std::env::var("MAYFLY_RATE_LIMIT_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60),
        reaper_interval_secs: std::env::var("MAYFLY_REAPER_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60),
    })
}
