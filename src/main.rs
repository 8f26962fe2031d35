use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::get;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mayfly::cli::{Cli, Commands, ServiceCommands};
use mayfly::errors::AppError;
use mayfly::lifecycle::executor;
use mayfly::lifecycle::scheduler::CleanupScheduler;
use mayfly::metrics::Metrics;
use mayfly::middleware::rate_limit::RateLimiter;
use mayfly::store::postgres::PgStore;
use mayfly::{api, config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mayfly=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(Commands::Service { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_service_command(&db, command).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let metrics = Metrics::new();
    let scheduler = CleanupScheduler::new(db.clone(), metrics.clone());
    let limiter = RateLimiter::new(
        cfg.rate_limit_max,
        Duration::from_secs(cfg.rate_limit_window_secs),
    );
    let reaper_interval = Duration::from_secs(cfg.reaper_interval_secs);

    let state = Arc::new(AppState {
        db,
        config: cfg,
        limiter,
        scheduler: scheduler.clone(),
        metrics,
    });

    // Re-arm cleanup jobs for leases that survived a restart; anything
    // already past its expiry falls to the reaper's first sweep.
    match scheduler.rearm().await {
        Ok(n) => tracing::info!("re-armed {} cleanup jobs", n),
        Err(e) => tracing::warn!("failed to re-arm cleanup jobs: {}", e),
    }
    scheduler.spawn_reaper(reaper_interval);

    // Rate-limiter bucket housekeeping.
    let housekeeping = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            housekeeping.limiter.evict_expired();
        }
    });

    let app = axum::Router::new()
        // Health and metrics endpoints are never service-gated
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .merge(api::api_router(state.clone()))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("mayfly listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response so
/// clients can correlate errors with server logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> Result<&'static str, AppError> {
    sqlx::query("SELECT 1")
        .execute(state.db.pool())
        .await
        .map_err(AppError::Database)?;
    Ok("ok")
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}

async fn handle_service_command(db: &PgStore, cmd: ServiceCommands) -> anyhow::Result<()> {
    match cmd {
        ServiceCommands::List { limit } => {
            let services = db.list_services(limit).await?;
            if services.is_empty() {
                println!("No services found.");
                return Ok(());
            }
            println!(
                "{:<8} {:<20} {:<18} {:<11} {:<6} EXPIRES",
                "ID", "NAME", "TYPE", "STATUS", "EPOCH"
            );
            for s in services {
                let kind = format!("{:?}", s.service_type);
                let status = format!("{:?}", s.status);
                println!(
                    "{:<8} {:<20} {:<18} {:<11} {:<6} {}",
                    s.id,
                    s.name,
                    kind,
                    status,
                    s.cleanup_epoch,
                    s.expires_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        ServiceCommands::Destroy { id } => {
            let Some(service) = db.get_service(id).await? else {
                println!("Service {} not found.", id);
                return Ok(());
            };
            let outcome = executor::run_cleanup(db, id, service.cleanup_epoch).await?;
            println!(
                "Service {} destroyed ({} messages, {} records purged).",
                id, outcome.messages_deleted, outcome.records_deleted
            );
        }
    }
    Ok(())
}
