//! Service provisioning and lease renewal.
//!
//! The manager is the sole owner of scheduling decisions: handlers call
//! in here, and this module decides when the cleanup scheduler gets a new
//! job or loses an old one.

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::errors::AppError;
use crate::models::resource::ResourceSpec;
use crate::models::service::{Service, ServiceStatus, ServiceType};
use crate::store::postgres::NewService;
use crate::AppState;

/// Minimum lease: 1 minute. One observed variant used ~6 minutes; this
/// implementation fixes the bound at 1 minute (see DESIGN.md).
pub const MIN_TTL_HOURS: f64 = 1.0 / 60.0;
pub const MAX_TTL_HOURS: f64 = 48.0;

const MIN_NAME_LEN: usize = 3;
const TOKEN_SUFFIX_LEN: usize = 40;

pub struct CreateServiceParams {
    pub name: String,
    pub service_type: ServiceType,
    pub ttl_hours: f64,
    pub resource_spec: Option<ResourceSpec>,
}

/// Provision a new service: validate, mint its access token, persist it
/// as active, and schedule destruction at the expiry instant.
pub async fn create_service(
    state: &AppState,
    params: CreateServiceParams,
) -> Result<Service, AppError> {
    validate_name(&params.name)?;
    let ttl = validate_ttl(params.ttl_hours)?;

    let now = Utc::now();
    let new = NewService {
        name: params.name,
        service_type: params.service_type,
        access_token: generate_access_token(),
        resource_spec: params.resource_spec,
        expires_at: now + ttl,
    };

    let service = state.db.create_service(&new).await.map_err(AppError::Internal)?;
    state.metrics.services_created_total.inc();
    tracing::info!(
        service_id = service.id,
        service_type = ?service.service_type,
        expires_at = %service.expires_at,
        "service created"
    );

    schedule_expiry(state, &service);
    Ok(service)
}

/// Extend a service's lease from *now*. Forces the status back to active
/// for an expired-but-not-yet-destroyed service; a destroyed service is
/// gone for good.
pub async fn renew_service(
    state: &AppState,
    service_id: i64,
    ttl_hours: f64,
) -> Result<Service, AppError> {
    let ttl = validate_ttl(ttl_hours)?;

    let current = state
        .db
        .get_service(service_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::NotFound("service"))?;
    if current.status == ServiceStatus::Destroyed {
        return Err(AppError::Gone);
    }

    // Cancel before the new expiry becomes visible, so the old job cannot
    // fire against the renewed row. A job that slips through anyway is
    // neutralized by the executor's epoch check.
    state.scheduler.cancel(service_id);

    let service = state
        .db
        .renew_service(service_id, Utc::now() + ttl)
        .await
        .map_err(AppError::Internal)?
        // The row can only vanish from under us via a concurrent destroy.
        .ok_or(AppError::Gone)?;

    state.metrics.services_renewed_total.inc();
    tracing::info!(
        service_id,
        expires_at = %service.expires_at,
        epoch = service.cleanup_epoch,
        "service renewed"
    );

    schedule_expiry(state, &service);
    Ok(service)
}

fn schedule_expiry(state: &AppState, service: &Service) {
    let delay = (service.expires_at - Utc::now())
        .to_std()
        .unwrap_or_default();
    if delay.is_zero() {
        // Already elapsed; the access gate rejects the service on its own.
        return;
    }
    state
        .scheduler
        .schedule(service.id, service.cleanup_epoch, delay);
}

pub fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().len() < MIN_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "name must be at least {} characters",
            MIN_NAME_LEN
        )));
    }
    Ok(())
}

pub fn validate_ttl(ttl_hours: f64) -> Result<Duration, AppError> {
    if !ttl_hours.is_finite() || !(MIN_TTL_HOURS..=MAX_TTL_HOURS).contains(&ttl_hours) {
        return Err(AppError::BadRequest(format!(
            "ttl_hours must be between {:.4} (1 minute) and {} (48 hours)",
            MIN_TTL_HOURS, MAX_TTL_HOURS
        )));
    }
    Ok(Duration::milliseconds((ttl_hours * 3_600_000.0) as i64))
}

/// Opaque capability secret, minted once at creation and never rotated by
/// renewal. Fixed length, CSPRNG-backed.
pub fn generate_access_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("svc_{}", suffix)
}
