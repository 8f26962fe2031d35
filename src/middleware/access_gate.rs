//! Per-request service gate.
//!
//! Every request addressed to a specific service id passes through here.
//! Existence, expiry and destruction are re-checked on each request;
//! nothing is cached across requests, so there is no stale-permission
//! window between a service expiring and its cleanup job firing.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::errors::AppError;
use crate::models::service::{Service, ServiceStatus};
use crate::AppState;

/// The resolved service, attached to the request and owned by it. Handlers
/// and the token gate read it via `Extension` instead of re-querying.
#[derive(Clone)]
pub struct ServiceContext(pub Arc<Service>);

pub async fn enforce(
    State(state): State<Arc<AppState>>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let raw = params
        .get("service_id")
        .ok_or_else(|| AppError::BadRequest("missing service id".into()))?;
    let service_id: i64 = raw
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid service id '{}'", raw)))?;

    let service = state
        .db
        .get_service(service_id)
        .await?
        .ok_or(AppError::NotFound("service"))?;

    check_service(&service, Utc::now())?;

    req.extensions_mut()
        .insert(ServiceContext(Arc::new(service)));
    Ok(next.run(req).await)
}

/// The gate decision itself: a destroyed service is gone forever, and an
/// expired one is gone even if its cleanup job has not fired yet.
pub fn check_service(service: &Service, now: chrono::DateTime<Utc>) -> Result<(), AppError> {
    if service.status == ServiceStatus::Destroyed || service.is_expired(now) {
        return Err(AppError::Gone);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::service::ServiceType;
    use chrono::Duration;

    fn service(status: ServiceStatus, expires_in: Duration) -> Service {
        let now = Utc::now();
        Service {
            id: 1,
            name: "demo".into(),
            service_type: ServiceType::CrudApi,
            access_token: "svc_x".into(),
            resource_spec: None,
            expires_at: now + expires_in,
            status,
            cleanup_epoch: 0,
            created_at: now,
        }
    }

    #[test]
    fn test_live_service_passes() {
        let svc = service(ServiceStatus::Active, Duration::hours(1));
        assert!(check_service(&svc, Utc::now()).is_ok());
    }

    #[test]
    fn test_expired_service_is_gone_before_cleanup_runs() {
        // Still ACTIVE in the store: the executor has not fired yet.
        let svc = service(ServiceStatus::Active, Duration::seconds(-1));
        assert!(matches!(
            check_service(&svc, Utc::now()),
            Err(AppError::Gone)
        ));
    }

    #[test]
    fn test_destroyed_service_is_gone_even_with_future_expiry() {
        let svc = service(ServiceStatus::Destroyed, Duration::hours(1));
        assert!(matches!(
            check_service(&svc, Utc::now()),
            Err(AppError::Gone)
        ));
    }
}
