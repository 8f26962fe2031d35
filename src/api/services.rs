use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::lifecycle::manager::{self, CreateServiceParams};
use crate::models::resource::ResourceSpec;
use crate::models::service::{Service, ServiceStatus, ServiceType};
use crate::schema::resolve::normalize_key;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub service_type: ServiceType,
    pub ttl_hours: f64,
    #[serde(default)]
    pub resource_spec: Option<ResourceSpec>,
}

#[derive(Serialize)]
pub struct CreateServiceResponse {
    pub service_id: i64,
    pub name: String,
    pub service_type: ServiceType,
    /// Only surfaced here and on renewal; a capability, not display data.
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub endpoints: Value,
}

#[derive(Deserialize)]
pub struct RenewServiceRequest {
    pub ttl_hours: f64,
}

#[derive(Serialize)]
pub struct RenewServiceResponse {
    pub service_id: i64,
    pub expires_at: DateTime<Utc>,
    pub status: ServiceStatus,
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /services — provision an ephemeral service
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<CreateServiceResponse>), AppError> {
    let service = manager::create_service(
        &state,
        CreateServiceParams {
            name: payload.name,
            service_type: payload.service_type,
            ttl_hours: payload.ttl_hours,
            resource_spec: payload.resource_spec,
        },
    )
    .await?;

    let endpoints = endpoint_map(&service);
    Ok((
        StatusCode::CREATED,
        Json(CreateServiceResponse {
            service_id: service.id,
            name: service.name,
            service_type: service.service_type,
            access_token: service.access_token,
            expires_at: service.expires_at,
            endpoints,
        }),
    ))
}

/// POST /services/:service_id/renew — extend the lease from now
pub async fn renew_service(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
    Json(payload): Json<RenewServiceRequest>,
) -> Result<Json<RenewServiceResponse>, AppError> {
    let service_id: i64 = service_id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid service id '{}'", service_id)))?;

    let service = manager::renew_service(&state, service_id, payload.ttl_hours).await?;
    Ok(Json(RenewServiceResponse {
        service_id: service.id,
        expires_at: service.expires_at,
        status: service.status,
    }))
}

/// The endpoint map returned at creation and from the meta endpoint, so a
/// client never has to guess the generated routes.
pub fn endpoint_map(service: &Service) -> Value {
    let mut endpoints = json!({
        "create_message": format!("POST /{}/message", service.id),
        "list_messages": format!("GET /{}/messages", service.id),
        "meta": format!("GET /generated/{}/meta", service.id),
    });

    if let Some(spec) = &service.resource_spec {
        let mut resources = serde_json::Map::new();
        for resource in &spec.resources {
            let key = normalize_key(&resource.name);
            resources.insert(
                key.clone(),
                json!({
                    "list": format!("GET /generated/{}/{}", service.id, key),
                    "create": format!("POST /generated/{}/{}", service.id, key),
                    "get": format!("GET /generated/{}/{}/:id", service.id, key),
                    "update": format!("PUT /generated/{}/{}/:id", service.id, key),
                    "delete": format!("DELETE /generated/{}/{}/:id", service.id, key),
                }),
            );
        }
        endpoints["resources"] = Value::Object(resources);
    }

    endpoints
}
