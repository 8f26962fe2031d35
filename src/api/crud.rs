//! Dynamic CRUD over a service's declared resources.
//!
//! Every operation is scoped to `(service_id, resource_key)`: the store
//! queries carry both, so records can never leak across resources of the
//! same service, let alone across services.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::api::services::endpoint_map;
use crate::errors::AppError;
use crate::middleware::access_gate::ServiceContext;
use crate::models::record::StoredRecord;
use crate::models::resource::ResourceDef;
use crate::models::service::Service;
use crate::schema::resolve::{find_resource, normalize_key};
use crate::schema::validate::{merge_payload, validate_payload};
use crate::AppState;

fn resolve<'a>(service: &'a Service, requested: &str) -> Result<(&'a ResourceDef, String), AppError> {
    let spec = service
        .resource_spec
        .as_ref()
        .ok_or(AppError::NotFound("resource"))?;
    find_resource(&spec.0, requested).ok_or(AppError::NotFound("resource"))
}

fn parse_record_id(raw: &str) -> Result<i64, AppError> {
    raw.parse().map_err(|_| AppError::NotFound("record"))
}

/// GET /generated/:service_id/meta
pub async fn meta(
    Extension(service): Extension<ServiceContext>,
) -> Json<Value> {
    let service = &service.0;
    let resources: Vec<Value> = service
        .resource_spec
        .as_ref()
        .map(|spec| {
            spec.resources
                .iter()
                .map(|r| {
                    json!({
                        "name": r.name,
                        "key": normalize_key(&r.name),
                        "description": r.description,
                        "fields": r.fields,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Json(json!({
        "service_id": service.id,
        "name": service.name,
        "service_type": service.service_type,
        "status": service.status,
        "created_at": service.created_at,
        "expires_at": service.expires_at,
        "description": service.resource_spec.as_ref().and_then(|s| s.description.clone()),
        "resources": resources,
        "endpoints": endpoint_map(service),
    }))
}

/// GET /generated/:service_id/:resource — newest first
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Extension(service): Extension<ServiceContext>,
    Path((_, resource)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let (_, key) = resolve(&service.0, &resource)?;
    let items = state.db.list_records(service.0.id, &key).await?;
    Ok(Json(json!({
        "resource": key,
        "count": items.len(),
        "items": items,
    })))
}

/// POST /generated/:service_id/:resource
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    Extension(service): Extension<ServiceContext>,
    Path((_, resource)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<StoredRecord>), AppError> {
    let (def, key) = resolve(&service.0, &resource)?;
    let payload = body
        .as_object()
        .ok_or_else(|| AppError::BadRequest("request body must be a JSON object".into()))?;

    let violations = validate_payload(def, payload);
    if !violations.is_empty() {
        return Err(AppError::Validation(violations));
    }

    let record = state.db.insert_record(service.0.id, &key, body).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /generated/:service_id/:resource/:record_id
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Extension(service): Extension<ServiceContext>,
    Path((_, resource, record_id)): Path<(String, String, String)>,
) -> Result<Json<StoredRecord>, AppError> {
    let (_, key) = resolve(&service.0, &resource)?;
    let id = parse_record_id(&record_id)?;
    let record = state
        .db
        .get_record(service.0.id, &key, id)
        .await?
        .ok_or(AppError::NotFound("record"))?;
    Ok(Json(record))
}

/// PUT /generated/:service_id/:resource/:record_id — shallow-merge update,
/// validated against the merged record rather than the partial diff.
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    Extension(service): Extension<ServiceContext>,
    Path((_, resource, record_id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<StoredRecord>, AppError> {
    let (def, key) = resolve(&service.0, &resource)?;
    let id = parse_record_id(&record_id)?;
    let patch = body
        .as_object()
        .ok_or_else(|| AppError::BadRequest("request body must be a JSON object".into()))?;

    let current = state
        .db
        .get_record(service.0.id, &key, id)
        .await?
        .ok_or(AppError::NotFound("record"))?;

    let merged = merge_payload(&current.payload.0, patch);
    let violations = validate_payload(def, &merged);
    if !violations.is_empty() {
        return Err(AppError::Validation(violations));
    }

    let record = state
        .db
        .update_record(service.0.id, &key, id, Value::Object(merged))
        .await?
        .ok_or(AppError::NotFound("record"))?;
    Ok(Json(record))
}

/// DELETE /generated/:service_id/:resource/:record_id — returns the
/// deleted representation.
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Extension(service): Extension<ServiceContext>,
    Path((_, resource, record_id)): Path<(String, String, String)>,
) -> Result<Json<StoredRecord>, AppError> {
    let (_, key) = resolve(&service.0, &resource)?;
    let id = parse_record_id(&record_id)?;
    let record = state
        .db
        .delete_record(service.0.id, &key, id)
        .await?
        .ok_or(AppError::NotFound("record"))?;
    Ok(Json(record))
}
