//! Integration tests for the core ephemeral-service contract:
//!
//! 1. The error envelope and contractual status codes
//! 2. Request/response DTO shapes
//! 3. The create→validate→merge flow a generated CRUD client exercises
//! 4. The at-most-one-pending-cleanup-job invariant across renewals
//!
//! These run without PostgreSQL: scheduler tests use a lazy pool that
//! never connects because their jobs are scheduled hours out.

use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

mod error_envelope_tests {
    use super::*;
    use mayfly::errors::{AppError, Violation};

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_gone_envelope() {
        let (status, body) = body_json(AppError::Gone).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["error"]["type"], "expired_error");
        assert_eq!(body["error"]["code"], "service_expired");
    }

    #[tokio::test]
    async fn test_validation_envelope_lists_violations() {
        let err = AppError::Validation(vec![
            Violation::required("title"),
            Violation::wrong_type("metadata", "object"),
        ]);
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let violations = body["error"]["violations"].as_array().unwrap();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0]["field"], "title");
        assert_eq!(violations[0]["code"], "required");
        assert_eq!(violations[1]["code"], "wrong_type");
    }

    #[tokio::test]
    async fn test_internal_errors_do_not_leak_details() {
        let err = AppError::Internal(anyhow::anyhow!("pool exhausted on pg-7"));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "internal server error");
    }

    #[tokio::test]
    async fn test_rate_limited_carries_retry_after() {
        let resp = AppError::RateLimited { retry_after: 17 }.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("retry-after").unwrap(), "17");
    }
}

mod dto_tests {
    use mayfly::api::services::{endpoint_map, CreateServiceRequest};
    use mayfly::models::resource::FieldType;
    use mayfly::models::service::{Service, ServiceStatus, ServiceType};
    use sqlx::types::Json;

    use super::*;

    #[test]
    fn test_create_request_parses_resource_spec() {
        let req: CreateServiceRequest = serde_json::from_value(json!({
            "name": "demo",
            "service_type": "crud_api",
            "ttl_hours": 0.02,
            "resource_spec": {
                "resources": [
                    {"name": "record", "fields": [
                        {"name": "title", "type": "string", "required": true},
                        {"name": "metadata", "type": "object"}
                    ]}
                ]
            }
        }))
        .unwrap();

        assert_eq!(req.service_type, ServiceType::CrudApi);
        assert_eq!(req.ttl_hours, 0.02);
        let spec = req.resource_spec.unwrap();
        assert_eq!(spec.resources[0].fields[0].field_type, FieldType::String);
        assert!(spec.resources[0].fields[0].required);
    }

    #[test]
    fn test_create_request_without_spec() {
        let req: CreateServiceRequest = serde_json::from_value(json!({
            "name": "scratch",
            "service_type": "notes",
            "ttl_hours": 2.0
        }))
        .unwrap();
        assert!(req.resource_spec.is_none());
    }

    #[test]
    fn test_endpoint_map_exposes_generated_routes_by_plural_slug() {
        let now = chrono::Utc::now();
        let service = Service {
            id: 42,
            name: "demo".into(),
            service_type: ServiceType::CrudApi,
            access_token: "svc_secret".into(),
            resource_spec: Some(Json(
                serde_json::from_value(json!({
                    "resources": [{"name": "Blog Post", "fields": []}]
                }))
                .unwrap(),
            )),
            expires_at: now,
            status: ServiceStatus::Active,
            cleanup_epoch: 0,
            created_at: now,
        };

        let endpoints = endpoint_map(&service);
        assert_eq!(endpoints["meta"], "GET /generated/42/meta");
        let posts = &endpoints["resources"]["blog_posts"];
        assert_eq!(posts["list"], "GET /generated/42/blog_posts");
        assert_eq!(posts["create"], "POST /generated/42/blog_posts");
    }

    #[test]
    fn test_service_serialization_never_includes_token() {
        let now = chrono::Utc::now();
        let service = Service {
            id: 7,
            name: "demo".into(),
            service_type: ServiceType::Chat,
            access_token: "svc_secret".into(),
            resource_spec: None,
            expires_at: now,
            status: ServiceStatus::Active,
            cleanup_epoch: 0,
            created_at: now,
        };
        let value = serde_json::to_value(&service).unwrap();
        assert!(value.get("access_token").is_none());
    }
}

mod crud_flow_tests {
    use mayfly::models::resource::ResourceSpec;
    use mayfly::schema::resolve::find_resource;
    use mayfly::schema::validate::{merge_payload, validate_payload};

    use super::*;

    fn spec() -> ResourceSpec {
        serde_json::from_value(json!({
            "resources": [
                {"name": "record", "fields": [
                    {"name": "title", "type": "string", "required": true},
                    {"name": "metadata", "type": "object"}
                ]}
            ]
        }))
        .unwrap()
    }

    /// The shape of the end-to-end scenario, at the component level:
    /// resolve the resource, create a valid record, reject an invalid one,
    /// and validate a partial update against the merged result.
    #[test]
    fn test_create_then_update_flow() {
        let spec = spec();
        let (def, key) = find_resource(&spec, "record").unwrap();
        assert_eq!(key, "records");

        // Create: valid payload passes.
        let create = json!({"title": "x"});
        assert!(validate_payload(def, create.as_object().unwrap()).is_empty());

        // Create: missing required field names the field.
        let bad = json!({"metadata": {"a": 1}});
        let violations = validate_payload(def, bad.as_object().unwrap());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "title");

        // Update: the partial diff omits the required field, but the merge
        // keeps it, so the update is accepted.
        let patch = json!({"metadata": {"b": 2}});
        let merged = merge_payload(&create, patch.as_object().unwrap());
        assert!(validate_payload(def, &merged).is_empty());
        assert_eq!(merged["title"], "x");
        assert_eq!(merged["metadata"]["b"], 2);
    }

    #[test]
    fn test_undeclared_resource_is_not_found() {
        assert!(find_resource(&spec(), "users").is_none());
    }
}

mod scheduler_invariant_tests {
    use std::time::Duration;

    use mayfly::lifecycle::scheduler::CleanupScheduler;
    use mayfly::metrics::Metrics;
    use mayfly::store::postgres::PgStore;

    fn scheduler() -> CleanupScheduler {
        let store = PgStore::connect_lazy("postgres://localhost/mayfly_test").unwrap();
        CleanupScheduler::new(store, Metrics::new())
    }

    const FAR_OUT: Duration = Duration::from_secs(3600);

    /// Renewing N times in sequence must leave exactly one live job.
    #[tokio::test]
    async fn test_n_renewals_one_live_job() {
        let scheduler = scheduler();
        for epoch in 0..10 {
            scheduler.schedule(1, epoch, FAR_OUT);
            assert_eq!(scheduler.pending_count(), 1);
            assert!(scheduler.has_pending(1));
        }
    }

    #[tokio::test]
    async fn test_cancel_then_reschedule() {
        let scheduler = scheduler();
        scheduler.schedule(1, 0, FAR_OUT);
        scheduler.cancel(1);
        assert_eq!(scheduler.pending_count(), 0);
        scheduler.schedule(1, 1, FAR_OUT);
        assert_eq!(scheduler.pending_count(), 1);
    }

    /// Already-elapsed expiries are never queued; the access gate alone
    /// rejects those services.
    #[tokio::test]
    async fn test_elapsed_expiry_not_queued() {
        let scheduler = scheduler();
        scheduler.schedule(1, 0, Duration::ZERO);
        assert!(!scheduler.has_pending(1));
    }
}
