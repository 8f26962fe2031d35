use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::models::resource::ResourceSpec;

/// A provisioned ephemeral service.
///
/// Services are tenant-scoped containers for messages and generated
/// records. Each carries a TTL; once `expires_at` passes the access gate
/// rejects every request, and a delayed cleanup job purges the data and
/// flips the status to `destroyed`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub service_type: ServiceType,
    /// Per-service capability secret. Returned only by the create and
    /// renew endpoints, never serialized into other responses.
    #[serde(skip_serializing)]
    pub access_token: String,
    pub resource_spec: Option<Json<ResourceSpec>>,
    pub expires_at: DateTime<Utc>,
    pub status: ServiceStatus,
    /// Monotonic counter, bumped on every renewal. A cleanup job records
    /// the epoch it was scheduled under and no-ops if the row has moved on.
    pub cleanup_epoch: i64,
    pub created_at: DateTime<Utc>,
}

impl Service {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Kind of ephemeral service. Closed set; stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ServiceType {
    Chat,
    Notes,
    Qa,
    IotLogger,
    CrudApi,
    WebhookReceiver,
}

/// Service state machine: `active` → `destroyed`. Destroyed is terminal;
/// renewal can extend an active service but never resurrect a destroyed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Destroyed,
}
