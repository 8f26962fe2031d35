use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;

/// A validated payload stored under `(service_id, resource_key)`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredRecord {
    pub id: i64,
    pub service_id: i64,
    pub resource_key: String,
    pub payload: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Free-text entry scoped to one service. Gated by the access gate alone,
/// not the service token.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub service_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
