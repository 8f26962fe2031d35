use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;

use crate::models::record::{Message, StoredRecord};
use crate::models::resource::ResourceSpec;
use crate::models::service::{Service, ServiceType};

const SERVICE_COLUMNS: &str =
    "id, name, service_type, access_token, resource_spec, expires_at, status, cleanup_epoch, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

pub struct NewService {
    pub name: String,
    pub service_type: ServiceType,
    pub access_token: String,
    pub resource_spec: Option<ResourceSpec>,
    pub expires_at: DateTime<Utc>,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Build a store over a pool that connects on first use. Used by
    /// tests that never actually touch the database.
    pub fn connect_lazy(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- Service Operations --

    pub async fn create_service(&self, new: &NewService) -> anyhow::Result<Service> {
        let row = sqlx::query_as::<_, Service>(&format!(
            "INSERT INTO services (name, service_type, access_token, resource_spec, expires_at, status)
             VALUES ($1, $2, $3, $4, $5, 'active')
             RETURNING {SERVICE_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(new.service_type)
        .bind(&new.access_token)
        .bind(new.resource_spec.clone().map(Json))
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_service(&self, id: i64) -> anyhow::Result<Option<Service>> {
        let row = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Extend a service's lease: new expiry, status forced back to active,
    /// epoch bumped so any still-pending cleanup job goes stale. Guarded so
    /// a destroyed service can never be brought back.
    pub async fn renew_service(
        &self,
        id: i64,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Service>> {
        let row = sqlx::query_as::<_, Service>(&format!(
            "UPDATE services
             SET expires_at = $2, status = 'active', cleanup_epoch = cleanup_epoch + 1
             WHERE id = $1 AND status <> 'destroyed'
             RETURNING {SERVICE_COLUMNS}"
        ))
        .bind(id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Idempotent terminal transition.
    pub async fn mark_destroyed(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE services SET status = 'destroyed' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Active services with a future expiry, scheduled again at startup.
    pub async fn list_active_services(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Service>> {
        let rows = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE status = 'active' AND expires_at > $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Active services whose expiry has already passed: cleanup candidates
    /// for the reaper sweep.
    pub async fn list_expired_active(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Service>> {
        let rows = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE status = 'active' AND expires_at <= $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_services(&self, limit: i64) -> anyhow::Result<Vec<Service>> {
        let rows = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Message Operations --

    pub async fn insert_message(&self, service_id: i64, content: &str) -> anyhow::Result<Message> {
        let row = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (service_id, content) VALUES ($1, $2)
             RETURNING id, service_id, content, created_at",
        )
        .bind(service_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_messages(&self, service_id: i64) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(
            "SELECT id, service_id, content, created_at FROM messages
             WHERE service_id = $1 ORDER BY id DESC",
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_messages(&self, service_id: i64) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE service_id = $1")
            .bind(service_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -- Record Operations --

    pub async fn insert_record(
        &self,
        service_id: i64,
        resource_key: &str,
        payload: Value,
    ) -> anyhow::Result<StoredRecord> {
        let row = sqlx::query_as::<_, StoredRecord>(
            "INSERT INTO records (service_id, resource_key, payload) VALUES ($1, $2, $3)
             RETURNING id, service_id, resource_key, payload, created_at, updated_at",
        )
        .bind(service_id)
        .bind(resource_key)
        .bind(Json(payload))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_record(
        &self,
        service_id: i64,
        resource_key: &str,
        id: i64,
    ) -> anyhow::Result<Option<StoredRecord>> {
        let row = sqlx::query_as::<_, StoredRecord>(
            "SELECT id, service_id, resource_key, payload, created_at, updated_at
             FROM records WHERE id = $1 AND service_id = $2 AND resource_key = $3",
        )
        .bind(id)
        .bind(service_id)
        .bind(resource_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_records(
        &self,
        service_id: i64,
        resource_key: &str,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        let rows = sqlx::query_as::<_, StoredRecord>(
            "SELECT id, service_id, resource_key, payload, created_at, updated_at
             FROM records WHERE service_id = $1 AND resource_key = $2 ORDER BY id DESC",
        )
        .bind(service_id)
        .bind(resource_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_record(
        &self,
        service_id: i64,
        resource_key: &str,
        id: i64,
        payload: Value,
    ) -> anyhow::Result<Option<StoredRecord>> {
        let row = sqlx::query_as::<_, StoredRecord>(
            "UPDATE records SET payload = $4, updated_at = NOW()
             WHERE id = $1 AND service_id = $2 AND resource_key = $3
             RETURNING id, service_id, resource_key, payload, created_at, updated_at",
        )
        .bind(id)
        .bind(service_id)
        .bind(resource_key)
        .bind(Json(payload))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_record(
        &self,
        service_id: i64,
        resource_key: &str,
        id: i64,
    ) -> anyhow::Result<Option<StoredRecord>> {
        let row = sqlx::query_as::<_, StoredRecord>(
            "DELETE FROM records
             WHERE id = $1 AND service_id = $2 AND resource_key = $3
             RETURNING id, service_id, resource_key, payload, created_at, updated_at",
        )
        .bind(id)
        .bind(service_id)
        .bind(resource_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_records(&self, service_id: i64) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE service_id = $1")
            .bind(service_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
