use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::middleware::access_gate::ServiceContext;
use crate::models::record::Message;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
}

/// POST /:service_id/message
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Extension(service): Extension<ServiceContext>,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("message content must not be empty".into()));
    }

    let message = state.db.insert_message(service.0.id, content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /:service_id/messages — newest first
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(service): Extension<ServiceContext>,
) -> Result<Json<Value>, AppError> {
    let items = state.db.list_messages(service.0.id).await?;
    Ok(Json(json!({ "count": items.len(), "items": items })))
}
