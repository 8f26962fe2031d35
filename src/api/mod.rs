use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::metrics;
use crate::middleware::{access_gate, rate_limit, token_gate};
use crate::AppState;

pub mod crud;
pub mod messages;
pub mod services;

/// Build the API router. The caller owns the outer layers (tracing, CORS,
/// body limit); per-group gating order is decided here.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let service_routes = Router::new()
        .route("/services", post(services::create_service))
        .route("/services/:service_id/renew", post(services::renew_service));

    // Free-text messages: access gate only, no service token (see DESIGN.md).
    let message_routes = Router::new()
        .route("/:service_id/message", post(messages::create_message))
        .route("/:service_id/messages", get(messages::list_messages))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            access_gate::enforce,
        ));

    // Generated CRUD: access gate, then token gate. route_layer runs the
    // last-added layer first.
    let generated_routes = Router::new()
        .route("/generated/:service_id/meta", get(crud::meta))
        .route(
            "/generated/:service_id/:resource",
            get(crud::list_records).post(crud::create_record),
        )
        .route(
            "/generated/:service_id/:resource/:record_id",
            get(crud::get_record)
                .put(crud::update_record)
                .delete(crud::delete_record),
        )
        .route_layer(middleware::from_fn(token_gate::enforce))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            access_gate::enforce,
        ));

    Router::new()
        .merge(service_routes)
        .merge(message_routes)
        .merge(generated_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ))
        // Outermost, so rate-limited rejections are counted too.
        .layer(middleware::from_fn_with_state(state, metrics::track))
}
