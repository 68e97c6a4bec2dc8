//! HTTP gateway
//!
//! Endpoints:
//! - GET  /                 - liveness text
//! - GET  /webhook          - Meta verification handshake
//! - POST /webhook          - WhatsApp event callback
//! - POST /systeme-webhook  - CRM lead submission (`?secret=`)

mod crm;
mod webhook;

use crate::coach::Coach;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Webhook bodies are small; media arrives by id, not inline.
const MAX_BODY_SIZE: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub coach: Arc<Coach>,
}

impl AppState {
    pub fn new(coach: Arc<Coach>) -> Self {
        Self { coach }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(ping))
        .route(
            "/webhook",
            get(webhook::verify).post(webhook::receive),
        )
        .route("/systeme-webhook", axum::routing::post(crm::receive))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

async fn ping() -> &'static str {
    "FitMouv webhook OK"
}
