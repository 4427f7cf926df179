//! REST surface for the milestone booking engine

pub mod config;
pub mod error;
pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use booking_engine::{engine::BookingEngine, error::ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

// Application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
}

impl AppState {
    pub fn new(engine: BookingEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Envelope for every response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health_check))
        // Bookings
        .route("/api/bookings", post(routes::create_booking))
        .route("/api/bookings/:booking_id", get(routes::get_booking))
        .route("/api/bookings/:booking_id/cancel", post(routes::cancel_booking))
        .route("/api/bookings/:booking_id/dispute", post(routes::open_dispute))
        .route(
            "/api/clients/:client_id/bookings",
            get(routes::list_client_bookings),
        )
        .route(
            "/api/freelancers/:freelancer_id/bookings",
            get(routes::list_freelancer_bookings),
        )
        // Stages
        .route(
            "/api/bookings/:booking_id/stages",
            get(routes::list_stages).post(routes::create_stages),
        )
        .route("/api/stages/:stage_id/submit", post(routes::submit_stage))
        .route("/api/stages/:stage_id/approve", post(routes::approve_stage))
        .route("/api/stages/:stage_id/reject", post(routes::reject_stage))
        .route("/api/stages/:stage_id/release", post(routes::release_stage))
        // Catalog
        .route("/api/provision", post(routes::provision))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
