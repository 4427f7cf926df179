use crate::{error::ApiError, ApiResponse, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use booking_engine::{
    booking::BookingAttempt,
    enrichment::BookingView,
    models::{
        Actor, ActorRole, Booking, BookingQuery, BookingReceipt, BookingStatus, PackageDraft,
        ServiceDraft, Stage, StageDef,
    },
    provisioner::{ProvisionedIds, ProvisioningFlow},
    stages::StageUpdate,
};
use serde::Deserialize;
use tracing::info;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub client_id: String,
    pub package_id: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Reuse to retry the same attempt; omitted for a new one
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<BookingStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<ListQuery> for BookingQuery {
    fn from(query: ListQuery) -> Self {
        let defaults = BookingQuery::default();
        BookingQuery {
            status: query.status,
            limit: query.limit.unwrap_or(defaults.limit),
            offset: query.offset.unwrap_or(defaults.offset),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub actor_id: String,
    pub role: ActorRole,
    #[serde(default)]
    pub reason: String,
}

impl ActorRequest {
    fn actor(&self) -> Actor {
        Actor {
            id: self.actor_id.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateStagesRequest {
    pub freelancer_id: String,
    pub stages: Vec<StageDef>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitStageRequest {
    pub freelancer_id: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectStageRequest {
    pub client_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub service: ServiceDraft,
    #[serde(default)]
    pub package: PackageDraft,
}

// Health check endpoint
pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::ok("OK".to_string()))
}

pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingReceipt>>), ApiError> {
    let attempt = match request.idempotency_key {
        Some(key) => BookingAttempt::with_key(request.client_id, request.package_id, request.notes, key),
        None => BookingAttempt::new(request.client_id, request.package_id, request.notes),
    };

    let engine = &state.engine;
    let receipt = engine
        .retry
        .run(|| engine.bookings.submit(&attempt))
        .await?;

    info!(booking_id = %receipt.booking_id, "booking created via api");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(receipt))))
}

pub async fn get_booking(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<BookingView> {
    let booking = state.engine.bookings.get_booking(&booking_id).await?;
    let view = state.engine.enricher.enrich(&booking).await;
    Ok(Json(ApiResponse::ok(view)))
}

pub async fn list_client_bookings(
    Path(client_id): Path<String>,
    Query(query): Query<ListQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Booking>> {
    let bookings = state
        .engine
        .bookings
        .list_for_client(&client_id, query.into())
        .await?;
    Ok(Json(ApiResponse::ok(bookings)))
}

pub async fn list_freelancer_bookings(
    Path(freelancer_id): Path<String>,
    Query(query): Query<ListQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Booking>> {
    let bookings = state
        .engine
        .bookings
        .list_for_freelancer(&freelancer_id, query.into())
        .await?;
    Ok(Json(ApiResponse::ok(bookings)))
}

pub async fn cancel_booking(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ActorRequest>,
) -> ApiResult<Booking> {
    let booking = state
        .engine
        .bookings
        .cancel_booking(&booking_id, &request.actor(), &request.reason)
        .await?;
    Ok(Json(ApiResponse::ok(booking)))
}

pub async fn open_dispute(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ActorRequest>,
) -> ApiResult<Booking> {
    let booking = state
        .engine
        .bookings
        .open_dispute(&booking_id, &request.actor(), &request.reason)
        .await?;
    Ok(Json(ApiResponse::ok(booking)))
}

pub async fn list_stages(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Stage>> {
    let stages = state.engine.stages.list_stages(&booking_id).await?;
    Ok(Json(ApiResponse::ok(stages)))
}

pub async fn create_stages(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<CreateStagesRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Stage>>>), ApiError> {
    let stages = state
        .engine
        .stages
        .create_stages(&booking_id, &request.freelancer_id, &request.stages)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(stages))))
}

pub async fn submit_stage(
    Path(stage_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SubmitStageRequest>,
) -> ApiResult<Stage> {
    let stage = state
        .engine
        .stages
        .submit_stage(
            &stage_id,
            &request.freelancer_id,
            &request.notes,
            request.artifacts,
        )
        .await?;
    Ok(Json(ApiResponse::ok(stage)))
}

pub async fn approve_stage(
    Path(stage_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ClientRequest>,
) -> ApiResult<StageUpdate> {
    let update = state
        .engine
        .stages
        .approve_stage(&stage_id, &request.client_id)
        .await?;
    Ok(Json(ApiResponse::ok(update)))
}

pub async fn release_stage(
    Path(stage_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ClientRequest>,
) -> ApiResult<StageUpdate> {
    let update = state
        .engine
        .stages
        .release_stage(&stage_id, &request.client_id)
        .await?;
    Ok(Json(ApiResponse::ok(update)))
}

pub async fn reject_stage(
    Path(stage_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RejectStageRequest>,
) -> ApiResult<Stage> {
    let stage = state
        .engine
        .stages
        .reject_stage(&stage_id, &request.client_id, &request.reason)
        .await?;
    Ok(Json(ApiResponse::ok(stage)))
}

pub async fn provision(
    State(state): State<AppState>,
    Json(request): Json<ProvisionRequest>,
) -> ApiResult<ProvisionedIds> {
    let mut flow = ProvisioningFlow::new();
    let ids = state
        .engine
        .provisioner
        .ensure_service_and_package(&mut flow, &request.service, &request.package)
        .await?;
    info!(flow = %flow.flow_id(), service_id = %ids.service_id, package_id = %ids.package_id, "catalog provisioned");
    Ok(Json(ApiResponse::ok(ids)))
}
