//! Ledger client abstraction
//!
//! The ledger is the system of record for money movement and for
//! booking/stage state. Everything in this crate that mutates a booking
//! goes through [`LedgerClient`]; errors it returns are surfaced to
//! callers unchanged.

pub(crate) mod http;
mod memory;

pub use http::HttpLedgerClient;
pub use memory::MemoryLedger;

use crate::{
    models::{Actor, Booking, BookingQuery, BookingReceipt, PackageTier, Stage, StageDef},
    EngineResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Debit request for a package booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookPackageRequest {
    pub client_id: String,
    pub package_id: String,
    /// Sent out of band (header) by HTTP clients
    #[serde(skip)]
    pub idempotency_key: String,
    pub notes: Option<String>,
}

/// Stage submission payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitStageRequest {
    pub stage_id: String,
    pub freelancer_id: String,
    pub notes: String,
    pub artifacts: Vec<String>,
}

/// Schema-valid service record to register with the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub freelancer_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
}

/// Schema-valid package record to register with the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePackageRequest {
    pub service_id: String,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub currency: String,
    pub delivery_time_days: u32,
    pub revisions: u32,
    pub features: Vec<String>,
    pub tier: PackageTier,
}

/// Remote operations consumed from the ledger service
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Debit the client and open a booking. At most one debit per idempotency key.
    async fn book_package(&self, request: BookPackageRequest) -> EngineResult<BookingReceipt>;

    async fn get_booking_by_id(&self, booking_id: &str) -> EngineResult<Booking>;

    async fn list_bookings_for_client(
        &self,
        client_id: &str,
        query: BookingQuery,
    ) -> EngineResult<Vec<Booking>>;

    async fn list_bookings_for_freelancer(
        &self,
        freelancer_id: &str,
        query: BookingQuery,
    ) -> EngineResult<Vec<Booking>>;

    /// Cancel and start the refund path
    async fn cancel_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<Booking>;

    async fn open_dispute(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<Booking>;

    /// Mark a booking whose stages are all released as completed
    async fn complete_booking(&self, booking_id: &str) -> EngineResult<Booking>;

    async fn create_stages(
        &self,
        booking_id: &str,
        freelancer_id: &str,
        stages: &[StageDef],
    ) -> EngineResult<Vec<Stage>>;

    async fn get_stage_by_id(&self, stage_id: &str) -> EngineResult<Stage>;

    /// Stages of a booking ordered by stage number
    async fn list_stages(&self, booking_id: &str) -> EngineResult<Vec<Stage>>;

    async fn submit_stage(&self, request: SubmitStageRequest) -> EngineResult<Stage>;

    async fn approve_stage(&self, stage_id: &str, client_id: &str) -> EngineResult<Stage>;

    /// Pay out an approved stage from escrow
    async fn release_stage(&self, stage_id: &str, client_id: &str) -> EngineResult<Stage>;

    async fn reject_stage(
        &self,
        stage_id: &str,
        client_id: &str,
        reason: &str,
    ) -> EngineResult<Stage>;

    /// Register a service; returns its id
    async fn create_service_for_booking(
        &self,
        request: CreateServiceRequest,
        idempotency_key: &str,
    ) -> EngineResult<String>;

    /// Register a package; returns its id
    async fn create_package_for_booking(
        &self,
        request: CreatePackageRequest,
        idempotency_key: &str,
    ) -> EngineResult<String>;
}

/// Shared handle to a ledger client
pub type SharedLedger = Arc<dyn LedgerClient>;
