//! In-process reference ledger
//!
//! Implements the ledger contract against in-memory maps so the engine
//! can run locally and be tested without a remote ledger. It enforces the
//! idempotency contract, client balances and the booking/stage
//! transition tables, and supports failure injection. It does not
//! implement settlement.

use super::{
    BookPackageRequest, CreatePackageRequest, CreateServiceRequest, LedgerClient,
    SubmitStageRequest,
};
use crate::{
    clock::SharedClock,
    error::{BookingError, ErrorKind},
    models::{
        Actor, Booking, BookingQuery, BookingReceipt, BookingStatus, Package, PaymentStatus, Service,
        Stage, StageDef, StageStatus,
    },
    EngineResult,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Receipt remembered per idempotency key, with the request it answered
#[derive(Debug, Clone)]
struct RecordedBooking {
    client_id: String,
    package_id: String,
    receipt: BookingReceipt,
}

#[derive(Default)]
struct LedgerState {
    services: HashMap<String, Service>,
    packages: HashMap<String, Package>,
    bookings: HashMap<String, Booking>,
    stages: HashMap<String, Stage>,

    /// Spendable client balances
    balances: HashMap<String, i64>,
    /// Amount still held per booking
    escrow: HashMap<String, i64>,
    /// Amount paid out per freelancer
    payouts: HashMap<String, i64>,
    debit_count: usize,

    booking_keys: HashMap<String, RecordedBooking>,
    provision_keys: HashMap<String, String>,

    release_failures: VecDeque<ErrorKind>,
    completion_failures: VecDeque<ErrorKind>,
    drop_booking_responses: usize,
}

/// In-memory [`LedgerClient`]
pub struct MemoryLedger {
    clock: SharedClock,
    currency: String,
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            currency: "SUI".to_string(),
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Credit a client's spendable balance
    pub async fn fund_client(&self, client_id: &str, amount: i64) {
        *self
            .state
            .write()
            .await
            .balances
            .entry(client_id.to_string())
            .or_insert(0) += amount;
    }

    pub async fn balance(&self, client_id: &str) -> i64 {
        self.state
            .read()
            .await
            .balances
            .get(client_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn payouts(&self, freelancer_id: &str) -> i64 {
        self.state
            .read()
            .await
            .payouts
            .get(freelancer_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of successful debits performed
    pub async fn debit_count(&self) -> usize {
        self.state.read().await.debit_count
    }

    pub async fn service_count(&self) -> usize {
        self.state.read().await.services.len()
    }

    pub async fn package_count(&self) -> usize {
        self.state.read().await.packages.len()
    }

    /// Register a catalog package directly, bypassing provisioning
    pub async fn seed_package(&self, package: Package) {
        self.state
            .write()
            .await
            .packages
            .insert(package.package_id.clone(), package);
    }

    pub async fn package(&self, package_id: &str) -> Option<Package> {
        self.state.read().await.packages.get(package_id).cloned()
    }

    /// Freelancer acceptance: moves a funded booking from Pending to Active
    pub async fn activate_booking(&self, booking_id: &str) -> EngineResult<Booking> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let booking = state
            .bookings
            .get_mut(booking_id)
            .ok_or_else(|| BookingError::not_found(format!("booking {booking_id}")))?;

        booking.validate_transition(BookingStatus::Active, PaymentStatus::HeldInEscrow)?;
        booking.status = BookingStatus::Active;
        booking.updated_at = now;
        Ok(booking.clone())
    }

    /// Make the next `count` release attempts fail with `kind`
    pub async fn fail_next_releases(&self, count: usize, kind: ErrorKind) {
        let mut state = self.state.write().await;
        for _ in 0..count {
            state.release_failures.push_back(kind);
        }
    }

    /// Make the next `count` booking completions fail with `kind`
    pub async fn fail_next_completions(&self, count: usize, kind: ErrorKind) {
        let mut state = self.state.write().await;
        for _ in 0..count {
            state.completion_failures.push_back(kind);
        }
    }

    /// Apply the next `count` debits but report a transport failure
    pub async fn drop_next_booking_responses(&self, count: usize) {
        self.state.write().await.drop_booking_responses += count;
    }

    fn next_id(prefix: &str) -> String {
        format!("{}-{}", prefix, Uuid::new_v4().simple())
    }

    fn booking_mut<'a>(state: &'a mut LedgerState, booking_id: &str) -> EngineResult<&'a mut Booking> {
        state
            .bookings
            .get_mut(booking_id)
            .ok_or_else(|| BookingError::not_found(format!("booking {booking_id}")))
    }

    /// Look up a stage and its booking, checking the acting party
    fn stage_context(
        state: &LedgerState,
        stage_id: &str,
        party_id: &str,
        as_client: bool,
    ) -> EngineResult<(Stage, Booking)> {
        let stage = state
            .stages
            .get(stage_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found(format!("stage {stage_id}")))?;
        let booking = state
            .bookings
            .get(&stage.booking_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found(format!("booking {}", stage.booking_id)))?;

        let expected = if as_client {
            &booking.client_id
        } else {
            &booking.freelancer_id
        };
        if expected != party_id {
            return Err(BookingError::unauthorized(format!(
                "{party_id} is not the {} of booking {}",
                if as_client { "client" } else { "freelancer" },
                booking.booking_id
            )));
        }

        if booking.status != BookingStatus::Active {
            return Err(BookingError::invalid_status(format!(
                "booking {} is {:?}",
                booking.booking_id, booking.status
            )));
        }

        Ok((stage, booking))
    }

    fn list_where<F>(state: &LedgerState, query: BookingQuery, filter: F) -> Vec<Booking>
    where
        F: Fn(&Booking) -> bool,
    {
        let query = query.normalized();
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| filter(b))
            .filter(|b| query.status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bookings
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn book_package(&self, request: BookPackageRequest) -> EngineResult<BookingReceipt> {
        if request.idempotency_key.trim().is_empty() {
            return Err(BookingError::invalid_input("idempotency key is required"));
        }

        let now = self.clock.now();
        let mut state = self.state.write().await;

        if let Some(recorded) = state.booking_keys.get(&request.idempotency_key) {
            if recorded.client_id != request.client_id || recorded.package_id != request.package_id
            {
                return Err(BookingError::already_exists(format!(
                    "idempotency key {} was used for a different booking request",
                    request.idempotency_key
                )));
            }
            info!(key = %request.idempotency_key, "replaying booking for reused idempotency key");
            return Ok(recorded.receipt.clone());
        }

        let package = state
            .packages
            .get(&request.package_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found(format!("package {}", request.package_id)))?;

        let balance = state
            .balances
            .get(&request.client_id)
            .copied()
            .unwrap_or(0);
        if balance < package.price {
            return Err(BookingError::insufficient_funds(format!(
                "client {} holds {} but package {} costs {}",
                request.client_id, balance, package.package_id, package.price
            )));
        }

        let booking_id = Self::next_id("BK");
        let receipt = BookingReceipt {
            booking_id: booking_id.clone(),
            escrow_account: format!("escrow-{booking_id}"),
            amount: package.price,
            ledger_ref: Self::next_id("TX"),
        };

        state
            .balances
            .insert(request.client_id.clone(), balance - package.price);
        state.escrow.insert(booking_id.clone(), package.price);
        state.debit_count += 1;

        let booking = Booking {
            booking_id: booking_id.clone(),
            service_id: package.service_id.clone(),
            package_id: package.package_id.clone(),
            client_id: request.client_id.clone(),
            freelancer_id: package.freelancer_id.clone(),
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::HeldInEscrow,
            total_amount: package.price,
            currency: package.currency.clone(),
            escrow_account: receipt.escrow_account.clone(),
            ledger_ref: receipt.ledger_ref.clone(),
            notes: request.notes.clone(),
            package_title: Some(package.title.clone()),
            platform_fee: None,
            created_at: now,
            updated_at: now,
            deadline: Some(now + chrono::Duration::days(package.delivery_time_days as i64)),
            stage_ids: Vec::new(),
            current_stage: None,
        };
        state.bookings.insert(booking_id.clone(), booking);
        state.booking_keys.insert(
            request.idempotency_key.clone(),
            RecordedBooking {
                client_id: request.client_id,
                package_id: request.package_id,
                receipt: receipt.clone(),
            },
        );

        if state.drop_booking_responses > 0 {
            state.drop_booking_responses -= 1;
            warn!(%booking_id, "dropping booking response after debit");
            return Err(BookingError::transport("connection reset after debit"));
        }

        Ok(receipt)
    }

    async fn get_booking_by_id(&self, booking_id: &str) -> EngineResult<Booking> {
        self.state
            .read()
            .await
            .bookings
            .get(booking_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found(format!("booking {booking_id}")))
    }

    async fn list_bookings_for_client(
        &self,
        client_id: &str,
        query: BookingQuery,
    ) -> EngineResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(Self::list_where(&state, query, |b| b.client_id == client_id))
    }

    async fn list_bookings_for_freelancer(
        &self,
        freelancer_id: &str,
        query: BookingQuery,
    ) -> EngineResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(Self::list_where(&state, query, |b| {
            b.freelancer_id == freelancer_id
        }))
    }

    async fn cancel_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<Booking> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let booking = Self::booking_mut(&mut state, booking_id)?.clone();

        if !booking.is_party(actor) {
            return Err(BookingError::unauthorized(format!(
                "{} may not cancel booking {booking_id}",
                actor.id
            )));
        }
        booking.validate_transition(BookingStatus::Cancelled, PaymentStatus::Refunded)?;

        let held = state.escrow.remove(booking_id).unwrap_or(0);
        *state
            .balances
            .entry(booking.client_id.clone())
            .or_insert(0) += held;

        let booking = Self::booking_mut(&mut state, booking_id)?;
        booking.status = BookingStatus::Cancelled;
        booking.payment_status = PaymentStatus::Refunded;
        booking.updated_at = now;
        booking.check_invariants()?;

        info!(booking_id, refunded = held, reason, "booking cancelled");
        Ok(booking.clone())
    }

    async fn open_dispute(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<Booking> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let booking = Self::booking_mut(&mut state, booking_id)?;

        if !booking.is_party(actor) {
            return Err(BookingError::unauthorized(format!(
                "{} may not dispute booking {booking_id}",
                actor.id
            )));
        }
        booking.validate_transition(BookingStatus::InDispute, PaymentStatus::Disputed)?;
        booking.status = BookingStatus::InDispute;
        booking.payment_status = PaymentStatus::Disputed;
        booking.updated_at = now;

        info!(booking_id, reason, "dispute opened");
        Ok(booking.clone())
    }

    async fn complete_booking(&self, booking_id: &str) -> EngineResult<Booking> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let booking = Self::booking_mut(&mut state, booking_id)?.clone();

        let all_released = !booking.stage_ids.is_empty()
            && booking.stage_ids.iter().all(|id| {
                state
                    .stages
                    .get(id)
                    .is_some_and(|s| s.status == StageStatus::Released)
            });
        if !all_released {
            return Err(BookingError::invalid_status(format!(
                "booking {booking_id} still has unreleased stages"
            )));
        }
        booking.validate_transition(BookingStatus::Completed, PaymentStatus::Released)?;
        if let Some(kind) = state.completion_failures.pop_front() {
            warn!(booking_id, ?kind, "injected completion failure");
            return Err(BookingError::from_kind(kind, format!("completion of {booking_id} failed")));
        }

        let booking = Self::booking_mut(&mut state, booking_id)?;
        booking.status = BookingStatus::Completed;
        booking.payment_status = PaymentStatus::Released;
        booking.current_stage = None;
        booking.updated_at = now;
        Ok(booking.clone())
    }

    async fn create_stages(
        &self,
        booking_id: &str,
        freelancer_id: &str,
        stages: &[StageDef],
    ) -> EngineResult<Vec<Stage>> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let booking = Self::booking_mut(&mut state, booking_id)?;

        if booking.freelancer_id != freelancer_id {
            return Err(BookingError::unauthorized(format!(
                "{freelancer_id} is not the freelancer of booking {booking_id}"
            )));
        }
        if !booking.status.can_create_stages() {
            return Err(BookingError::invalid_status(format!(
                "stages can only be created on an active booking, {booking_id} is {:?}",
                booking.status
            )));
        }
        if !booking.stage_ids.is_empty() {
            return Err(BookingError::already_exists(format!(
                "booking {booking_id} already has stages"
            )));
        }
        let total: i64 = stages.iter().map(|s| s.amount).sum();
        if stages.is_empty() || total != booking.total_amount {
            return Err(BookingError::invalid_input(format!(
                "stage amounts sum to {total}, booking total is {}",
                booking.total_amount
            )));
        }

        let created: Vec<Stage> = stages
            .iter()
            .zip(1u32..)
            .map(|(def, number)| Stage::new(booking_id, Self::next_id("ST"), number, def.clone()))
            .collect();

        booking.stage_ids = created.iter().map(|s| s.stage_id.clone()).collect();
        booking.current_stage = Some(1);
        booking.updated_at = now;

        for stage in &created {
            state.stages.insert(stage.stage_id.clone(), stage.clone());
        }
        Ok(created)
    }

    async fn get_stage_by_id(&self, stage_id: &str) -> EngineResult<Stage> {
        self.state
            .read()
            .await
            .stages
            .get(stage_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found(format!("stage {stage_id}")))
    }

    async fn list_stages(&self, booking_id: &str) -> EngineResult<Vec<Stage>> {
        let state = self.state.read().await;
        let booking = state
            .bookings
            .get(booking_id)
            .ok_or_else(|| BookingError::not_found(format!("booking {booking_id}")))?;

        let mut stages: Vec<Stage> = booking
            .stage_ids
            .iter()
            .filter_map(|id| state.stages.get(id).cloned())
            .collect();
        stages.sort_by_key(|s| s.stage_number);
        Ok(stages)
    }

    async fn submit_stage(&self, request: SubmitStageRequest) -> EngineResult<Stage> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let (mut stage, _) =
            Self::stage_context(&state, &request.stage_id, &request.freelancer_id, false)?;

        stage.mark_submitted(now, request.notes, request.artifacts)?;
        Self::booking_mut(&mut state, &stage.booking_id)?.current_stage = Some(stage.stage_number);
        state.stages.insert(stage.stage_id.clone(), stage.clone());
        Ok(stage)
    }

    async fn approve_stage(&self, stage_id: &str, client_id: &str) -> EngineResult<Stage> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let (mut stage, _) = Self::stage_context(&state, stage_id, client_id, true)?;

        stage.mark_approved(now)?;
        state.stages.insert(stage.stage_id.clone(), stage.clone());
        Ok(stage)
    }

    async fn release_stage(&self, stage_id: &str, client_id: &str) -> EngineResult<Stage> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let (mut stage, booking) = Self::stage_context(&state, stage_id, client_id, true)?;

        if booking.payment_status != PaymentStatus::HeldInEscrow {
            return Err(BookingError::booking_not_funded(format!(
                "booking {} has payment status {:?}",
                booking.booking_id, booking.payment_status
            )));
        }
        if let Some(kind) = state.release_failures.pop_front() {
            warn!(stage_id, ?kind, "injected release failure");
            return Err(BookingError::from_kind(kind, format!("release of {stage_id} failed")));
        }

        stage.mark_released(now)?;

        let held = state.escrow.entry(booking.booking_id.clone()).or_insert(0);
        *held -= stage.amount;
        *state
            .payouts
            .entry(booking.freelancer_id.clone())
            .or_insert(0) += stage.amount;
        state.stages.insert(stage.stage_id.clone(), stage.clone());

        let next = booking
            .stage_ids
            .iter()
            .filter_map(|id| state.stages.get(id))
            .filter(|s| s.status != StageStatus::Released)
            .map(|s| s.stage_number)
            .min();
        Self::booking_mut(&mut state, &booking.booking_id)?.current_stage = next;

        Ok(stage)
    }

    async fn reject_stage(
        &self,
        stage_id: &str,
        client_id: &str,
        reason: &str,
    ) -> EngineResult<Stage> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let (mut stage, _) = Self::stage_context(&state, stage_id, client_id, true)?;

        stage.mark_rejected(now, reason.to_string())?;
        state.stages.insert(stage.stage_id.clone(), stage.clone());
        Ok(stage)
    }

    async fn create_service_for_booking(
        &self,
        request: CreateServiceRequest,
        idempotency_key: &str,
    ) -> EngineResult<String> {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        if let Some(existing) = state.provision_keys.get(idempotency_key) {
            return Ok(existing.clone());
        }

        let service_id = Self::next_id("SV");
        state.services.insert(
            service_id.clone(),
            Service {
                service_id: service_id.clone(),
                freelancer_id: request.freelancer_id,
                title: request.title,
                description: request.description,
                category: request.category,
                created_at: now,
            },
        );
        state
            .provision_keys
            .insert(idempotency_key.to_string(), service_id.clone());
        Ok(service_id)
    }

    async fn create_package_for_booking(
        &self,
        request: CreatePackageRequest,
        idempotency_key: &str,
    ) -> EngineResult<String> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.provision_keys.get(idempotency_key) {
            return Ok(existing.clone());
        }

        let freelancer_id = state
            .services
            .get(&request.service_id)
            .map(|s| s.freelancer_id.clone())
            .ok_or_else(|| BookingError::not_found(format!("service {}", request.service_id)))?;
        if request.price <= 0 {
            return Err(BookingError::invalid_input("package price must be positive"));
        }

        let package_id = Self::next_id("PK");
        state.packages.insert(
            package_id.clone(),
            Package {
                package_id: package_id.clone(),
                service_id: request.service_id,
                freelancer_id,
                title: request.title,
                description: request.description,
                price: request.price,
                currency: if request.currency.is_empty() {
                    self.currency.clone()
                } else {
                    request.currency
                },
                delivery_time_days: request.delivery_time_days,
                revisions: request.revisions,
                features: request.features,
                tier: request.tier,
            },
        );
        state
            .provision_keys
            .insert(idempotency_key.to_string(), package_id.clone());
        Ok(package_id)
    }
}
