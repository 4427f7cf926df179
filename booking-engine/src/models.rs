//! Core data models for the booking engine
//!
//! Bookings and stages carry two state machines each backed by a
//! transition table. The ledger is authoritative for both; the tables
//! here let the engine fail fast and let the reference ledger enforce
//! the same rules.

use crate::{error::BookingError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Created, awaiting freelancer acceptance
    Pending,
    /// Work in progress, stages may be created
    Active,
    /// Under admin arbitration
    InDispute,
    /// Every stage released
    Completed,
    /// Cancelled and refunded (or refund pending)
    Cancelled,
}

impl BookingStatus {
    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Check if this state allows cancellation
    pub fn can_cancel(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }

    /// Check if this state allows stage creation
    pub fn can_create_stages(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if this state allows a dispute to be opened
    pub fn can_dispute(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Payment status of the escrowed funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Debit not yet confirmed
    Pending,
    /// Funds held by the ledger against the booking
    HeldInEscrow,
    /// Funds paid out to the freelancer
    Released,
    /// Funds returned to the client
    Refunded,
    /// Frozen pending dispute resolution
    Disputed,
}

/// Catalog tier of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageTier {
    Basic,
    Standard,
    Premium,
}

/// A freelancer's catalog service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: String,
    pub freelancer_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// A priced offering under a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub package_id: String,
    pub service_id: String,
    pub freelancer_id: String,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub currency: String,
    pub delivery_time_days: u32,
    pub revisions: u32,
    pub features: Vec<String>,
    pub tier: PackageTier,
}

/// Possibly incomplete upstream service data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceDraft {
    pub freelancer_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Possibly incomplete upstream package data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub delivery_time_days: Option<u32>,
    pub revisions: Option<u32>,
    #[serde(default)]
    pub features: Vec<String>,
    pub tier: Option<PackageTier>,
}

/// Booking record as held by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: String,
    pub service_id: String,
    pub package_id: String,
    pub client_id: String,
    pub freelancer_id: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: i64,
    pub currency: String,
    pub escrow_account: String,
    pub ledger_ref: String,
    pub notes: Option<String>,

    // Denormalised at booking time, used as enrichment fallbacks
    pub package_title: Option<String>,
    pub platform_fee: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,

    pub stage_ids: Vec<String>,
    pub current_stage: Option<u32>,
}

/// Milestone status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    InProgress,
    Submitted,
    Approved,
    Rejected,
    Released,
}

impl StageStatus {
    /// Released is the only terminal stage state; rejection loops back
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released)
    }

    pub fn can_submit(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::Rejected)
    }

    pub fn can_approve(&self) -> bool {
        matches!(self, Self::Submitted)
    }

    pub fn can_reject(&self) -> bool {
        matches!(self, Self::Submitted)
    }

    pub fn can_release(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// A unit of deliverable work within a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub stage_id: String,
    pub booking_id: String,
    pub stage_number: u32,
    pub title: String,
    pub description: String,
    pub amount: i64,
    pub status: StageStatus,

    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,

    pub submission_notes: Option<String>,
    pub submission_artifacts: Vec<String>,
    pub rejection_reason: Option<String>,
}

/// Stage definition supplied by the freelancer at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDef {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: i64,
}

impl StageDef {
    pub fn new(title: impl Into<String>, amount: i64) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            amount,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Result of a successful ledger debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingReceipt {
    pub booking_id: String,
    pub escrow_account: String,
    pub amount: i64,
    pub ledger_ref: String,
}

/// Public profile data for a marketplace user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Locally held payment-session metadata for a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub session_id: String,
    pub booking_id: String,
    pub provider: String,
    pub platform_fee: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Role of the caller performing an administrative booking action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorRole {
    Client,
    Freelancer,
    Admin,
}

/// Caller identity for cancel/dispute operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn client(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Client,
        }
    }

    pub fn freelancer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Freelancer,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Admin,
        }
    }
}

/// Paging and filtering for booking lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub limit: u32,
    pub offset: u32,
}

impl BookingQuery {
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp the limit into `1..=MAX_LIMIT`
    pub fn normalized(self) -> Self {
        Self {
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
            ..self
        }
    }
}

impl Default for BookingQuery {
    fn default() -> Self {
        Self {
            status: None,
            limit: 20,
            offset: 0,
        }
    }
}

impl Booking {
    /// Whether `actor` may cancel or dispute this booking
    pub fn is_party(&self, actor: &Actor) -> bool {
        match actor.role {
            ActorRole::Admin => true,
            ActorRole::Client => actor.id == self.client_id,
            ActorRole::Freelancer => actor.id == self.freelancer_id,
        }
    }

    /// Validate a joint status transition
    pub fn validate_transition(
        &self,
        to_status: BookingStatus,
        to_payment: PaymentStatus,
    ) -> EngineResult<()> {
        use BookingStatus as B;
        use PaymentStatus as P;

        let valid = match ((self.status, self.payment_status), (to_status, to_payment)) {
            ((B::Pending, P::Pending), (B::Pending, P::HeldInEscrow)) => true,
            ((B::Pending, P::HeldInEscrow), (B::Active, P::HeldInEscrow)) => true,
            ((B::Pending | B::Active, P::HeldInEscrow), (B::Cancelled, P::Refunded)) => true,
            ((B::Pending | B::Active, P::HeldInEscrow), (B::Cancelled, P::HeldInEscrow)) => true,
            ((B::Pending, P::Pending), (B::Cancelled, P::Refunded)) => true,
            ((B::Cancelled, P::HeldInEscrow), (B::Cancelled, P::Refunded)) => true,
            ((B::Active, P::HeldInEscrow), (B::InDispute, P::Disputed)) => true,
            ((B::Active, P::HeldInEscrow), (B::Completed, P::Released)) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(BookingError::invalid_status(format!(
                "booking {} cannot move from {:?}/{:?} to {:?}/{:?}",
                self.booking_id, self.status, self.payment_status, to_status, to_payment
            )))
        }
    }

    /// Check the cross-axis invariants between status and payment status
    pub fn check_invariants(&self) -> EngineResult<()> {
        let ok = match self.status {
            BookingStatus::Completed => self.payment_status == PaymentStatus::Released,
            BookingStatus::Cancelled => matches!(
                self.payment_status,
                PaymentStatus::Refunded | PaymentStatus::HeldInEscrow
            ),
            _ => true,
        };

        if ok {
            Ok(())
        } else {
            Err(BookingError::internal(format!(
                "booking {} violates invariant: {:?} with payment {:?}",
                self.booking_id, self.status, self.payment_status
            )))
        }
    }
}

impl Stage {
    /// Create a fresh stage in `Pending`
    pub fn new(booking_id: &str, stage_id: String, stage_number: u32, def: StageDef) -> Self {
        Self {
            stage_id,
            booking_id: booking_id.to_string(),
            stage_number,
            title: def.title,
            description: def.description,
            amount: def.amount,
            status: StageStatus::Pending,
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
            released_at: None,
            submission_notes: None,
            submission_artifacts: Vec::new(),
            rejection_reason: None,
        }
    }

    fn invalid(&self, to: StageStatus) -> BookingError {
        BookingError::invalid_status(format!(
            "stage {} cannot move from {:?} to {:?}",
            self.stage_id, self.status, to
        ))
    }

    /// Record a (re)submission. Clears any earlier rejection reason.
    pub fn mark_submitted(
        &mut self,
        now: DateTime<Utc>,
        notes: String,
        artifacts: Vec<String>,
    ) -> EngineResult<()> {
        if !self.status.can_submit() {
            return Err(self.invalid(StageStatus::Submitted));
        }
        self.status = StageStatus::Submitted;
        self.submitted_at = Some(now);
        self.submission_notes = Some(notes);
        self.submission_artifacts = artifacts;
        self.rejection_reason = None;
        Ok(())
    }

    pub fn mark_approved(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        if !self.status.can_approve() {
            return Err(self.invalid(StageStatus::Approved));
        }
        self.status = StageStatus::Approved;
        self.approved_at = Some(now);
        Ok(())
    }

    pub fn mark_rejected(&mut self, now: DateTime<Utc>, reason: String) -> EngineResult<()> {
        if !self.status.can_reject() {
            return Err(self.invalid(StageStatus::Rejected));
        }
        self.status = StageStatus::Rejected;
        self.rejected_at = Some(now);
        self.rejection_reason = Some(reason);
        Ok(())
    }

    pub fn mark_released(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        if self.approved_at.is_none() {
            return Err(BookingError::stage_not_approved(format!(
                "stage {} has never been approved",
                self.stage_id
            )));
        }
        if !self.status.can_release() {
            return Err(self.invalid(StageStatus::Released));
        }
        self.status = StageStatus::Released;
        self.released_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> Stage {
        Stage::new("BK-1", "ST-1".into(), 1, StageDef::new("Wireframes", 100))
    }

    fn booking(status: BookingStatus, payment_status: PaymentStatus) -> Booking {
        let now = Utc::now();
        Booking {
            booking_id: "BK-1".into(),
            service_id: "SV-1".into(),
            package_id: "PK-1".into(),
            client_id: "client".into(),
            freelancer_id: "freelancer".into(),
            status,
            payment_status,
            total_amount: 100,
            currency: "USD".into(),
            escrow_account: "escrow".into(),
            ledger_ref: "ref".into(),
            notes: None,
            package_title: None,
            platform_fee: None,
            created_at: now,
            updated_at: now,
            deadline: None,
            stage_ids: Vec::new(),
            current_stage: None,
        }
    }

    #[test]
    fn test_stage_resubmission_after_rejection() {
        let now = Utc::now();
        let mut stage = stage();
        stage.mark_submitted(now, "v1".into(), vec![]).unwrap();
        stage.mark_rejected(now, "needs work".into()).unwrap();
        assert_eq!(stage.rejection_reason.as_deref(), Some("needs work"));

        stage.mark_submitted(now, "v2".into(), vec!["a.png".into()]).unwrap();
        assert_eq!(stage.status, StageStatus::Submitted);
        assert_eq!(stage.rejection_reason, None);
        assert_eq!(stage.stage_number, 1);
        assert_eq!(stage.amount, 100);
    }

    #[test]
    fn test_only_submitted_is_approvable() {
        let mut stage = stage();
        stage.mark_submitted(Utc::now(), "v1".into(), vec![]).unwrap();
        stage.mark_rejected(Utc::now(), "no".into()).unwrap();

        let err = stage.mark_approved(Utc::now()).unwrap_err();
        assert!(matches!(err, BookingError::InvalidStatus(_)));
        assert_eq!(stage.status, StageStatus::Rejected);
    }

    #[test]
    fn test_release_requires_approval() {
        let mut stage = stage();
        let err = stage.mark_released(Utc::now()).unwrap_err();
        assert!(matches!(err, BookingError::StageNotApproved(_)));
    }

    #[test]
    fn test_booking_transitions() {
        let active = booking(BookingStatus::Active, PaymentStatus::HeldInEscrow);
        assert!(active
            .validate_transition(BookingStatus::Completed, PaymentStatus::Released)
            .is_ok());
        assert!(active
            .validate_transition(BookingStatus::Completed, PaymentStatus::Refunded)
            .is_err());

        let done = booking(BookingStatus::Completed, PaymentStatus::Released);
        assert!(done
            .validate_transition(BookingStatus::Cancelled, PaymentStatus::Refunded)
            .is_err());
        assert!(done.check_invariants().is_ok());

        let broken = booking(BookingStatus::Completed, PaymentStatus::HeldInEscrow);
        assert!(broken.check_invariants().is_err());
    }

    #[test]
    fn test_admin_is_party_to_every_booking() {
        let b = booking(BookingStatus::Active, PaymentStatus::HeldInEscrow);
        assert!(b.is_party(&Actor::admin("ops")));
        assert!(b.is_party(&Actor::client("client")));
        assert!(!b.is_party(&Actor::client("freelancer")));
        assert!(!b.is_party(&Actor::freelancer("stranger")));
    }
}
