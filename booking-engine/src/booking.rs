//! Booking creation and booking-level state transitions
//!
//! Creation turns one logical booking attempt into at most one ledger
//! debit. The attempt owns its idempotency key: retrying the same
//! [`BookingAttempt`] re-sends the same key, while a fresh user action
//! mints a new attempt and therefore a new key.

use crate::{
    directory::CachedDirectory,
    error::BookingError,
    ledger::{BookPackageRequest, SharedLedger},
    models::{Actor, Booking, BookingQuery, BookingReceipt},
    EngineResult,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// One user-initiated booking attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingAttempt {
    pub client_id: String,
    pub package_id: String,
    pub notes: Option<String>,
    idempotency_key: String,
}

impl BookingAttempt {
    /// Start a new attempt with a freshly minted idempotency key
    pub fn new(
        client_id: impl Into<String>,
        package_id: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self::with_key(client_id, package_id, notes, Uuid::new_v4().to_string())
    }

    /// Resume an attempt whose key the caller already holds
    pub fn with_key(
        client_id: impl Into<String>,
        package_id: impl Into<String>,
        notes: Option<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            package_id: package_id.into(),
            notes,
            idempotency_key: idempotency_key.into(),
        }
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }
}

/// Creates bookings and drives booking-level transitions
pub struct BookingService {
    ledger: SharedLedger,
    directory: Arc<CachedDirectory>,
}

impl BookingService {
    pub fn new(ledger: SharedLedger, directory: Arc<CachedDirectory>) -> Self {
        Self { ledger, directory }
    }

    /// Create a booking as a new attempt
    pub async fn create_booking(
        &self,
        client_id: &str,
        package_id: &str,
        notes: Option<String>,
    ) -> EngineResult<BookingReceipt> {
        let attempt = BookingAttempt::new(client_id, package_id, notes);
        self.submit(&attempt).await
    }

    /// Send an attempt to the ledger. Safe to call again with the same attempt.
    pub async fn submit(&self, attempt: &BookingAttempt) -> EngineResult<BookingReceipt> {
        let price = self.validate_attempt(attempt).await?;

        info!(
            client_id = %attempt.client_id,
            package_id = %attempt.package_id,
            key = %attempt.idempotency_key,
            price,
            "booking package"
        );

        let receipt = self
            .ledger
            .book_package(BookPackageRequest {
                client_id: attempt.client_id.clone(),
                package_id: attempt.package_id.clone(),
                idempotency_key: attempt.idempotency_key.clone(),
                notes: attempt.notes.clone(),
            })
            .await
            .inspect_err(|e| {
                warn!(key = %attempt.idempotency_key, error = %e, "booking failed");
            })?;

        info!(booking_id = %receipt.booking_id, amount = receipt.amount, "booking created");
        Ok(receipt)
    }

    /// Fail fast, with no side effects, on requests the ledger would reject
    async fn validate_attempt(&self, attempt: &BookingAttempt) -> EngineResult<i64> {
        if attempt.client_id.trim().is_empty() {
            return Err(BookingError::invalid_input("client_id is required"));
        }
        if attempt.package_id.trim().is_empty() {
            return Err(BookingError::invalid_input("package_id is required"));
        }
        if attempt.idempotency_key.trim().is_empty() {
            return Err(BookingError::invalid_input("idempotency key is required"));
        }

        let package = match self.directory.package(&attempt.package_id).await {
            Ok(package) => package,
            Err(BookingError::NotFound(_)) => {
                return Err(BookingError::invalid_input(format!(
                    "package {} does not exist",
                    attempt.package_id
                )))
            }
            Err(e) => return Err(e),
        };

        if package.price <= 0 {
            return Err(BookingError::invalid_input(format!(
                "package {} has no positive price",
                attempt.package_id
            )));
        }
        Ok(package.price)
    }

    pub async fn get_booking(&self, booking_id: &str) -> EngineResult<Booking> {
        if booking_id.trim().is_empty() {
            return Err(BookingError::invalid_input("booking_id is required"));
        }
        self.ledger.get_booking_by_id(booking_id).await
    }

    pub async fn list_for_client(
        &self,
        client_id: &str,
        query: BookingQuery,
    ) -> EngineResult<Vec<Booking>> {
        self.ledger
            .list_bookings_for_client(client_id, query.normalized())
            .await
    }

    pub async fn list_for_freelancer(
        &self,
        freelancer_id: &str,
        query: BookingQuery,
    ) -> EngineResult<Vec<Booking>> {
        self.ledger
            .list_bookings_for_freelancer(freelancer_id, query.normalized())
            .await
    }

    /// Cancel a pending or active booking and trigger the refund path
    pub async fn cancel_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<Booking> {
        let booking = self.get_booking(booking_id).await?;

        if !booking.is_party(actor) {
            return Err(BookingError::unauthorized(format!(
                "{} is not a party to booking {booking_id}",
                actor.id
            )));
        }
        if !booking.status.can_cancel() {
            return Err(BookingError::invalid_status(format!(
                "booking {booking_id} is {:?} and cannot be cancelled",
                booking.status
            )));
        }

        let cancelled = self.ledger.cancel_booking(booking_id, actor, reason).await?;
        info!(
            booking_id,
            actor = %actor.id,
            payment_status = ?cancelled.payment_status,
            "booking cancelled"
        );
        Ok(cancelled)
    }

    /// Freeze an active booking for admin arbitration
    pub async fn open_dispute(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<Booking> {
        if reason.trim().is_empty() {
            return Err(BookingError::invalid_input("dispute reason is required"));
        }
        let booking = self.get_booking(booking_id).await?;

        if !booking.is_party(actor) {
            return Err(BookingError::unauthorized(format!(
                "{} is not a party to booking {booking_id}",
                actor.id
            )));
        }
        if !booking.status.can_dispute() {
            return Err(BookingError::invalid_status(format!(
                "booking {booking_id} is {:?} and cannot be disputed",
                booking.status
            )));
        }

        let disputed = self.ledger.open_dispute(booking_id, actor, reason).await?;
        warn!(booking_id, actor = %actor.id, reason, "booking disputed");
        Ok(disputed)
    }
}
