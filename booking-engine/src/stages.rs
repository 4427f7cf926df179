//! Milestone lifecycle and fund release
//!
//! Approval and release are two separate ledger calls. Approval is the
//! durable checkpoint; if the release that follows fails the stage stays
//! `Approved` and [`StageService::release_stage`] retries only the release.

use crate::{
    error::BookingError,
    ledger::{SharedLedger, SubmitStageRequest},
    models::{BookingStatus, Stage, StageDef, StageStatus},
    EngineResult,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of a release: the stage plus whether it completed its booking
#[derive(Debug, Clone, Serialize)]
pub struct StageUpdate {
    pub stage: Stage,
    pub booking_completed: bool,
}

pub struct StageService {
    ledger: SharedLedger,
}

impl StageService {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }

    /// Create the full stage plan of an active booking
    pub async fn create_stages(
        &self,
        booking_id: &str,
        freelancer_id: &str,
        stages: &[StageDef],
    ) -> EngineResult<Vec<Stage>> {
        if freelancer_id.trim().is_empty() {
            return Err(BookingError::invalid_input("freelancer_id is required"));
        }
        if stages.is_empty() {
            return Err(BookingError::invalid_input("at least one stage is required"));
        }
        for (index, def) in stages.iter().enumerate() {
            if def.title.trim().is_empty() {
                return Err(BookingError::invalid_input(format!(
                    "stage {} has no title",
                    index + 1
                )));
            }
            if def.amount <= 0 {
                return Err(BookingError::invalid_input(format!(
                    "stage {} amount must be positive",
                    index + 1
                )));
            }
        }

        let booking = self.ledger.get_booking_by_id(booking_id).await?;
        if !booking.status.can_create_stages() {
            return Err(BookingError::invalid_status(format!(
                "stages can only be created on an active booking, {booking_id} is {:?}",
                booking.status
            )));
        }

        let total: i64 = stages.iter().map(|s| s.amount).sum();
        if total != booking.total_amount {
            return Err(BookingError::invalid_input(format!(
                "stage amounts sum to {total}, booking total is {}",
                booking.total_amount
            )));
        }

        let created = self
            .ledger
            .create_stages(booking_id, freelancer_id, stages)
            .await?;
        info!(booking_id, count = created.len(), total, "stages created");
        Ok(created)
    }

    pub async fn submit_stage(
        &self,
        stage_id: &str,
        freelancer_id: &str,
        notes: &str,
        artifacts: Vec<String>,
    ) -> EngineResult<Stage> {
        if notes.trim().is_empty() {
            return Err(BookingError::invalid_input("submission notes are required"));
        }

        let stage = self
            .ledger
            .submit_stage(SubmitStageRequest {
                stage_id: stage_id.to_string(),
                freelancer_id: freelancer_id.to_string(),
                notes: notes.to_string(),
                artifacts,
            })
            .await?;
        info!(stage_id, booking_id = %stage.booking_id, "stage submitted");
        Ok(stage)
    }

    /// Approve a submitted stage, then release its funds
    pub async fn approve_stage(&self, stage_id: &str, client_id: &str) -> EngineResult<StageUpdate> {
        let approved = self.ledger.approve_stage(stage_id, client_id).await?;
        info!(stage_id, booking_id = %approved.booking_id, "stage approved");

        self.release_stage(stage_id, client_id)
            .await
            .inspect_err(|e| {
                warn!(
                    stage_id,
                    error = %e,
                    "release after approval failed, stage remains approved"
                );
            })
    }

    /// Release an approved stage. Used directly to retry a failed release.
    ///
    /// Calling it again on a stage that is already `Released` re-runs the
    /// completion check without moving funds. A completion failure after a
    /// successful release is logged and reported as `booking_completed: false`.
    pub async fn release_stage(&self, stage_id: &str, client_id: &str) -> EngineResult<StageUpdate> {
        let stage = match self.ledger.release_stage(stage_id, client_id).await {
            Ok(stage) => {
                info!(stage_id, booking_id = %stage.booking_id, amount = stage.amount, "stage released");
                stage
            }
            Err(BookingError::InvalidStatus(msg)) => {
                match self.already_released(stage_id, client_id).await? {
                    Some(stage) => {
                        debug!(stage_id, booking_id = %stage.booking_id, "stage already released");
                        stage
                    }
                    None => return Err(BookingError::InvalidStatus(msg)),
                }
            }
            Err(e) => return Err(e),
        };

        let booking_completed = self
            .complete_if_finished(&stage.booking_id)
            .await
            .unwrap_or_else(|e| {
                warn!(
                    stage_id,
                    booking_id = %stage.booking_id,
                    error = %e,
                    "stage released but booking completion failed, release again to retry"
                );
                false
            });

        Ok(StageUpdate {
            stage,
            booking_completed,
        })
    }

    /// The stage, if it is already released and `client_id` owns its booking
    async fn already_released(&self, stage_id: &str, client_id: &str) -> EngineResult<Option<Stage>> {
        let stage = self.ledger.get_stage_by_id(stage_id).await?;
        if stage.status != StageStatus::Released {
            return Ok(None);
        }

        let booking = self.ledger.get_booking_by_id(&stage.booking_id).await?;
        if booking.client_id != client_id {
            return Err(BookingError::unauthorized(format!(
                "{client_id} is not the client of booking {}",
                booking.booking_id
            )));
        }
        Ok(Some(stage))
    }

    pub async fn reject_stage(
        &self,
        stage_id: &str,
        client_id: &str,
        reason: &str,
    ) -> EngineResult<Stage> {
        if reason.trim().is_empty() {
            return Err(BookingError::invalid_input("rejection reason is required"));
        }

        let stage = self.ledger.reject_stage(stage_id, client_id, reason).await?;
        info!(stage_id, booking_id = %stage.booking_id, reason, "stage rejected");
        Ok(stage)
    }

    pub async fn get_stage(&self, stage_id: &str) -> EngineResult<Stage> {
        self.ledger.get_stage_by_id(stage_id).await
    }

    pub async fn list_stages(&self, booking_id: &str) -> EngineResult<Vec<Stage>> {
        self.ledger.list_stages(booking_id).await
    }

    /// Complete the booking once every stage is released.
    /// Returns whether the booking is `Completed` afterwards.
    pub async fn complete_if_finished(&self, booking_id: &str) -> EngineResult<bool> {
        let stages = self.ledger.list_stages(booking_id).await?;
        if stages.is_empty() || !stages.iter().all(|s| s.status.is_terminal()) {
            return Ok(false);
        }

        let booking = self.ledger.get_booking_by_id(booking_id).await?;
        if booking.status.is_terminal() {
            return Ok(booking.status == BookingStatus::Completed);
        }

        let completed = match self.ledger.complete_booking(booking_id).await {
            Ok(completed) => completed,
            // A concurrent release of the last stage may have completed it first
            Err(err @ BookingError::InvalidStatus(_)) => {
                let current = self.ledger.get_booking_by_id(booking_id).await?;
                if current.status == BookingStatus::Completed {
                    debug!(booking_id, "booking already completed");
                    return Ok(true);
                }
                return Err(err);
            }
            Err(e) => return Err(e),
        };
        completed.check_invariants()?;
        info!(
            booking_id,
            total = completed.total_amount,
            stages = stages.len(),
            "booking completed"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::SystemClock,
        error::ErrorKind,
        ledger::{BookPackageRequest, LedgerClient, MemoryLedger},
        models::{Package, PackageTier, PaymentStatus},
    };
    use std::sync::Arc;

    async fn active_booking(total: i64) -> (StageService, Arc<MemoryLedger>, String) {
        let ledger = Arc::new(MemoryLedger::new(Arc::new(SystemClock)));
        ledger
            .seed_package(Package {
                package_id: "PK-1".into(),
                service_id: "SV-1".into(),
                freelancer_id: "fl-1".into(),
                title: "Landing page".into(),
                description: "Responsive landing page".into(),
                price: total,
                currency: "SUI".into(),
                delivery_time_days: 7,
                revisions: 1,
                features: vec![],
                tier: PackageTier::Standard,
            })
            .await;
        ledger.fund_client("cl-1", total).await;

        let receipt = ledger
            .book_package(BookPackageRequest {
                client_id: "cl-1".into(),
                package_id: "PK-1".into(),
                idempotency_key: "key-1".into(),
                notes: None,
            })
            .await
            .unwrap();
        ledger.activate_booking(&receipt.booking_id).await.unwrap();

        (StageService::new(ledger.clone()), ledger, receipt.booking_id)
    }

    #[tokio::test]
    async fn test_create_stages_requires_matching_total() {
        let (service, _, booking_id) = active_booking(5_000_000_000).await;

        let err = service
            .create_stages(
                &booking_id,
                "fl-1",
                &[
                    StageDef::new("Wireframes", 2_000_000_000),
                    StageDef::new("Mockups", 2_000_000_000),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));

        let stages = service
            .create_stages(
                &booking_id,
                "fl-1",
                &[
                    StageDef::new("Wireframes", 2_500_000_000),
                    StageDef::new("Mockups", 2_500_000_000),
                ],
            )
            .await
            .unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].stage_number, 1);
        assert_eq!(stages[1].stage_number, 2);
        assert!(stages.iter().all(|s| s.status == StageStatus::Pending));
    }

    #[tokio::test]
    async fn test_empty_notes_rejected_without_ledger_call() {
        let (service, _, booking_id) = active_booking(100).await;
        let stages = service
            .create_stages(&booking_id, "fl-1", &[StageDef::new("All work", 100)])
            .await
            .unwrap();

        let err = service
            .submit_stage(&stages[0].stage_id, "fl-1", "   ", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));

        let stage = service.get_stage(&stages[0].stage_id).await.unwrap();
        assert_eq!(stage.status, StageStatus::Pending);
        assert!(stage.submitted_at.is_none());
    }

    #[tokio::test]
    async fn test_approve_releases_and_completes() {
        let (service, ledger, booking_id) = active_booking(100).await;
        let stages = service
            .create_stages(&booking_id, "fl-1", &[StageDef::new("All work", 100)])
            .await
            .unwrap();
        let stage_id = &stages[0].stage_id;

        service
            .submit_stage(stage_id, "fl-1", "done", vec!["https://files/x".into()])
            .await
            .unwrap();
        let update = service.approve_stage(stage_id, "cl-1").await.unwrap();

        assert_eq!(update.stage.status, StageStatus::Released);
        assert!(update.booking_completed);
        assert_eq!(ledger.payouts("fl-1").await, 100);

        let booking = ledger.get_booking_by_id(&booking_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Completed);
        assert_eq!(booking.payment_status, PaymentStatus::Released);
    }

    #[tokio::test]
    async fn test_failed_release_keeps_approval() {
        let (service, ledger, booking_id) = active_booking(100).await;
        let stages = service
            .create_stages(&booking_id, "fl-1", &[StageDef::new("All work", 100)])
            .await
            .unwrap();
        let stage_id = &stages[0].stage_id;
        service
            .submit_stage(stage_id, "fl-1", "done", vec![])
            .await
            .unwrap();

        ledger.fail_next_releases(1, ErrorKind::LedgerError).await;
        let err = service.approve_stage(stage_id, "cl-1").await.unwrap_err();
        assert!(matches!(err, BookingError::LedgerError(_)));
        assert_eq!(
            service.get_stage(stage_id).await.unwrap().status,
            StageStatus::Approved
        );

        let update = service.release_stage(stage_id, "cl-1").await.unwrap();
        assert_eq!(update.stage.status, StageStatus::Released);
        assert!(update.booking_completed);
    }

    #[tokio::test]
    async fn test_completion_failure_keeps_release_and_can_be_redriven() {
        let (service, ledger, booking_id) = active_booking(100).await;
        let stages = service
            .create_stages(&booking_id, "fl-1", &[StageDef::new("All work", 100)])
            .await
            .unwrap();
        let stage_id = &stages[0].stage_id;
        service
            .submit_stage(stage_id, "fl-1", "done", vec![])
            .await
            .unwrap();

        ledger.fail_next_completions(1, ErrorKind::Transport).await;
        let update = service.approve_stage(stage_id, "cl-1").await.unwrap();
        assert_eq!(update.stage.status, StageStatus::Released);
        assert!(!update.booking_completed);
        assert_eq!(
            ledger.get_booking_by_id(&booking_id).await.unwrap().status,
            BookingStatus::Active
        );

        let update = service.release_stage(stage_id, "cl-1").await.unwrap();
        assert!(update.booking_completed);
        let booking = ledger.get_booking_by_id(&booking_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Completed);
        assert_eq!(ledger.payouts("fl-1").await, 100);

        // Releasing a completed booking's stage again moves no funds
        let update = service.release_stage(stage_id, "cl-1").await.unwrap();
        assert!(update.booking_completed);
        assert_eq!(ledger.payouts("fl-1").await, 100);

        let err = service.release_stage(stage_id, "cl-2").await.unwrap_err();
        assert!(matches!(err, BookingError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_concurrent_final_approvals_complete_once() {
        let (service, ledger, booking_id) = active_booking(100).await;
        let stages = service
            .create_stages(
                &booking_id,
                "fl-1",
                &[StageDef::new("Draft", 50), StageDef::new("Final", 50)],
            )
            .await
            .unwrap();
        for stage in &stages {
            service
                .submit_stage(&stage.stage_id, "fl-1", "done", vec![])
                .await
                .unwrap();
        }

        let (first, second) = tokio::join!(
            service.approve_stage(&stages[0].stage_id, "cl-1"),
            service.approve_stage(&stages[1].stage_id, "cl-1")
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(first.booking_completed || second.booking_completed);

        let booking = ledger.get_booking_by_id(&booking_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Completed);
        assert_eq!(ledger.payouts("fl-1").await, 100);
    }

    #[tokio::test]
    async fn test_release_of_unapproved_stage_is_not_treated_as_released() {
        let (service, _, booking_id) = active_booking(100).await;
        let stages = service
            .create_stages(&booking_id, "fl-1", &[StageDef::new("All work", 100)])
            .await
            .unwrap();

        let err = service
            .release_stage(&stages[0].stage_id, "cl-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StageNotApproved);
        assert_eq!(
            service.get_stage(&stages[0].stage_id).await.unwrap().status,
            StageStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_empty_rejection_reason() {
        let service = StageService::new(Arc::new(MemoryLedger::new(Arc::new(SystemClock))));
        let err = service.reject_stage("ST-1", "cl-1", "").await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
    }
}
