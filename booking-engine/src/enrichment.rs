//! Display-ready booking views
//!
//! Four lookups run concurrently and each settles on its own: a failure or
//! timeout in one degrades that field to a fallback and never fails the
//! view. The escrow breakdown is display-only; the ledger is authoritative.

use crate::{
    config::EnrichmentConfig,
    directory::CachedDirectory,
    error::BookingError,
    models::{Booking, PackageTier, PaymentSession},
    sessions::PaymentSessionStore,
    EngineResult,
};
use serde::Serialize;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, warn};

const BPS_DENOMINATOR: i128 = 10_000;

/// Party as shown to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartyView {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageView {
    pub package_id: String,
    pub title: String,
    pub tier: Option<PackageTier>,
    pub delivery_time_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EscrowBreakdown {
    pub total_amount: i64,
    pub platform_fee: i64,
    pub base_amount: i64,
    pub escrow_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub client: PartyView,
    pub freelancer: PartyView,
    pub package: PackageView,
    pub escrow: EscrowBreakdown,
    pub payment_provider: Option<String>,
    /// Lookups that fell back instead of resolving
    pub degraded: Vec<&'static str>,
}

pub struct Enricher {
    directory: Arc<CachedDirectory>,
    sessions: Arc<dyn PaymentSessionStore>,
    config: EnrichmentConfig,
}

async fn bounded<T>(
    limit: Duration,
    lookup: &'static str,
    fut: impl Future<Output = EngineResult<T>>,
) -> EngineResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BookingError::timeout(format!(
            "{lookup} lookup exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

impl Enricher {
    pub fn new(
        directory: Arc<CachedDirectory>,
        sessions: Arc<dyn PaymentSessionStore>,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            directory,
            sessions,
            config,
        }
    }

    /// Build a view of `booking`. Never fails.
    pub async fn enrich(&self, booking: &Booking) -> BookingView {
        let limit = self.config.lookup_timeout();
        let (client, freelancer, package, session) = tokio::join!(
            bounded(limit, "client_profile", self.directory.profile(&booking.client_id)),
            bounded(limit, "freelancer_profile", self.directory.profile(&booking.freelancer_id)),
            bounded(limit, "package", self.directory.package(&booking.package_id)),
            bounded(
                limit,
                "payment_session",
                self.sessions.session_for_booking(&booking.booking_id)
            ),
        );

        let mut degraded = Vec::new();
        let mut settle = |lookup: &'static str, err: BookingError| {
            warn!(
                booking_id = %booking.booking_id,
                lookup,
                error = %err,
                "enrichment lookup degraded"
            );
            degraded.push(lookup);
        };

        let client = match client {
            Ok(p) => PartyView {
                user_id: p.user_id,
                display_name: p.display_name,
                avatar_url: p.avatar_url,
            },
            Err(e) => {
                settle("client_profile", e);
                Self::raw_party(&booking.client_id)
            }
        };

        let freelancer = match freelancer {
            Ok(p) => PartyView {
                user_id: p.user_id,
                display_name: p.display_name,
                avatar_url: p.avatar_url,
            },
            Err(e) => {
                settle("freelancer_profile", e);
                Self::raw_party(&booking.freelancer_id)
            }
        };

        let package = match package {
            Ok(p) => PackageView {
                package_id: p.package_id,
                title: p.title,
                tier: Some(p.tier),
                delivery_time_days: Some(p.delivery_time_days),
            },
            Err(e) => {
                settle("package", e);
                PackageView {
                    package_id: booking.package_id.clone(),
                    title: booking
                        .package_title
                        .clone()
                        .unwrap_or_else(|| booking.package_id.clone()),
                    tier: None,
                    delivery_time_days: None,
                }
            }
        };

        let session = match session {
            Ok(s) => s,
            Err(e) => {
                settle("payment_session", e);
                None
            }
        };

        let escrow = self.escrow_breakdown(booking, session.as_ref());
        debug!(booking_id = %booking.booking_id, degraded = degraded.len(), "booking enriched");

        BookingView {
            booking: booking.clone(),
            client,
            freelancer,
            package,
            escrow,
            payment_provider: session.map(|s| s.provider),
            degraded,
        }
    }

    fn raw_party(user_id: &str) -> PartyView {
        PartyView {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            avatar_url: None,
        }
    }

    /// Stored fee first, else the configured rate rounded down
    pub fn escrow_breakdown(
        &self,
        booking: &Booking,
        session: Option<&PaymentSession>,
    ) -> EscrowBreakdown {
        let total = booking.total_amount;
        let bps = i128::from(self.config.platform_fee_bps);
        let share = |bps: i128| (i128::from(total) * bps).div_euclid(BPS_DENOMINATOR) as i64;

        let platform_fee = session
            .and_then(|s| s.platform_fee)
            .or(booking.platform_fee)
            .unwrap_or_else(|| share(bps));

        EscrowBreakdown {
            total_amount: total,
            platform_fee,
            base_amount: total - platform_fee,
            escrow_amount: share(BPS_DENOMINATOR - bps),
        }
    }
}
