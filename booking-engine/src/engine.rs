//! Booking Engine - wires the components against their collaborators
//!
//! The engine owns one instance of every service and shares the ledger,
//! caches and clock between them. Collaborators are chosen from
//! [`EngineConfig`] or injected directly for tests and embedding.

use crate::{
    booking::BookingService,
    cache::LookupCaches,
    clock::{SharedClock, SystemClock},
    config::{EngineConfig, LedgerMode},
    directory::{CachedDirectory, HttpDirectory, PackageDirectory, ProfileDirectory},
    enrichment::Enricher,
    ledger::{HttpLedgerClient, MemoryLedger, SharedLedger},
    provisioner::ResourceProvisioner,
    retry::RetryPolicy,
    sessions::{InMemorySessionStore, PaymentSessionStore},
    stages::StageService,
    EngineResult,
};
use std::sync::Arc;
use tracing::{info, warn};

/// External collaborators of the engine
pub struct Collaborators {
    pub ledger: SharedLedger,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub packages: Arc<dyn PackageDirectory>,
    pub sessions: Arc<dyn PaymentSessionStore>,
    pub clock: SharedClock,
}

pub struct BookingEngine {
    pub bookings: BookingService,
    pub stages: StageService,
    pub enricher: Enricher,
    pub provisioner: ResourceProvisioner,
    pub retry: RetryPolicy,
    directory: Arc<CachedDirectory>,
    ledger: SharedLedger,
}

impl BookingEngine {
    /// Build collaborators from configuration
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let clock: SharedClock = Arc::new(SystemClock);
        let directory = Arc::new(HttpDirectory::new(&config.directory)?);

        let collaborators = match config.ledger.mode {
            LedgerMode::Http => Collaborators {
                ledger: Arc::new(HttpLedgerClient::new(&config.ledger)?),
                profiles: directory.clone(),
                packages: directory,
                sessions: Arc::new(InMemorySessionStore::new()),
                clock,
            },
            LedgerMode::Memory => {
                warn!("in-memory ledger: clients cannot be funded over REST, use for smoke runs only");
                let ledger = Arc::new(MemoryLedger::new(clock.clone()));
                Collaborators {
                    ledger: ledger.clone(),
                    profiles: directory,
                    packages: ledger,
                    sessions: Arc::new(InMemorySessionStore::new()),
                    clock,
                }
            }
        };

        info!(mode = ?config.ledger.mode, ledger_url = %config.ledger.base_url, "booking engine configured");
        Ok(Self::new(config, collaborators))
    }

    pub fn new(config: &EngineConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            ledger,
            profiles,
            packages,
            sessions,
            clock,
        } = collaborators;

        let caches = Arc::new(LookupCaches::new(&config.cache, clock));
        let directory = Arc::new(CachedDirectory::new(caches, profiles, packages));

        Self {
            bookings: BookingService::new(ledger.clone(), directory.clone()),
            stages: StageService::new(ledger.clone()),
            enricher: Enricher::new(directory.clone(), sessions, config.enrichment.clone()),
            provisioner: ResourceProvisioner::new(config.provisioning.clone(), ledger.clone()),
            retry: RetryPolicy::new(&config.retry),
            directory,
            ledger,
        }
    }

    pub fn directory(&self) -> &CachedDirectory {
        &self.directory
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }
}
