//! Escrow-backed milestone booking engine
//!
//! Turns a marketplace order into a booking whose funds are held in escrow
//! by an external ledger and released stage by stage:
//! - Idempotent booking creation (at most one debit per attempt)
//! - Booking and stage state machines with two-phase approve/release
//! - Lazy provisioning of catalog records
//! - Best-effort enrichment over TTL-cached profile/package lookups
//!
//! The ledger is the system of record for money movement. This crate
//! validates, sequences and surfaces its errors but never settles funds.

pub mod booking;
pub mod cache;
pub mod clock;
pub mod config;
pub mod directory;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod ledger;
pub mod models;
pub mod provisioner;
pub mod retry;
pub mod sessions;
pub mod stages;

use error::BookingError;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, BookingError>;
