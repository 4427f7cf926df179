//! Error types for the booking engine
//!
//! Mirrors the ledger's error taxonomy one variant per kind so that
//! ledger failures can be surfaced verbatim, plus a handful of ambient
//! variants for transport, configuration and serialization problems.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for booking operations
#[derive(Error, Debug)]
pub enum BookingError {
    /// Referenced booking, stage, package or profile does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists (duplicate stage batch, etc.)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Request failed validation before reaching the ledger
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Actor is not a party to the booking
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Debit or release could not be processed
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Client balance does not cover the package price
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Ledger-side failure with no more specific kind
    #[error("Ledger error: {0}")]
    LedgerError(String),

    /// Release attempted on a stage that was never approved
    #[error("Stage not approved: {0}")]
    StageNotApproved(String),

    /// Operation requires escrowed funds the booking does not hold
    #[error("Booking not funded: {0}")]
    BookingNotFunded(String),

    /// Transition is not allowed from the current status
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Transient transport failure; safe to repeat with the same idempotency key
    #[error("Transport error: {0}")]
    Transport(String),

    /// A bounded call did not finish in time
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Discriminant of [`BookingError`], suitable for wire responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    Unauthorized,
    PaymentFailed,
    InsufficientFunds,
    LedgerError,
    StageNotApproved,
    BookingNotFunded,
    InvalidStatus,
    Transport,
    Timeout,
    Config,
    Serialization,
    Internal,
}

/// Coarse grouping used for logging and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Conflict,
    Authorization,
    Financial,
    NotFound,
    Transport,
    Internal,
}

impl BookingError {
    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an already-exists error
    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create a validation error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an authorization error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a payment error
    pub fn payment_failed<S: Into<String>>(msg: S) -> Self {
        Self::PaymentFailed(msg.into())
    }

    /// Create an insufficient funds error
    pub fn insufficient_funds<S: Into<String>>(msg: S) -> Self {
        Self::InsufficientFunds(msg.into())
    }

    /// Create a generic ledger error
    pub fn ledger<S: Into<String>>(msg: S) -> Self {
        Self::LedgerError(msg.into())
    }

    /// Create a stage-not-approved error
    pub fn stage_not_approved<S: Into<String>>(msg: S) -> Self {
        Self::StageNotApproved(msg.into())
    }

    /// Create a booking-not-funded error
    pub fn booking_not_funded<S: Into<String>>(msg: S) -> Self {
        Self::BookingNotFunded(msg.into())
    }

    /// Create an invalid status error
    pub fn invalid_status<S: Into<String>>(msg: S) -> Self {
        Self::InvalidStatus(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Rebuild an error from a wire kind and message
    pub fn from_kind<S: Into<String>>(kind: ErrorKind, msg: S) -> Self {
        let msg = msg.into();
        match kind {
            ErrorKind::NotFound => Self::NotFound(msg),
            ErrorKind::AlreadyExists => Self::AlreadyExists(msg),
            ErrorKind::InvalidInput => Self::InvalidInput(msg),
            ErrorKind::Unauthorized => Self::Unauthorized(msg),
            ErrorKind::PaymentFailed => Self::PaymentFailed(msg),
            ErrorKind::InsufficientFunds => Self::InsufficientFunds(msg),
            ErrorKind::LedgerError => Self::LedgerError(msg),
            ErrorKind::StageNotApproved => Self::StageNotApproved(msg),
            ErrorKind::BookingNotFunded => Self::BookingNotFunded(msg),
            ErrorKind::InvalidStatus => Self::InvalidStatus(msg),
            ErrorKind::Transport => Self::Transport(msg),
            ErrorKind::Timeout => Self::Timeout(msg),
            ErrorKind::Config => Self::Config(msg),
            // A serde error cannot be rebuilt from text
            ErrorKind::Serialization | ErrorKind::Internal => Self::Internal(msg),
        }
    }

    /// Wire discriminant of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::PaymentFailed(_) => ErrorKind::PaymentFailed,
            Self::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            Self::LedgerError(_) => ErrorKind::LedgerError,
            Self::StageNotApproved(_) => ErrorKind::StageNotApproved,
            Self::BookingNotFunded(_) => ErrorKind::BookingNotFunded,
            Self::InvalidStatus(_) => ErrorKind::InvalidStatus,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Config(_) => ErrorKind::Config,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) => ErrorCategory::Validation,
            Self::AlreadyExists(_) | Self::InvalidStatus(_) => ErrorCategory::Conflict,
            Self::Unauthorized(_) => ErrorCategory::Authorization,
            Self::InsufficientFunds(_)
            | Self::PaymentFailed(_)
            | Self::LedgerError(_)
            | Self::BookingNotFunded(_)
            | Self::StageNotApproved(_) => ErrorCategory::Financial,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Transport(_) | Self::Timeout(_) => ErrorCategory::Transport,
            Self::Config(_) | Self::Serialization(_) | Self::Internal(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Whether repeating the same request (same idempotency key) may succeed.
    ///
    /// Only transport-level failures qualify. Financial errors are final.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }
}

impl From<reqwest::Error> for BookingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Internal(format!("malformed response: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<config::ConfigError> for BookingError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_from_kind() {
        let err = BookingError::insufficient_funds("balance 10 < price 20");
        let rebuilt = BookingError::from_kind(err.kind(), "balance 10 < price 20");
        assert_eq!(rebuilt.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(rebuilt.to_string(), err.to_string());
    }

    #[test]
    fn test_financial_errors_are_not_retryable() {
        assert!(!BookingError::insufficient_funds("x").is_retryable());
        assert!(!BookingError::payment_failed("x").is_retryable());
        assert!(!BookingError::ledger("x").is_retryable());
        assert!(BookingError::transport("connection reset").is_retryable());
        assert!(BookingError::timeout("5s").is_retryable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            BookingError::invalid_input("x").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            BookingError::invalid_status("x").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            BookingError::booking_not_funded("x").category(),
            ErrorCategory::Financial
        );
    }
}
