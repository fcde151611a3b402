//! Error types for the trading core
//!
//! Comprehensive error taxonomy using thiserror. Every error that can reach
//! a client maps to a stable [`ErrorCode`] carried in ERROR payloads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable error codes for ERROR events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidPair,
    InvalidAmount,
    InvalidNonce,
    InvalidExchangeAddress,
    InvalidHash,
    InvalidSignature,
    UnknownPair,
    InactivePair,
    Unauthorized,
    MalformedPayload,
    OrderNotFound,
    NotOwner,
    AlreadyTerminal,
    InvalidTransition,
    MatchingInvariant,
    TradeNotFound,
    SettlementFailed,
    StorageUnavailable,
    TransportUnavailable,
    Internal,
}

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Trade error: {0}")]
    Trade(#[from] TradeError),

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Unreachable for validated input; the offending order is rejected
    #[error("Matching invariant violated: {reason}")]
    MatchingInvariant { reason: String },
}

impl EngineError {
    pub fn invariant(reason: impl Into<String>) -> Self {
        EngineError::MatchingInvariant {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation(e) => e.code(),
            EngineError::Order(e) => e.code(),
            EngineError::Trade(e) => e.code(),
            EngineError::Arithmetic(_) | EngineError::MatchingInvariant { .. } => {
                ErrorCode::MatchingInvariant
            }
            EngineError::Settlement(e) => e.code(),
            EngineError::Storage(_) => ErrorCode::StorageUnavailable,
            EngineError::Transport(_) => ErrorCode::TransportUnavailable,
        }
    }
}

/// Checked integer arithmetic failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("not a non-negative integer: {0}")]
    InvalidNumber(String),
}

/// Signature decoding and verification failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid signature encoding")]
    InvalidSignature,

    #[error("Signature verification failed")]
    VerificationFailed,
}

/// Pre-admission rejections. The order never touches the book.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Base and quote token are the same: {token}")]
    SameBaseAndQuote { token: String },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Price point must be positive")]
    InvalidPricepoint,

    #[error("Nonce {provided} is not above last seen nonce {last_seen}")]
    InvalidNonce { provided: u64, last_seen: u64 },

    #[error("Exchange address mismatch: expected {expected}, got {actual}")]
    InvalidExchangeAddress { expected: String, actual: String },

    #[error("Order hash mismatch: computed {computed}, submitted {submitted}")]
    InvalidHash { computed: String, submitted: String },

    #[error("Order is not signed")]
    MissingSignature,

    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SigningError),

    #[error("Signature recovers to {recovered}, order claims {claimed}")]
    SignerMismatch { claimed: String, recovered: String },

    #[error("No pair for tokens {base}/{quote}")]
    UnknownPair { base: String, quote: String },

    #[error("Pair {pair} is not active")]
    InactivePair { pair: String },

    #[error("Order names pair {submitted}, tokens resolve to {resolved}")]
    PairNameMismatch { submitted: String, resolved: String },

    #[error("Connection account {connection} cannot act for {claimed}")]
    UnauthorizedSender { connection: String, claimed: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::SameBaseAndQuote { .. } => ErrorCode::InvalidPair,
            ValidationError::InvalidAmount | ValidationError::InvalidPricepoint => {
                ErrorCode::InvalidAmount
            }
            ValidationError::InvalidNonce { .. } => ErrorCode::InvalidNonce,
            ValidationError::InvalidExchangeAddress { .. } => ErrorCode::InvalidExchangeAddress,
            ValidationError::InvalidHash { .. } => ErrorCode::InvalidHash,
            ValidationError::MissingSignature
            | ValidationError::InvalidSignature(_)
            | ValidationError::SignerMismatch { .. } => ErrorCode::InvalidSignature,
            ValidationError::UnknownPair { .. } | ValidationError::PairNameMismatch { .. } => {
                ErrorCode::UnknownPair
            }
            ValidationError::InactivePair { .. } => ErrorCode::InactivePair,
            ValidationError::UnauthorizedSender { .. } => ErrorCode::Unauthorized,
            ValidationError::MalformedPayload(_) => ErrorCode::MalformedPayload,
        }
    }
}

/// Order-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Order not found: {hash}")]
    NotFound { hash: String },

    #[error("Order {hash} is not owned by {requester}")]
    NotOwner { hash: String, requester: String },

    #[error("Order already in terminal state: {status}")]
    AlreadyTerminal { status: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Fill of {fill} exceeds remaining {remaining}")]
    Overfill { fill: String, remaining: String },

    #[error("Order {hash} already resting in the book")]
    Duplicate { hash: String },

    #[error("Order {hash} cannot rest with status {status}")]
    NotRestable { hash: String, status: String },

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}

impl OrderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrderError::NotFound { .. } => ErrorCode::OrderNotFound,
            OrderError::NotOwner { .. } => ErrorCode::NotOwner,
            OrderError::AlreadyTerminal { .. } => ErrorCode::AlreadyTerminal,
            OrderError::InvalidStateTransition { .. } => ErrorCode::InvalidTransition,
            OrderError::Overfill { .. }
            | OrderError::Duplicate { .. }
            | OrderError::NotRestable { .. }
            | OrderError::Arithmetic(_) => ErrorCode::MatchingInvariant,
        }
    }
}

/// Trade-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("Trade not found: {hash}")]
    NotFound { hash: String },

    #[error("Trade already settled with status {status}")]
    AlreadySettled { status: String },

    #[error("Invalid trade transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl TradeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TradeError::NotFound { .. } => ErrorCode::TradeNotFound,
            TradeError::AlreadySettled { .. } | TradeError::InvalidStateTransition { .. } => {
                ErrorCode::InvalidTransition
            }
        }
    }
}

/// Storage collaborator failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Stale nonce {provided}, last recorded {last_seen}")]
    StaleNonce { provided: u64, last_seen: u64 },

    #[error("Invalid record: {0}")]
    Invalid(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Transport and blockchain collaborator failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Recoverable settlement failures. Affected trades move to FAILED and the
/// matched quantity is restored to the book.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("Taker signature not received within {seconds}s")]
    SignatureTimeout { seconds: u64 },

    #[error("Invalid taker signature for trade {trade}: {reason}")]
    InvalidSignature { trade: String, reason: String },

    #[error("Blockchain rejected trade {trade}: {reason}")]
    ChainRejected { trade: String, reason: String },

    #[error("No pending settlement for trade {trade}")]
    UnknownTrade { trade: String },

    #[error("{account} is not the taker of trade {trade}")]
    NotTaker { trade: String, account: String },

    #[error("Trade error: {0}")]
    Trade(#[from] TradeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SettlementError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SettlementError::InvalidSignature { .. } => ErrorCode::InvalidSignature,
            SettlementError::UnknownTrade { .. } => ErrorCode::TradeNotFound,
            SettlementError::NotTaker { .. } => ErrorCode::Unauthorized,
            SettlementError::Trade(e) => e.code(),
            SettlementError::Storage(_) => ErrorCode::StorageUnavailable,
            SettlementError::Transport(_) => ErrorCode::TransportUnavailable,
            SettlementError::SignatureTimeout { .. } | SettlementError::ChainRejected { .. } => {
                ErrorCode::SettlementFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidNonce {
            provided: 3,
            last_seen: 5,
        };
        assert_eq!(err.to_string(), "Nonce 3 is not above last seen nonce 5");
    }

    #[test]
    fn test_engine_error_from_validation_error() {
        let err: EngineError = ValidationError::InvalidAmount.into();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(err.code(), ErrorCode::InvalidAmount);
    }

    #[test]
    fn test_signing_error_maps_to_invalid_signature() {
        let err: ValidationError = SigningError::VerificationFailed.into();
        assert_eq!(err.code(), ErrorCode::InvalidSignature);
    }

    #[test]
    fn test_error_code_wire_format() {
        let json = serde_json::to_string(&ErrorCode::InvalidExchangeAddress).unwrap();
        assert_eq!(json, "\"INVALID_EXCHANGE_ADDRESS\"");
    }

    #[test]
    fn test_invariant_constructor() {
        let err = EngineError::invariant("maker vanished");
        assert_eq!(err.code(), ErrorCode::MatchingInvariant);
        assert!(err.to_string().contains("maker vanished"));
    }
}
