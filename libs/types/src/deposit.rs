//! Deposit transaction records
//!
//! Published on detection and consumed at-least-once; `tx_ref` is the
//! idempotency key for crediting.

use crate::ids::Address;
use crate::numeric::Amount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DepositStatus {
    PENDING,
    SUCCESS,
}

/// A detected deposit awaiting balance crediting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositTransaction {
    /// Source-chain transaction reference
    pub tx_ref: String,
    pub chain: String,
    /// Credited account
    pub address: Address,
    /// Credited token
    pub token: Address,
    pub amount: Amount,
    pub status: DepositStatus,
    pub created_at: i64,
}

/// Result of crediting a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositOutcome {
    /// Balance credited; carries the new balance
    Credited(Amount),
    /// `tx_ref` already processed, nothing changed
    Duplicate,
}
