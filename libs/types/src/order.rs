//! Order types
//!
//! An order's identity is its content hash over the immutable fields; only
//! `filled_amount`, `status`, `superseded_by` and the signature of an
//! engine-derived order change after creation.

use crate::errors::{ArithmeticError, OrderError};
use crate::ids::{Address, Hash};
use crate::numeric::{Amount, PricePoint};
use crate::pair::Pair;
use crate::signing::{CanonicalHasher, Signature, Wallet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }

    fn as_byte(&self) -> u8 {
        match self {
            Side::BUY => 0,
            Side::SELL => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::BUY => f.write_str("BUY"),
            Side::SELL => f.write_str("SELL"),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Admitted, no fills
    #[default]
    #[serde(rename = "OPEN")]
    Open,

    /// Some fills, remainder still resting
    #[serde(rename = "PARTIAL")]
    Partial,

    /// Completely matched (terminal)
    #[serde(rename = "FILLED")]
    Filled,

    /// Cancelled by its owner (terminal)
    #[serde(rename = "CANCELLED")]
    Cancelled,

    /// Failed validation, never admitted (terminal)
    #[serde(rename = "REJECTED")]
    Rejected,

    /// Superseded by a residual record (terminal)
    #[serde(rename = "REPLACED")]
    Replaced,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Replaced
        )
    }

    /// Statuses an order may hold while in the book
    pub fn is_restable(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::Partial => "PARTIAL",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Replaced => "REPLACED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed intent to trade on one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub hash: Hash,
    pub pair_name: String,
    pub base_token: Address,
    pub quote_token: Address,
    pub side: Side,
    pub amount: Amount,
    pub pricepoint: PricePoint,
    #[serde(default)]
    pub filled_amount: Amount,
    #[serde(default)]
    pub status: OrderStatus,
    pub user_address: Address,
    pub exchange_address: Address,
    pub nonce: u64,
    #[serde(default)]
    pub signature: Option<Signature>,
    #[serde(default)]
    pub make_fee: Amount,
    #[serde(default)]
    pub take_fee: Amount,
    #[serde(default)]
    pub created_at: i64, // Unix nanos
    /// Record this order was derived from: the predecessor order of a
    /// residual, or the failed trade whose quantity it restores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Hash>,
    /// Residual record that replaced this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Hash>,
}

impl Order {
    /// Create an unsigned OPEN order on `pair` with the pair's fees.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pair: &Pair,
        side: Side,
        amount: Amount,
        pricepoint: PricePoint,
        user_address: Address,
        exchange_address: Address,
        nonce: u64,
        created_at: i64,
    ) -> Self {
        let mut order = Self {
            hash: Hash::default(),
            pair_name: pair.name(),
            base_token: pair.base_token_address,
            quote_token: pair.quote_token_address,
            side,
            amount,
            pricepoint,
            filled_amount: Amount::ZERO,
            status: OrderStatus::Open,
            user_address,
            exchange_address,
            nonce,
            signature: None,
            make_fee: pair.make_fee,
            take_fee: pair.take_fee,
            created_at,
            origin: None,
            superseded_by: None,
        };
        order.hash = order.compute_hash();
        order
    }

    /// Content hash over the immutable fields.
    pub fn compute_hash(&self) -> Hash {
        let hasher = CanonicalHasher::new()
            .address(&self.exchange_address)
            .address(&self.base_token)
            .address(&self.quote_token)
            .u128(self.amount.as_u128())
            .u128(self.pricepoint.as_u128())
            .byte(self.side.as_byte())
            .u64(self.nonce)
            .address(&self.user_address)
            .u128(self.make_fee.as_u128())
            .u128(self.take_fee.as_u128());
        match &self.origin {
            Some(origin) => hasher.hash(origin).finish(),
            None => hasher.finish(),
        }
    }

    /// Sign the order hash with the owner's wallet.
    pub fn sign(&mut self, wallet: &Wallet) {
        self.signature = Some(wallet.sign_hash(&self.hash));
    }

    /// Unfilled quantity.
    pub fn remaining(&self) -> Amount {
        Amount::new(self.amount.as_u128().saturating_sub(self.filled_amount.as_u128()))
    }

    /// Check quantity invariant: 0 <= filled <= amount
    pub fn check_invariant(&self) -> bool {
        self.filled_amount <= self.amount
    }

    pub fn is_filled(&self) -> bool {
        self.filled_amount == self.amount
    }

    pub fn has_fills(&self) -> bool {
        !self.filled_amount.is_zero()
    }

    /// Add a fill. Overfilling is an error, never a silent clamp.
    pub fn fill(&mut self, amount: Amount) -> Result<(), OrderError> {
        let remaining = self.remaining();
        if amount > remaining {
            return Err(OrderError::Overfill {
                fill: amount.to_string(),
                remaining: remaining.to_string(),
            });
        }
        self.filled_amount = self.filled_amount.checked_add(amount)?;
        Ok(())
    }

    /// Give back a previously applied fill.
    pub fn unfill(&mut self, amount: Amount) -> Result<(), OrderError> {
        self.filled_amount = self.filled_amount.checked_sub(amount)?;
        Ok(())
    }

    /// Fresh OPEN record carrying this order's remainder.
    pub fn residual(&self, created_at: i64) -> Result<Order, ArithmeticError> {
        let remaining = self.amount.checked_sub(self.filled_amount)?;
        Ok(self.derive(remaining, self.hash, created_at))
    }

    /// Fresh OPEN record restoring `amount` from the failed trade `trade_hash`.
    pub fn restored(&self, amount: Amount, trade_hash: Hash, created_at: i64) -> Order {
        self.derive(amount, trade_hash, created_at)
    }

    fn derive(&self, amount: Amount, origin: Hash, created_at: i64) -> Order {
        let mut order = Order {
            hash: Hash::default(),
            amount,
            filled_amount: Amount::ZERO,
            status: OrderStatus::Open,
            signature: None,
            created_at,
            origin: Some(origin),
            superseded_by: None,
            ..self.clone()
        };
        order.hash = order.compute_hash();
        order
    }
}
