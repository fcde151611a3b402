//! Trade execution and settlement types

use crate::ids::{Address, Hash};
use crate::numeric::{Amount, PricePoint};
use crate::order::Side;
use crate::signing::CanonicalHasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    /// Matched off-chain, awaiting signature and on-chain confirmation
    PENDING,
    /// Confirmed on-chain (terminal)
    SUCCESS,
    /// Rejected on-chain or never authorized (terminal)
    FAILED,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::PENDING)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::PENDING => f.write_str("PENDING"),
            TradeStatus::SUCCESS => f.write_str("SUCCESS"),
            TradeStatus::FAILED => f.write_str("FAILED"),
        }
    }
}

/// One fill between a resting maker order and an incoming taker order
///
/// Immutable except for `status` and `tx_ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub hash: Hash,
    pub pair_name: String,
    pub base_token: Address,
    pub quote_token: Address,

    // Order references
    pub maker_order_hash: Hash,
    pub taker_order_hash: Hash,

    // Account references
    pub maker: Address,
    pub taker: Address,

    // Trade details (from taker perspective)
    pub side: Side,
    pub amount: Amount,
    pub pricepoint: PricePoint,

    // Fees
    pub make_fee: Amount,
    pub take_fee: Amount,

    pub created_at: i64, // Unix nanos
    pub status: TradeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
}

impl Trade {
    /// Recompute the content hash from the trade terms.
    pub fn compute_hash(&self) -> Hash {
        CanonicalHasher::new()
            .u128(self.amount.as_u128())
            .address(&self.base_token)
            .address(&self.quote_token)
            .u128(self.pricepoint.as_u128())
            .hash(&self.maker_order_hash)
            .hash(&self.taker_order_hash)
            .byte(match self.side {
                Side::BUY => 0,
                Side::SELL => 1,
            })
            .str(&self.pair_name)
            .address(&self.maker)
            .address(&self.taker)
            .u64(self.created_at as u64)
            .finish()
    }

    pub fn is_pending(&self) -> bool {
        self.status == TradeStatus::PENDING
    }
}
