//! Blockchain capability
//!
//! Matched trades are settled on-chain by submitting the trade terms with
//! the taker's authorization. Submission may confirm immediately, fail, or
//! stay pending until a later [`ChainOutcome`] arrives through the
//! settlement coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use types::errors::TransportError;
use types::order::Order;
use types::signing::Signature;
use types::trade::Trade;

/// A trade ready for on-chain submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTrade {
    pub trade: Trade,
    pub maker_order: Order,
    /// Taker's signature over the trade hash
    pub taker_signature: Signature,
}

/// Immediate result of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitStatus {
    /// Confirmed on-chain
    Success { tx_ref: String },
    /// Rejected by the chain
    Failed { reason: String },
    /// Accepted, confirmation follows later
    Pending { tx_ref: String },
}

/// Final outcome of a pending submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainOutcome {
    Confirmed { tx_ref: String },
    Reverted { reason: String },
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn submit_trade(&self, trade: &SignedTrade) -> Result<SubmitStatus, TransportError>;
}
