//! Trade execution logic
//!
//! Builds one trade per consumed resting order

use types::errors::EngineError;
use types::numeric::Amount;
use types::order::Order;
use types::trade::{Trade, TradeStatus};

/// Execute a trade between a resting maker and an incoming taker
///
/// The maker sets the price. The trade side is the taker's side, and each
/// order contributes its own fee field. The amount must fit both
/// remainders; anything else is an engine bug.
pub fn execute_trade(
    maker: &Order,
    taker: &Order,
    amount: Amount,
    timestamp: i64,
) -> Result<Trade, EngineError> {
    if amount.is_zero() {
        return Err(EngineError::invariant("zero-amount fill"));
    }
    if amount > maker.remaining() || amount > taker.remaining() {
        return Err(EngineError::invariant(format!(
            "fill {} exceeds remaining maker {} / taker {}",
            amount,
            maker.remaining(),
            taker.remaining()
        )));
    }
    if maker.side == taker.side || maker.pair_name != taker.pair_name {
        return Err(EngineError::invariant(format!(
            "orders {} and {} cannot trade",
            maker.hash, taker.hash
        )));
    }

    let mut trade = Trade {
        hash: Default::default(),
        pair_name: taker.pair_name.clone(),
        base_token: taker.base_token,
        quote_token: taker.quote_token,
        maker_order_hash: maker.hash,
        taker_order_hash: taker.hash,
        maker: maker.user_address,
        taker: taker.user_address,
        side: taker.side,
        amount,
        pricepoint: maker.pricepoint,
        make_fee: maker.make_fee,
        take_fee: taker.take_fee,
        created_at: timestamp,
        status: TradeStatus::PENDING,
        tx_ref: None,
    };
    trade.hash = trade.compute_hash();
    Ok(trade)
}
