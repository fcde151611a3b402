//! Crossing detection logic
//!
//! Determines when an incoming order can trade against a resting one

use types::numeric::PricePoint;
use types::order::{Order, Side};

/// Check if an incoming order crosses a resting order
///
/// A BUY crosses a resting SELL when its price is at or above the ask;
/// a SELL crosses a resting BUY when its price is at or below the bid.
pub fn crosses(incoming: &Order, resting: &Order) -> bool {
    incoming.side != resting.side
        && price_crosses(incoming.side, incoming.pricepoint, resting.pricepoint)
}

/// Price-only crossing check from the incoming order's perspective
pub fn price_crosses(incoming_side: Side, incoming_price: PricePoint, resting_price: PricePoint) -> bool {
    match incoming_side {
        Side::BUY => incoming_price >= resting_price,
        Side::SELL => incoming_price <= resting_price,
    }
}
