//! Order and trade lifecycle state machine
//!
//! Order transitions:
//! - OPEN → PARTIAL | FILLED | CANCELLED | REPLACED
//! - PARTIAL → PARTIAL | FILLED | CANCELLED
//! - FILLED, CANCELLED, REJECTED, REPLACED are terminal
//!
//! REJECTED is only reachable before admission. The one exception to
//! terminality is [`reopen`], the settlement compensation that gives a
//! failed trade's quantity back to a FILLED or PARTIAL order.
//!
//! Trade transitions: PENDING → SUCCESS | FAILED, both terminal.

use types::errors::{OrderError, TradeError};
use types::numeric::Amount;
use types::order::{Order, OrderStatus};
use types::trade::{Trade, TradeStatus};

/// Whether an order may move from `from` to `to` in normal processing
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Open, Partial | Filled | Cancelled | Replaced) | (Partial, Partial | Filled | Cancelled)
    )
}

/// Move an order to `to`, rejecting illegal transitions
pub fn transition(order: &mut Order, to: OrderStatus) -> Result<(), OrderError> {
    if !can_transition(order.status, to) {
        return Err(if order.status.is_terminal() {
            OrderError::AlreadyTerminal {
                status: order.status.to_string(),
            }
        } else {
            OrderError::InvalidStateTransition {
                from: order.status.to_string(),
                to: to.to_string(),
            }
        });
    }
    order.status = to;
    Ok(())
}

/// Reset client-controlled mutable fields on an incoming order
///
/// Clients cannot claim fills or a status; admission always starts OPEN.
pub fn admit(order: &mut Order) {
    order.status = OrderStatus::Open;
    order.filled_amount = Amount::ZERO;
    order.superseded_by = None;
}

/// Mark a not-yet-admitted order as rejected
pub fn reject(order: &mut Order) -> Result<(), OrderError> {
    if order.status != OrderStatus::Open || order.has_fills() {
        return Err(OrderError::InvalidStateTransition {
            from: order.status.to_string(),
            to: OrderStatus::Rejected.to_string(),
        });
    }
    order.status = OrderStatus::Rejected;
    Ok(())
}

/// Status after a fill has been added to `filled_amount`
pub fn apply_fill(order: &mut Order) -> Result<(), OrderError> {
    let next = if order.is_filled() {
        OrderStatus::Filled
    } else {
        OrderStatus::Partial
    };
    transition(order, next)
}

/// Compensation for a failed trade: give `amount` back to the order
///
/// Only FILLED and PARTIAL orders carry fills that can be returned. The
/// result is PARTIAL while other fills remain, otherwise OPEN.
pub fn reopen(order: &mut Order, amount: Amount) -> Result<(), OrderError> {
    if !matches!(order.status, OrderStatus::Filled | OrderStatus::Partial) {
        return Err(OrderError::InvalidStateTransition {
            from: order.status.to_string(),
            to: "OPEN".to_string(),
        });
    }
    order.unfill(amount)?;
    order.status = if order.has_fills() {
        OrderStatus::Partial
    } else {
        OrderStatus::Open
    };
    Ok(())
}

/// Whether a trade may move from `from` to `to`
pub fn can_settle(from: TradeStatus, to: TradeStatus) -> bool {
    matches!(
        (from, to),
        (TradeStatus::PENDING, TradeStatus::SUCCESS | TradeStatus::FAILED)
    )
}

/// Finalize a pending trade, recording the transaction reference if any
pub fn settle_trade(
    trade: &mut Trade,
    to: TradeStatus,
    tx_ref: Option<String>,
) -> Result<(), TradeError> {
    if trade.status.is_terminal() {
        return Err(TradeError::AlreadySettled {
            status: trade.status.to_string(),
        });
    }
    if !can_settle(trade.status, to) {
        return Err(TradeError::InvalidStateTransition {
            from: trade.status.to_string(),
            to: to.to_string(),
        });
    }
    trade.status = to;
    if tx_ref.is_some() {
        trade.tx_ref = tx_ref;
    }
    Ok(())
}
