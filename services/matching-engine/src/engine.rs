//! Matching engine core
//!
//! Owns the order book of one pair and matches incoming orders against it
//! in price-time priority. Matching runs in two phases: [`MatchingEngine::plan`]
//! computes the outcome without touching the book, and
//! [`MatchingEngine::commit`] applies it. Callers that persist state in
//! between get an all-or-nothing admission.

use tracing::{debug, error};
use types::errors::{EngineError, OrderError};
use types::ids::{Address, Hash};
use types::numeric::Amount;
use types::order::{Order, OrderStatus};
use types::pair::Pair;
use types::trade::Trade;

use crate::book::{BookSnapshot, OrderBook};
use crate::lifecycle;
use crate::matching::{crosses, execute_trade};

/// Everything one incoming order did to the book
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Final record of the incoming order
    pub taker: Order,
    /// Updated maker snapshots, in match order
    pub makers: Vec<Order>,
    /// One trade per maker, same order as `makers`
    pub trades: Vec<Trade>,
    /// Fresh record carrying the unmatched remainder of a REPLACED taker
    pub residual: Option<Order>,
}

impl MatchOutcome {
    /// The order that enters the book after this outcome, if any
    pub fn resting(&self) -> Option<&Order> {
        if let Some(residual) = &self.residual {
            return Some(residual);
        }
        if self.taker.status.is_restable() && !self.taker.remaining().is_zero() {
            Some(&self.taker)
        } else {
            None
        }
    }

    pub fn has_trades(&self) -> bool {
        !self.trades.is_empty()
    }

    /// Total quantity matched for the incoming order
    pub fn matched_amount(&self) -> Amount {
        self.trades
            .iter()
            .fold(Amount::ZERO, |acc, trade| {
                Amount::new(acc.as_u128().saturating_add(trade.amount.as_u128()))
            })
    }
}

/// Matching engine for a single pair
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    pair: Pair,
    book: OrderBook,
}

impl MatchingEngine {
    /// Create an engine with an empty book
    pub fn new(pair: Pair) -> Self {
        let book = OrderBook::new(pair.name());
        Self { pair, book }
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Depth snapshot of both sides
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        self.book.snapshot(depth)
    }

    /// Put a previously admitted resting order back into the book
    ///
    /// Used when hydrating from storage. No matching happens.
    pub fn load(&mut self, order: Order) -> Result<(), OrderError> {
        self.book.insert(order)
    }

    /// Compute the outcome of `incoming` against the current book
    ///
    /// The book is not modified. The incoming order must be OPEN or PARTIAL
    /// and not already resting.
    pub fn plan(&self, incoming: Order, timestamp: i64) -> Result<MatchOutcome, EngineError> {
        if incoming.pair_name != self.book.pair_name() {
            return Err(EngineError::invariant(format!(
                "order {} for pair {} routed to {}",
                incoming.hash,
                incoming.pair_name,
                self.book.pair_name()
            )));
        }
        if !incoming.status.is_restable() || incoming.remaining().is_zero() {
            return Err(OrderError::NotRestable {
                hash: incoming.hash.to_string(),
                status: incoming.status.to_string(),
            }
            .into());
        }
        if self.book.contains(&incoming.hash) {
            return Err(OrderError::Duplicate {
                hash: incoming.hash.to_string(),
            }
            .into());
        }

        let had_fills = incoming.has_fills();
        let mut taker = incoming;
        let mut makers = Vec::new();
        let mut trades = Vec::new();

        for resting in self.book.iter_side(taker.side.opposite()) {
            if !crosses(&taker, resting) {
                break;
            }

            let fill = taker.remaining().min(resting.remaining());
            let trade = execute_trade(resting, &taker, fill, timestamp)?;

            let mut maker = resting.clone();
            maker.fill(fill)?;
            lifecycle::apply_fill(&mut maker)?;
            taker.fill(fill)?;

            debug!(
                pair = %self.book.pair_name(),
                maker = %maker.hash,
                taker = %taker.hash,
                amount = %fill,
                pricepoint = %trade.pricepoint,
                "orders matched"
            );

            makers.push(maker);
            trades.push(trade);

            if taker.is_filled() {
                break;
            }
        }

        let mut residual = None;
        if !trades.is_empty() {
            if taker.is_filled() || had_fills {
                lifecycle::apply_fill(&mut taker)?;
            } else {
                let successor = taker.residual(timestamp)?;
                lifecycle::transition(&mut taker, OrderStatus::Replaced)?;
                taker.superseded_by = Some(successor.hash);
                residual = Some(successor);
            }
        }

        Ok(MatchOutcome {
            taker,
            makers,
            trades,
            residual,
        })
    }

    /// Apply a planned outcome
    ///
    /// Fails without touching the book if any maker is no longer resting
    /// with the fill state the plan was computed from.
    pub fn commit(&mut self, outcome: &MatchOutcome) -> Result<(), EngineError> {
        if outcome.makers.len() != outcome.trades.len() {
            return Err(EngineError::invariant("maker and trade counts differ"));
        }
        for (maker, trade) in outcome.makers.iter().zip(&outcome.trades) {
            let current = self.book.get(&maker.hash).ok_or_else(|| {
                EngineError::invariant(format!("maker {} is no longer resting", maker.hash))
            })?;
            if current.filled_amount.checked_add(trade.amount)? != maker.filled_amount {
                return Err(EngineError::invariant(format!(
                    "maker {} changed since the match was planned",
                    maker.hash
                )));
            }
        }
        if let Some(resting) = outcome.resting() {
            if self.book.contains(&resting.hash) {
                return Err(OrderError::Duplicate {
                    hash: resting.hash.to_string(),
                }
                .into());
            }
        }

        for maker in &outcome.makers {
            if maker.is_filled() {
                self.book.remove(&maker.hash);
            } else {
                self.book.update(maker.clone()).map_err(|e| {
                    error!(order = %maker.hash, error = %e, "book update failed after verification");
                    e
                })?;
            }
        }
        if let Some(resting) = outcome.resting() {
            self.book.insert(resting.clone())?;
        }
        Ok(())
    }

    /// Plan and commit in one step
    pub fn match_order(&mut self, incoming: Order, timestamp: i64) -> Result<MatchOutcome, EngineError> {
        let outcome = self.plan(incoming, timestamp)?;
        self.commit(&outcome)?;
        Ok(outcome)
    }

    /// Check that `requester` may cancel the resting order `hash`
    pub fn check_cancel(&self, hash: &Hash, requester: &Address) -> Result<&Order, OrderError> {
        let order = self.book.get(hash).ok_or_else(|| OrderError::NotFound {
            hash: hash.to_string(),
        })?;
        if &order.user_address != requester {
            return Err(OrderError::NotOwner {
                hash: hash.to_string(),
                requester: requester.to_string(),
            });
        }
        Ok(order)
    }

    /// Remove a resting order on its owner's request
    ///
    /// Returns the CANCELLED record.
    pub fn cancel(&mut self, hash: &Hash, requester: &Address) -> Result<Order, OrderError> {
        let mut order = self.check_cancel(hash, requester)?.clone();
        lifecycle::transition(&mut order, OrderStatus::Cancelled)?;
        self.book.remove(hash);
        Ok(order)
    }

    /// Give `amount` of a failed trade back to a resting order, keeping
    /// its queue position
    pub fn restore(&mut self, hash: &Hash, amount: Amount) -> Result<Order, OrderError> {
        let mut order = self
            .book
            .get(hash)
            .cloned()
            .ok_or_else(|| OrderError::NotFound {
                hash: hash.to_string(),
            })?;
        lifecycle::reopen(&mut order, amount)?;
        self.book.update(order.clone())?;
        Ok(order)
    }

    /// Swap the snapshot of a resting order whose mutable metadata changed
    /// (e.g. a residual that received its owner's signature)
    pub fn refresh(&mut self, order: Order) -> Result<(), OrderError> {
        self.book.update(order)
    }
}
