//! Order book infrastructure module
//!
//! Contains price levels, bid book, ask book, and the per-pair [`OrderBook`]
//! that joins both sides behind a hash index.

pub mod price_level;
pub mod bid_book;
pub mod ask_book;

pub use price_level::PriceLevel;
pub use bid_book::BidBook;
pub use ask_book::AskBook;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use types::errors::OrderError;
use types::ids::Hash;
use types::numeric::{Amount, PricePoint};
use types::order::{Order, Side};

/// Aggregated view of one price level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthLevel {
    pub pricepoint: PricePoint,
    pub total_remaining: Amount,
    pub order_count: usize,
}

impl DepthLevel {
    fn new(pricepoint: PricePoint, level: &PriceLevel) -> Self {
        Self {
            pricepoint,
            total_remaining: level.total_remaining(),
            order_count: level.order_count(),
        }
    }
}

/// Order book snapshot for queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub pair_name: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// Resting orders of one pair
///
/// Every order held here has status OPEN or PARTIAL and a non-zero
/// remainder. The index maps each resting hash to its side and price so
/// removal never scans the book.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pair_name: String,
    bids: BidBook,
    asks: AskBook,
    index: HashMap<Hash, (Side, PricePoint)>,
}

impl OrderBook {
    pub fn new(pair_name: impl Into<String>) -> Self {
        Self {
            pair_name: pair_name.into(),
            bids: BidBook::new(),
            asks: AskBook::new(),
            index: HashMap::new(),
        }
    }

    pub fn pair_name(&self) -> &str {
        &self.pair_name
    }

    /// Insert a resting order on its side, behind earlier orders at its price
    pub fn insert(&mut self, order: Order) -> Result<(), OrderError> {
        if !order.status.is_restable() || order.remaining().is_zero() {
            return Err(OrderError::NotRestable {
                hash: order.hash.to_string(),
                status: order.status.to_string(),
            });
        }
        if self.index.contains_key(&order.hash) {
            return Err(OrderError::Duplicate {
                hash: order.hash.to_string(),
            });
        }

        self.index.insert(order.hash, (order.side, order.pricepoint));
        match order.side {
            Side::BUY => self.bids.insert(order),
            Side::SELL => self.asks.insert(order),
        }
        Ok(())
    }

    /// Remove and return an order; `None` if it is not resting
    pub fn remove(&mut self, hash: &Hash) -> Option<Order> {
        let (side, price) = self.index.remove(hash)?;
        match side {
            Side::BUY => self.bids.remove(hash, price),
            Side::SELL => self.asks.remove(hash, price),
        }
    }

    /// Swap in a new snapshot of a resting order without losing its place
    pub fn update(&mut self, order: Order) -> Result<(), OrderError> {
        if !order.status.is_restable() || order.remaining().is_zero() {
            return Err(OrderError::NotRestable {
                hash: order.hash.to_string(),
                status: order.status.to_string(),
            });
        }
        let hash = order.hash;
        let replaced = match self.index.get(&hash) {
            Some((Side::BUY, _)) => self.bids.replace(order),
            Some((Side::SELL, _)) => self.asks.replace(order),
            None => false,
        };
        if replaced {
            Ok(())
        } else {
            Err(OrderError::NotFound {
                hash: hash.to_string(),
            })
        }
    }

    pub fn get(&self, hash: &Hash) -> Option<&Order> {
        match self.index.get(hash)? {
            (Side::BUY, price) => self.bids.get(hash, *price),
            (Side::SELL, price) => self.asks.get(hash, *price),
        }
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.contains_key(hash)
    }

    /// Highest-priority resting order on the side opposite `side`
    pub fn best_opposite(&self, side: Side) -> Option<&Order> {
        match side {
            Side::BUY => self.asks.best_ask(),
            Side::SELL => self.bids.best_bid(),
        }
    }

    /// Resting orders of one side in price-time priority
    pub fn iter_side(&self, side: Side) -> Box<dyn Iterator<Item = &Order> + '_> {
        match side {
            Side::BUY => Box::new(self.bids.iter()),
            Side::SELL => Box::new(self.asks.iter()),
        }
    }

    /// Top `depth` levels of each side
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            pair_name: self.pair_name.clone(),
            bids: self.bids.depth_snapshot(depth),
            asks: self.asks.depth_snapshot(depth),
        }
    }

    /// Number of resting orders
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
