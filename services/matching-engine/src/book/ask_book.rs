//! Sell side of a pair's book
//!
//! Levels are keyed by pricepoint in a BTreeMap and walked front to back,
//! so the cheapest offer always comes out first.

use std::collections::BTreeMap;
use types::ids::Hash;
use types::numeric::PricePoint;
use types::order::Order;

use super::price_level::PriceLevel;
use super::DepthLevel;

/// Resting SELL orders, cheapest level first, FIFO within a level
#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<PricePoint, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `order` behind everything already offered at its pricepoint
    pub fn insert(&mut self, order: Order) {
        let pricepoint = order.pricepoint;
        self.levels.entry(pricepoint).or_default().push_back(order);
    }

    /// Take an offer out; a level left with no orders is dropped
    pub fn remove(&mut self, hash: &Hash, pricepoint: PricePoint) -> Option<Order> {
        let level = self.levels.get_mut(&pricepoint)?;
        let taken = level.remove(hash)?;
        if level.is_empty() {
            self.levels.remove(&pricepoint);
        }
        Some(taken)
    }

    pub fn replace(&mut self, order: Order) -> bool {
        self.levels
            .get_mut(&order.pricepoint)
            .map_or(false, |level| level.replace(order))
    }

    pub fn get(&self, hash: &Hash, pricepoint: PricePoint) -> Option<&Order> {
        self.levels.get(&pricepoint).and_then(|level| level.get(hash))
    }

    /// Oldest offer at the lowest pricepoint
    pub fn best_ask(&self) -> Option<&Order> {
        self.levels
            .first_key_value()
            .and_then(|(_, level)| level.front())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.levels.values().flat_map(PriceLevel::iter)
    }

    /// Aggregates for the `depth` cheapest levels
    pub fn depth_snapshot(&self, depth: usize) -> Vec<DepthLevel> {
        let mut out = Vec::with_capacity(depth.min(self.levels.len()));
        for (pricepoint, level) in self.levels.iter().take(depth) {
            out.push(DepthLevel::new(*pricepoint, level));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Distinct pricepoints with at least one offer
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
