//! Buy side of a pair's book

use std::collections::BTreeMap;
use types::ids::Hash;
use types::numeric::PricePoint;
use types::order::Order;

use super::price_level::PriceLevel;
use super::DepthLevel;

/// Resting BUY orders
///
/// The map is ascending like the ask side; bids are read from the back so
/// the highest pricepoint leads. Within a level, arrival order decides.
#[derive(Debug, Clone, Default)]
pub struct BidBook {
    levels: BTreeMap<PricePoint, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: Order) {
        let pricepoint = order.pricepoint;
        self.levels.entry(pricepoint).or_default().push_back(order);
    }

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

    /// Oldest bid at the highest pricepoint
    pub fn best_bid(&self) -> Option<&Order> {
        self.levels
            .last_key_value()
            .and_then(|(_, level)| level.front())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.levels.values().rev().flat_map(PriceLevel::iter)
    }

    /// Aggregates for the `depth` highest levels
    pub fn depth_snapshot(&self, depth: usize) -> Vec<DepthLevel> {
        self.levels
            .iter()
            .rev()
            .take(depth)
            .map(|(pricepoint, level)| DepthLevel::new(*pricepoint, level))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{order, ALICE, BOB};
    use types::order::Side;

    #[test]
    fn test_highest_bid_is_best() {
        let mut bids = BidBook::new();
        let highest = order(BOB, Side::BUY, 150, 51_000, 1);

        bids.insert(order(ALICE, Side::BUY, 100, 50_000, 1));
        bids.insert(highest.clone());
        bids.insert(order(ALICE, Side::BUY, 100, 49_000, 2));

        assert_eq!(bids.best_bid().unwrap().hash, highest.hash);
    }

    #[test]
    fn test_iteration_reads_levels_high_to_low() {
        let mut bids = BidBook::new();
        let low = order(ALICE, Side::BUY, 100, 49_000, 1);
        let high_first = order(ALICE, Side::BUY, 100, 50_000, 2);
        let high_second = order(BOB, Side::BUY, 100, 50_000, 1);

        bids.insert(low.clone());
        bids.insert(high_first.clone());
        bids.insert(high_second.clone());

        let hashes: Vec<_> = bids.iter().map(|o| o.hash).collect();
        assert_eq!(hashes, vec![high_first.hash, high_second.hash, low.hash]);
    }

    #[test]
    fn test_depth_is_descending() {
        let mut bids = BidBook::new();
        bids.insert(order(ALICE, Side::BUY, 100, 49_000, 1));
        bids.insert(order(ALICE, Side::BUY, 100, 51_000, 2));
        bids.insert(order(ALICE, Side::BUY, 100, 50_000, 3));

        let depth = bids.depth_snapshot(2);
        assert_eq!(depth[0].pricepoint, PricePoint::new(51_000));
        assert_eq!(depth[1].pricepoint, PricePoint::new(50_000));
    }

    #[test]
    fn test_remove_drops_empty_level() {
        let mut bids = BidBook::new();
        let bid = order(ALICE, Side::BUY, 100, 50_000, 1);
        bids.insert(bid.clone());

        assert!(bids.remove(&bid.hash, bid.pricepoint).is_some());
        assert_eq!(bids.level_count(), 0);
    }
}
