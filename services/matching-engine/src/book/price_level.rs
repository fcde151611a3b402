//! One pricepoint of one side: a FIFO of resting orders and their
//! running remainder.

use std::collections::VecDeque;
use types::ids::Hash;
use types::numeric::Amount;
use types::order::Order;

#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    queue: VecDeque<Order>,
    /// Sum of `remaining()` over `queue`
    remaining: Amount,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the back of the queue
    pub fn push_back(&mut self, order: Order) {
        self.remaining = saturating(self.remaining, order.remaining(), Amount::ZERO);
        self.queue.push_back(order);
    }

    pub fn remove(&mut self, hash: &Hash) -> Option<Order> {
        let at = self.queue.iter().position(|resting| resting.hash == *hash)?;
        let taken = self.queue.remove(at)?;
        self.remaining = saturating(self.remaining, Amount::ZERO, taken.remaining());
        Some(taken)
    }

    /// Overwrite the stored snapshot of `order`, keeping its place in line.
    /// False when the hash does not rest here.
    pub fn replace(&mut self, order: Order) -> bool {
        let Some(slot) = self.queue.iter_mut().find(|resting| resting.hash == order.hash) else {
            return false;
        };
        self.remaining = saturating(self.remaining, order.remaining(), slot.remaining());
        *slot = order;
        true
    }

    pub fn front(&self) -> Option<&Order> {
        self.queue.front()
    }

    pub fn get(&self, hash: &Hash) -> Option<&Order> {
        self.queue.iter().find(|resting| resting.hash == *hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.queue.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn total_remaining(&self) -> Amount {
        self.remaining
    }

    pub fn order_count(&self) -> usize {
        self.queue.len()
    }
}

/// `total + plus - minus`, clamped to the u128 range
fn saturating(total: Amount, plus: Amount, minus: Amount) -> Amount {
    Amount::new(
        total
            .as_u128()
            .saturating_add(plus.as_u128())
            .saturating_sub(minus.as_u128()),
    )
}
