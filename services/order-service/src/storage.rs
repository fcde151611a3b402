//! Storage capability
//!
//! The trading core persists orders, trades, nonces and balances through
//! [`Storage`]. [`MemoryStore`] is the in-process adapter used by tests and
//! single-node deployments.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use matching_engine::lifecycle;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use types::account::Account;
use types::deposit::{DepositOutcome, DepositTransaction};
use types::errors::StorageError;
use types::ids::{Address, Hash};
use types::order::{Order, Side};
use types::pair::Pair;
use types::trade::{Trade, TradeStatus};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_pair(&self, name: &str) -> Result<Option<Pair>, StorageError>;

    async fn get_pair_by_tokens(
        &self,
        base: &Address,
        quote: &Address,
    ) -> Result<Option<Pair>, StorageError>;

    async fn get_order_by_hash(&self, hash: &Hash) -> Result<Option<Order>, StorageError>;

    /// Insert a new order. Fails with `AlreadyExists` on a known hash.
    async fn create_order(&self, order: &Order) -> Result<(), StorageError>;

    /// Overwrite the mutable fields of a known order (status, fills,
    /// successor link, signature).
    async fn update_order(&self, order: &Order) -> Result<(), StorageError>;

    async fn create_trade(&self, trade: &Trade) -> Result<(), StorageError>;

    async fn get_trade_by_hash(&self, hash: &Hash) -> Result<Option<Trade>, StorageError>;

    async fn update_trade_status(
        &self,
        hash: &Hash,
        status: TradeStatus,
        tx_ref: Option<String>,
    ) -> Result<(), StorageError>;

    /// Resting orders of one side in price-time priority
    async fn get_order_book(
        &self,
        pair_name: &str,
        side: Side,
        depth: usize,
    ) -> Result<Vec<Order>, StorageError>;

    async fn get_last_nonce(&self, account: &Address) -> Result<Option<u64>, StorageError>;

    /// Record `nonce` only if it is above the last recorded one.
    async fn record_nonce(&self, account: &Address, nonce: u64) -> Result<(), StorageError>;

    async fn find_or_create_account(&self, address: &Address) -> Result<Account, StorageError>;

    async fn get_account(&self, address: &Address) -> Result<Option<Account>, StorageError>;

    /// Credit a deposit once per `tx_ref`.
    async fn credit_deposit(
        &self,
        deposit: &DepositTransaction,
    ) -> Result<DepositOutcome, StorageError>;
}

#[derive(Debug, Clone)]
struct StoredOrder {
    /// Insertion sequence, used as time priority
    sequence: u64,
    order: Order,
}

/// In-memory [`Storage`] backed by concurrent maps
#[derive(Debug, Default)]
pub struct MemoryStore {
    pairs: DashMap<String, Pair>,
    orders: DashMap<Hash, StoredOrder>,
    trades: DashMap<Hash, Trade>,
    nonces: DashMap<Address, u64>,
    accounts: DashMap<Address, Account>,
    deposits: DashMap<String, DepositTransaction>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tradable pair
    pub fn insert_pair(&self, pair: Pair) {
        self.pairs.insert(pair.name(), pair);
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get_pair(&self, name: &str) -> Result<Option<Pair>, StorageError> {
        Ok(self.pairs.get(name).map(|p| p.value().clone()))
    }

    async fn get_pair_by_tokens(
        &self,
        base: &Address,
        quote: &Address,
    ) -> Result<Option<Pair>, StorageError> {
        Ok(self
            .pairs
            .iter()
            .find(|p| &p.base_token_address == base && &p.quote_token_address == quote)
            .map(|p| p.value().clone()))
    }

    async fn get_order_by_hash(&self, hash: &Hash) -> Result<Option<Order>, StorageError> {
        Ok(self.orders.get(hash).map(|stored| stored.order.clone()))
    }

    async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
        match self.orders.entry(order.hash) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(order.hash.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(StoredOrder {
                    sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                    order: order.clone(),
                });
                Ok(())
            }
        }
    }

    async fn update_order(&self, order: &Order) -> Result<(), StorageError> {
        let mut stored = self
            .orders
            .get_mut(&order.hash)
            .ok_or_else(|| StorageError::NotFound(order.hash.to_string()))?;
        stored.order.status = order.status;
        stored.order.filled_amount = order.filled_amount;
        stored.order.superseded_by = order.superseded_by;
        stored.order.signature = order.signature.clone();
        Ok(())
    }

    async fn create_trade(&self, trade: &Trade) -> Result<(), StorageError> {
        match self.trades.entry(trade.hash) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(trade.hash.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(trade.clone());
                Ok(())
            }
        }
    }

    async fn get_trade_by_hash(&self, hash: &Hash) -> Result<Option<Trade>, StorageError> {
        Ok(self.trades.get(hash).map(|t| t.value().clone()))
    }

    async fn update_trade_status(
        &self,
        hash: &Hash,
        status: TradeStatus,
        tx_ref: Option<String>,
    ) -> Result<(), StorageError> {
        let mut trade = self
            .trades
            .get_mut(hash)
            .ok_or_else(|| StorageError::NotFound(hash.to_string()))?;
        // PENDING -> PENDING only attaches a transaction reference
        let refresh = trade.status == TradeStatus::PENDING && status == TradeStatus::PENDING;
        if !refresh && !lifecycle::can_settle(trade.status, status) {
            return Err(StorageError::Invalid(format!(
                "trade {hash} cannot move from {} to {status}",
                trade.status
            )));
        }
        trade.status = status;
        if tx_ref.is_some() {
            trade.tx_ref = tx_ref;
        }
        Ok(())
    }

    async fn get_order_book(
        &self,
        pair_name: &str,
        side: Side,
        depth: usize,
    ) -> Result<Vec<Order>, StorageError> {
        let mut resting: Vec<StoredOrder> = self
            .orders
            .iter()
            .filter(|stored| {
                let order = &stored.order;
                order.pair_name == pair_name
                    && order.side == side
                    && order.status.is_restable()
                    && !order.remaining().is_zero()
            })
            .map(|stored| stored.value().clone())
            .collect();

        resting.sort_by(|a, b| {
            let by_price = match side {
                Side::BUY => b.order.pricepoint.cmp(&a.order.pricepoint),
                Side::SELL => a.order.pricepoint.cmp(&b.order.pricepoint),
            };
            by_price.then(a.sequence.cmp(&b.sequence))
        });

        Ok(resting
            .into_iter()
            .take(depth)
            .map(|stored| stored.order)
            .collect())
    }

    async fn get_last_nonce(&self, account: &Address) -> Result<Option<u64>, StorageError> {
        Ok(self.nonces.get(account).map(|n| *n))
    }

    async fn record_nonce(&self, account: &Address, nonce: u64) -> Result<(), StorageError> {
        match self.nonces.entry(*account) {
            Entry::Occupied(mut last) => {
                let last_seen = *last.get();
                if nonce <= last_seen {
                    return Err(StorageError::StaleNonce {
                        provided: nonce,
                        last_seen,
                    });
                }
                last.insert(nonce);
            }
            Entry::Vacant(slot) => {
                slot.insert(nonce);
            }
        }
        Ok(())
    }

    async fn find_or_create_account(&self, address: &Address) -> Result<Account, StorageError> {
        Ok(self
            .accounts
            .entry(*address)
            .or_insert_with(|| Account::new(*address, types::now_nanos()))
            .value()
            .clone())
    }

    async fn get_account(&self, address: &Address) -> Result<Option<Account>, StorageError> {
        Ok(self.accounts.get(address).map(|a| a.value().clone()))
    }

    async fn credit_deposit(
        &self,
        deposit: &DepositTransaction,
    ) -> Result<DepositOutcome, StorageError> {
        // deposits before accounts, always
        match self.deposits.entry(deposit.tx_ref.clone()) {
            Entry::Occupied(_) => {
                debug!(tx_ref = %deposit.tx_ref, "deposit already credited");
                Ok(DepositOutcome::Duplicate)
            }
            Entry::Vacant(slot) => {
                let mut account = self
                    .accounts
                    .entry(deposit.address)
                    .or_insert_with(|| Account::new(deposit.address, types::now_nanos()));
                let balance = account
                    .credit(deposit.token, deposit.amount)
                    .map_err(|e| StorageError::Invalid(e.to_string()))?;
                slot.insert(deposit.clone());
                Ok(DepositOutcome::Credited(balance))
            }
        }
    }
}
