//! Shared fixtures for the order service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use matching_engine::events::{EngineEvent, SignatureRequest, SignatureResponse, TradeSignature};
use order_service::{
    ChainClient, MemoryStore, OrderService, OutboundMessage, ServiceConfig, SignedTrade, Storage,
    SubmitStatus,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use types::account::Account;
use types::deposit::{DepositOutcome, DepositTransaction};
use types::errors::{ErrorCode, StorageError, TransportError};
use types::ids::{Address, ConnectionId, Hash};
use types::numeric::{Amount, PricePoint};
use types::order::{Order, Side};
use types::pair::Pair;
use types::signing::Wallet;
use types::trade::{Trade, TradeStatus};

pub const ALICE: u8 = 1;
pub const BOB: u8 = 2;
pub const CAROL: u8 = 3;
pub const DAVE: u8 = 4;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn wallet(seed: u8) -> Wallet {
    Wallet::from_secret([seed; 32])
}

pub fn exchange() -> Address {
    Address::from_bytes([0xee; 20])
}

pub fn pair() -> Pair {
    Pair {
        base_token_symbol: "ZRX".to_owned(),
        base_token_address: Address::from_bytes([0x01; 20]),
        base_token_decimals: 18,
        quote_token_symbol: "WETH".to_owned(),
        quote_token_address: Address::from_bytes([0x02; 20]),
        quote_token_decimals: 18,
        pricepoint_multiplier: 1_000_000,
        active: true,
        make_fee: Amount::ZERO,
        take_fee: Amount::ZERO,
    }
}

/// Signed order on `pair` owned by the wallet of `seed`
pub fn order_on(pair: &Pair, seed: u8, side: Side, amount: u128, pricepoint: u128, nonce: u64) -> Order {
    let owner = wallet(seed);
    let mut order = Order::new(
        pair,
        side,
        Amount::new(amount),
        PricePoint::new(pricepoint),
        owner.address(),
        exchange(),
        nonce,
        1708123456789000000,
    );
    order.sign(&owner);
    order
}

pub fn order(seed: u8, side: Side, amount: u128, pricepoint: u128, nonce: u64) -> Order {
    order_on(&pair(), seed, side, amount, pricepoint, nonce)
}

/// Sign every trade of a request, and the residual if there is one
pub fn sign_request(seed: u8, request: &SignatureRequest) -> SignatureResponse {
    let signer = wallet(seed);
    SignatureResponse {
        taker_order_hash: request.taker_order_hash,
        trades: request
            .matches
            .iter()
            .map(|m| TradeSignature {
                trade_hash: m.trade.hash,
                signature: signer.sign_hash(&m.trade.hash),
            })
            .collect(),
        remaining_order: request
            .remaining_order
            .as_ref()
            .map(|residual| signer.sign_hash(&residual.hash)),
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Chain client answering from a script, then confirming everything
#[derive(Default)]
pub struct ScriptedChain {
    script: Mutex<VecDeque<Result<SubmitStatus, TransportError>>>,
    submitted: Mutex<Vec<SignedTrade>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, response: Result<SubmitStatus, TransportError>) -> Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    /// Hold every answer until `gate` is notified once per submission
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn submitted(&self) -> Vec<SignedTrade> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn submit_trade(&self, trade: &SignedTrade) -> Result<SubmitStatus, TransportError> {
        self.submitted.lock().unwrap().push(trade.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(SubmitStatus::Success {
                tx_ref: format!("0x{}", trade.trade.hash.short()),
            })
        })
    }
}

/// Memory store whose trade inserts can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_trades: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_trades(&self, fail: bool) {
        self.fail_trades.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for FlakyStore {
    async fn get_pair(&self, name: &str) -> Result<Option<Pair>, StorageError> {
        self.inner.get_pair(name).await
    }

    async fn get_pair_by_tokens(
        &self,
        base: &Address,
        quote: &Address,
    ) -> Result<Option<Pair>, StorageError> {
        self.inner.get_pair_by_tokens(base, quote).await
    }

    async fn get_order_by_hash(&self, hash: &Hash) -> Result<Option<Order>, StorageError> {
        self.inner.get_order_by_hash(hash).await
    }

    async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
        self.inner.create_order(order).await
    }

    async fn update_order(&self, order: &Order) -> Result<(), StorageError> {
        self.inner.update_order(order).await
    }

    async fn create_trade(&self, trade: &Trade) -> Result<(), StorageError> {
        if self.fail_trades.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("trade table offline".to_string()));
        }
        self.inner.create_trade(trade).await
    }

    async fn get_trade_by_hash(&self, hash: &Hash) -> Result<Option<Trade>, StorageError> {
        self.inner.get_trade_by_hash(hash).await
    }

    async fn update_trade_status(
        &self,
        hash: &Hash,
        status: TradeStatus,
        tx_ref: Option<String>,
    ) -> Result<(), StorageError> {
        self.inner.update_trade_status(hash, status, tx_ref).await
    }

    async fn get_order_book(
        &self,
        pair_name: &str,
        side: Side,
        depth: usize,
    ) -> Result<Vec<Order>, StorageError> {
        self.inner.get_order_book(pair_name, side, depth).await
    }

    async fn get_last_nonce(&self, account: &Address) -> Result<Option<u64>, StorageError> {
        self.inner.get_last_nonce(account).await
    }

    async fn record_nonce(&self, account: &Address, nonce: u64) -> Result<(), StorageError> {
        self.inner.record_nonce(account, nonce).await
    }

    async fn find_or_create_account(&self, address: &Address) -> Result<Account, StorageError> {
        self.inner.find_or_create_account(address).await
    }

    async fn get_account(&self, address: &Address) -> Result<Option<Account>, StorageError> {
        self.inner.get_account(address).await
    }

    async fn credit_deposit(
        &self,
        deposit: &DepositTransaction,
    ) -> Result<DepositOutcome, StorageError> {
        self.inner.credit_deposit(deposit).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn config() -> ServiceConfig {
    ServiceConfig {
        exchange_address: exchange(),
        ..ServiceConfig::default()
    }
}

pub struct Harness {
    pub service: OrderService,
    pub store: Arc<MemoryStore>,
    pub chain: Arc<ScriptedChain>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(config(), ScriptedChain::new())
    }

    pub fn with(config: ServiceConfig, chain: ScriptedChain) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        store.insert_pair(pair());
        let chain = Arc::new(chain);
        let service = OrderService::new(config, store.clone(), chain.clone()).unwrap();
        Self {
            service,
            store,
            chain,
        }
    }

    /// Connect the account of `seed`
    pub fn client(&self, seed: u8) -> Client {
        let (connection, events) = self.service.connect(wallet(seed).address());
        Client { connection, events }
    }
}

pub struct Client {
    pub connection: ConnectionId,
    pub events: UnboundedReceiver<OutboundMessage>,
}

impl Client {
    pub async fn next(&mut self) -> EngineEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream closed")
            .event
    }

    pub async fn expect_added(&mut self) -> Order {
        match self.next().await {
            EngineEvent::OrderAdded(order) => order,
            other => panic!("expected ORDER_ADDED, got {other:?}"),
        }
    }

    pub async fn expect_signature_request(&mut self) -> SignatureRequest {
        match self.next().await {
            EngineEvent::RequestSignature(request) => request,
            other => panic!("expected REQUEST_SIGNATURE, got {other:?}"),
        }
    }

    pub async fn expect_pending(&mut self) -> Trade {
        match self.next().await {
            EngineEvent::OrderPending(notice) => notice.trade,
            other => panic!("expected ORDER_PENDING, got {other:?}"),
        }
    }

    pub async fn expect_success(&mut self) -> Trade {
        match self.next().await {
            EngineEvent::OrderSuccess(notice) => notice.trade,
            other => panic!("expected ORDER_SUCCESS, got {other:?}"),
        }
    }

    pub async fn expect_cancelled(&mut self) -> Order {
        match self.next().await {
            EngineEvent::OrderCancelled(order) => order,
            other => panic!("expected ORDER_CANCELLED, got {other:?}"),
        }
    }

    pub async fn expect_error(&mut self, code: ErrorCode) {
        match self.next().await {
            EngineEvent::Error(payload) => assert_eq!(payload.code, code, "{}", payload.message),
            other => panic!("expected ERROR {code:?}, got {other:?}"),
        }
    }

    /// Nothing queued right now
    pub fn assert_quiet(&mut self) {
        if let Ok(message) = self.events.try_recv() {
            panic!("unexpected event {:?}", message.event);
        }
    }
}

/// Poll `check` until it holds or the event timeout elapses
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
