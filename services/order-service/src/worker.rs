//! Per-pair serialized execution
//!
//! Every pair gets one worker task that owns its [`MatchingEngine`] and
//! drains a bounded command queue in FIFO order. Admissions, cancels and
//! settlement compensation for a pair therefore never interleave, and a
//! cancel racing a match resolves by queue order.

use dashmap::DashMap;
use matching_engine::book::BookSnapshot;
use matching_engine::events::{CancelRequest, EngineEvent, MatchedTrade, SignatureRequest};
use matching_engine::lifecycle;
use matching_engine::validator::{validate_order, ValidationContext};
use matching_engine::{MatchOutcome, MatchingEngine};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use types::errors::{EngineError, OrderError, StorageError, TransportError, ValidationError};
use types::ids::{Address, Hash};
use types::order::{Order, OrderStatus, Side};
use types::pair::Pair;
use types::signing::Signature;
use types::trade::{Trade, TradeStatus};

use crate::config::ServiceConfig;
use crate::dispatcher::Dispatcher;
use crate::settlement::{SettlementBatch, SettlementLedger};
use crate::storage::Storage;

/// Work item for a pair worker
#[derive(Debug)]
pub enum PairCommand {
    /// Validate and admit a client order
    Submit { order: Order },
    /// Owner's cancel request
    Cancel {
        request: CancelRequest,
        requester: Address,
    },
    /// Give the quantity of a FAILED trade back to its orders. With
    /// `withdraw_taker` the taker side is cancelled instead of re-matched.
    Compensate { trade: Trade, withdraw_taker: bool },
    /// Attach the owner's signature to an engine-created order
    AttachSignature {
        order_hash: Hash,
        signature: Signature,
        account: Address,
    },
    /// Depth query
    Snapshot {
        depth: usize,
        reply: oneshot::Sender<BookSnapshot>,
    },
}

/// Collaborators shared by every worker
pub(crate) struct WorkerContext {
    pub storage: Arc<dyn Storage>,
    pub dispatcher: Arc<Dispatcher>,
    pub ledger: Arc<SettlementLedger>,
    pub config: ServiceConfig,
}

/// Lazily spawns one worker per pair and forwards commands to it
pub struct PairRouter {
    workers: DashMap<String, mpsc::Sender<PairCommand>>,
    context: Arc<WorkerContext>,
}

impl PairRouter {
    pub(crate) fn new(context: Arc<WorkerContext>) -> Self {
        Self {
            workers: DashMap::new(),
            context,
        }
    }

    /// Queue `command` for the worker of `pair_name`, spawning it if needed
    pub async fn send(&self, pair_name: &str, command: PairCommand) -> Result<(), EngineError> {
        let existing = self.workers.get(pair_name).map(|s| s.value().clone());
        let sender = match existing {
            Some(sender) => sender,
            None => {
                let pair = self
                    .context
                    .storage
                    .get_pair(pair_name)
                    .await?
                    .ok_or_else(|| StorageError::NotFound(pair_name.to_string()))?;
                self.workers
                    .entry(pair_name.to_string())
                    .or_insert_with(|| self.spawn(pair))
                    .value()
                    .clone()
            }
        };

        if sender.send(command).await.is_err() {
            error!(pair = %pair_name, "pair worker stopped");
            self.workers.remove(pair_name);
            return Err(TransportError::Closed.into());
        }
        Ok(())
    }

    /// Number of running workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn spawn(&self, pair: Pair) -> mpsc::Sender<PairCommand> {
        let (sender, receiver) = mpsc::channel(self.context.config.pair_queue_capacity);
        info!(pair = %pair.name(), "starting pair worker");
        let worker = PairWorker {
            engine: MatchingEngine::new(pair),
            context: self.context.clone(),
        };
        tokio::spawn(worker.run(receiver));
        sender
    }
}

struct PairWorker {
    engine: MatchingEngine,
    context: Arc<WorkerContext>,
}

impl PairWorker {
    async fn run(mut self, mut receiver: mpsc::Receiver<PairCommand>) {
        self.hydrate().await;

        while let Some(command) = receiver.recv().await {
            match command {
                PairCommand::Submit { order } => self.submit(order).await,
                PairCommand::Cancel { request, requester } => self.cancel(request, requester).await,
                PairCommand::Compensate {
                    trade,
                    withdraw_taker,
                } => self.compensate(trade, withdraw_taker).await,
                PairCommand::AttachSignature {
                    order_hash,
                    signature,
                    account,
                } => self.attach_signature(order_hash, signature, account).await,
                PairCommand::Snapshot { depth, reply } => {
                    let _ = reply.send(self.engine.snapshot(depth));
                }
            }
        }
        debug!(pair = %self.pair_name(), "pair worker exiting");
    }

    fn pair_name(&self) -> &str {
        self.engine.book().pair_name()
    }

    fn notify(&self, account: &Address, event: EngineEvent) {
        self.context.dispatcher.notify(account, event);
    }

    /// Load resting orders persisted by a previous run
    async fn hydrate(&mut self) {
        let pair_name = self.pair_name().to_string();
        let depth = self.context.config.book_hydration_depth;
        for side in [Side::BUY, Side::SELL] {
            let orders = match self.context.storage.get_order_book(&pair_name, side, depth).await {
                Ok(orders) => orders,
                Err(e) => {
                    error!(pair = %pair_name, side = %side, error = %e, "book hydration failed");
                    continue;
                }
            };
            for order in orders {
                let hash = order.hash;
                if let Err(e) = self.engine.load(order) {
                    warn!(pair = %pair_name, order = %hash, error = %e, "skipping unloadable order");
                }
            }
        }
        info!(pair = %pair_name, resting = self.engine.book().len(), "book hydrated");
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    async fn submit(&mut self, mut order: Order) {
        let owner = order.user_address;
        let hash = order.hash;

        if let Err(e) = self.admit(&mut order).await {
            warn!(pair = %self.pair_name(), order = %hash, error = %e, "order rejected");
            self.notify(&owner, EngineEvent::order_error(e.code(), e.to_string(), hash));
            return;
        }
        info!(pair = %self.pair_name(), order = %hash, side = %order.side, "order admitted");

        if let Err(e) = self.execute(order).await {
            self.notify(&owner, EngineEvent::order_error(e.code(), e.to_string(), hash));
        }
    }

    /// Validate, record the nonce and persist the new OPEN order
    async fn admit(&self, order: &mut Order) -> Result<(), EngineError> {
        let storage = &self.context.storage;
        let last_nonce = storage.get_last_nonce(&order.user_address).await?;
        let context = ValidationContext {
            exchange_address: self.context.config.exchange_address,
            last_nonce,
            pair: Some(self.engine.pair()),
        };
        validate_order(order, &context)?;

        lifecycle::admit(order);
        order.created_at = types::now_nanos();

        storage
            .record_nonce(&order.user_address, order.nonce)
            .await
            .map_err(|e| match e {
                StorageError::StaleNonce {
                    provided,
                    last_seen,
                } => EngineError::from(ValidationError::InvalidNonce {
                    provided,
                    last_seen,
                }),
                other => other.into(),
            })?;
        storage.create_order(order).await.map_err(|e| match e {
            StorageError::AlreadyExists(hash) => EngineError::from(OrderError::Duplicate { hash }),
            other => other.into(),
        })?;
        Ok(())
    }

    /// Match an order already known to storage, persist the result, apply it
    /// to the book and hand any trades to settlement
    async fn execute(&mut self, order: Order) -> Result<(), EngineError> {
        let hash = order.hash;
        let outcome = match self.engine.plan(order.clone(), types::now_nanos()) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(pair = %self.pair_name(), order = %hash, error = %e, "matching failed");
                self.reject(order).await;
                return Err(e);
            }
        };
        let request = match self.signature_request(&outcome) {
            Ok(request) => request,
            Err(e) => {
                error!(pair = %self.pair_name(), order = %hash, error = %e, "matching failed");
                self.reject(order).await;
                return Err(e);
            }
        };

        if let Err(e) = self.persist(&outcome).await {
            error!(pair = %self.pair_name(), order = %hash, error = %e, "persisting match failed");
            self.rollback(&outcome).await;
            self.reject(order).await;
            return Err(e);
        }
        if let Err(e) = self.engine.commit(&outcome) {
            error!(pair = %self.pair_name(), order = %hash, error = %e, "commit failed");
            return Err(e);
        }

        let owner = outcome.taker.user_address;
        match request {
            None => {
                if let Some(resting) = outcome.resting() {
                    self.notify(&owner, EngineEvent::OrderAdded(resting.clone()));
                }
            }
            Some(request) => {
                info!(
                    pair = %self.pair_name(),
                    order = %hash,
                    trades = outcome.trades.len(),
                    status = %outcome.taker.status,
                    "order matched"
                );
                self.context.ledger.begin(SettlementBatch {
                    taker_order: outcome.taker.clone(),
                    residual: outcome.residual.as_ref().map(|r| r.hash),
                    trades: outcome
                        .trades
                        .iter()
                        .cloned()
                        .zip(outcome.makers.iter().cloned())
                        .collect(),
                });
                if let Some(resting) = outcome.resting() {
                    self.notify(&owner, EngineEvent::OrderAdded(resting.clone()));
                }
                self.notify(&owner, EngineEvent::RequestSignature(request));
            }
        }
        Ok(())
    }

    fn signature_request(&self, outcome: &MatchOutcome) -> Result<Option<SignatureRequest>, EngineError> {
        if !outcome.has_trades() {
            return Ok(None);
        }
        let pair = self.engine.pair();
        let matches = outcome
            .trades
            .iter()
            .zip(&outcome.makers)
            .map(|(trade, maker)| -> Result<MatchedTrade, EngineError> {
                Ok(MatchedTrade {
                    maker_order: maker.clone(),
                    trade: trade.clone(),
                    quote_amount: pair.quote_amount(trade.amount, trade.pricepoint)?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(Some(SignatureRequest {
            taker_order_hash: outcome.taker.hash,
            matches,
            remaining_order: outcome.residual.clone(),
        }))
    }

    async fn persist(&self, outcome: &MatchOutcome) -> Result<(), EngineError> {
        let storage = &self.context.storage;
        for trade in &outcome.trades {
            storage.create_trade(trade).await?;
        }
        if let Some(residual) = &outcome.residual {
            storage.create_order(residual).await?;
        }
        for maker in &outcome.makers {
            storage.update_order(maker).await?;
        }
        storage.update_order(&outcome.taker).await?;
        Ok(())
    }

    /// Best-effort undo of a partly persisted match. The book was not
    /// touched, so it still holds the makers as they were.
    async fn rollback(&self, outcome: &MatchOutcome) {
        let storage = &self.context.storage;
        for trade in &outcome.trades {
            if let Ok(Some(_)) = storage.get_trade_by_hash(&trade.hash).await {
                if let Err(e) = storage
                    .update_trade_status(&trade.hash, TradeStatus::FAILED, None)
                    .await
                {
                    error!(trade = %trade.hash, error = %e, "rollback: trade left pending");
                }
            }
        }
        if let Some(residual) = &outcome.residual {
            let mut residual = residual.clone();
            if lifecycle::reject(&mut residual).is_ok() {
                if let Err(e) = storage.update_order(&residual).await {
                    debug!(order = %residual.hash, error = %e, "rollback: residual not stored");
                }
            }
        }
        for maker in &outcome.makers {
            if let Some(original) = self.engine.book().get(&maker.hash) {
                if let Err(e) = storage.update_order(original).await {
                    error!(order = %maker.hash, error = %e, "rollback: maker left modified");
                }
            }
        }
    }

    async fn reject(&self, mut order: Order) {
        if lifecycle::reject(&mut order).is_ok() {
            if let Err(e) = self.context.storage.update_order(&order).await {
                error!(order = %order.hash, error = %e, "failed to record rejection");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    async fn cancel(&mut self, request: CancelRequest, requester: Address) {
        let hash = request.order_hash;
        match self.try_cancel(&request, &requester).await {
            Ok(cancelled) => {
                info!(pair = %self.pair_name(), order = %hash, "order cancelled");
                let owner = cancelled.user_address;
                self.notify(&owner, EngineEvent::OrderCancelled(cancelled));
            }
            Err(e) => {
                warn!(pair = %self.pair_name(), order = %hash, error = %e, "cancel refused");
                self.notify(&requester, EngineEvent::order_error(e.code(), e.to_string(), hash));
            }
        }
    }

    async fn try_cancel(&mut self, request: &CancelRequest, requester: &Address) -> Result<Order, EngineError> {
        let signer = request
            .signature
            .recover(&request.order_hash)
            .map_err(ValidationError::from)?;
        if &signer != requester {
            return Err(ValidationError::SignerMismatch {
                claimed: requester.to_string(),
                recovered: signer.to_string(),
            }
            .into());
        }

        let resting = match self.engine.check_cancel(&request.order_hash, requester) {
            Ok(order) => order.clone(),
            Err(OrderError::NotFound { .. }) => {
                return Err(self.not_resting(&request.order_hash, requester).await.into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut cancelled = resting;
        lifecycle::transition(&mut cancelled, OrderStatus::Cancelled)?;
        self.context.storage.update_order(&cancelled).await?;
        self.engine.cancel(&request.order_hash, requester)?;
        Ok(cancelled)
    }

    /// Explain why an order is not in the book
    async fn not_resting(&self, hash: &Hash, requester: &Address) -> OrderError {
        match self.context.storage.get_order_by_hash(hash).await {
            Ok(Some(order)) if &order.user_address != requester => OrderError::NotOwner {
                hash: hash.to_string(),
                requester: requester.to_string(),
            },
            Ok(Some(order)) if order.status.is_terminal() => OrderError::AlreadyTerminal {
                status: order.status.to_string(),
            },
            _ => OrderError::NotFound {
                hash: hash.to_string(),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Compensation
    // -----------------------------------------------------------------------

    async fn compensate(&mut self, trade: Trade, withdraw_taker: bool) {
        info!(
            pair = %self.pair_name(),
            trade = %trade.hash,
            withdraw_taker,
            "compensating failed trade"
        );
        // the taker goes first so a restored maker cannot cross it again
        if withdraw_taker {
            if let Err(e) = self.withdraw(&trade.taker_order_hash, &trade).await {
                error!(
                    pair = %self.pair_name(),
                    trade = %trade.hash,
                    order = %trade.taker_order_hash,
                    error = %e,
                    "taker withdrawal failed"
                );
            }
        }
        let restorable = if withdraw_taker {
            vec![trade.maker_order_hash]
        } else {
            vec![trade.maker_order_hash, trade.taker_order_hash]
        };
        for hash in restorable {
            if let Err(e) = self.restore(&hash, &trade).await {
                error!(
                    pair = %self.pair_name(),
                    trade = %trade.hash,
                    order = %hash,
                    error = %e,
                    "compensation failed"
                );
            }
        }
    }

    async fn restore(&mut self, hash: &Hash, trade: &Trade) -> Result<(), EngineError> {
        let storage = self.context.storage.clone();

        if self.engine.book().contains(hash) {
            let mut restored = self.engine.book().get(hash).cloned().ok_or_else(|| {
                OrderError::NotFound {
                    hash: hash.to_string(),
                }
            })?;
            lifecycle::reopen(&mut restored, trade.amount)?;
            storage.update_order(&restored).await?;
            let restored = self.engine.restore(hash, trade.amount)?;
            let owner = restored.user_address;
            self.notify(&owner, EngineEvent::OrderAdded(restored));
            return Ok(());
        }

        let order = storage
            .get_order_by_hash(hash)
            .await?
            .ok_or_else(|| OrderError::NotFound {
                hash: hash.to_string(),
            })?;

        match order.status {
            OrderStatus::Filled | OrderStatus::Partial => {
                let mut reopened = order;
                lifecycle::reopen(&mut reopened, trade.amount)?;
                storage.update_order(&reopened).await?;
                self.execute(reopened).await
            }
            OrderStatus::Replaced => {
                let successor = order.restored(trade.amount, trade.hash, types::now_nanos());
                storage.create_order(&successor).await?;
                self.execute(successor).await
            }
            OrderStatus::Cancelled | OrderStatus::Rejected => {
                debug!(order = %hash, status = %order.status, "not reinstating closed order");
                Ok(())
            }
            OrderStatus::Open => {
                warn!(order = %hash, "open order outside the book, nothing to restore");
                Ok(())
            }
        }
    }

    /// Cancel what is left of a taker order whose owner never authorized
    /// the trade. The trade amount is unfilled first so the cancelled record
    /// only counts settled quantity. A REPLACED order keeps its status and
    /// its resting successor is cancelled instead.
    async fn withdraw(&mut self, hash: &Hash, trade: &Trade) -> Result<(), EngineError> {
        let storage = self.context.storage.clone();

        let order = match self.engine.book().get(hash) {
            Some(resting) => resting.clone(),
            None => storage
                .get_order_by_hash(hash)
                .await?
                .ok_or_else(|| OrderError::NotFound {
                    hash: hash.to_string(),
                })?,
        };

        match order.status {
            OrderStatus::Filled | OrderStatus::Partial => {
                let mut cancelled = order;
                lifecycle::reopen(&mut cancelled, trade.amount)?;
                lifecycle::transition(&mut cancelled, OrderStatus::Cancelled)?;
                self.close_out(cancelled).await
            }
            OrderStatus::Replaced => {
                let mut next = order.superseded_by;
                while let Some(successor) = next {
                    if let Some(resting) = self.engine.book().get(&successor) {
                        let mut cancelled = resting.clone();
                        lifecycle::transition(&mut cancelled, OrderStatus::Cancelled)?;
                        return self.close_out(cancelled).await;
                    }
                    next = storage
                        .get_order_by_hash(&successor)
                        .await?
                        .and_then(|o| o.superseded_by);
                }
                Ok(())
            }
            OrderStatus::Open | OrderStatus::Cancelled | OrderStatus::Rejected => {
                debug!(order = %hash, status = %order.status, "nothing to withdraw");
                Ok(())
            }
        }
    }

    /// Persist a CANCELLED record, drop it from the book if it rests there
    /// and tell its owner
    async fn close_out(&mut self, cancelled: Order) -> Result<(), EngineError> {
        self.context.storage.update_order(&cancelled).await?;
        let owner = cancelled.user_address;
        if self.engine.book().contains(&cancelled.hash) {
            self.engine.cancel(&cancelled.hash, &owner)?;
        }
        info!(pair = %self.pair_name(), order = %cancelled.hash, "taker order withdrawn");
        self.notify(&owner, EngineEvent::OrderCancelled(cancelled));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Residual signatures
    // -----------------------------------------------------------------------

    async fn attach_signature(&mut self, hash: Hash, signature: Signature, account: Address) {
        if let Err(e) = self.try_attach_signature(&hash, signature, &account).await {
            warn!(order = %hash, error = %e, "residual signature refused");
            self.notify(&account, EngineEvent::order_error(e.code(), e.to_string(), hash));
        }
    }

    async fn try_attach_signature(
        &mut self,
        hash: &Hash,
        signature: Signature,
        account: &Address,
    ) -> Result<(), EngineError> {
        let mut order = match self.engine.book().get(hash) {
            Some(order) => order.clone(),
            None => self
                .context
                .storage
                .get_order_by_hash(hash)
                .await?
                .ok_or_else(|| OrderError::NotFound {
                    hash: hash.to_string(),
                })?,
        };
        if &order.user_address != account {
            return Err(OrderError::NotOwner {
                hash: hash.to_string(),
                requester: account.to_string(),
            }
            .into());
        }
        let signer = signature.recover(hash).map_err(ValidationError::from)?;
        if &signer != account {
            return Err(ValidationError::SignerMismatch {
                claimed: account.to_string(),
                recovered: signer.to_string(),
            }
            .into());
        }

        order.signature = Some(signature);
        self.context.storage.update_order(&order).await?;
        if self.engine.book().contains(hash) {
            self.engine.refresh(order)?;
        }
        debug!(order = %hash, "residual order signed");
        Ok(())
    }
}
