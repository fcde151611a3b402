//! Settlement coordination
//!
//! A matched trade stays PENDING while the taker signs its exact terms and
//! the chain settles it. [`SettlementLedger`] holds those pending records;
//! pair workers register a batch before any event about it leaves the
//! worker. [`SettlementCoordinator`] drives each record to SUCCESS or
//! FAILED and asks the owning pair worker to compensate failures.
//!
//! Record states: AwaitingSignature → Signed → Submitting → Submitted →
//! (removed). A transport error during submission puts the record back to
//! Signed so it can be resubmitted. Only an AwaitingSignature record can be
//! failed for the taker's fault (timeout or bad signature).

use dashmap::DashMap;
use matching_engine::events::{EngineEvent, SignatureResponse, TradeNotice};
use matching_engine::lifecycle;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use types::errors::{ErrorCode, SettlementError, TradeError};
use types::ids::{Address, Hash};
use types::order::Order;
use types::signing::Signature;
use types::trade::{Trade, TradeStatus};

use crate::chain::{ChainClient, ChainOutcome, SignedTrade, SubmitStatus};
use crate::dispatcher::Dispatcher;
use crate::storage::Storage;
use crate::worker::{PairCommand, PairRouter};

/// Trades produced by one incoming order
#[derive(Debug, Clone)]
pub struct SettlementBatch {
    pub taker_order: Order,
    /// Residual record the taker may sign alongside the trades
    pub residual: Option<Hash>,
    /// Each trade with its maker order snapshot
    pub trades: Vec<(Trade, Order)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementState {
    AwaitingSignature { since: Instant },
    Signed { signature: Signature },
    /// Handed to the chain, no answer yet
    Submitting { signature: Signature },
    Submitted {
        signature: Signature,
        tx_ref: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct PendingSettlement {
    pub trade: Trade,
    pub maker_order: Order,
    pub taker_order: Order,
    pub state: SettlementState,
}

#[derive(Debug, Clone, Default)]
struct TakerEntry {
    trades: Vec<Hash>,
    residual: Option<Hash>,
}

/// Pending trades keyed by trade hash, indexed by taker order
#[derive(Default)]
pub struct SettlementLedger {
    pending: DashMap<Hash, PendingSettlement>,
    by_taker: DashMap<Hash, TakerEntry>,
}

impl SettlementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every trade of a batch as awaiting the taker's signature
    pub fn begin(&self, batch: SettlementBatch) {
        let since = Instant::now();
        let taker_hash = batch.taker_order.hash;
        let mut entry = self.by_taker.entry(taker_hash).or_default();
        if batch.residual.is_some() {
            entry.residual = batch.residual;
        }
        for (trade, maker_order) in batch.trades {
            entry.trades.push(trade.hash);
            self.pending.insert(
                trade.hash,
                PendingSettlement {
                    trade,
                    maker_order,
                    taker_order: batch.taker_order.clone(),
                    state: SettlementState::AwaitingSignature { since },
                },
            );
        }
    }

    pub fn get(&self, trade_hash: &Hash) -> Option<PendingSettlement> {
        self.pending.get(trade_hash).map(|p| p.value().clone())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending trade hashes of one taker order
    pub fn trades_of(&self, taker_order_hash: &Hash) -> Vec<Hash> {
        self.by_taker
            .get(taker_order_hash)
            .map(|e| e.trades.clone())
            .unwrap_or_default()
    }

    fn residual_of(&self, taker_order_hash: &Hash) -> Option<Hash> {
        self.by_taker.get(taker_order_hash).and_then(|e| e.residual)
    }

    /// Replace the state of a record currently in a state `from` accepts
    fn advance<F>(&self, trade_hash: &Hash, from: F, to: SettlementState) -> bool
    where
        F: Fn(&SettlementState) -> bool,
    {
        match self.pending.get_mut(trade_hash) {
            Some(mut record) if from(&record.state) => {
                record.state = to;
                true
            }
            _ => false,
        }
    }

    /// Move AwaitingSignature → Signed; false if the record is elsewhere
    fn sign(&self, trade_hash: &Hash, signature: Signature) -> bool {
        self.advance(
            trade_hash,
            |state| matches!(state, SettlementState::AwaitingSignature { .. }),
            SettlementState::Signed { signature },
        )
    }

    /// Move Signed → Submitting and hand back what the chain needs
    fn start_submission(&self, trade_hash: &Hash) -> Option<(PendingSettlement, Signature)> {
        let mut record = self.pending.get_mut(trade_hash)?;
        let SettlementState::Signed { signature } = &record.state else {
            return None;
        };
        let signature = signature.clone();
        record.state = SettlementState::Submitting {
            signature: signature.clone(),
        };
        Some((record.value().clone(), signature))
    }

    /// Remove a record once it reached a terminal status
    fn close(&self, trade_hash: &Hash) -> Option<PendingSettlement> {
        self.close_if(trade_hash, |_| true)
    }

    /// Remove a record only while its state satisfies `when`
    fn close_if<F>(&self, trade_hash: &Hash, when: F) -> Option<PendingSettlement>
    where
        F: Fn(&SettlementState) -> bool,
    {
        let (_, record) = self
            .pending
            .remove_if(trade_hash, |_, record| when(&record.state))?;
        let taker_hash = record.trade.taker_order_hash;
        if let Some(mut entry) = self.by_taker.get_mut(&taker_hash) {
            entry.trades.retain(|h| h != trade_hash);
        }
        self.by_taker
            .remove_if(&taker_hash, |_, entry| entry.trades.is_empty());
        Some(record)
    }

    fn expired(&self, timeout: Duration, now: Instant) -> Vec<Hash> {
        self.pending
            .iter()
            .filter(|record| match record.state {
                SettlementState::AwaitingSignature { since } => now.duration_since(since) >= timeout,
                _ => false,
            })
            .map(|record| *record.key())
            .collect()
    }
}

/// Drives pending trades through signature, submission and confirmation
pub struct SettlementCoordinator {
    ledger: Arc<SettlementLedger>,
    storage: Arc<dyn Storage>,
    chain: Arc<dyn ChainClient>,
    dispatcher: Arc<Dispatcher>,
    router: Arc<PairRouter>,
    signature_timeout: Option<Duration>,
    reaper_interval: Duration,
}

impl SettlementCoordinator {
    pub fn new(
        ledger: Arc<SettlementLedger>,
        storage: Arc<dyn Storage>,
        chain: Arc<dyn ChainClient>,
        dispatcher: Arc<Dispatcher>,
        router: Arc<PairRouter>,
        signature_timeout: Option<Duration>,
        reaper_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            storage,
            chain,
            dispatcher,
            router,
            signature_timeout,
            reaper_interval,
        }
    }

    pub fn ledger(&self) -> &Arc<SettlementLedger> {
        &self.ledger
    }

    /// Handle the taker's answer to REQUEST_SIGNATURE
    ///
    /// Each trade is judged on its own: a bad signature fails that trade
    /// only. Fails as a whole when the taker order has nothing pending.
    pub async fn on_signature(
        self: &Arc<Self>,
        account: Address,
        response: SignatureResponse,
    ) -> Result<(), SettlementError> {
        let taker_hash = response.taker_order_hash;
        let pair_name = match self
            .ledger
            .trades_of(&taker_hash)
            .first()
            .and_then(|h| self.ledger.get(h))
        {
            Some(record) => record.trade.pair_name,
            None => {
                return Err(SettlementError::UnknownTrade {
                    trade: taker_hash.to_string(),
                })
            }
        };
        let residual = self.ledger.residual_of(&taker_hash);

        for item in response.trades {
            let trade_hash = item.trade_hash;
            match self.check_signature(&account, &taker_hash, &trade_hash, item.signature) {
                Ok(true) => {
                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.submit(&trade_hash).await });
                }
                Ok(false) => debug!(trade = %trade_hash, "trade already signed"),
                Err(e) => {
                    warn!(trade = %trade_hash, error = %e, "trade signature refused");
                    self.dispatcher.notify(
                        &account,
                        EngineEvent::trade_error(e.code(), e.to_string(), trade_hash),
                    );
                    if matches!(e, SettlementError::InvalidSignature { .. }) {
                        self.fail(&trade_hash, &e).await;
                    }
                }
            }
        }

        if let (Some(signature), Some(residual)) = (response.remaining_order, residual) {
            let command = PairCommand::AttachSignature {
                order_hash: residual,
                signature,
                account,
            };
            if let Err(e) = self.router.send(&pair_name, command).await {
                error!(order = %residual, error = %e, "could not forward residual signature");
            }
        }
        Ok(())
    }

    /// Verify one trade signature and mark the record Signed.
    ///
    /// `Ok(false)` when the record was already past AwaitingSignature.
    fn check_signature(
        &self,
        account: &Address,
        taker_hash: &Hash,
        trade_hash: &Hash,
        signature: Signature,
    ) -> Result<bool, SettlementError> {
        let record = self
            .ledger
            .get(trade_hash)
            .filter(|r| &r.trade.taker_order_hash == taker_hash)
            .ok_or_else(|| SettlementError::UnknownTrade {
                trade: trade_hash.to_string(),
            })?;
        if &record.trade.taker != account {
            return Err(SettlementError::NotTaker {
                trade: trade_hash.to_string(),
                account: account.to_string(),
            });
        }
        if !matches!(record.state, SettlementState::AwaitingSignature { .. }) {
            return Ok(false);
        }

        let reason = match signature.recover(trade_hash) {
            Ok(signer) if &signer == account => None,
            Ok(signer) => Some(format!("signed by {signer}")),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = reason {
            return Err(SettlementError::InvalidSignature {
                trade: trade_hash.to_string(),
                reason,
            });
        }
        Ok(self.ledger.sign(trade_hash, signature))
    }

    /// Retry submission of a Signed trade after a transport error
    pub async fn resubmit(&self, trade_hash: &Hash) -> Result<(), SettlementError> {
        match self.ledger.get(trade_hash) {
            Some(PendingSettlement {
                state: SettlementState::Signed { .. },
                ..
            }) => {
                self.submit(trade_hash).await;
                Ok(())
            }
            Some(record) => Err(TradeError::InvalidStateTransition {
                from: format!("{:?}", record.state),
                to: "SUBMITTED".to_string(),
            }
            .into()),
            None => Err(SettlementError::UnknownTrade {
                trade: trade_hash.to_string(),
            }),
        }
    }

    /// Outcome reported by a chain watcher. Accepted as soon as the trade
    /// was handed to the chain, even before the submission call returned.
    pub async fn on_chain_event(
        &self,
        trade_hash: &Hash,
        outcome: ChainOutcome,
    ) -> Result<(), SettlementError> {
        let record = self
            .ledger
            .get(trade_hash)
            .ok_or_else(|| SettlementError::UnknownTrade {
                trade: trade_hash.to_string(),
            })?;
        if !matches!(
            record.state,
            SettlementState::Submitting { .. } | SettlementState::Submitted { .. }
        ) {
            return Err(TradeError::InvalidStateTransition {
                from: format!("{:?}", record.state),
                to: "CONFIRMED".to_string(),
            }
            .into());
        }

        match outcome {
            ChainOutcome::Confirmed { tx_ref } => self.finalize(trade_hash, tx_ref).await,
            ChainOutcome::Reverted { reason } => {
                self.fail(
                    trade_hash,
                    &SettlementError::ChainRejected {
                        trade: trade_hash.to_string(),
                        reason,
                    },
                )
                .await
            }
        }
        Ok(())
    }

    async fn submit(&self, trade_hash: &Hash) {
        let Some((record, signature)) = self.ledger.start_submission(trade_hash) else {
            return;
        };
        let signed = SignedTrade {
            trade: record.trade.clone(),
            maker_order: record.maker_order.clone(),
            taker_signature: signature.clone(),
        };

        match self.chain.submit_trade(&signed).await {
            Ok(SubmitStatus::Success { tx_ref }) => {
                self.mark_submitted(&record, signature, Some(tx_ref.clone())).await;
                self.finalize(trade_hash, tx_ref).await;
            }
            Ok(SubmitStatus::Pending { tx_ref }) => {
                self.mark_submitted(&record, signature, Some(tx_ref)).await;
            }
            Ok(SubmitStatus::Failed { reason }) => {
                self.fail(
                    trade_hash,
                    &SettlementError::ChainRejected {
                        trade: trade_hash.to_string(),
                        reason,
                    },
                )
                .await;
            }
            Err(e) => {
                warn!(trade = %trade_hash, error = %e, "submission failed, awaiting resubmit");
                self.ledger.advance(
                    trade_hash,
                    |state| matches!(state, SettlementState::Submitting { .. }),
                    SettlementState::Signed { signature },
                );
            }
        }
    }

    /// Chain accepted the trade: remember the reference and tell both sides
    async fn mark_submitted(&self, record: &PendingSettlement, signature: Signature, tx_ref: Option<String>) {
        let trade_hash = record.trade.hash;
        let moved = self.ledger.advance(
            &trade_hash,
            |state| matches!(state, SettlementState::Submitting { .. }),
            SettlementState::Submitted {
                signature,
                tx_ref: tx_ref.clone(),
            },
        );
        if !moved {
            debug!(trade = %trade_hash, "trade settled before its submission returned");
            return;
        }
        let mut trade = record.trade.clone();
        trade.tx_ref = tx_ref.clone();
        if let Err(e) = self
            .storage
            .update_trade_status(&trade_hash, TradeStatus::PENDING, tx_ref)
            .await
        {
            error!(trade = %trade_hash, error = %e, "failed to record submission");
        }
        info!(trade = %trade_hash, "trade submitted");
        self.notify_parties(record, &trade, |notice| EngineEvent::OrderPending(notice));
    }

    async fn finalize(&self, trade_hash: &Hash, tx_ref: String) {
        let Some(record) = self.ledger.close(trade_hash) else {
            return;
        };
        let mut trade = record.trade.clone();
        if let Err(e) = lifecycle::settle_trade(&mut trade, TradeStatus::SUCCESS, Some(tx_ref.clone())) {
            error!(trade = %trade_hash, error = %e, "trade cannot settle");
            return;
        }
        if let Err(e) = self
            .storage
            .update_trade_status(trade_hash, TradeStatus::SUCCESS, Some(tx_ref))
            .await
        {
            error!(trade = %trade_hash, error = %e, "failed to record settlement");
        }
        info!(trade = %trade_hash, pair = %trade.pair_name, "trade settled");
        self.notify_parties(&record, &trade, |notice| EngineEvent::OrderSuccess(notice));
    }

    /// Move the trade to FAILED and have its pair worker restore quantities.
    ///
    /// A failure blamed on the taker only applies while the trade still
    /// awaits its signature; the taker's order is then withdrawn rather
    /// than matched again.
    async fn fail(&self, trade_hash: &Hash, cause: &SettlementError) {
        let withdraw_taker = matches!(
            cause,
            SettlementError::InvalidSignature { .. } | SettlementError::SignatureTimeout { .. }
        );
        let closed = if withdraw_taker {
            self.ledger.close_if(trade_hash, |state| {
                matches!(state, SettlementState::AwaitingSignature { .. })
            })
        } else {
            self.ledger.close(trade_hash)
        };
        let Some(record) = closed else {
            return;
        };
        let mut trade = record.trade.clone();
        if let Err(e) = lifecycle::settle_trade(&mut trade, TradeStatus::FAILED, None) {
            error!(trade = %trade_hash, error = %e, "trade cannot fail");
            return;
        }
        warn!(trade = %trade_hash, cause = %cause, "trade settlement failed");
        if let Err(e) = self
            .storage
            .update_trade_status(trade_hash, TradeStatus::FAILED, None)
            .await
        {
            error!(trade = %trade_hash, error = %e, "failed to record trade failure");
        }

        // the taker hears about its own bad signature from on_signature
        let parties = match cause {
            SettlementError::InvalidSignature { .. } => vec![trade.maker],
            _ => vec![trade.maker, trade.taker],
        };
        for party in parties {
            self.dispatcher.notify(
                &party,
                EngineEvent::trade_error(ErrorCode::SettlementFailed, cause.to_string(), trade.hash),
            );
        }

        let pair_name = trade.pair_name.clone();
        let command = PairCommand::Compensate {
            trade,
            withdraw_taker,
        };
        if let Err(e) = self.router.send(&pair_name, command).await {
            error!(trade = %trade_hash, error = %e, "compensation could not be queued");
        }
    }

    fn notify_parties<F>(&self, record: &PendingSettlement, trade: &Trade, event: F)
    where
        F: Fn(TradeNotice) -> EngineEvent,
    {
        self.dispatcher.notify(
            &trade.maker,
            event(TradeNotice {
                order: record.maker_order.clone(),
                trade: trade.clone(),
            }),
        );
        self.dispatcher.notify(
            &trade.taker,
            event(TradeNotice {
                order: record.taker_order.clone(),
                trade: trade.clone(),
            }),
        );
    }

    /// Fail every trade still awaiting a signature past the timeout
    pub async fn reap_expired(&self) -> usize {
        let Some(timeout) = self.signature_timeout else {
            return 0;
        };
        let expired = self.ledger.expired(timeout, Instant::now());
        for trade_hash in &expired {
            self.fail(
                trade_hash,
                &SettlementError::SignatureTimeout {
                    seconds: timeout.as_secs(),
                },
            )
            .await;
        }
        expired.len()
    }

    /// Periodic [`Self::reap_expired`]; `None` when no timeout is configured
    pub fn spawn_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.signature_timeout?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.reaper_interval);
            loop {
                ticker.tick().await;
                let reaped = this.reap_expired().await;
                if reaped > 0 {
                    info!(reaped, "expired unsigned trades");
                }
            }
        }))
    }
}
