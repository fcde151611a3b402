//! Service facade
//!
//! Entry point for the transport layer. A connection registers for an
//! account, then feeds decoded client messages through
//! [`OrderService::handle`]. Orders and cancels go to the owning pair's
//! worker; signatures go to the settlement coordinator. Every failure is
//! reported back to the account as an ERROR event.

use matching_engine::book::BookSnapshot;
use matching_engine::events::{ClientMessage, EngineEvent};
use matching_engine::validator::{validate_order, ValidationContext};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::errors::{EngineError, OrderError, TransportError, ValidationError};
use types::ids::{Address, ConnectionId, Hash};
use types::order::Order;

use crate::chain::ChainClient;
use crate::config::{ConfigError, ServiceConfig};
use crate::deposit::{DepositConsumer, DepositQueue};
use crate::dispatcher::{Dispatcher, OutboundMessage};
use crate::settlement::{SettlementCoordinator, SettlementLedger};
use crate::storage::Storage;
use crate::worker::{PairCommand, PairRouter, WorkerContext};

pub struct OrderService {
    config: ServiceConfig,
    storage: Arc<dyn Storage>,
    dispatcher: Arc<Dispatcher>,
    router: Arc<PairRouter>,
    settlement: Arc<SettlementCoordinator>,
    reaper: Option<JoinHandle<()>>,
}

impl OrderService {
    /// Wire the service together. Must be called inside a tokio runtime.
    pub fn new(
        config: ServiceConfig,
        storage: Arc<dyn Storage>,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let dispatcher = Arc::new(Dispatcher::new());
        let ledger = Arc::new(SettlementLedger::new());
        let context = Arc::new(WorkerContext {
            storage: storage.clone(),
            dispatcher: dispatcher.clone(),
            ledger: ledger.clone(),
            config: config.clone(),
        });
        let router = Arc::new(PairRouter::new(context));
        let settlement = Arc::new(SettlementCoordinator::new(
            ledger,
            storage.clone(),
            chain,
            dispatcher.clone(),
            router.clone(),
            config.signature_timeout(),
            config.reaper_interval(),
        ));
        let reaper = settlement.spawn_reaper();

        info!(
            exchange = %config.exchange_address,
            signature_timeout = ?config.signature_timeout(),
            "order service started"
        );
        Ok(Self {
            config,
            storage,
            dispatcher,
            router,
            settlement,
            reaper,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn settlement(&self) -> &Arc<SettlementCoordinator> {
        &self.settlement
    }

    pub fn router(&self) -> &Arc<PairRouter> {
        &self.router
    }

    /// Register a client connection for `account`
    pub fn connect(
        &self,
        account: Address,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<OutboundMessage>) {
        self.dispatcher.connect(account)
    }

    pub fn disconnect(&self, connection: ConnectionId) {
        self.dispatcher.disconnect(connection);
    }

    /// Decode and handle one raw inbound frame
    pub async fn handle_raw(&self, connection: ConnectionId, frame: &str) -> Result<(), EngineError> {
        match serde_json::from_str::<ClientMessage>(frame) {
            Ok(message) => self.handle(connection, message).await,
            Err(e) => {
                let error: EngineError = ValidationError::MalformedPayload(e.to_string()).into();
                debug!(connection = %connection, error = %error, "undecodable frame");
                if let Some(account) = self.dispatcher.account_of(&connection) {
                    self.dispatcher
                        .notify(&account, EngineEvent::error(error.code(), error.to_string()));
                }
                Err(error)
            }
        }
    }

    /// Handle one client message from `connection`
    pub async fn handle(&self, connection: ConnectionId, message: ClientMessage) -> Result<(), EngineError> {
        let account = self
            .dispatcher
            .account_of(&connection)
            .ok_or(TransportError::Closed)?;
        let message_type = message.message_type();

        let (result, subject) = match message {
            ClientMessage::NewOrder(order) => {
                let hash = order.hash;
                (self.new_order(account, order).await, Some(hash))
            }
            ClientMessage::CancelOrder(request) => {
                let hash = request.order_hash;
                let result = match self.storage.get_order_by_hash(&hash).await {
                    Ok(Some(order)) => {
                        self.router
                            .send(
                                &order.pair_name,
                                PairCommand::Cancel {
                                    request,
                                    requester: account,
                                },
                            )
                            .await
                    }
                    Ok(None) => Err(OrderError::NotFound {
                        hash: hash.to_string(),
                    }
                    .into()),
                    Err(e) => Err(e.into()),
                };
                (result, Some(hash))
            }
            ClientMessage::SubmitSignature(response) => {
                let result = self
                    .settlement
                    .on_signature(account, response)
                    .await
                    .map_err(EngineError::from);
                (result, None)
            }
        };

        if let Err(e) = &result {
            warn!(account = %account, message_type = %message_type, error = %e, "client request failed");
            self.report(&account, e, subject);
        }
        result
    }

    /// Pre-routing checks that need no pair worker
    async fn new_order(&self, account: Address, order: Order) -> Result<(), EngineError> {
        if order.user_address != account {
            return Err(ValidationError::UnauthorizedSender {
                connection: account.to_string(),
                claimed: order.user_address.to_string(),
            }
            .into());
        }

        let pair = self
            .storage
            .get_pair_by_tokens(&order.base_token, &order.quote_token)
            .await?;
        match pair {
            Some(pair) => {
                self.router
                    .send(&pair.name(), PairCommand::Submit { order })
                    .await
            }
            None => {
                // run the cheaper checks first so their errors win
                let last_nonce = self.storage.get_last_nonce(&order.user_address).await?;
                let context = ValidationContext {
                    exchange_address: self.config.exchange_address,
                    last_nonce,
                    pair: None,
                };
                validate_order(&order, &context)?;
                Err(ValidationError::UnknownPair {
                    base: order.base_token.to_string(),
                    quote: order.quote_token.to_string(),
                }
                .into())
            }
        }
    }

    fn report(&self, account: &Address, error: &EngineError, subject: Option<Hash>) {
        let event = match subject {
            Some(hash) => EngineEvent::order_error(error.code(), error.to_string(), hash),
            None => EngineEvent::error(error.code(), error.to_string()),
        };
        self.dispatcher.notify(account, event);
    }

    /// Aggregated depth of a pair's book, answered by its worker
    pub async fn snapshot(&self, pair_name: &str, depth: usize) -> Result<BookSnapshot, EngineError> {
        let (reply, response) = oneshot::channel();
        self.router
            .send(pair_name, PairCommand::Snapshot { depth, reply })
            .await?;
        response.await.map_err(|_| TransportError::Closed.into())
    }

    /// Start crediting deposits published to `queue`
    pub fn spawn_deposit_consumer(&self, queue: &dyn DepositQueue) -> Result<JoinHandle<()>, TransportError> {
        DepositConsumer::new(self.storage.clone()).spawn(queue)
    }
}

impl Drop for OrderService {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
    }
}
