//! Deposit feed
//!
//! Detected deposits are published to a [`DepositQueue`] and credited by a
//! [`DepositConsumer`]. Delivery is at-least-once, so crediting is keyed by
//! the transaction reference and a redelivered record changes nothing.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use types::deposit::{DepositOutcome, DepositTransaction};
use types::errors::{StorageError, TransportError};

use crate::storage::Storage;

#[async_trait]
pub trait DepositQueue: Send + Sync {
    async fn publish(&self, deposit: DepositTransaction) -> Result<(), TransportError>;

    /// Stream of published records. A queue may serve a single subscriber.
    fn subscribe(&self) -> Result<BoxStream<'static, DepositTransaction>, TransportError>;
}

/// In-process queue over a tokio channel
pub struct MemoryDepositQueue {
    sender: mpsc::UnboundedSender<DepositTransaction>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<DepositTransaction>>>,
}

impl MemoryDepositQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl Default for MemoryDepositQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DepositQueue for MemoryDepositQueue {
    async fn publish(&self, deposit: DepositTransaction) -> Result<(), TransportError> {
        self.sender.send(deposit).map_err(|_| TransportError::Closed)
    }

    fn subscribe(&self) -> Result<BoxStream<'static, DepositTransaction>, TransportError> {
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| TransportError::Unavailable("deposit queue poisoned".to_string()))?
            .take()
            .ok_or_else(|| TransportError::Unavailable("deposit queue already subscribed".to_string()))?;
        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|deposit| (deposit, receiver))
        })
        .boxed())
    }
}

/// Credits account balances from the deposit feed
pub struct DepositConsumer {
    storage: Arc<dyn Storage>,
}

impl DepositConsumer {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Credit one record; storage errors are returned to the caller
    pub async fn process(&self, deposit: &DepositTransaction) -> Result<DepositOutcome, StorageError> {
        let outcome = self.storage.credit_deposit(deposit).await?;
        match outcome {
            DepositOutcome::Credited(balance) => info!(
                tx_ref = %deposit.tx_ref,
                chain = %deposit.chain,
                account = %deposit.address,
                token = %deposit.token,
                amount = %deposit.amount,
                balance = %balance,
                "deposit credited"
            ),
            DepositOutcome::Duplicate => {
                debug!(tx_ref = %deposit.tx_ref, "duplicate deposit ignored")
            }
        }
        Ok(outcome)
    }

    /// Consume until the stream ends
    pub async fn run(self, mut deposits: BoxStream<'static, DepositTransaction>) {
        while let Some(deposit) = deposits.next().await {
            if let Err(e) = self.process(&deposit).await {
                error!(tx_ref = %deposit.tx_ref, error = %e, "deposit crediting failed");
            }
        }
        info!("deposit feed closed");
    }

    pub fn spawn(
        self,
        queue: &dyn DepositQueue,
    ) -> Result<JoinHandle<()>, TransportError> {
        let deposits = queue.subscribe()?;
        Ok(tokio::spawn(self.run(deposits)))
    }
}
