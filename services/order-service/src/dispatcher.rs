//! Event dispatcher
//!
//! Routes lifecycle events to every live connection of an account. Each
//! connection owns an unbounded channel, so events pushed by one producer
//! arrive in the order they were produced.

use dashmap::DashMap;
use matching_engine::events::EngineEvent;
use tokio::sync::mpsc;
use tracing::debug;
use types::ids::{Address, ConnectionId};

/// One event addressed to one account
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub account: Address,
    pub event: EngineEvent,
}

impl OutboundMessage {
    /// `{"type": ..., "payload": ...}` as sent to the client
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.event)
    }
}

struct Connection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

/// Registry of live connections per account
#[derive(Default)]
pub struct Dispatcher {
    connections: DashMap<Address, Vec<Connection>>,
    owners: DashMap<ConnectionId, Address>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `account` and return its event stream
    pub fn connect(
        &self,
        account: Address,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<OutboundMessage>) {
        let id = ConnectionId::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections
            .entry(account)
            .or_default()
            .push(Connection { id, sender });
        self.owners.insert(id, account);
        debug!(account = %account, connection = %id, "connection registered");
        (id, receiver)
    }

    pub fn disconnect(&self, id: ConnectionId) {
        let Some((_, account)) = self.owners.remove(&id) else {
            return;
        };
        if let Some(mut list) = self.connections.get_mut(&account) {
            list.retain(|c| c.id != id);
        }
        self.connections.remove_if(&account, |_, list| list.is_empty());
        debug!(account = %account, connection = %id, "connection removed");
    }

    /// Account a connection was registered for
    pub fn account_of(&self, id: &ConnectionId) -> Option<Address> {
        self.owners.get(id).map(|a| *a)
    }

    pub fn connection_count(&self, account: &Address) -> usize {
        self.connections.get(account).map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver `event` to every live connection of `account`
    ///
    /// Returns the number of connections reached. Connections whose
    /// receiver is gone are pruned.
    pub fn notify(&self, account: &Address, event: EngineEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        if let Some(mut list) = self.connections.get_mut(account) {
            list.retain(|connection| {
                let message = OutboundMessage {
                    account: *account,
                    event: event.clone(),
                };
                if connection.sender.send(message).is_ok() {
                    delivered += 1;
                    true
                } else {
                    closed.push(connection.id);
                    false
                }
            });
        }
        if !closed.is_empty() {
            self.connections.remove_if(account, |_, list| list.is_empty());
            for id in closed {
                self.owners.remove(&id);
            }
        }
        if delivered == 0 {
            debug!(
                account = %account,
                message_type = %event.message_type(),
                "no live connection, event dropped"
            );
        }
        delivered
    }
}
