//! Order Service
//!
//! Async shell around the matching engine. Admits client orders, runs one
//! serialized worker per trading pair, dispatches lifecycle events to
//! connected accounts, and settles matched trades through the taker's
//! signature and the blockchain collaborator.
//!
//! **Key Invariants:**
//! - Orders of one pair are processed strictly one at a time, in arrival order
//! - Settlement waits never hold a pair worker
//! - A failed trade always gives its quantity back to the book
//! - A deposit reference is credited at most once

pub mod chain;
pub mod config;
pub mod deposit;
pub mod dispatcher;
pub mod service;
pub mod settlement;
pub mod storage;
pub mod worker;

pub use chain::{ChainClient, ChainOutcome, SignedTrade, SubmitStatus};
pub use config::{ConfigError, ServiceConfig};
pub use deposit::{DepositConsumer, DepositQueue, MemoryDepositQueue};
pub use dispatcher::{Dispatcher, OutboundMessage};
pub use service::OrderService;
pub use settlement::{SettlementCoordinator, SettlementLedger};
pub use storage::{MemoryStore, Storage};
pub use worker::{PairCommand, PairRouter};
