//! Matching Engine
//!
//! Deterministic per-pair order matching with price-time priority, the
//! order validator, and the order/trade lifecycle state machine. No async
//! and no I/O: the order service drives one [`MatchingEngine`] per pair
//! from a serialized worker.
//!
//! **Key Invariants:**
//! - Price-time priority strictly enforced; the maker sets the trade price
//! - Deterministic matching (same book and input → same trades)
//! - `0 <= filled_amount <= amount` for every order, overfill is an error
//! - Resting orders are OPEN or PARTIAL with a non-zero remainder
//! - The book is never left crossed after a commit

pub mod book;
pub mod matching;
pub mod engine;
pub mod events;
pub mod lifecycle;
pub mod validator;

pub use engine::{MatchOutcome, MatchingEngine};
pub use events::{ClientMessage, EngineEvent, MessageType};
pub use validator::{validate_order, ValidationContext};
