//! Types library for the DEX trading core
//!
//! This library provides the core type definitions shared by the matching
//! engine and the order service: exact integer amounts, content-hashed
//! orders and trades, signatures, and the error taxonomy.
//!
//! # Modules
//! - `ids`: Addresses, content hashes, connection ids
//! - `numeric`: Checked integer amounts and price points
//! - `order`: Order lifecycle types
//! - `trade`: Trade settlement types
//! - `pair`: Trading pair metadata
//! - `account`: Account and balance types
//! - `deposit`: Deposit transaction records
//! - `signing`: Canonical hashing and Ed25519 signatures
//! - `errors`: Error taxonomy

pub mod ids;
pub mod numeric;
pub mod order;
pub mod trade;
pub mod pair;
pub mod account;
pub mod deposit;
pub mod signing;
pub mod errors;

/// Current time as Unix nanoseconds.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::*;
    pub use crate::deposit::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::pair::*;
    pub use crate::signing::*;
    pub use crate::trade::*;
}
