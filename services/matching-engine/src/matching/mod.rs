//! Crossing test and trade construction for one maker/taker pair

pub mod crossing;
pub mod executor;

pub use crossing::crosses;
pub use executor::execute_trade;
