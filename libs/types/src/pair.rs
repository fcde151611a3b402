//! Trading pair metadata

use crate::errors::ArithmeticError;
use crate::ids::Address;
use crate::numeric::{self, Amount, PricePoint};
use serde::{Deserialize, Serialize};

/// A tradable base/quote token pair.
///
/// Pair name format: "BASE/QUOTE" (e.g. "ZRX/WETH").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub base_token_symbol: String,
    pub base_token_address: Address,
    pub base_token_decimals: u8,
    pub quote_token_symbol: String,
    pub quote_token_address: Address,
    pub quote_token_decimals: u8,
    /// Scale applied to price points so price arithmetic stays integral
    pub pricepoint_multiplier: u128,
    pub active: bool,
    pub make_fee: Amount,
    pub take_fee: Amount,
}

impl Pair {
    pub fn name(&self) -> String {
        format!("{}/{}", self.base_token_symbol, self.quote_token_symbol)
    }

    /// Quote-token consideration for `amount` base tokens at `pricepoint`.
    pub fn quote_amount(
        &self,
        amount: Amount,
        pricepoint: PricePoint,
    ) -> Result<Amount, ArithmeticError> {
        numeric::quote_amount(amount, pricepoint, self.pricepoint_multiplier)
    }
}
