//! Account and balance types
//!
//! Balances are owned by the storage collaborator; the trading core only
//! reads them and credits deposits.

use crate::errors::ArithmeticError;
use crate::ids::Address;
use crate::numeric::Amount;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Balance of one token held by an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub balance: Amount,
    pub allowance: Amount,
    pub locked_balance: Amount,
    pub pending_balance: Amount,
}

impl TokenBalance {
    /// Spendable balance: total minus locked
    pub fn available(&self) -> Amount {
        Amount::new(
            self.balance
                .as_u128()
                .saturating_sub(self.locked_balance.as_u128()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    pub token_balances: HashMap<Address, TokenBalance>,
    pub created_at: i64,
}

impl Account {
    /// Create an account with no balances
    pub fn new(address: Address, created_at: i64) -> Self {
        Self {
            address,
            token_balances: HashMap::new(),
            created_at,
        }
    }

    pub fn balance(&self, token: &Address) -> Amount {
        self.token_balances
            .get(token)
            .map(|b| b.balance)
            .unwrap_or(Amount::ZERO)
    }

    /// Credit `amount` of `token`, returning the new balance.
    pub fn credit(&mut self, token: Address, amount: Amount) -> Result<Amount, ArithmeticError> {
        let entry = self.token_balances.entry(token).or_default();
        entry.balance = entry.balance.checked_add(amount)?;
        Ok(entry.balance)
    }
}
