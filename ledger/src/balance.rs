//! Balance storage.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use autosettle_common::Asset;
use serde::{Deserialize, Serialize};

/// A nonzero balance held by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// Asset held.
    pub asset: Asset,
    /// Amount in minor units.
    pub amount: U256,
}

/// Balances keyed by `(asset, account)`. Zero balances are not stored.
#[derive(Debug, Clone, Default)]
pub struct BalanceBook {
    balances: HashMap<(Asset, Address), U256>,
}

impl BalanceBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `account` in `asset`.
    pub fn get(&self, asset: Asset, account: Address) -> U256 {
        self.balances
            .get(&(asset, account))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Overwrite a balance, returning the previous value.
    pub fn set(&mut self, asset: Asset, account: Address, amount: U256) -> U256 {
        let previous = if amount.is_zero() {
            self.balances.remove(&(asset, account))
        } else {
            self.balances.insert((asset, account), amount)
        };
        previous.unwrap_or(U256::ZERO)
    }

    /// All nonzero holdings of an account.
    pub fn holdings(&self, account: Address) -> Vec<Holding> {
        let mut holdings: Vec<Holding> = self
            .balances
            .iter()
            .filter(|((_, owner), _)| *owner == account)
            .map(|((asset, _), amount)| Holding {
                asset: *asset,
                amount: *amount,
            })
            .collect();
        holdings.sort_by(|a, b| a.asset.cmp(&b.asset));
        holdings
    }

    /// Sum of every account's balance in `asset`.
    pub fn total(&self, asset: Asset) -> U256 {
        self.balances
            .iter()
            .filter(|((held, _), _)| *held == asset)
            .fold(U256::ZERO, |acc, (_, amount)| acc.saturating_add(*amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_balances_are_pruned() {
        let mut book = BalanceBook::new();
        let account = Address::repeat_byte(1);

        assert_eq!(book.set(Asset::Native, account, U256::from(5u64)), U256::ZERO);
        assert_eq!(book.set(Asset::Native, account, U256::ZERO), U256::from(5u64));
        assert!(book.holdings(account).is_empty());
    }

    #[test]
    fn test_total_across_accounts() {
        let mut book = BalanceBook::new();
        let token = Asset::Token(Address::repeat_byte(9));
        book.set(token, Address::repeat_byte(1), U256::from(10u64));
        book.set(token, Address::repeat_byte(2), U256::from(15u64));
        book.set(Asset::Native, Address::repeat_byte(1), U256::from(99u64));

        assert_eq!(book.total(token), U256::from(25u64));
        assert_eq!(book.holdings(Address::repeat_byte(1)).len(), 2);
    }
}
