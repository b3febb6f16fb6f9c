//! Core ledger implementation.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use autosettle_common::{Asset, NATIVE_DECIMALS};
use tracing::{debug, trace};

use crate::account::{AccountPolicy, TokenInfo};
use crate::balance::{BalanceBook, Holding};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::{EntryType, Journal, Posting, UndoEntry};

/// Handle to an open checkpoint. Must be committed or rolled back, innermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a checkpoint must be committed or rolled back"]
pub struct Checkpoint {
    depth: usize,
    undo_mark: usize,
    posting_mark: usize,
}

impl Checkpoint {
    /// Index of the first posting recorded after this checkpoint.
    pub fn posting_mark(&self) -> usize {
        self.posting_mark
    }
}

/// Multi-asset ledger standing in for chain state.
#[derive(Debug, Default)]
pub struct Ledger {
    tokens: HashMap<Address, TokenInfo>,
    wrapped_native: Option<Address>,
    balances: BalanceBook,
    allowances: HashMap<(Address, Address, Address), U256>,
    policies: HashMap<Address, AccountPolicy>,
    journal: Journal,
    open_checkpoints: usize,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy a token contract.
    pub fn create_token(
        &mut self,
        address: Address,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> LedgerResult<()> {
        if self.tokens.contains_key(&address) {
            return Err(LedgerError::TokenExists(address));
        }
        let info = TokenInfo::new(symbol, decimals);
        debug!(token = %address, symbol = %info.symbol, decimals, "Token created");
        self.tokens.insert(address, info);
        Ok(())
    }

    /// Deploy the wrapped native token at `address`.
    pub fn create_wrapped_native(&mut self, address: Address) -> LedgerResult<()> {
        self.create_token(address, "WNATIVE", NATIVE_DECIMALS)?;
        self.wrapped_native = Some(address);
        Ok(())
    }

    /// Address of the wrapped native token, if deployed.
    pub fn wrapped_native(&self) -> Option<Address> {
        self.wrapped_native
    }

    /// Token metadata.
    pub fn token_info(&self, token: Address) -> Option<&TokenInfo> {
        self.tokens.get(&token)
    }

    /// Decimals of an asset, `None` if the token does not exist.
    pub fn decimals(&self, asset: Asset) -> Option<u8> {
        match asset {
            Asset::Native => Some(NATIVE_DECIMALS),
            Asset::Token(token) => self.tokens.get(&token).map(|info| info.decimals),
        }
    }

    /// Set how an account reacts to incoming value.
    pub fn set_policy(&mut self, account: Address, policy: AccountPolicy) {
        self.policies.insert(account, policy);
    }

    /// Policy of an account.
    pub fn policy(&self, account: Address) -> AccountPolicy {
        self.policies.get(&account).copied().unwrap_or_default()
    }

    /// Balance of `account` in `asset`.
    pub fn balance_of(&self, asset: Asset, account: Address) -> U256 {
        self.balances.get(asset, account)
    }

    /// Nonzero holdings of an account.
    pub fn holdings(&self, account: Address) -> Vec<Holding> {
        self.balances.holdings(account)
    }

    /// Sum of all balances of an asset.
    pub fn total_supply(&self, asset: Asset) -> U256 {
        self.balances.total(asset)
    }

    /// Create new units out of thin air.
    pub fn mint(&mut self, asset: Asset, to: Address, amount: U256) -> LedgerResult<()> {
        self.ensure_exists(asset)?;
        self.credit(asset, to, amount)
    }

    /// Move `amount` of `asset` between accounts.
    pub fn transfer(
        &mut self,
        asset: Asset,
        from: Address,
        to: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        self.ensure_exists(asset)?;
        if asset.is_native() && !self.policy(to).accepts_native() {
            return Err(LedgerError::RecipientRejected(to));
        }
        self.debit(asset, from, amount)?;
        self.credit(asset, to, amount)?;
        trace!(asset = %asset, from = %from, to = %to, amount = %amount, "Transfer");
        Ok(())
    }

    /// Allowance granted by `owner` to `spender` on `token`.
    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Set the allowance of `spender` over `owner`'s `token`.
    pub fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        self.ensure_exists(Asset::Token(token))?;
        self.set_allowance(token, owner, spender, amount);
        Ok(())
    }

    /// Move `owner`'s tokens on behalf of `spender`, consuming allowance.
    ///
    /// An unlimited (`U256::MAX`) allowance is not decremented.
    pub fn transfer_from(
        &mut self,
        asset: Asset,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        let token = asset.token().ok_or(LedgerError::NativeAllowance)?;
        if spender != from {
            let approved = self.allowance(token, from, spender);
            if approved < amount {
                return Err(LedgerError::InsufficientAllowance {
                    token,
                    spender,
                    needed: amount,
                    approved,
                });
            }
            if approved != U256::MAX {
                self.set_allowance(token, from, spender, approved - amount);
            }
        }
        self.transfer(asset, from, to, amount)
    }

    /// Deposit native value into the wrapped token, 1:1.
    pub fn wrap_native(&mut self, owner: Address, amount: U256) -> LedgerResult<()> {
        let wrapped = self.wrapped_native.ok_or(LedgerError::NoWrappedNative)?;
        self.transfer(Asset::Native, owner, wrapped, amount)?;
        self.credit(Asset::Token(wrapped), owner, amount)
    }

    /// Burn wrapped tokens and release native value to `owner`.
    pub fn unwrap_native(&mut self, owner: Address, amount: U256) -> LedgerResult<()> {
        let wrapped = self.wrapped_native.ok_or(LedgerError::NoWrappedNative)?;
        self.debit(Asset::Token(wrapped), owner, amount)?;
        self.transfer(Asset::Native, wrapped, owner, amount)
    }

    /// Open a checkpoint. Every mutation after it can be undone.
    pub fn checkpoint(&mut self) -> Checkpoint {
        let (undo_mark, posting_mark) = self.journal.marks();
        let checkpoint = Checkpoint {
            depth: self.open_checkpoints,
            undo_mark,
            posting_mark,
        };
        self.open_checkpoints += 1;
        checkpoint
    }

    /// Undo every mutation since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> LedgerResult<()> {
        self.close(checkpoint)?;
        let undone = self
            .journal
            .unwind(checkpoint.undo_mark, checkpoint.posting_mark);
        let count = undone.len();
        for entry in undone {
            match entry {
                UndoEntry::Balance {
                    asset,
                    account,
                    previous,
                } => {
                    self.balances.set(asset, account, previous);
                }
                UndoEntry::Allowance {
                    token,
                    owner,
                    spender,
                    previous,
                } => {
                    self.write_allowance(token, owner, spender, previous);
                }
            }
        }
        debug!(undone = count, depth = checkpoint.depth, "Ledger rolled back");
        Ok(())
    }

    /// Keep every mutation since `checkpoint`.
    pub fn commit(&mut self, checkpoint: Checkpoint) -> LedgerResult<()> {
        self.close(checkpoint)?;
        if self.open_checkpoints == 0 {
            self.journal.clear_undo();
        }
        Ok(())
    }

    /// Balance postings recorded so far.
    pub fn postings(&self) -> &[Posting] {
        self.journal.postings()
    }

    /// The full journal.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn close(&mut self, checkpoint: Checkpoint) -> LedgerResult<()> {
        if self.open_checkpoints == 0 || checkpoint.depth != self.open_checkpoints - 1 {
            return Err(LedgerError::StaleCheckpoint(checkpoint.depth));
        }
        self.open_checkpoints -= 1;
        Ok(())
    }

    fn ensure_exists(&self, asset: Asset) -> LedgerResult<()> {
        match asset {
            Asset::Native => Ok(()),
            Asset::Token(token) if self.tokens.contains_key(&token) => Ok(()),
            Asset::Token(token) => Err(LedgerError::UnknownToken(token)),
        }
    }

    fn debit(&mut self, asset: Asset, account: Address, amount: U256) -> LedgerResult<()> {
        let available = self.balances.get(asset, account);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset,
                account,
                needed: amount,
                available,
            });
        }
        let previous = self.balances.set(asset, account, available - amount);
        self.journal.record_undo(UndoEntry::Balance {
            asset,
            account,
            previous,
        });
        self.journal.post(asset, account, EntryType::Debit, amount);
        Ok(())
    }

    fn credit(&mut self, asset: Asset, account: Address, amount: U256) -> LedgerResult<()> {
        let current = self.balances.get(asset, account);
        let updated = current
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { account })?;
        let previous = self.balances.set(asset, account, updated);
        self.journal.record_undo(UndoEntry::Balance {
            asset,
            account,
            previous,
        });
        self.journal.post(asset, account, EntryType::Credit, amount);
        Ok(())
    }

    fn set_allowance(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
        let previous = self.write_allowance(token, owner, spender, amount);
        self.journal.record_undo(UndoEntry::Allowance {
            token,
            owner,
            spender,
            previous,
        });
    }

    fn write_allowance(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> U256 {
        let key = (token, owner, spender);
        let previous = if amount.is_zero() {
            self.allowances.remove(&key)
        } else {
            self.allowances.insert(key, amount)
        };
        previous.unwrap_or(U256::ZERO)
    }
}
