//! Postings and the undo log.

use alloy_primitives::{Address, U256};
use autosettle_common::Asset;
use serde::{Deserialize, Serialize};

/// Direction of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Balance decreased.
    Debit,
    /// Balance increased.
    Credit,
}

/// One balance movement, kept for audit and conservation checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Asset moved.
    pub asset: Asset,
    /// Account affected.
    pub account: Address,
    /// Debit or credit.
    pub entry_type: EntryType,
    /// Amount moved.
    pub amount: U256,
}

/// State overwritten by a mutation, restored on rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UndoEntry {
    Balance {
        asset: Asset,
        account: Address,
        previous: U256,
    },
    Allowance {
        token: Address,
        owner: Address,
        spender: Address,
        previous: U256,
    },
}

/// Undo log plus posting history.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    undo: Vec<UndoEntry>,
    postings: Vec<Posting>,
}

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_undo(&mut self, entry: UndoEntry) {
        self.undo.push(entry);
    }

    pub(crate) fn post(&mut self, asset: Asset, account: Address, entry_type: EntryType, amount: U256) {
        self.postings.push(Posting {
            asset,
            account,
            entry_type,
            amount,
        });
    }

    /// Current undo log and posting lengths.
    pub(crate) fn marks(&self) -> (usize, usize) {
        (self.undo.len(), self.postings.len())
    }

    /// Pop undo entries back to `undo_mark`, newest first, and drop postings past `posting_mark`.
    pub(crate) fn unwind(&mut self, undo_mark: usize, posting_mark: usize) -> Vec<UndoEntry> {
        self.postings.truncate(posting_mark);
        let mut undone = self.undo.split_off(undo_mark);
        undone.reverse();
        undone
    }

    /// Forget undo history once no checkpoint can reach it.
    pub(crate) fn clear_undo(&mut self) {
        self.undo.clear();
    }

    /// All postings recorded so far.
    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    /// Total `(credits, debits)` of `asset` across postings from `start`.
    ///
    /// Transfers net to zero; mints and burns do not.
    pub fn net_since(&self, start: usize, asset: Asset) -> (U256, U256) {
        self.postings
            .iter()
            .skip(start)
            .filter(|p| p.asset == asset)
            .fold((U256::ZERO, U256::ZERO), |(credits, debits), p| match p.entry_type {
                EntryType::Credit => (credits.saturating_add(p.amount), debits),
                EntryType::Debit => (credits, debits.saturating_add(p.amount)),
            })
    }

    /// Check that postings from `start` move value without creating or destroying it.
    pub fn is_balanced_since(&self, start: usize) -> bool {
        let mut assets: Vec<Asset> = self.postings.iter().skip(start).map(|p| p.asset).collect();
        assets.sort();
        assets.dedup();
        assets.into_iter().all(|asset| {
            let (credits, debits) = self.net_since(start, asset);
            credits == debits
        })
    }
}
