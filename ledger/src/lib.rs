//! AutoSettle Ledger
//!
//! In-process stand-in for chain state: multi-asset balances, token
//! allowances, native wrapping, and an undo journal so a settlement call
//! either commits every effect or none.

pub mod engine;
pub mod account;
pub mod journal;
pub mod balance;
pub mod error;

pub use engine::{Checkpoint, Ledger};
pub use account::{AccountPolicy, TokenInfo};
pub use journal::{EntryType, Journal, Posting};
pub use balance::{BalanceBook, Holding};
pub use error::{LedgerError, LedgerResult};
