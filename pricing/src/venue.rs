//! Swap venue abstraction and a constant-product implementation.
//!
//! Pool reserves are plain ledger balances held by a per-pair pool
//! address, so every unit a swap moves shows up in the ledger journal.

use alloy_primitives::{keccak256, Address, U256};
use autosettle_common::{Asset, Timestamp, BPS_DENOMINATOR};
use autosettle_ledger::{Ledger, LedgerError};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, trace};

#[cfg(any(test, feature = "test-utils"))]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default pool fee, 0.30 %.
pub const DEFAULT_FEE_BPS: u16 = 30;

/// Errors raised by a swap venue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VenueError {
    #[error("No pool for {0} / {1}")]
    NoPool(Address, Address),

    #[error("Insufficient liquidity for output {0}")]
    InsufficientLiquidity(U256),

    #[error("Required input {required} exceeds maximum {max}")]
    ExcessiveInput { required: U256, max: U256 },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Order expired at {deadline}, now {now}")]
    Expired { deadline: Timestamp, now: Timestamp },

    #[error("Pricing overflow")]
    Overflow,

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Swap rejected: {0}")]
    Rejected(String),
}

/// An exact-output swap order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOrder {
    /// Token path, input first.
    pub path: Vec<Address>,
    /// Exact amount of the last token to deliver.
    pub amount_out: U256,
    /// Most input the payer allows.
    pub amount_in_max: U256,
    /// Account the input is pulled from. Must have approved the venue.
    pub payer: Address,
    /// Account receiving the output.
    pub recipient: Address,
    /// Last valid timestamp.
    pub deadline: Timestamp,
}

/// A venue able to quote and execute exact-output swaps.
pub trait SwapVenue: Send + Sync {
    /// Address the payer approves as spender.
    fn address(&self) -> Address;

    /// Input needed to receive exactly `amount_out` of the last token in `path`.
    fn quote_exact_output(
        &self,
        ledger: &Ledger,
        path: &[Address],
        amount_out: U256,
    ) -> Result<U256, VenueError>;

    /// Execute the order and return the input reported as consumed.
    fn swap_exact_output(
        &self,
        ledger: &mut Ledger,
        order: &SwapOrder,
        now: Timestamp,
    ) -> Result<U256, VenueError>;
}

/// `x * y = k` pools with a flat fee, multi-hop.
pub struct ConstantProductVenue {
    address: Address,
    fee_bps: u16,
    pools: RwLock<HashMap<(Address, Address), Address>>,
}

fn sort_pair(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl ConstantProductVenue {
    /// Create a venue with the default fee.
    pub fn new(address: Address) -> Self {
        Self::with_fee(address, DEFAULT_FEE_BPS)
    }

    /// Create a venue charging `fee_bps` on every hop.
    pub fn with_fee(address: Address, fee_bps: u16) -> Self {
        Self {
            address,
            fee_bps,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// Deterministic pool address for a pair, independent of order.
    pub fn pool_address(&self, a: Address, b: Address) -> Address {
        let (lo, hi) = sort_pair(a, b);
        let mut preimage = Vec::with_capacity(60);
        preimage.extend_from_slice(self.address.as_slice());
        preimage.extend_from_slice(lo.as_slice());
        preimage.extend_from_slice(hi.as_slice());
        Address::from_slice(&keccak256(&preimage)[12..])
    }

    /// Create a pool and mint its initial reserves into the ledger.
    pub fn create_pool(
        &self,
        ledger: &mut Ledger,
        token_a: Address,
        token_b: Address,
        reserve_a: U256,
        reserve_b: U256,
    ) -> Result<Address, VenueError> {
        if token_a == token_b {
            return Err(VenueError::InvalidPath("identical tokens".to_string()));
        }
        let pool = self.pool_address(token_a, token_b);
        ledger.mint(Asset::Token(token_a), pool, reserve_a)?;
        ledger.mint(Asset::Token(token_b), pool, reserve_b)?;
        self.pools.write().insert(sort_pair(token_a, token_b), pool);
        debug!(
            pool = %pool,
            token_a = %token_a,
            token_b = %token_b,
            reserve_a = %reserve_a,
            reserve_b = %reserve_b,
            "Pool created"
        );
        Ok(pool)
    }

    /// Pool address for a pair, if one was created.
    pub fn pool(&self, a: Address, b: Address) -> Option<Address> {
        self.pools.read().get(&sort_pair(a, b)).copied()
    }

    /// Current `(reserve_in, reserve_out)` of the pool between two tokens.
    pub fn reserves(
        &self,
        ledger: &Ledger,
        token_in: Address,
        token_out: Address,
    ) -> Result<(U256, U256), VenueError> {
        let pool = self
            .pool(token_in, token_out)
            .ok_or(VenueError::NoPool(token_in, token_out))?;
        Ok((
            ledger.balance_of(Asset::Token(token_in), pool),
            ledger.balance_of(Asset::Token(token_out), pool),
        ))
    }

    /// Input needed for one hop, rounded up by one unit.
    pub fn amount_in(
        &self,
        amount_out: U256,
        reserve_in: U256,
        reserve_out: U256,
    ) -> Result<U256, VenueError> {
        if amount_out.is_zero() {
            return Err(VenueError::InvalidPath("zero output".to_string()));
        }
        if reserve_in.is_zero() || reserve_out <= amount_out {
            return Err(VenueError::InsufficientLiquidity(amount_out));
        }
        let bps = U256::from(BPS_DENOMINATOR);
        let numerator = reserve_in
            .checked_mul(amount_out)
            .and_then(|n| n.checked_mul(bps))
            .ok_or(VenueError::Overflow)?;
        let denominator = (reserve_out - amount_out)
            .checked_mul(bps - U256::from(self.fee_bps))
            .ok_or(VenueError::Overflow)?;
        if denominator.is_zero() {
            return Err(VenueError::InsufficientLiquidity(amount_out));
        }
        (numerator / denominator)
            .checked_add(U256::from(1u64))
            .ok_or(VenueError::Overflow)
    }

    /// Amounts along `path`, working backward from the exact output.
    pub fn amounts_in(
        &self,
        ledger: &Ledger,
        path: &[Address],
        amount_out: U256,
    ) -> Result<Vec<U256>, VenueError> {
        if path.len() < 2 {
            return Err(VenueError::InvalidPath(format!("{} hops", path.len())));
        }
        let mut amounts = vec![U256::ZERO; path.len()];
        amounts[path.len() - 1] = amount_out;
        for i in (1..path.len()).rev() {
            let (reserve_in, reserve_out) = self.reserves(ledger, path[i - 1], path[i])?;
            amounts[i - 1] = self.amount_in(amounts[i], reserve_in, reserve_out)?;
        }
        Ok(amounts)
    }

    /// Move funds along the path for precomputed `amounts`.
    fn settle_hops(
        &self,
        ledger: &mut Ledger,
        order: &SwapOrder,
        amounts: &[U256],
    ) -> Result<(), VenueError> {
        let path = &order.path;
        let first_pool = self
            .pool(path[0], path[1])
            .ok_or(VenueError::NoPool(path[0], path[1]))?;
        ledger.transfer_from(
            Asset::Token(path[0]),
            self.address,
            order.payer,
            first_pool,
            amounts[0],
        )?;

        for i in 0..path.len() - 1 {
            let pool = self
                .pool(path[i], path[i + 1])
                .ok_or(VenueError::NoPool(path[i], path[i + 1]))?;
            let to = if i + 2 < path.len() {
                self.pool(path[i + 1], path[i + 2])
                    .ok_or(VenueError::NoPool(path[i + 1], path[i + 2]))?
            } else {
                order.recipient
            };
            ledger.transfer(Asset::Token(path[i + 1]), pool, to, amounts[i + 1])?;
            trace!(hop = i, pool = %pool, out = %amounts[i + 1], "Hop settled");
        }
        Ok(())
    }

    fn check_order(&self, order: &SwapOrder, now: Timestamp) -> Result<(), VenueError> {
        if now > order.deadline {
            return Err(VenueError::Expired {
                deadline: order.deadline,
                now,
            });
        }
        if order.path.len() < 2 {
            return Err(VenueError::InvalidPath(format!("{} hops", order.path.len())));
        }
        Ok(())
    }
}

impl SwapVenue for ConstantProductVenue {
    fn address(&self) -> Address {
        self.address
    }

    fn quote_exact_output(
        &self,
        ledger: &Ledger,
        path: &[Address],
        amount_out: U256,
    ) -> Result<U256, VenueError> {
        Ok(self.amounts_in(ledger, path, amount_out)?[0])
    }

    fn swap_exact_output(
        &self,
        ledger: &mut Ledger,
        order: &SwapOrder,
        now: Timestamp,
    ) -> Result<U256, VenueError> {
        self.check_order(order, now)?;
        let amounts = self.amounts_in(ledger, &order.path, order.amount_out)?;
        if amounts[0] > order.amount_in_max {
            return Err(VenueError::ExcessiveInput {
                required: amounts[0],
                max: order.amount_in_max,
            });
        }
        self.settle_hops(ledger, order, &amounts)?;
        debug!(
            amount_in = %amounts[0],
            amount_out = %order.amount_out,
            hops = order.path.len() - 1,
            "Swap executed"
        );
        Ok(amounts[0])
    }
}

/// Misbehaviour a [`ScriptedVenue`] applies to its next swaps.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueScript {
    /// Behave like the wrapped venue.
    Honest,
    /// Revert every swap.
    Reject(String),
    /// Deliver this much less output than ordered.
    UnderDeliver(U256),
    /// Report a consumed input that differs from what was pulled.
    Misreport(U256),
}

/// Constant-product venue with scriptable failures and a pre-swap hook.
#[cfg(any(test, feature = "test-utils"))]
pub struct ScriptedVenue {
    inner: ConstantProductVenue,
    script: RwLock<VenueScript>,
    hook: RwLock<Option<Box<dyn Fn() + Send + Sync>>>,
    swaps: AtomicUsize,
    quotes: AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl ScriptedVenue {
    pub fn new(inner: ConstantProductVenue) -> Self {
        Self {
            inner,
            script: RwLock::new(VenueScript::Honest),
            hook: RwLock::new(None),
            swaps: AtomicUsize::new(0),
            quotes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &ConstantProductVenue {
        &self.inner
    }

    pub fn set_script(&self, script: VenueScript) {
        *self.script.write() = script;
    }

    /// Run `hook` at the start of every swap, before any funds move.
    pub fn set_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.write() = Some(Box::new(hook));
    }

    /// Number of swap calls received, including rejected ones.
    pub fn swap_calls(&self) -> usize {
        self.swaps.load(Ordering::SeqCst)
    }

    /// Number of quote calls received.
    pub fn quote_calls(&self) -> usize {
        self.quotes.load(Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SwapVenue for ScriptedVenue {
    fn address(&self) -> Address {
        self.inner.address()
    }

    fn quote_exact_output(
        &self,
        ledger: &Ledger,
        path: &[Address],
        amount_out: U256,
    ) -> Result<U256, VenueError> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        self.inner.quote_exact_output(ledger, path, amount_out)
    }

    fn swap_exact_output(
        &self,
        ledger: &mut Ledger,
        order: &SwapOrder,
        now: Timestamp,
    ) -> Result<U256, VenueError> {
        self.swaps.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.hook.read().as_ref() {
            hook();
        }

        let script = self.script.read().clone();
        match script {
            VenueScript::Honest => self.inner.swap_exact_output(ledger, order, now),
            VenueScript::Reject(reason) => Err(VenueError::Rejected(reason)),
            VenueScript::UnderDeliver(shortfall) => {
                self.inner.check_order(order, now)?;
                let mut amounts = self.inner.amounts_in(ledger, &order.path, order.amount_out)?;
                let last = amounts.len() - 1;
                amounts[last] = amounts[last].saturating_sub(shortfall);
                self.inner.settle_hops(ledger, order, &amounts)?;
                Ok(amounts[0])
            }
            VenueScript::Misreport(reported) => {
                self.inner.swap_exact_output(ledger, order, now)?;
                Ok(reported)
            }
        }
    }
}
