//! Simulated payers.

use alloy_primitives::{Address, U256};
use autosettle_common::{Asset, SettlementAmount, SettlementRequest, Timestamp};
use rand::Rng;

/// A wallet that pays invoices.
#[derive(Debug, Clone)]
pub struct SimulatedPayer {
    /// Name used by scenarios.
    pub name: String,
    /// Account on the ledger.
    pub address: Address,
    /// Assets this payer holds, in order of preference.
    pub wallet: Vec<Asset>,
}

impl SimulatedPayer {
    /// Create a new simulated payer.
    pub fn new(name: impl Into<String>, address: Address, wallet: Vec<Asset>) -> Self {
        Self {
            name: name.into(),
            address,
            wallet,
        }
    }

    /// Draw a random invoice payment between $1 and $1000.
    pub fn random_payment<R: Rng>(&self, rng: &mut R, invoice: String, now: Timestamp) -> Option<SettlementRequest> {
        if self.wallet.is_empty() {
            return None;
        }
        let asset = self.wallet[rng.gen_range(0..self.wallet.len())];
        let cents = rng.gen_range(100..100_000u64);
        // Most wallets leave a minute of headroom; a few submit late.
        let deadline = if rng.gen_bool(0.05) { now - 1 } else { now + 60 };
        Some(self.request(asset, SettlementAmount::from_cents(cents), invoice, deadline))
    }

    /// Build a request for `amount`. The cap and attached value are set by the caller.
    pub fn request(
        &self,
        asset: Asset,
        amount: SettlementAmount,
        invoice: String,
        deadline: Timestamp,
    ) -> SettlementRequest {
        SettlementRequest::new(self.address, asset, amount, invoice, deadline)
    }
}

/// Payer factory for creating test payers.
pub struct PayerFactory;

impl PayerFactory {
    /// Create `count` payers. Named ones come first; the rest are numbered.
    pub fn create_payers(count: usize, assets: &[Asset]) -> Vec<SimulatedPayer> {
        let names = ["alice", "bob", "carol", "dave", "erin", "frank"];

        (0..count)
            .map(|i| {
                let name = names
                    .get(i)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("payer-{}", i + 1));
                // Leave the low byte range to market contracts.
                let address = Address::with_last_byte(0xa0u8.wrapping_add(i as u8));
                SimulatedPayer::new(name, address, assets.to_vec())
            })
            .collect()
    }
}

/// Scale a cap by `bps` of headroom.
pub fn with_headroom(amount: U256, bps: u16) -> U256 {
    amount.saturating_mul(U256::from(10_000u64 + u64::from(bps))) / U256::from(10_000u64)
}
