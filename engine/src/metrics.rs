//! Metrics collection for engine monitoring.

use autosettle_common::{RouteKind, SettleError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Engine metrics.
pub struct EngineMetrics {
    /// Total payment calls that passed the reentrancy guard.
    pub settlements_total: AtomicU64,
    /// Settled payments.
    pub settlements_success: AtomicU64,
    /// Reverted payments.
    pub settlements_reverted: AtomicU64,
    /// Calls rejected by the reentrancy guard.
    pub reentrancy_rejected: AtomicU64,
    /// Payments in the settlement asset itself.
    pub routes_same_asset: AtomicU64,
    /// Payments converted on a direct route.
    pub routes_direct: AtomicU64,
    /// Payments converted via the intermediate.
    pub routes_via: AtomicU64,
    /// Nonzero dust refunds.
    pub refunds_issued: AtomicU64,
    /// Quotes served.
    pub quotes_served: AtomicU64,
    /// Quotes that failed.
    pub quotes_failed: AtomicU64,
}

impl EngineMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            settlements_total: AtomicU64::new(0),
            settlements_success: AtomicU64::new(0),
            settlements_reverted: AtomicU64::new(0),
            reentrancy_rejected: AtomicU64::new(0),
            routes_same_asset: AtomicU64::new(0),
            routes_direct: AtomicU64::new(0),
            routes_via: AtomicU64::new(0),
            refunds_issued: AtomicU64::new(0),
            quotes_served: AtomicU64::new(0),
            quotes_failed: AtomicU64::new(0),
        }
    }

    pub fn settlement_initiated(&self) {
        self.settlements_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a settled payment and the route it took.
    pub fn settlement_success(&self, route: RouteKind, refunded: bool) {
        self.settlements_success.fetch_add(1, Ordering::Relaxed);
        let counter = match route {
            RouteKind::SameAsset => &self.routes_same_asset,
            RouteKind::Direct => &self.routes_direct,
            RouteKind::ViaIntermediate => &self.routes_via,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if refunded {
            self.refunds_issued.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn settlement_reverted(&self) {
        self.settlements_reverted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call that never got past the guard.
    pub fn guard_rejected(&self, error: &SettleError) {
        if matches!(error, SettleError::Reentrancy) {
            self.reentrancy_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn quote_served(&self) {
        self.quotes_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn quote_failed(&self) {
        self.quotes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            settlements_total: self.settlements_total.load(Ordering::Relaxed),
            settlements_success: self.settlements_success.load(Ordering::Relaxed),
            settlements_reverted: self.settlements_reverted.load(Ordering::Relaxed),
            reentrancy_rejected: self.reentrancy_rejected.load(Ordering::Relaxed),
            routes_same_asset: self.routes_same_asset.load(Ordering::Relaxed),
            routes_direct: self.routes_direct.load(Ordering::Relaxed),
            routes_via: self.routes_via.load(Ordering::Relaxed),
            refunds_issued: self.refunds_issued.load(Ordering::Relaxed),
            quotes_served: self.quotes_served.load(Ordering::Relaxed),
            quotes_failed: self.quotes_failed.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("settlements_total", "Total payment calls", snapshot.settlements_total),
            ("settlements_success", "Settled payments", snapshot.settlements_success),
            ("settlements_reverted", "Reverted payments", snapshot.settlements_reverted),
            ("reentrancy_rejected", "Calls rejected by the reentrancy guard", snapshot.reentrancy_rejected),
            ("routes_same_asset", "Payments in the settlement asset", snapshot.routes_same_asset),
            ("routes_direct", "Payments on a direct route", snapshot.routes_direct),
            ("routes_via", "Payments via the intermediate", snapshot.routes_via),
            ("refunds_issued", "Dust refunds issued", snapshot.refunds_issued),
            ("quotes_served", "Quotes served", snapshot.quotes_served),
            ("quotes_failed", "Quotes failed", snapshot.quotes_failed),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP autosettle_{name} {help}\n# TYPE autosettle_{name} counter\nautosettle_{name} {value}\n\n"
            ));
        }
        output
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub settlements_total: u64,
    pub settlements_success: u64,
    pub settlements_reverted: u64,
    pub reentrancy_rejected: u64,
    pub routes_same_asset: u64,
    pub routes_direct: u64,
    pub routes_via: u64,
    pub refunds_issued: u64,
    pub quotes_served: u64,
    pub quotes_failed: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<EngineMetrics>;
