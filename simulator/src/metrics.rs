//! Simulation metrics.

use std::collections::{BTreeMap, VecDeque};

use autosettle_common::SettlementAmount;
use rust_decimal::Decimal;
use serde::Serialize;

/// Simulation metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Total payments attempted.
    pub total_payments: u64,
    /// Payments that settled.
    pub settled: u64,
    /// Payments that reverted.
    pub failed: u64,
    /// Payments that returned dust to the payer.
    pub refunds: u64,
    /// Settled volume in dollars.
    pub volume: Decimal,
    /// Failures by error code.
    pub failures_by_code: BTreeMap<&'static str, u64>,
    /// Expectation mismatches in scripted steps.
    pub mismatches: u64,
    /// Latency samples (µs).
    #[serde(skip)]
    latency_samples: VecDeque<u64>,
    #[serde(skip)]
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_payments: 0,
            settled: 0,
            failed: 0,
            refunds: 0,
            volume: Decimal::ZERO,
            failures_by_code: BTreeMap::new(),
            mismatches: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record a settled payment.
    pub fn record_success(&mut self, amount: SettlementAmount, refunded: bool, latency_us: u64) {
        self.total_payments += 1;
        self.settled += 1;
        if refunded {
            self.refunds += 1;
        }
        self.volume += amount.as_decimal();
        self.sample(latency_us);
    }

    /// Record a reverted payment.
    pub fn record_failure(&mut self, code: &'static str, latency_us: u64) {
        self.total_payments += 1;
        self.failed += 1;
        *self.failures_by_code.entry(code).or_insert(0) += 1;
        self.sample(latency_us);
    }

    pub fn record_mismatch(&mut self) {
        self.mismatches += 1;
    }

    fn sample(&mut self, latency_us: u64) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Get average latency in µs.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_payments == 0 {
            return 0.0;
        }

        self.settled as f64 / self.total_payments as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
