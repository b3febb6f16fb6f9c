//! AutoSettle Engine
//!
//! The settlement engine is the single entry point for payments. It prices
//! the payer asset, reserves it, converts it on a swap venue, refunds the
//! dust and delivers the exact settlement amount to the merchant, all
//! inside one rollback-protected ledger checkpoint.

pub mod admin;
pub mod config;
pub mod events;
pub mod executor;
pub mod guard;
pub mod metrics;
pub mod orchestrator;
pub mod refund;
pub mod registry;
pub mod state;

pub use admin::AdminCap;
pub use config::EngineConfig;
pub use events::EventLog;
pub use executor::SettlementExecutor;
pub use guard::ReentrancyGuard;
pub use metrics::{EngineMetrics, MetricsSnapshot, SharedMetrics};
pub use orchestrator::{OracleSettlementEngine, SettlementEngine, SpotSettlementEngine};
pub use refund::RefundCalculator;
pub use registry::TokenRegistry;
pub use state::OperationalState;
