//! AutoSettle Common Types
//!
//! Shared types used across the AutoSettle workspace: identifiers, assets
//! and fixed-point amounts, token configuration, the settlement state
//! machine, audit events and the error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod token;
pub mod settlement;
pub mod events;
pub mod error;
pub mod time;

pub use alloy_primitives::{Address, U256};

pub use identifiers::*;
pub use monetary::*;
pub use token::*;
pub use settlement::*;
pub use events::*;
pub use error::*;
pub use time::*;
