//! Engine operational state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalState {
    /// Accepting quotes and payments.
    Active,
    /// Administratively paused; every quote and payment is rejected.
    Paused,
}

impl OperationalState {
    /// Check if the engine is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, OperationalState::Active)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, OperationalState::Paused)
    }
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationalState::Active => write!(f, "active"),
            OperationalState::Paused => write!(f, "paused"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paused_rejects() {
        assert!(OperationalState::Active.accepts_requests());
        assert!(!OperationalState::Paused.accepts_requests());
        assert!(OperationalState::Paused.is_paused());
        assert_eq!(OperationalState::Paused.to_string(), "paused");
    }
}
