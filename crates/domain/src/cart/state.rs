//! Cart state machine.

use serde::{Deserialize, Serialize};

/// The state of a cart in its lifecycle.
///
/// ```text
/// Active ──► CheckedOut
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CartState {
    /// Items can be added and removed.
    #[default]
    Active,

    /// The cart was checked out (terminal state).
    CheckedOut,
}

impl CartState {
    /// Returns true if items can be modified in this state.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, CartState::Active)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, CartState::CheckedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CartState::Active => "Active",
            CartState::CheckedOut => "CheckedOut",
        }
    }
}

impl std::fmt::Display for CartState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_active() {
        assert_eq!(CartState::default(), CartState::Active);
    }

    #[test]
    fn only_active_can_modify_items() {
        assert!(CartState::Active.can_modify_items());
        assert!(!CartState::CheckedOut.can_modify_items());
    }

    #[test]
    fn checked_out_is_terminal() {
        assert!(!CartState::Active.is_terminal());
        assert!(CartState::CheckedOut.is_terminal());
    }

    #[test]
    fn display() {
        assert_eq!(CartState::Active.to_string(), "Active");
        assert_eq!(CartState::CheckedOut.to_string(), "CheckedOut");
    }
}
