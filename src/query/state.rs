//! Statement lifecycle state.
//!
//! States are ordered `Freed < Prepared < Described < Executed < Fetching <
//! Fetched`. Changing state is an unconditional overwrite: every operation on
//! [`Statement`](super::Statement) checks its own preconditions through the
//! predicates below and then stores the state it reached.

use std::fmt;

/// Lifecycle state of a statement handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum StatementState {
    /// No driver handle is held
    #[default]
    Freed,
    /// Handle parsed, nothing executed yet
    Prepared,
    /// Executed in describe-only mode; column metadata is available
    Described,
    /// Executed; rows are ready to fetch
    Executed,
    /// A fetch is in progress
    Fetching,
    /// All rows consumed, or the fetch was abandoned
    Fetched,
}

impl StatementState {
    pub const fn freed() -> Self {
        Self::Freed
    }

    pub const fn prepared() -> Self {
        Self::Prepared
    }

    pub const fn described() -> Self {
        Self::Described
    }

    pub const fn executed() -> Self {
        Self::Executed
    }

    pub const fn fetching() -> Self {
        Self::Fetching
    }

    pub const fn fetched() -> Self {
        Self::Fetched
    }

    /// A handle has been acquired.
    pub fn is_prepared(&self) -> bool {
        *self >= Self::Prepared
    }

    /// Column metadata can be read without executing again.
    pub fn is_described(&self) -> bool {
        *self >= Self::Described
    }

    /// Rows can be fetched right away.
    pub fn is_fetchable(&self) -> bool {
        *self == Self::Executed
    }

    /// No fetch has started since the last execution.
    pub fn is_not_fetched_yet(&self) -> bool {
        *self < Self::Fetching
    }

    /// Releasing the handle cannot break an in-progress row traversal.
    pub fn is_safe_to_free(&self) -> bool {
        *self != Self::Fetching
    }
}

impl fmt::Display for StatementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Freed => "freed",
            Self::Prepared => "prepared",
            Self::Described => "described",
            Self::Executed => "executed",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
        };
        f.write_str(name)
    }
}
