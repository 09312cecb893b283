//! Unit State Machine
//!
//! Tracks where each resource unit is within one convergence run and rejects
//! transitions the engine must never make.
//!
//! # State Flow
//!
//! ```text
//! Declared
//!     ↓
//! Diffing ──────────→ Unchanged
//!     ↓
//! Applying ─────────→ Applied | Deleted
//!     ↓
//! Failed
//!
//! (Declared can also go straight to Skipped when a predecessor did not succeed)
//! ```

use crate::error::ConvergeError;
use crate::graph::UnitId;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Lifecycle of one unit within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    Declared,
    Diffing,
    Applying,
    Unchanged,
    Applied,
    Deleted,
    Failed,
    Skipped,
}

impl UnitState {
    /// Returns true for states a unit never leaves during a run
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Unchanged | Self::Applied | Self::Deleted | Self::Failed | Self::Skipped
        )
    }

    /// Returns true if dependents of a unit in this state may proceed
    #[inline]
    pub const fn unblocks_dependents(self) -> bool {
        matches!(self, Self::Unchanged | Self::Applied | Self::Deleted)
    }

    /// Whether `self -> to` is a legal step
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Declared, Self::Diffing)
                | (Self::Declared, Self::Skipped)
                | (Self::Diffing, Self::Unchanged)
                | (Self::Diffing, Self::Applying)
                | (Self::Diffing, Self::Failed)
                | (Self::Applying, Self::Applied)
                | (Self::Applying, Self::Deleted)
                | (Self::Applying, Self::Unchanged)
                | (Self::Applying, Self::Failed)
        )
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::Diffing => "diffing",
            Self::Applying => "applying",
            Self::Unchanged => "unchanged",
            Self::Applied => "applied",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitTransitionError {
    #[error("Unknown unit {unit}")]
    UnknownUnit { unit: UnitId },

    #[error("Cannot move {unit} from {from} to {to}")]
    Illegal {
        unit: UnitId,
        from: UnitState,
        to: UnitState,
    },
}

impl From<UnitTransitionError> for ConvergeError {
    fn from(err: UnitTransitionError) -> Self {
        match err {
            UnitTransitionError::UnknownUnit { unit } => {
                ConvergeError::graph(format!("unknown unit {}", unit))
            }
            UnitTransitionError::Illegal { unit, from, to } => ConvergeError::Transition {
                unit: unit.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            },
        }
    }
}

/// State of every unit in the current run.
#[derive(Debug, Clone, Default)]
pub struct UnitTracker {
    states: HashMap<UnitId, UnitState>,
}

impl UnitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit in the `Declared` state.
    pub fn declare(&mut self, unit: &UnitId) {
        self.states.insert(unit.clone(), UnitState::Declared);
    }

    pub fn state(&self, unit: &UnitId) -> Option<UnitState> {
        self.states.get(unit).copied()
    }

    /// Move `unit` to `to`.
    ///
    /// # Errors
    ///
    /// - `UnknownUnit` if the unit was never declared
    /// - `Illegal` if the step is not part of the state flow
    pub fn transition(&mut self, unit: &UnitId, to: UnitState) -> Result<(), UnitTransitionError> {
        let from = self
            .states
            .get(unit)
            .copied()
            .ok_or_else(|| UnitTransitionError::UnknownUnit { unit: unit.clone() })?;
        if !from.can_transition_to(to) {
            return Err(UnitTransitionError::Illegal {
                unit: unit.clone(),
                from,
                to,
            });
        }
        self.states.insert(unit.clone(), to);
        Ok(())
    }

    /// First predecessor that did not end in a state allowing dependents.
    pub fn blocker<'a>(&self, predecessors: &'a [UnitId]) -> Option<&'a UnitId> {
        predecessors
            .iter()
            .find(|p| !self.state(p).is_some_and(UnitState::unblocks_dependents))
    }

    /// True once every declared unit is terminal.
    pub fn all_terminal(&self) -> bool {
        self.states.values().all(|s| s.is_terminal())
    }
}
