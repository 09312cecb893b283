//! Error handling for identity-converge
//!
//! Centralized error type using thiserror. Attribute and guard errors are fatal
//! and abort a run before any unit is applied; collaborator failures on a single
//! unit are recorded in the run report instead of being raised.

use thiserror::Error;

/// Main error type for identity-converge
#[derive(Error, Debug)]
pub enum ConvergeError {
    /// A referenced attribute path is not set at any tier and has no default
    #[error("Attribute not set: '{path}' is not defined at any precedence tier")]
    AttributeResolution { path: String },

    /// A guard attribute holds something other than a boolean
    #[error("Guard evaluation failed: '{path}' must be a boolean, found {found}")]
    GuardEvaluation { path: String, found: String },

    /// An enum-valued selector holds an unknown literal
    #[error("Invalid value for '{path}': '{value}' (expected {expected})")]
    InvalidValue {
        path: String,
        value: String,
        expected: String,
    },

    /// An external collaborator failed in a way that cannot be scoped to one unit
    #[error("{unit} failed: {reason}")]
    Collaborator { unit: String, reason: String },

    /// Resource graph construction or ordering errors
    #[error("Resource graph error: {0}")]
    Graph(String),

    /// Unit state machine violation
    #[error("Invalid transition for {unit}: {from} -> {to}")]
    Transition {
        unit: String,
        from: String,
        to: String,
    },

    /// IO errors (attribute files, local host)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors (attribute file shape, CLI input)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for convergence operations
pub type Result<T> = std::result::Result<T, ConvergeError>;

impl ConvergeError {
    /// Create an attribute resolution error
    pub fn missing(path: impl Into<String>) -> Self {
        Self::AttributeResolution { path: path.into() }
    }

    /// Create a guard evaluation error
    pub fn guard(path: impl Into<String>, found: impl Into<String>) -> Self {
        Self::GuardEvaluation {
            path: path.into(),
            found: found.into(),
        }
    }

    /// Create an invalid selector value error
    pub fn invalid_value(
        path: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            path: path.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a collaborator error
    pub fn collaborator(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Collaborator {
            unit: unit.into(),
            reason: reason.into(),
        }
    }

    /// Create a resource graph error
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if this error names an attribute path (resolution, guard, value)
    pub fn is_attribute_error(&self) -> bool {
        matches!(
            self,
            Self::AttributeResolution { .. } | Self::GuardEvaluation { .. } | Self::InvalidValue { .. }
        )
    }
}
