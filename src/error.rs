//! Custom error types for the orchestration layer.
//!
//! This module defines the primary error type, `BorealisError`, used by motors,
//! pseudo-motors, the orchestrator and the session configuration. Using the
//! `thiserror` crate, it provides a centralized and consistent way to handle the
//! different ways a move or a scan can fail.
//!
//! ## Error Hierarchy
//!
//! - **`NotReady`**: an axis or pseudo-motor was busy when a move was requested.
//! - **`SoftLimit`**: the computed dial target lies outside the configured soft limits.
//!   Always raised *before* any hardware command is issued.
//! - **`LimitSwitch`** / **`Timeout`**: raised by a controller while waiting for an
//!   axis to settle.
//! - **`Registration`**: a component was refused by the orchestrator.
//! - **`ScanAborted`**: wraps any of the above with the index and position of the
//!   scan point that failed. Nothing is rolled back.
//! - **`Hardware`**: free-form driver failures. Driver code is free to use `anyhow`;
//!   `?` converts the error into this variant.
//!
//! By using `#[from]`, `BorealisError` can be created from the underlying error types,
//! simplifying error handling with the `?` operator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, BorealisError>;

/// Errors raised by motion nodes, the orchestrator and session setup.
#[derive(Error, Debug)]
pub enum BorealisError {
    /// The axis (or one of the children of a pseudo-motor) is not idle.
    #[error("Command interrupted: {name} is not ready yet (i.e. not idle)")]
    NotReady {
        /// Motor or pseudo-motor alias.
        name: String,
    },

    /// Target outside the soft limit interval, in dial units.
    #[error(
        "The dial position {value} for motor {} is outside \
         the available soft limit range [{low}:{high}]",
        .alias.to_uppercase()
    )]
    SoftLimit {
        /// Offending dial value.
        value: f64,
        /// Motor alias.
        alias: String,
        /// Lower bound (inclusive).
        low: f64,
        /// Upper bound (inclusive).
        high: f64,
    },

    /// Hardware end-of-travel switch fired while waiting for a move to settle.
    #[error("Limit switch activated on axis {axis} of {controller}, move aborted")]
    LimitSwitch {
        /// Controller alias.
        controller: String,
        /// Controller-native axis identifier.
        axis: String,
    },

    /// The axis never reached its target in the allotted time.
    #[error("Axis {axis} never reached target position {target}. Stopped at {position}")]
    Timeout {
        /// Controller-native axis identifier.
        axis: String,
        /// Requested dial position.
        target: f64,
        /// Last position read before giving up.
        position: f64,
    },

    /// A component could not be registered with the orchestrator.
    #[error("Cannot register {role} component '{name}': {reason}")]
    Registration {
        /// Registry the component was offered to.
        role: &'static str,
        /// Component name.
        name: String,
        /// Why it was refused.
        reason: String,
    },

    /// A pseudo-motor was given a different number of children and laws.
    #[error(
        "Length of motor list ({children}) does not match \
         the length of conversion law list ({laws})"
    )]
    LawCountMismatch {
        /// Number of children.
        children: usize,
        /// Number of conversion laws.
        laws: usize,
    },

    /// A pseudo-motor was built without children.
    #[error("Pseudo-motor '{0}' needs at least one child")]
    EmptyComposition(String),

    /// A pseudo-motor would contain itself.
    #[error("Pseudo-motor '{name}' would contain itself through '{via}'")]
    CyclicComposition {
        /// Pseudo-motor being built.
        name: String,
        /// Child through which the cycle closes.
        via: String,
    },

    /// Rejected input value (scan points, acquisition time, limits).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A scan stopped at `index`; components already moved stay where they are.
    #[error("Scan aborted at point #{index} (position {position}): {source}")]
    ScanAborted {
        /// Zero-based point index.
        index: usize,
        /// Requested initiator position.
        position: f64,
        /// What stopped the point.
        #[source]
        source: Box<BorealisError>,
    },

    /// Configuration could not be extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration extracted but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or device I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event could not be serialized by a recorder.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Driver failure.
    #[error("Hardware error: {0}")]
    Hardware(#[from] anyhow::Error),
}

impl From<figment::Error> for BorealisError {
    fn from(err: figment::Error) -> Self {
        BorealisError::Config(Box::new(err))
    }
}

/// Coarse classification of an error, for logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Precondition refused a move (soft limit, not ready).
    Safety,
    /// Reported by the hardware (limit switch, driver failure).
    Hardware,
    /// Settle never observed.
    Timeout,
    /// Setup problem: registration, composition, configuration.
    Configuration,
}

impl ErrorCategory {
    /// Upper-case label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Safety => "SAFETY",
            ErrorCategory::Hardware => "HARDWARE",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Configuration => "CONFIGURATION",
        }
    }
}

impl BorealisError {
    /// Category of the root cause. `ScanAborted` reports the category of what it wraps.
    pub fn category(&self) -> ErrorCategory {
        match self {
            BorealisError::NotReady { .. }
            | BorealisError::SoftLimit { .. }
            | BorealisError::InvalidArgument(_) => ErrorCategory::Safety,
            BorealisError::LimitSwitch { .. }
            | BorealisError::Hardware(_)
            | BorealisError::Io(_)
            | BorealisError::Serialization(_) => ErrorCategory::Hardware,
            BorealisError::Timeout { .. } => ErrorCategory::Timeout,
            BorealisError::Registration { .. }
            | BorealisError::LawCountMismatch { .. }
            | BorealisError::EmptyComposition(_)
            | BorealisError::CyclicComposition { .. }
            | BorealisError::Config(_)
            | BorealisError::Configuration(_) => ErrorCategory::Configuration,
            BorealisError::ScanAborted { source, .. } => source.category(),
        }
    }

    /// Innermost error, unwrapping any `ScanAborted` layers.
    pub fn root_cause(&self) -> &BorealisError {
        match self {
            BorealisError::ScanAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
