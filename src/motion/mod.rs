//! Motion nodes: motors and pseudo-motors.
//!
//! A motion node is anything with a user-space position that can be validated and
//! moved. Two implementations exist:
//!
//! - [`Motor`]: bound to one axis of a shared [`Controller`](crate::hardware::Controller)
//! - [`PseudoMotor`]: drives an ordered list of other motion nodes through per-child
//!   conversion laws and reports one aggregate position through a position law
//!
//! Pseudo-motors can nest to arbitrary depth. Children are shared `Arc`s, so one
//! motor may take part in several pseudo-motors at once.
//!
//! # Safety contract
//!
//! `amove` validates *everything* before issuing the first hardware command:
//! readiness first, then soft limits (recursively, for every child). Once motion
//! has started, a failure on one child leaves the previous children where they are.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, BorealisError};
use crate::hardware::Component;

pub mod motor;
pub mod pseudo_motor;

pub use motor::Motor;
pub use pseudo_motor::{ConversionLaw, PositionLaw, PseudoMotor};

/// Shared capability set of motors and pseudo-motors.
#[async_trait]
pub trait MotionNode: Component {
    /// Current user-space position, read live from the hardware.
    async fn user_position(&self) -> AppResult<f64>;

    /// True if the node (and every child, for pseudo-motors) is idle.
    async fn is_ready(&self) -> AppResult<bool>;

    /// Validate a user-space target against every soft limit it would touch.
    ///
    /// Pure validation: never issues a hardware command.
    async fn check_soft_limits(&self, target: f64) -> AppResult<()>;

    /// Move to an absolute user-space target and wait until settled.
    async fn amove(&self, target: f64) -> AppResult<()>;

    /// Direct children, in declared order. Empty for leaf nodes.
    fn children(&self) -> &[Arc<dyn MotionNode>] {
        &[]
    }
}

/// Sign relating dial and user positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// `user = dial + offset`
    #[default]
    Positive,
    /// `user = -dial + offset`
    Negative,
}

impl Direction {
    /// `+1.0` or `-1.0`.
    pub fn coeff(self) -> f64 {
        match self {
            Direction::Positive => 1.0,
            Direction::Negative => -1.0,
        }
    }

    /// Lowercase name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        }
    }
}

impl From<bool> for Direction {
    /// `true` means positive direction.
    fn from(positive: bool) -> Self {
        if positive {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }
}

/// Inclusive soft-limit interval in dial units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftLimits {
    low: f64,
    high: f64,
}

impl SoftLimits {
    /// Unconstrained interval.
    pub const UNBOUNDED: SoftLimits = SoftLimits {
        low: f64::NEG_INFINITY,
        high: f64::INFINITY,
    };

    /// # Errors
    /// `InvalidArgument` if a bound is NaN or `low > high`.
    pub fn new(low: f64, high: f64) -> AppResult<Self> {
        if low.is_nan() || high.is_nan() || low > high {
            return Err(BorealisError::InvalidArgument(format!(
                "invalid soft limit range [{low}:{high}]"
            )));
        }
        Ok(Self { low, high })
    }

    /// Lower bound, dial units.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper bound, dial units.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Finite bounds are inclusive. Infinite and NaN positions are never contained,
    /// so `UNBOUNDED` is the open interval (-inf, +inf).
    pub fn contains(&self, dial: f64) -> bool {
        dial.is_finite() && dial >= self.low && dial <= self.high
    }
}

impl Default for SoftLimits {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}
