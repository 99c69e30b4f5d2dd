//! Core library for the borealis spectrometer control layer.
//!
//! This library contains the motion model (motors with dial/user conversion and
//! soft limits, composable pseudo-motors), the capability traits implemented by
//! hardware drivers, and the orchestrator that runs step scans and publishes
//! their events to data recorders.
//!
//! ```text
//! MotionNode ──notify(Scan)──► Orchestrator ──ScanEvent──► DataRecorder
//!     │                            │
//!  Controller                   Detector
//! ```

pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod measurement;
pub mod motion;
pub mod orchestrator;
pub mod recorder;
pub mod session;

pub use error::{AppResult, BorealisError, ErrorCategory};
pub use motion::{Direction, MotionNode, Motor, PseudoMotor, SoftLimits};
pub use orchestrator::{ComponentMessage, Orchestrator, ScanEvent, ScanRequest, ScanState};
