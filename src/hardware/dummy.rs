//! Dummy Hardware Implementations
//!
//! Simulated devices for sessions without physical hardware and for tests.
//! All dummy devices use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Dummies
//!
//! - `DummyController` - In-memory multi-axis controller, moves are instantaneous
//! - `DummyDetector` - Spectrum source that returns a ramp after the requested dwell
//!
//! `DummyController` also records every axis command and can simulate a busy axis,
//! an engaged limit switch, a stuck axis or a one-shot communication failure.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::hardware::capabilities::{Component, Controller, Detector, DeviceInfo, HasDeviceInfo};
use crate::measurement::{DetectorInfo, Mca, McaMetadata};

// =============================================================================
// DummyController - Simulated Motion Controller
// =============================================================================

/// Command received by a [`DummyController`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisCommand {
    /// `move_axis` call.
    Move {
        /// Controller-native axis identifier.
        axis: String,
        /// Requested dial position.
        target: f64,
    },
    /// `set_zero` call.
    Zero {
        /// Controller-native axis identifier.
        axis: String,
    },
}

/// In-memory controller.
///
/// Unknown axes read as 0.0. Moves complete immediately unless the axis is stuck
/// or its limit switch is engaged.
///
/// # Example
///
/// ```rust,ignore
/// let ctrl = DummyController::new("DummyCtrl");
/// ctrl.move_axis("1", 10.0).await?;
/// assert_eq!(ctrl.get_axis_position("1").await?, 10.0);
/// ```
pub struct DummyController {
    alias: String,
    positions: RwLock<HashMap<String, f64>>,
    busy: RwLock<HashSet<String>>,
    limit_switches: RwLock<HashSet<String>>,
    stuck: RwLock<HashSet<String>>,
    command_log: RwLock<Vec<AxisCommand>>,
    fail_next: AtomicBool,
}

impl DummyController {
    /// Controller with every axis idle at dial 0.
    pub fn new(alias: impl Into<String>) -> Self {
        let alias = alias.into();
        info!(controller = %alias, "Dummy controller initialised");
        Self {
            alias,
            positions: RwLock::new(HashMap::new()),
            busy: RwLock::new(HashSet::new()),
            limit_switches: RwLock::new(HashSet::new()),
            stuck: RwLock::new(HashSet::new()),
            command_log: RwLock::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Mark an axis busy (`ready == false`) or idle.
    pub async fn set_ready(&self, axis: &str, ready: bool) {
        let mut busy = self.busy.write().await;
        if ready {
            busy.remove(axis);
        } else {
            busy.insert(axis.to_string());
        }
    }

    /// Engage or release the limit switch of an axis. An engaged axis ignores moves.
    pub async fn set_limit_switch(&self, axis: &str, engaged: bool) {
        let mut switches = self.limit_switches.write().await;
        if engaged {
            switches.insert(axis.to_string());
        } else {
            switches.remove(axis);
        }
    }

    /// A stuck axis accepts move commands but never changes position.
    pub async fn set_stuck(&self, axis: &str, stuck: bool) {
        let mut set = self.stuck.write().await;
        if stuck {
            set.insert(axis.to_string());
        } else {
            set.remove(axis);
        }
    }

    /// Make the next `move_axis` call fail with a hardware error.
    pub fn inject_next_failure(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Every command received so far.
    pub async fn command_log(&self) -> Vec<AxisCommand> {
        self.command_log.read().await.clone()
    }

    /// Number of `move_axis` calls received for `axis`.
    pub async fn move_count(&self, axis: &str) -> usize {
        self.command_log
            .read()
            .await
            .iter()
            .filter(|cmd| matches!(cmd, AxisCommand::Move { axis: a, .. } if a == axis))
            .count()
    }
}

impl Default for DummyController {
    fn default() -> Self {
        Self::new("DummyCtrl")
    }
}

#[async_trait]
impl Controller for DummyController {
    fn alias(&self) -> &str {
        &self.alias
    }

    async fn move_axis(&self, axis: &str, target: f64) -> AppResult<()> {
        self.command_log.write().await.push(AxisCommand::Move {
            axis: axis.to_string(),
            target,
        });

        if self.fail_next.swap(false, Ordering::SeqCst) {
            let err = anyhow!("{}: injected failure while moving axis {}", self.alias, axis);
            return Err(err.into());
        }

        let blocked = self.stuck.read().await.contains(axis)
            || self.limit_switches.read().await.contains(axis);
        if blocked {
            debug!(controller = %self.alias, axis, target, "Move ignored by blocked axis");
            return Ok(());
        }

        self.positions.write().await.insert(axis.to_string(), target);
        debug!(controller = %self.alias, axis, target, "Axis moved");
        Ok(())
    }

    async fn get_axis_position(&self, axis: &str) -> AppResult<f64> {
        Ok(self.positions.read().await.get(axis).copied().unwrap_or(0.0))
    }

    async fn is_axis_ready(&self, axis: &str) -> AppResult<bool> {
        Ok(!self.busy.read().await.contains(axis))
    }

    async fn is_limit_switch_activated(&self, axis: &str) -> AppResult<bool> {
        Ok(self.limit_switches.read().await.contains(axis))
    }

    async fn set_axis_to_zero(&self, axis: &str) -> AppResult<()> {
        self.command_log.write().await.push(AxisCommand::Zero {
            axis: axis.to_string(),
        });
        self.positions.write().await.insert(axis.to_string(), 0.0);
        Ok(())
    }
}

// =============================================================================
// DummyDetector - Simulated Spectrometer Detector
// =============================================================================

/// Number of channels produced by a default dummy detector.
pub const DUMMY_CHANNELS: usize = 10;

/// Detector returning the ramp `0, 1, .., channels-1` after sleeping for the
/// requested acquisition time.
pub struct DummyDetector {
    alias: String,
    channels: usize,
    acquisitions: AtomicUsize,
    stops: AtomicUsize,
}

impl DummyDetector {
    /// Detector with [`DUMMY_CHANNELS`] channels.
    pub fn new(alias: impl Into<String>) -> Self {
        Self::with_channels(alias, DUMMY_CHANNELS)
    }

    /// Detector producing `channels` channels per spectrum.
    pub fn with_channels(alias: impl Into<String>, channels: usize) -> Self {
        let alias = alias.into();
        info!(detector = %alias, channels, "Dummy detector initialised");
        Self {
            alias,
            channels,
            acquisitions: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Number of completed acquisitions.
    pub fn acquisition_count(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls received.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Default for DummyDetector {
    fn default() -> Self {
        Self::new("DummyDet")
    }
}

impl Component for DummyDetector {
    fn name(&self) -> &str {
        &self.alias
    }

    fn as_device_info(&self) -> Option<&dyn HasDeviceInfo> {
        Some(self)
    }
}

impl HasDeviceInfo for DummyDetector {
    fn device_info(&self) -> DeviceInfo {
        let info = self.detector_info();
        DeviceInfo::new(self.alias.as_str())
            .with_attr("serial_number", info.serial_number)
            .with_attr("type", info.kind)
            .with_data_set("counts", self.channels)
            .with_data_set("runtime", 1)
            .with_data_set("icr", 1)
            .with_data_set("ocr", 1)
    }
}

#[async_trait]
impl Detector for DummyDetector {
    async fn acquisition(&self, duration: Duration) -> AppResult<Mca> {
        debug!(detector = %self.alias, ?duration, "Acquisition started");
        sleep(duration).await;

        let counts: Vec<u64> = (0..self.channels as u64).collect();
        let runtime = duration.as_secs_f64();
        let rate = if runtime > 0.0 {
            counts.iter().sum::<u64>() as f64 / runtime
        } else {
            0.0
        };
        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        let metadata =
            McaMetadata::new(runtime, runtime, self.detector_info()).with_rates(rate, rate);
        Ok(Mca::new(counts, metadata))
    }

    async fn stop(&self) -> AppResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        info!(detector = %self.alias, "Detector stopped");
        Ok(())
    }

    fn detector_info(&self) -> DetectorInfo {
        DetectorInfo {
            serial_number: "Unknown".to_string(),
            alias: self.alias.clone(),
            kind: "DummyDetector".to_string(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
