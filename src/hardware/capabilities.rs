//! Capability traits consumed by the orchestration layer.
//!
//! Concrete drivers (Huber, Newport, Amptek, Ketek, ...) live outside this crate and
//! only need to implement these traits. Positions are always in the controller's
//! native ("dial") units here; user-space conversion happens in [`crate::motion`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{AppResult, BorealisError};
use crate::measurement::{DetectorInfo, Mca};

/// Default time allowed for an axis to settle.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Default polling period while waiting for an axis to settle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Absolute tolerance, in dial units, for "axis is at target".
pub const DEFAULT_POSITION_TOLERANCE: f64 = 5e-4;

/// How long and how finely to wait for an axis to reach its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettlePolicy {
    /// Give up (with `Timeout`) once this much time has elapsed.
    pub timeout: Duration,
    /// Delay between two position reads.
    pub poll_interval: Duration,
    /// Absolute tolerance, dial units.
    pub tolerance: f64,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SETTLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            tolerance: DEFAULT_POSITION_TOLERANCE,
        }
    }
}

impl SettlePolicy {
    /// True when `position` is within tolerance of `target`.
    pub fn is_settled(&self, position: f64, target: f64) -> bool {
        (position - target).abs() <= self.tolerance
    }
}

/// Multi-axis motion controller.
///
/// One instance is shared (through `Arc`) by every [`Motor`](crate::motion::Motor)
/// addressing the same physical controller. Implementations must serialize their
/// own axis commands if they are ever driven from several tasks.
///
/// ## Limit Handling
/// - Soft limits: checked by the motor before `move_axis` is ever called
/// - Hard limits: reported through `is_limit_switch_activated` and turned into
///   [`BorealisError::LimitSwitch`] by `wait_motion_end`
#[async_trait]
pub trait Controller: Send + Sync {
    /// Controller alias used in logs and device descriptors.
    fn alias(&self) -> &str;

    /// Command a move and return immediately (motion continues on the hardware).
    async fn move_axis(&self, axis: &str, target: f64) -> AppResult<()>;

    /// Current dial position of an axis.
    async fn get_axis_position(&self, axis: &str) -> AppResult<f64>;

    /// True if the axis is idle and can accept a command.
    async fn is_axis_ready(&self, axis: &str) -> AppResult<bool>;

    /// True if a hardware end-of-travel switch is engaged.
    async fn is_limit_switch_activated(&self, axis: &str) -> AppResult<bool>;

    /// Redefine the current axis position as dial zero.
    async fn set_axis_to_zero(&self, axis: &str) -> AppResult<()>;

    /// Block until the axis reports `target` (within tolerance).
    ///
    /// # Errors
    /// - [`BorealisError::LimitSwitch`] if a limit switch fires while waiting
    /// - [`BorealisError::Timeout`] if the axis has not settled within `policy.timeout`
    async fn wait_motion_end(
        &self,
        axis: &str,
        target: f64,
        policy: &SettlePolicy,
    ) -> AppResult<()> {
        let start = Instant::now();
        loop {
            let current = self.get_axis_position(axis).await?;
            if policy.is_settled(current, target) {
                debug!(controller = self.alias(), axis, position = current, "Axis settled");
                return Ok(());
            }

            if self.is_limit_switch_activated(axis).await? {
                warn!(
                    controller = self.alias(),
                    axis,
                    position = current,
                    "Limit switch activated"
                );
                return Err(BorealisError::LimitSwitch {
                    controller: self.alias().to_string(),
                    axis: axis.to_string(),
                });
            }

            if start.elapsed() > policy.timeout {
                return Err(BorealisError::Timeout {
                    axis: axis.to_string(),
                    target,
                    position: current,
                });
            }

            sleep(policy.poll_interval).await;
        }
    }
}

/// Scalar attribute stored in a device descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Flag.
    Bool(bool),
    /// Integer attribute.
    Int(i64),
    /// Floating point attribute (offsets, limits).
    Float(f64),
    /// Free text (serial numbers, aliases).
    Text(String),
    /// List of names.
    List(Vec<String>),
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        AttrValue::List(value)
    }
}

/// Self-description of a component, forwarded untouched to data recorders so they
/// can pre-allocate storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Static attributes (serial number, offsets, limits, ...).
    pub attrs: BTreeMap<String, AttrValue>,
    /// Named data sets produced per scan point, with their length.
    pub data_sets: BTreeMap<String, usize>,
}

/// A component name together with its descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Component name, key of the descriptor in `new_scan`.
    pub name: String,
    /// Attributes and data sets.
    #[serde(flatten)]
    pub descriptor: DeviceDescriptor,
}

impl DeviceInfo {
    /// Empty descriptor for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: DeviceDescriptor::default(),
        }
    }

    /// Add (or replace) a static attribute.
    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.descriptor.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Declare a data set of `size` values produced at each scan point.
    pub fn with_data_set(mut self, key: &str, size: usize) -> Self {
        self.descriptor.data_sets.insert(key.to_string(), size);
        self
    }
}

/// Capability: the component can describe itself.
pub trait HasDeviceInfo: Send + Sync {
    /// Current descriptor. Called once per scan, when the scan is announced.
    fn device_info(&self) -> DeviceInfo;
}

/// Anything that can be registered with the [`Orchestrator`](crate::orchestrator::Orchestrator).
pub trait Component: Send + Sync {
    /// Stable name, used as key in scan events.
    fn name(&self) -> &str;

    /// Capability query performed at registration time.
    ///
    /// Components that cannot describe themselves keep the default and are refused
    /// as motion or sensor components.
    fn as_device_info(&self) -> Option<&dyn HasDeviceInfo> {
        None
    }
}

/// Spectroscopy detector (MCA).
#[async_trait]
pub trait Detector: Component {
    /// Acquire for `duration` and return the spectrum.
    async fn acquisition(&self, duration: Duration) -> AppResult<Mca>;

    /// Abort any running acquisition.
    ///
    /// Called by the orchestrator on every sensor when a scan aborts.
    async fn stop(&self) -> AppResult<()>;

    /// Identity stored in every measurement's metadata.
    fn detector_info(&self) -> DetectorInfo;
}
