//! Hardware capabilities consumed by the motion layer, plus dummy devices.

pub mod capabilities;
pub mod dummy;

pub use capabilities::{
    AttrValue, Component, Controller, Detector, DeviceDescriptor, DeviceInfo, HasDeviceInfo,
    SettlePolicy, DEFAULT_POLL_INTERVAL, DEFAULT_POSITION_TOLERANCE, DEFAULT_SETTLE_TIMEOUT,
};
pub use dummy::{AxisCommand, DummyController, DummyDetector, DUMMY_CHANNELS};
