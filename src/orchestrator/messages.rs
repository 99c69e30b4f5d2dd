//! Typed messages exchanged through the orchestrator.
//!
//! Two closed enums, one per direction:
//!
//! - [`ComponentMessage`]: motion component → orchestrator
//! - [`ScanEvent`]: orchestrator → data recorders
//!
//! Event flow for one scan:
//!
//! ```text
//! NewScan (1)
//!    │
//!    ├── NewScanPoint (N, ascending idx)
//!    │
//! CloseScan (1)      or      AbortScan (1, at the failing idx)
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppResult, BorealisError};
use crate::hardware::DeviceDescriptor;
use crate::measurement::Mca;

/// Request to visit `points` in order, dwelling `acq_time` at each one.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    /// Initiator positions, in visiting order.
    pub points: Vec<f64>,
    /// Dwell time per point.
    pub acq_time: Duration,
}

impl ScanRequest {
    /// Request from points and a dwell time.
    pub fn new(points: Vec<f64>, acq_time: Duration) -> Self {
        Self { points, acq_time }
    }

    /// Build a request from an acquisition time in seconds.
    ///
    /// # Errors
    /// `InvalidArgument` if `acq_secs` is negative or not finite.
    pub fn from_secs(points: Vec<f64>, acq_secs: f64) -> AppResult<Self> {
        if !acq_secs.is_finite() || acq_secs < 0.0 {
            return Err(BorealisError::InvalidArgument(format!(
                "acquisition time must be a finite, non-negative number of seconds \
                 (got {acq_secs})"
            )));
        }
        Ok(Self::new(points, Duration::from_secs_f64(acq_secs)))
    }
}

/// Message sent by a component to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentMessage {
    /// Run a scan with the sender as initiating motion component.
    Scan(ScanRequest),
    /// Informational: the sender finished a move. The scan engine does not act on it.
    Moved {
        /// User position reached.
        position: f64,
    },
}

/// Payload of [`ScanEvent::NewScan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScan {
    /// Fresh identifier for this scan.
    pub scan_id: Uuid,
    /// Number of points that will be visited.
    pub scan_points: usize,
    /// Descriptor of every registered motion and sensor component, by name.
    pub all_device_info: BTreeMap<String, DeviceDescriptor>,
}

/// Payload of [`ScanEvent::NewScanPoint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    /// Zero-based point index.
    pub idx: usize,
    /// One spectrum per sensor, by sensor name.
    pub data: BTreeMap<String, Mca>,
    /// User position of every registered motion component, by name.
    pub positions: BTreeMap<String, f64>,
}

impl ScanPoint {
    /// Sum of the counts of every spectrum at this point.
    pub fn total_counts(&self) -> u64 {
        self.data.values().map(Mca::total_counts).sum()
    }
}

/// Payload of [`ScanEvent::AbortScan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanAbort {
    /// Index of the failed point.
    pub idx: usize,
    /// Requested initiator position at that point.
    pub position: f64,
    /// Display form of the cause.
    pub reason: String,
}

/// Lifecycle and per-point events published to every data recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    /// Announced once before the first point.
    NewScan(NewScan),
    /// One per completed point.
    NewScanPoint(ScanPoint),
    /// Every point completed.
    CloseScan,
    /// A point failed; no `CloseScan` follows.
    AbortScan(ScanAbort),
}

impl ScanEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::NewScan(_) => "new_scan",
            ScanEvent::NewScanPoint(_) => "new_scan_point",
            ScanEvent::CloseScan => "close_scan",
            ScanEvent::AbortScan(_) => "abort_scan",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_secs_validation() {
        let req = ScanRequest::from_secs(vec![1.0, 2.0], 0.25).unwrap();
        assert_eq!(req.acq_time, Duration::from_millis(250));
        assert!(ScanRequest::from_secs(vec![], -1.0).is_err());
        assert!(ScanRequest::from_secs(vec![], f64::NAN).is_err());
        assert!(ScanRequest::from_secs(vec![], f64::INFINITY).is_err());
    }

    #[test]
    fn test_event_tagging() {
        let value = serde_json::to_value(ScanEvent::CloseScan).unwrap();
        assert_eq!(value, serde_json::json!({ "event": "close_scan" }));

        let abort = ScanEvent::AbortScan(ScanAbort {
            idx: 2,
            position: 1.5,
            reason: "limit".into(),
        });
        let value = serde_json::to_value(&abort).unwrap();
        assert_eq!(value["event"], abort.name());
        assert_eq!(value["idx"], 2);
    }
}
