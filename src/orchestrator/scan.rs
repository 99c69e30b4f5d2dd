//! Scan state machine and point generation.

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, BorealisError};

/// Largest number of points [`scan_range`] will generate.
pub const MAX_SCAN_POINTS: usize = 10_000_000;

/// Scan engine state.
///
/// ```text
/// Idle → Announced → Running{0} → … → Running{n-1} → Closed
///                          └──────── failure ────────→ Aborted{idx}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanState {
    /// No scan has run yet.
    #[default]
    Idle,
    /// `new_scan` published, no point visited yet.
    Announced,
    /// Visiting point `index` (move → acquire → publish).
    Running {
        /// Point being visited.
        index: usize,
    },
    /// Every point visited, `close_scan` published.
    Closed,
    /// Point `index` failed; earlier moves stay in place. A scan that could not be
    /// announced ends here with `index` 0, before any move.
    Aborted {
        /// Failing point.
        index: usize,
    },
}

impl ScanState {
    /// True while a scan is between announce and close/abort.
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Announced | ScanState::Running { .. })
    }
}

/// Half-open arithmetic sequence `start, start + step, …` strictly before `stop`.
///
/// # Errors
/// `InvalidArgument` if `step` is zero, non-finite, points away from `stop`, or
/// would produce more than [`MAX_SCAN_POINTS`] points.
pub fn scan_range(start: f64, stop: f64, step: f64) -> AppResult<Vec<f64>> {
    if !(start.is_finite() && stop.is_finite() && step.is_finite()) || step == 0.0 {
        return Err(BorealisError::InvalidArgument(format!(
            "invalid scan range {start}..{stop} step {step}"
        )));
    }
    if (stop - start) * step < 0.0 {
        return Err(BorealisError::InvalidArgument(format!(
            "step {step} never reaches {stop} from {start}"
        )));
    }

    let count = ((stop - start) / step).ceil();
    if !count.is_finite() || count > MAX_SCAN_POINTS as f64 {
        return Err(BorealisError::InvalidArgument(format!(
            "scan range {start}..{stop} step {step} exceeds {MAX_SCAN_POINTS} points"
        )));
    }
    let count = count as usize;
    // index-based to avoid accumulating rounding error
    Ok((0..count).map(|i| start + i as f64 * step).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_range_excludes_stop() {
        assert_eq!(scan_range(0.0, 1.0, 0.25).unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(scan_range(5.0, 2.0, -1.0).unwrap(), vec![5.0, 4.0, 3.0]);
        assert!(scan_range(1.0, 1.0, 0.1).unwrap().is_empty());
    }

    #[test]
    fn test_scan_range_partial_last_step() {
        let points = scan_range(0.0, 1.0, 0.3).unwrap();
        assert_eq!(points.len(), 4);
        assert!((points[3] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_scan_range_rejects_bad_step() {
        assert!(scan_range(0.0, 1.0, 0.0).is_err());
        assert!(scan_range(0.0, 1.0, -0.1).is_err());
        assert!(scan_range(0.0, f64::NAN, 0.1).is_err());
    }

    #[test]
    fn test_scan_range_rejects_huge_point_count() {
        assert!(matches!(
            scan_range(0.0, 1.0, 1e-300),
            Err(BorealisError::InvalidArgument(_))
        ));
        assert!(scan_range(-1e300, 1e300, 1e-300).is_err());
        assert_eq!(scan_range(0.0, 500_000.0, 0.5).unwrap().len(), 1_000_000);
    }

    #[test]
    fn test_state_activity() {
        assert!(!ScanState::Idle.is_active());
        assert!(ScanState::Running { index: 0 }.is_active());
        assert!(!ScanState::Aborted { index: 3 }.is_active());
    }
}
