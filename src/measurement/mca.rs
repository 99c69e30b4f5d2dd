//! Multichannel-analyser spectrum returned by every detector acquisition.
//!
//! An [`Mca`] carries the raw channel counts plus the metadata a recorder needs to
//! normalise them later (real/live time, input/output count rates and the identity
//! of the detector that produced it). Both serialize with `serde`, which is how
//! spectra are handed to JSON-based recorders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the detector that produced a spectrum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorInfo {
    /// Vendor serial number.
    pub serial_number: String,
    /// Component alias.
    pub alias: String,
    /// Detector model / driver type.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Acquisition metadata attached to a spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McaMetadata {
    /// Real (elapsed) acquisition time in seconds.
    pub runtime: f64,
    /// Live time in seconds (runtime minus dead time).
    pub livetime: f64,
    /// Input count rate (counts/s).
    pub input_rate: f64,
    /// Output count rate (counts/s).
    pub output_rate: f64,
    /// Acquisition date.
    pub date: DateTime<Utc>,
    /// Source detector.
    pub detector: DetectorInfo,
}

impl McaMetadata {
    /// Metadata dated now, with zero count rates.
    pub fn new(runtime: f64, livetime: f64, detector: DetectorInfo) -> Self {
        Self {
            runtime,
            livetime,
            input_rate: 0.0,
            output_rate: 0.0,
            date: Utc::now(),
            detector,
        }
    }

    /// Set the input and output count rates.
    pub fn with_rates(mut self, input_rate: f64, output_rate: f64) -> Self {
        self.input_rate = input_rate;
        self.output_rate = output_rate;
        self
    }

    /// Fraction of the runtime the detector was busy, in `[0, 1]`.
    pub fn dead_time_fraction(&self) -> f64 {
        if self.runtime <= 0.0 {
            return 0.0;
        }
        (1.0 - self.livetime / self.runtime).clamp(0.0, 1.0)
    }
}

/// One spectrum: channel counts and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mca {
    /// Counts per channel.
    #[serde(rename = "mca_counts")]
    pub counts: Vec<u64>,
    /// Acquisition metadata.
    pub metadata: McaMetadata,
}

impl Mca {
    /// Wrap counts and metadata.
    pub fn new(counts: Vec<u64>, metadata: McaMetadata) -> Self {
        Self { counts, metadata }
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.counts.len()
    }

    /// Sum over all channels.
    pub fn total_counts(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DetectorInfo {
        DetectorInfo {
            serial_number: "Unknown".into(),
            alias: "det".into(),
            kind: "DummyDetector".into(),
        }
    }

    #[test]
    fn test_total_counts() {
        let mca = Mca::new((0..10).collect(), McaMetadata::new(1.0, 1.0, info()));
        assert_eq!(mca.channels(), 10);
        assert_eq!(mca.total_counts(), 45);
    }

    #[test]
    fn test_dead_time_fraction() {
        let md = McaMetadata::new(2.0, 1.5, info());
        assert!((md.dead_time_fraction() - 0.25).abs() < 1e-12);
        assert_eq!(McaMetadata::new(0.0, 0.0, info()).dead_time_fraction(), 0.0);
    }

    #[test]
    fn test_json_field_names() {
        let mca = Mca::new(vec![1, 2], McaMetadata::new(1.0, 0.9, info()).with_rates(3.0, 2.5));
        let value = serde_json::to_value(&mca).unwrap();
        assert_eq!(value["mca_counts"], serde_json::json!([1, 2]));
        assert_eq!(value["metadata"]["detector"]["type"], "DummyDetector");
        assert_eq!(value["metadata"]["output_rate"], 2.5);

        let back: Mca = serde_json::from_value(value).unwrap();
        assert_eq!(back, mca);
    }
}
