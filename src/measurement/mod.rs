//! Measurement types produced by detectors.

pub mod mca;

pub use mca::{DetectorInfo, Mca, McaMetadata};
