//! Energy scan on a simulated crystal spectrometer.
//!
//! A single `theta` motor carries a Si(12 8 4) analyzer; an `energy` pseudo-motor
//! drives it through Bragg's law. The scan is recorded in memory and, optionally,
//! as JSON lines.
//!
//! Run with:
//! ```bash
//! cargo run --example dummy_spectrometer
//! cargo run --example dummy_spectrometer -- /tmp/energy_scan.jsonl
//! ```
//!
//! Use RUST_LOG for fine-grained filtering:
//! ```bash
//! RUST_LOG=borealis=debug cargo run --example dummy_spectrometer
//! ```

use std::sync::Arc;
use std::time::Duration;

use borealis::hardware::{DummyController, DummyDetector};
use borealis::logging::init_tracing;
use borealis::orchestrator::{scan_range, ComponentMessage, ScanEvent, ScanRequest};
use borealis::recorder::{JsonLinesRecorder, MemoryRecorder};
use borealis::{MotionNode, Motor, Orchestrator, PseudoMotor, SoftLimits};
use tracing::{info, info_span, warn, Instrument};

/// hc, in keV·Å.
const HC: f64 = 12.39842;

/// Si(12 8 4) lattice spacing, in Å.
const D_HKL: f64 = 0.362834;

/// Bragg angle (degrees) → diffracted energy (keV).
fn theta_to_energy(angle: f64, d_hkl: f64) -> f64 {
    HC / (2.0 * d_hkl * angle.to_radians().sin())
}

/// Energy (keV) → Bragg angle (degrees). NaN below the backscattering energy.
fn energy_to_theta(energy: f64, d_hkl: f64) -> f64 {
    (HC / (2.0 * d_hkl * energy)).asin().to_degrees()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info", false)?;

    let ctrl = Arc::new(DummyController::new("DummyCtrl"));
    let detector = Arc::new(DummyDetector::new("DummyDet"));
    let theta = Arc::new(
        Motor::new("theta", "1", ctrl.clone()).with_soft_limits(SoftLimits::new(10.0, 89.0)?),
    );

    let energy = Arc::new(
        PseudoMotor::new(
            "energy",
            vec![theta.clone()],
            vec![Arc::new(|e: f64| energy_to_theta(e, D_HKL))],
        )?
        .with_position_law(Arc::new(|p: &[f64]| theta_to_energy(p[0], D_HKL))),
    );

    let memory = Arc::new(MemoryRecorder::new("memory"));
    let mut orchestrator = Orchestrator::new();
    orchestrator.add_motion_component(energy.clone())?;
    orchestrator.add_motion_component(theta.clone())?;
    orchestrator.add_sensor_component(detector)?;
    orchestrator.add_data_component(memory.clone());

    if let Some(path) = std::env::args().nth(1) {
        let trace = JsonLinesRecorder::open(&path).await?;
        info!(path = %trace.path().display(), "Recording scan as JSON lines");
        orchestrator.add_data_component(Arc::new(trace));
    }

    let points = scan_range(17.2, 17.8, 0.1)?;
    let request = ScanRequest::from_secs(points, 0.05)?;
    orchestrator
        .notify(energy.as_ref(), ComponentMessage::Scan(request))
        .instrument(info_span!("energy_scan", crystal = "Si(12 8 4)"))
        .await?;

    for event in memory.events().await {
        if let ScanEvent::NewScanPoint(point) = event {
            info!(
                idx = point.idx,
                energy_kev = point.positions["energy"],
                theta_deg = point.positions["theta"],
                counts = point.total_counts(),
                "Point"
            );
        }
    }

    // Below the backscattering energy there is no Bragg angle
    if let Err(err) = energy.amove(15.0).await {
        warn!(error = %err, "Unreachable energy refused");
    }
    info!(energy_kev = energy.user_position().await?, "Final position");

    Ok(())
}
