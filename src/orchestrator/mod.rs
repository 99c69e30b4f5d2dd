//! Session orchestrator (mediator) and scan engine.
//!
//! The orchestrator decouples motion and sensor components from data recorders.
//! It keeps three registries and runs scans on behalf of a motion component:
//!
//! - **Motion components**: motors and pseudo-motors whose positions are reported
//!   at every scan point
//! - **Sensor components**: detectors acquired at every scan point
//! - **Data components**: recorders receiving [`ScanEvent`]s
//!
//! There is no global instance: construct one per session and pass it by reference.
//! Registration takes `&mut self`; scans take `&self` and must not overlap.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut orchestrator = Orchestrator::new();
//! orchestrator.add_motion_component(theta.clone())?;
//! orchestrator.add_sensor_component(detector)?;
//! orchestrator.add_data_component(recorder.clone());
//!
//! orchestrator
//!     .notify(theta.as_ref(), ComponentMessage::Scan(ScanRequest::from_secs(points, 1.0)?))
//!     .await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppResult, BorealisError};
use crate::hardware::{Component, DeviceDescriptor, Detector};
use crate::motion::MotionNode;
use crate::recorder::DataRecorder;

pub mod messages;
pub mod scan;

pub use messages::{ComponentMessage, NewScan, ScanAbort, ScanEvent, ScanPoint, ScanRequest};
pub use scan::{scan_range, ScanState, MAX_SCAN_POINTS};

const IDX_COL: usize = 5;
const POS_COL: usize = 8;
const TIME_COL: usize = 7;
const COUNT_COL: usize = 10;

/// Registry of session components plus the scan engine.
pub struct Orchestrator {
    motion_components: Vec<Arc<dyn MotionNode>>,
    sensor_components: Vec<Arc<dyn Detector>>,
    data_components: Vec<Arc<dyn DataRecorder>>,
    state: watch::Sender<ScanState>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Empty registries, state `Idle`.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            motion_components: Vec::new(),
            sensor_components: Vec::new(),
            data_components: Vec::new(),
            state,
        }
    }

    /// Register a motor or pseudo-motor whose position is reported at each point.
    ///
    /// # Errors
    /// `Registration` if the component cannot describe itself or its name is taken.
    pub fn add_motion_component(&mut self, component: Arc<dyn MotionNode>) -> AppResult<()> {
        self.check_registrable("motion", component.as_ref())?;
        debug!(component = component.name(), "Adding motion component");
        self.motion_components.push(component);
        Ok(())
    }

    /// Register a detector acquired at each point.
    ///
    /// # Errors
    /// `Registration` if the component cannot describe itself or its name is taken.
    pub fn add_sensor_component(&mut self, component: Arc<dyn Detector>) -> AppResult<()> {
        self.check_registrable("sensor", component.as_ref())?;
        debug!(component = component.name(), "Adding sensor component");
        self.sensor_components.push(component);
        Ok(())
    }

    /// Register a recorder. No capability is required.
    pub fn add_data_component(&mut self, component: Arc<dyn DataRecorder>) {
        debug!(component = component.name(), "Adding data component");
        self.data_components.push(component);
    }

    /// Drop every registered component.
    pub fn clear_components(&mut self) {
        info!(
            motion = self.motion_components.len(),
            sensors = self.sensor_components.len(),
            recorders = self.data_components.len(),
            "Clearing all components"
        );
        self.motion_components.clear();
        self.sensor_components.clear();
        self.data_components.clear();
    }

    /// Registered motion components, in registration order.
    pub fn motion_components(&self) -> &[Arc<dyn MotionNode>] {
        &self.motion_components
    }

    /// Registered sensors, in registration order.
    pub fn sensor_components(&self) -> &[Arc<dyn Detector>] {
        &self.sensor_components
    }

    /// Registered recorders, in registration order.
    pub fn data_components(&self) -> &[Arc<dyn DataRecorder>] {
        &self.data_components
    }

    /// Current scan engine state.
    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    /// Watch scan state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    /// Single dispatch point for component messages.
    ///
    /// `Scan` runs a scan with `sender` as initiating motion component; other
    /// messages are acknowledged and ignored.
    pub async fn notify(
        &self,
        sender: &dyn MotionNode,
        message: ComponentMessage,
    ) -> AppResult<()> {
        match message {
            ComponentMessage::Scan(request) => self.run_scan(sender, &request).await,
            ComponentMessage::Moved { position } => {
                debug!(sender = sender.name(), position, "Ignoring move notification");
                Ok(())
            }
        }
    }

    /// Convenience wrapper around `notify(initiator, Scan { .. })`.
    pub async fn scan(
        &self,
        initiator: &dyn MotionNode,
        points: Vec<f64>,
        acq_time: Duration,
    ) -> AppResult<()> {
        self.notify(initiator, ComponentMessage::Scan(ScanRequest::new(points, acq_time)))
            .await
    }

    #[instrument(skip_all, fields(initiator = initiator.name(), points = request.points.len()))]
    async fn run_scan(&self, initiator: &dyn MotionNode, request: &ScanRequest) -> AppResult<()> {
        let started = Instant::now();

        let announce = ScanEvent::NewScan(NewScan {
            scan_id: Uuid::new_v4(),
            scan_points: request.points.len(),
            all_device_info: self.all_device_info(),
        });
        if let Err(err) = self.publish(&announce).await {
            error!(error = %err, "Scan could not be announced, nothing moved");
            self.state.send_replace(ScanState::Aborted { index: 0 });
            return Err(err);
        }
        self.state.send_replace(ScanState::Announced);

        info!("Scan starts...");
        info!(
            "| {:>IDX_COL$} | {:>POS_COL$} | {:>TIME_COL$} | {:>COUNT_COL$} |",
            "#", "pos", "time", "count tot."
        );
        info!(
            "| {} | {} | {} | {} |",
            "-".repeat(IDX_COL),
            "-".repeat(POS_COL),
            "-".repeat(TIME_COL),
            "-".repeat(COUNT_COL)
        );

        for (index, &position) in request.points.iter().enumerate() {
            self.state.send_replace(ScanState::Running { index });
            match self.run_point(initiator, index, position, request.acq_time).await {
                Ok(counts) => {
                    let counts = counts.map_or_else(|| "-".to_string(), |c| c.to_string());
                    let secs = request.acq_time.as_secs_f64();
                    info!(
                        "| {index:>IDX_COL$} | {position:>POS_COL$.3} | {secs:>TIME_COL$.2} \
                         | {counts:>COUNT_COL$} |"
                    );
                }
                Err(source) => return Err(self.abort(index, position, source).await),
            }
        }

        // every point completed: the scan is closed even if a recorder refuses the event
        let closed = self.publish(&ScanEvent::CloseScan).await;
        self.state.send_replace(ScanState::Closed);
        if let Err(err) = closed {
            error!(error = %err, "Recorder failed to take close event");
            return Err(err);
        }
        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Scan ended successfully"
        );
        Ok(())
    }

    /// Move → acquire → publish. Returns the summed counts, if any sensor is registered.
    async fn run_point(
        &self,
        initiator: &dyn MotionNode,
        idx: usize,
        position: f64,
        acq_time: Duration,
    ) -> AppResult<Option<u64>> {
        initiator.amove(position).await?;

        let mut data = BTreeMap::new();
        if self.sensor_components.is_empty() {
            if !acq_time.is_zero() {
                sleep(acq_time).await;
            }
        } else {
            for sensor in &self.sensor_components {
                let mca = sensor.acquisition(acq_time).await?;
                data.insert(sensor.name().to_string(), mca);
            }
        }

        let mut positions = BTreeMap::new();
        for component in &self.motion_components {
            positions.insert(component.name().to_string(), component.user_position().await?);
        }

        let point = ScanPoint { idx, data, positions };
        let counts = (!self.sensor_components.is_empty()).then(|| point.total_counts());
        self.publish(&ScanEvent::NewScanPoint(point)).await?;
        Ok(counts)
    }

    /// Stop every sensor, report the abort to recorders (both best effort) and build
    /// the error returned to the caller.
    async fn abort(&self, index: usize, position: f64, source: BorealisError) -> BorealisError {
        error!(
            index,
            position,
            category = source.category().as_str(),
            error = %source,
            "Scan interrupted"
        );
        self.state.send_replace(ScanState::Aborted { index });

        for sensor in &self.sensor_components {
            if let Err(err) = sensor.stop().await {
                warn!(sensor = sensor.name(), error = %err, "Sensor failed to stop");
            }
        }

        let event = ScanEvent::AbortScan(ScanAbort {
            idx: index,
            position,
            reason: source.to_string(),
        });
        for recorder in &self.data_components {
            if let Err(err) = recorder.receive(&event).await {
                warn!(
                    recorder = recorder.name(),
                    error = %err,
                    "Recorder failed to take abort event"
                );
            }
        }

        BorealisError::ScanAborted {
            index,
            position,
            source: Box::new(source),
        }
    }

    async fn publish(&self, event: &ScanEvent) -> AppResult<()> {
        for recorder in &self.data_components {
            debug!(recorder = recorder.name(), event = event.name(), "Notifying recorder");
            recorder.receive(event).await?;
        }
        Ok(())
    }

    fn all_device_info(&self) -> BTreeMap<String, DeviceDescriptor> {
        let motion = self.motion_components.iter().map(|c| c.as_device_info());
        let sensors = self.sensor_components.iter().map(|c| c.as_device_info());
        motion
            .chain(sensors)
            .flatten()
            .map(|capability| {
                let info = capability.device_info();
                (info.name, info.descriptor)
            })
            .collect()
    }

    fn check_registrable<C>(&self, role: &'static str, component: &C) -> AppResult<()>
    where
        C: Component + ?Sized,
    {
        let name = component.name();
        if component.as_device_info().is_none() {
            error!(component = name, role, "Component does not expose device info");
            return Err(BorealisError::Registration {
                role,
                name: name.to_string(),
                reason: "component does not expose device info".to_string(),
            });
        }

        let taken = self.motion_components.iter().any(|c| c.name() == name)
            || self.sensor_components.iter().any(|c| c.name() == name);
        if taken {
            return Err(BorealisError::Registration {
                role,
                name: name.to_string(),
                reason: "a motion or sensor component with this name is already registered"
                    .to_string(),
            });
        }
        Ok(())
    }
}
