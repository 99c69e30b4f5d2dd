//! Session assembly from configuration.
//!
//! A [`Session`] owns the controllers, motors and detectors declared in a
//! [`SessionConfig`] plus an [`Orchestrator`] with every motor and detector
//! already registered. Pseudo-motors are built in code on top of
//! [`Session::motor`] handles and registered through [`Session::orchestrator_mut`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{ControllerDefinition, DetectorDefinition, SessionConfig};
use crate::error::{AppResult, BorealisError};
use crate::hardware::{Controller, Detector, DummyController, DummyDetector};
use crate::motion::Motor;
use crate::orchestrator::Orchestrator;

/// Live components built from a configuration.
pub struct Session {
    name: String,
    controllers: BTreeMap<String, Arc<dyn Controller>>,
    motors: BTreeMap<String, Arc<Motor>>,
    detectors: BTreeMap<String, Arc<dyn Detector>>,
    orchestrator: Orchestrator,
}

impl Session {
    /// Validate `config` and build every declared component.
    ///
    /// # Errors
    /// `Configuration` for an invalid configuration, `Registration` if the
    /// orchestrator refuses a component.
    pub fn from_config(config: &SessionConfig) -> AppResult<Self> {
        config.validate()?;
        let settle = config.motion.settle_policy();

        let mut controllers = BTreeMap::new();
        for definition in &config.controllers {
            controllers.insert(definition.alias.clone(), build_controller(definition)?);
        }

        let mut orchestrator = Orchestrator::new();

        let mut motors = BTreeMap::new();
        for definition in &config.motors {
            let controller = controllers.get(&definition.controller).cloned().ok_or_else(|| {
                BorealisError::Configuration(format!(
                    "Motor '{}' references unknown controller '{}'",
                    definition.alias, definition.controller
                ))
            })?;
            let motor = Arc::new(
                Motor::new(definition.alias.clone(), definition.axis.clone(), controller)
                    .with_offset(definition.offset)
                    .with_direction(definition.direction())
                    .with_soft_limits(definition.soft_limits()?)
                    .with_settle_policy(settle),
            );
            orchestrator.add_motion_component(motor.clone())?;
            motors.insert(definition.alias.clone(), motor);
        }

        let mut detectors = BTreeMap::new();
        for definition in &config.detectors {
            let detector = build_detector(definition)?;
            orchestrator.add_sensor_component(detector.clone())?;
            detectors.insert(definition.alias.clone(), detector);
        }

        info!(
            session = %config.application.name,
            controllers = controllers.len(),
            motors = motors.len(),
            detectors = detectors.len(),
            "Session ready"
        );

        Ok(Self {
            name: config.application.name.clone(),
            controllers,
            motors,
            detectors,
            orchestrator,
        })
    }

    /// Application name from the configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Controller by alias.
    pub fn controller(&self, alias: &str) -> Option<Arc<dyn Controller>> {
        self.controllers.get(alias).cloned()
    }

    /// Physical motor by alias.
    pub fn motor(&self, alias: &str) -> Option<Arc<Motor>> {
        self.motors.get(alias).cloned()
    }

    /// Detector by alias.
    pub fn detector(&self, alias: &str) -> Option<Arc<dyn Detector>> {
        self.detectors.get(alias).cloned()
    }

    /// Motor aliases, sorted.
    pub fn motor_aliases(&self) -> impl Iterator<Item = &str> {
        self.motors.keys().map(String::as_str)
    }

    /// Orchestrator with every configured motor and detector registered.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Mutable access, to register pseudo-motors and recorders.
    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator {
        &mut self.orchestrator
    }
}

fn build_controller(definition: &ControllerDefinition) -> AppResult<Arc<dyn Controller>> {
    match definition.kind.as_str() {
        "dummy" => Ok(Arc::new(DummyController::new(definition.alias.clone()))),
        other => Err(BorealisError::Configuration(format!(
            "No driver for controller kind '{other}' ('{}')",
            definition.alias
        ))),
    }
}

fn build_detector(definition: &DetectorDefinition) -> AppResult<Arc<dyn Detector>> {
    match definition.kind.as_str() {
        "dummy" => Ok(Arc::new(DummyDetector::with_channels(
            definition.alias.clone(),
            definition.channels,
        ))),
        other => Err(BorealisError::Configuration(format!(
            "No driver for detector kind '{other}' ('{}')",
            definition.alias
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{Direction, MotionNode};

    const CONFIG: &str = r#"
        [motion]
        poll_interval_ms = 5

        [[controllers]]
        alias = "huber"

        [[motors]]
        alias = "theta"
        controller = "huber"
        axis = "1"
        offset = 2.0
        soft_limit_low = 0.0
        soft_limit_high = 45.0

        [[motors]]
        alias = "tth"
        controller = "huber"
        axis = "2"
        positive_direction = false

        [[detectors]]
        alias = "mca"
        channels = 8
    "#;

    #[test]
    fn test_builds_and_registers_components() {
        let config = SessionConfig::from_toml_str(CONFIG).unwrap();
        let session = Session::from_config(&config).unwrap();

        assert_eq!(session.name(), "borealis");
        assert_eq!(session.motor_aliases().collect::<Vec<_>>(), vec!["theta", "tth"]);
        assert_eq!(session.orchestrator().motion_components().len(), 2);
        assert_eq!(session.orchestrator().sensor_components().len(), 1);
        assert_eq!(session.motor("tth").unwrap().direction(), Direction::Negative);
        assert_eq!(session.controller("huber").unwrap().alias(), "huber");
        assert!(session.detector("mca").is_some());
        assert!(session.motor("phi").is_none());
    }

    #[tokio::test]
    async fn test_configured_motor_moves_shared_controller() {
        let config = SessionConfig::from_toml_str(CONFIG).unwrap();
        let session = Session::from_config(&config).unwrap();

        let theta = session.motor("theta").unwrap();
        theta.amove(12.0).await.unwrap();
        assert_eq!(theta.dial_position().await.unwrap(), 10.0);

        let huber = session.controller("huber").unwrap();
        assert_eq!(huber.get_axis_position("1").await.unwrap(), 10.0);

        // dial 48 > 45
        assert!(theta.amove(50.0).await.is_err());
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let mut config = SessionConfig::from_toml_str(CONFIG).unwrap();
        config.motors[0].controller = "ghost".into();
        assert!(matches!(
            Session::from_config(&config),
            Err(BorealisError::Configuration(_))
        ));
    }
}
