//! Session configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, `borealis.toml` by default)
//! 2. environment variables prefixed with `BOREALIS_`, nested keys separated by `__`
//!
//! ```text
//! BOREALIS_APPLICATION__LOG_LEVEL=debug
//! BOREALIS_MOTION__SETTLE_TIMEOUT_SECS=120
//! ```
//!
//! # Example file
//!
//! ```toml
//! [application]
//! name = "spectrometer"
//! log_level = "info"
//!
//! [motion]
//! settle_timeout_secs = 60
//! poll_interval_ms = 100
//! tolerance = 5e-4
//!
//! [[controllers]]
//! alias = "huber"
//! kind = "dummy"
//!
//! [[motors]]
//! alias = "theta"
//! controller = "huber"
//! axis = "1"
//! offset = 0.0
//! soft_limit_low = 0.0
//! soft_limit_high = 90.0
//!
//! [[detectors]]
//! alias = "mca"
//! channels = 4096
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, BorealisError};
use crate::hardware::{SettlePolicy, DEFAULT_POSITION_TOLERANCE};
use crate::logging::LOG_LEVELS;
use crate::motion::{Direction, SoftLimits};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "borealis.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BOREALIS_";

const CONTROLLER_KINDS: [&str; 1] = ["dummy"];
const DETECTOR_KINDS: [&str; 1] = ["dummy"];

/// Top-level session configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name and logging.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Settle parameters.
    #[serde(default)]
    pub motion: MotionConfig,
    /// Motion controllers.
    #[serde(default)]
    pub controllers: Vec<ControllerDefinition>,
    /// Physical motors.
    #[serde(default)]
    pub motors: Vec<MotorDefinition>,
    /// Detectors.
    #[serde(default)]
    pub detectors: Vec<DetectorDefinition>,
}

/// Application-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Session name, used in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Settle parameters shared by every configured motor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Settle timeout, seconds.
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_secs: f64,
    /// Position polling period, milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Settle tolerance, dial units.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            settle_timeout_secs: default_settle_timeout(),
            poll_interval_ms: default_poll_interval(),
            tolerance: default_tolerance(),
        }
    }
}

impl MotionConfig {
    /// Policy handed to every configured motor.
    pub fn settle_policy(&self) -> SettlePolicy {
        SettlePolicy {
            timeout: Duration::from_secs_f64(self.settle_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            tolerance: self.tolerance,
        }
    }
}

/// Motion controller definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDefinition {
    /// Unique controller alias.
    pub alias: String,
    /// Driver kind. Only `dummy` ships with the library.
    #[serde(default = "default_kind")]
    pub kind: String,
}

/// Physical motor definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorDefinition {
    /// Unique component alias.
    pub alias: String,
    /// Alias of the controller driving this motor.
    pub controller: String,
    /// Controller-native axis identifier.
    pub axis: String,
    /// User offset, `user = dial * direction + offset`.
    #[serde(default)]
    pub offset: f64,
    /// `false` reverses the dial/user relation.
    #[serde(default = "default_true")]
    pub positive_direction: bool,
    /// Lower dial bound, inclusive. Missing means unbounded.
    #[serde(default)]
    pub soft_limit_low: Option<f64>,
    /// Upper dial bound, inclusive. Missing means unbounded.
    #[serde(default)]
    pub soft_limit_high: Option<f64>,
}

impl MotorDefinition {
    /// Direction from `positive_direction`.
    pub fn direction(&self) -> Direction {
        Direction::from(self.positive_direction)
    }

    /// Soft limits from the two optional bounds.
    ///
    /// # Errors
    /// `InvalidArgument` if a bound is NaN or low > high.
    pub fn soft_limits(&self) -> AppResult<SoftLimits> {
        SoftLimits::new(
            self.soft_limit_low.unwrap_or(f64::NEG_INFINITY),
            self.soft_limit_high.unwrap_or(f64::INFINITY),
        )
    }
}

/// Detector definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorDefinition {
    /// Unique component alias.
    pub alias: String,
    /// Driver kind. Only `dummy` ships with the library.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Spectrum length.
    #[serde(default = "default_channels")]
    pub channels: usize,
}

fn default_name() -> String {
    "borealis".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_settle_timeout() -> f64 {
    60.0
}

fn default_poll_interval() -> u64 {
    100
}

fn default_tolerance() -> f64 {
    DEFAULT_POSITION_TOLERANCE
}

fn default_kind() -> String {
    "dummy".to_string()
}

fn default_true() -> bool {
    true
}

fn default_channels() -> usize {
    crate::hardware::DUMMY_CHANNELS
}

impl SessionConfig {
    /// Load from [`DEFAULT_CONFIG_FILE`] and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from `path` and the environment, environment taking precedence.
    ///
    /// A missing file is not an error: every section has defaults.
    ///
    /// # Errors
    /// `Config` if a value has the wrong type, `Configuration` if validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        Self::extract(Figment::new().merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> AppResult<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks:
    /// - log level is known
    /// - settle parameters are positive
    /// - controller aliases are unique, motor and detector aliases are unique together
    /// - driver kinds are known
    /// - every motor references a declared controller and has valid soft limits
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        let motion = &self.motion;
        if !(motion.settle_timeout_secs.is_finite() && motion.settle_timeout_secs > 0.0) {
            return Err(invalid(format!(
                "settle_timeout_secs must be positive (got {})",
                motion.settle_timeout_secs
            )));
        }
        if motion.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be > 0".to_string()));
        }
        if !(motion.tolerance.is_finite() && motion.tolerance > 0.0) {
            return Err(invalid(format!(
                "tolerance must be positive (got {})",
                motion.tolerance
            )));
        }

        let mut controllers = HashSet::new();
        for controller in &self.controllers {
            if !controllers.insert(controller.alias.as_str()) {
                return Err(invalid(format!(
                    "Duplicate controller alias: '{}'",
                    controller.alias
                )));
            }
            check_kind("controller", &controller.alias, &controller.kind, &CONTROLLER_KINDS)?;
        }

        let mut components = HashSet::new();
        for motor in &self.motors {
            if !components.insert(motor.alias.as_str()) {
                return Err(invalid(format!("Duplicate component alias: '{}'", motor.alias)));
            }
            if !controllers.contains(motor.controller.as_str()) {
                return Err(invalid(format!(
                    "Motor '{}' references unknown controller '{}'",
                    motor.alias, motor.controller
                )));
            }
            motor
                .soft_limits()
                .map_err(|err| invalid(format!("Motor '{}': {err}", motor.alias)))?;
        }

        for detector in &self.detectors {
            if !components.insert(detector.alias.as_str()) {
                return Err(invalid(format!(
                    "Duplicate component alias: '{}'",
                    detector.alias
                )));
            }
            check_kind("detector", &detector.alias, &detector.kind, &DETECTOR_KINDS)?;
            if detector.channels == 0 {
                return Err(invalid(format!(
                    "Detector '{}': 'channels' must be > 0",
                    detector.alias
                )));
            }
        }

        Ok(())
    }
}

fn check_kind(role: &str, alias: &str, kind: &str, known: &[&str]) -> AppResult<()> {
    if known.contains(&kind) {
        Ok(())
    } else {
        Err(invalid(format!(
            "Invalid {role} kind '{kind}' for '{alias}'. Must be one of: {}",
            known.join(", ")
        )))
    }
}

fn invalid(message: String) -> BorealisError {
    BorealisError::Configuration(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const SAMPLE: &str = r#"
        [application]
        name = "spectrometer"

        [[controllers]]
        alias = "huber"

        [[motors]]
        alias = "theta"
        controller = "huber"
        axis = "1"
        offset = 1.5
        positive_direction = false
        soft_limit_low = 0.0
        soft_limit_high = 90.0

        [[detectors]]
        alias = "mca"
        channels = 16
    "#;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.motion.settle_policy(), SettlePolicy::default());
        assert!(config.motors.is_empty());
    }

    #[test]
    fn test_parse_sample() {
        let config = SessionConfig::from_toml_str(SAMPLE).unwrap();
        let theta = &config.motors[0];
        assert_eq!(theta.direction(), Direction::Negative);
        assert_eq!(theta.soft_limits().unwrap().high(), 90.0);
        assert_eq!(config.controllers[0].kind, "dummy");
        assert_eq!(config.detectors[0].channels, 16);
    }

    #[test]
    fn test_missing_limits_are_unbounded() {
        let config = SessionConfig::from_toml_str(
            r#"
            [[controllers]]
            alias = "c"
            [[motors]]
            alias = "m"
            controller = "c"
            axis = "x"
            "#,
        )
        .unwrap();
        assert_eq!(config.motors[0].soft_limits().unwrap(), SoftLimits::UNBOUNDED);
        assert!(config.motors[0].positive_direction);
    }

    #[test]
    fn test_unknown_controller_rejected() {
        let err = SessionConfig::from_toml_str(
            r#"
            [[motors]]
            alias = "m"
            controller = "ghost"
            axis = "1"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown controller 'ghost'"));
    }

    #[test]
    fn test_inverted_limits_rejected() {
        let err = SessionConfig::from_toml_str(
            r#"
            [[controllers]]
            alias = "c"
            [[motors]]
            alias = "m"
            controller = "c"
            axis = "1"
            soft_limit_low = 5.0
            soft_limit_high = 1.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, BorealisError::Configuration(_)));
    }

    #[test]
    fn test_duplicate_component_alias_rejected() {
        let err = SessionConfig::from_toml_str(
            r#"
            [[controllers]]
            alias = "c"
            [[motors]]
            alias = "dup"
            controller = "c"
            axis = "1"
            [[detectors]]
            alias = "dup"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate component alias"));
    }

    #[test]
    fn test_bad_settle_parameters_rejected() {
        assert!(SessionConfig::from_toml_str("[motion]\npoll_interval_ms = 0").is_err());
        assert!(SessionConfig::from_toml_str("[motion]\nsettle_timeout_secs = -1.0").is_err());
        assert!(SessionConfig::from_toml_str("[application]\nlog_level = \"loud\"").is_err());
    }

    #[test]
    fn test_wrong_type_is_config_error() {
        let err =
            SessionConfig::from_toml_str("[motion]\npoll_interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, BorealisError::Config(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, SAMPLE)?;
            jail.set_env("BOREALIS_APPLICATION__LOG_LEVEL", "debug");
            jail.set_env("BOREALIS_MOTION__POLL_INTERVAL_MS", "25");

            let config = SessionConfig::load().unwrap();
            assert_eq!(config.application.name, "spectrometer");
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.motion.poll_interval_ms, 25);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = SessionConfig::load_from("absent.toml").unwrap();
            assert_eq!(config, SessionConfig::default());
            Ok(())
        });
    }
}
