//! Motor bound to one controller axis.
//!
//! ```text
//! user = dial * direction + offset        dial = (user - offset) / direction
//! ```
//!
//! Nothing is cached: every read goes to the controller, which is authoritative.
//!
//! # Example
//!
//! ```rust,ignore
//! let ctrl = Arc::new(DummyController::new("huber"));
//! let tube_x = Motor::new("tube_x", "1", ctrl)
//!     .with_offset(-1.0)
//!     .with_soft_limits(SoftLimits::new(-50.0, 50.0)?);
//! tube_x.amove(3.0).await?;
//! assert_eq!(tube_x.dial_position().await?, 4.0);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::{AppResult, BorealisError};
use crate::hardware::{Component, Controller, DeviceInfo, HasDeviceInfo, SettlePolicy};
use crate::motion::{Direction, MotionNode, SoftLimits};

/// One physical, controller-addressable axis.
pub struct Motor {
    alias: String,
    axis_id: String,
    offset: f64,
    direction: Direction,
    limits: SoftLimits,
    settle: SettlePolicy,
    controller: Arc<dyn Controller>,
}

impl Motor {
    /// Motor with zero offset, positive direction and no soft limits.
    pub fn new(
        alias: impl Into<String>,
        axis_id: impl Into<String>,
        controller: Arc<dyn Controller>,
    ) -> Self {
        Self {
            alias: alias.into(),
            axis_id: axis_id.into(),
            offset: 0.0,
            direction: Direction::Positive,
            limits: SoftLimits::UNBOUNDED,
            settle: SettlePolicy::default(),
            controller,
        }
    }

    /// User offset, `user = dial * direction + offset`.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Dial/user sign.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Dial-space limits checked before every move.
    pub fn with_soft_limits(mut self, limits: SoftLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Settle parameters for [`MotionNode::wait_motion_end`].
    pub fn with_settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Component alias.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Controller-native axis identifier.
    pub fn axis_id(&self) -> &str {
        &self.axis_id
    }

    /// User offset.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Dial/user sign.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Dial-space limits.
    pub fn soft_limits(&self) -> SoftLimits {
        self.limits
    }

    /// Convert a user-space value to dial units.
    pub fn user_to_dial(&self, user: f64) -> f64 {
        (user - self.offset) / self.direction.coeff()
    }

    /// Convert a dial value to user space.
    pub fn dial_to_user(&self, dial: f64) -> f64 {
        dial * self.direction.coeff() + self.offset
    }

    /// Raw controller position.
    pub async fn dial_position(&self) -> AppResult<f64> {
        self.controller.get_axis_position(&self.axis_id).await
    }

    /// Dial and user positions, logged at info level.
    pub async fn position(&self) -> AppResult<(f64, f64)> {
        let dial = self.dial_position().await?;
        let user = self.dial_to_user(dial);
        info!(motor = %self.alias, dial, user, "{} at {dial} (dial) {user} (user)", self.alias);
        Ok((dial, user))
    }

    /// Fail with `SoftLimit` if `dial` is outside `[limit_low, limit_high]`.
    pub fn check_dial_limits(&self, dial: f64) -> AppResult<()> {
        if self.limits.contains(dial) {
            return Ok(());
        }
        Err(BorealisError::SoftLimit {
            value: dial,
            alias: self.alias.clone(),
            low: self.limits.low(),
            high: self.limits.high(),
        })
    }

    /// Move by `delta` (user units) relative to the position read now.
    pub async fn rmove(&self, delta: f64) -> AppResult<()> {
        let current = self.user_position().await?;
        self.amove(current + delta).await
    }

    /// Redefine the current axis position as dial zero.
    pub async fn set_current_as_zero(&self) -> AppResult<()> {
        let previous = self.dial_position().await?;
        self.controller.set_axis_to_zero(&self.axis_id).await?;
        warn!(
            motor = %self.alias,
            previous_dial = previous,
            "Dial position of {} reset to 0, initial dial value was {previous}",
            self.alias
        );
        Ok(())
    }

    async fn ensure_ready(&self) -> AppResult<()> {
        if self.is_ready().await? {
            return Ok(());
        }
        error!(
            motor = %self.alias,
            "Command interrupted due to motor not ready yet (i.e. not idle)"
        );
        Err(BorealisError::NotReady {
            name: self.alias.clone(),
        })
    }
}

impl std::fmt::Debug for Motor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Motor")
            .field("alias", &self.alias)
            .field("axis_id", &self.axis_id)
            .field("controller", &self.controller.alias())
            .field("offset", &self.offset)
            .field("direction", &self.direction)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Component for Motor {
    fn name(&self) -> &str {
        &self.alias
    }

    fn as_device_info(&self) -> Option<&dyn HasDeviceInfo> {
        Some(self)
    }
}

impl HasDeviceInfo for Motor {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::new(self.alias.as_str())
            .with_attr("axis_id", self.axis_id.as_str())
            .with_attr("controller", self.controller.alias())
            .with_attr("offset", self.offset)
            .with_attr("direction", self.direction.as_str())
            .with_attr("limit_low", self.limits.low())
            .with_attr("limit_high", self.limits.high())
            .with_data_set("user_position", 1)
    }
}

#[async_trait]
impl MotionNode for Motor {
    async fn user_position(&self) -> AppResult<f64> {
        let dial = self.dial_position().await?;
        Ok(self.dial_to_user(dial))
    }

    async fn is_ready(&self) -> AppResult<bool> {
        self.controller.is_axis_ready(&self.axis_id).await
    }

    async fn check_soft_limits(&self, target: f64) -> AppResult<()> {
        self.check_dial_limits(self.user_to_dial(target))
    }

    async fn amove(&self, target: f64) -> AppResult<()> {
        self.ensure_ready().await?;

        let dial = self.user_to_dial(target);
        self.check_dial_limits(dial)?;

        self.controller.move_axis(&self.axis_id, dial).await?;
        self.controller
            .wait_motion_end(&self.axis_id, dial, &self.settle)
            .await?;
        debug!(motor = %self.alias, user = target, dial, "Motor moved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{AttrValue, DummyController};
    use std::time::Duration;

    fn motor(ctrl: &Arc<DummyController>) -> Motor {
        Motor::new("DummyMotor", "1", ctrl.clone())
    }

    #[tokio::test]
    async fn test_offset_round_trip() {
        let ctrl = Arc::new(DummyController::default());
        let mot = motor(&ctrl).with_offset(-1.0);
        mot.amove(3.0).await.unwrap();
        assert_eq!(mot.dial_position().await.unwrap(), 4.0);
        assert_eq!(mot.user_position().await.unwrap(), 3.0);
        assert_eq!(mot.position().await.unwrap(), (4.0, 3.0));
    }

    #[tokio::test]
    async fn test_negative_direction() {
        let ctrl = Arc::new(DummyController::default());
        let mot = motor(&ctrl).with_offset(2.0).with_direction(Direction::Negative);
        mot.amove(5.0).await.unwrap();
        assert_eq!(mot.dial_position().await.unwrap(), -3.0);
        assert_eq!(mot.user_position().await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn test_soft_limits() {
        let ctrl = Arc::new(DummyController::default());
        let limits = SoftLimits::new(5.0, 20.0).unwrap();

        let mot = motor(&ctrl).with_soft_limits(limits);
        mot.amove(10.0).await.unwrap();
        let err = mot.amove(50.0).await.unwrap_err();
        assert!(matches!(
            err,
            BorealisError::SoftLimit { value, low, high, .. }
                if value == 50.0 && low == 5.0 && high == 20.0
        ));
        assert_eq!(ctrl.move_count("1").await, 1);

        let reversed = motor(&ctrl)
            .with_soft_limits(limits)
            .with_direction(Direction::Negative);
        assert!(matches!(
            reversed.amove(10.0).await,
            Err(BorealisError::SoftLimit { value, .. }) if value == -10.0
        ));
        assert_eq!(ctrl.move_count("1").await, 1);
    }

    #[tokio::test]
    async fn test_check_soft_limits_takes_user_target() {
        let ctrl = Arc::new(DummyController::default());
        let mot = motor(&ctrl)
            .with_offset(10.0)
            .with_soft_limits(SoftLimits::new(0.0, 5.0).unwrap());
        // user 12 -> dial 2
        mot.check_soft_limits(12.0).await.unwrap();
        assert!(mot.check_dial_limits(12.0).is_err());
        assert!(mot.check_soft_limits(2.0).await.is_err());
    }

    #[tokio::test]
    async fn test_non_finite_target_issues_no_move() {
        let ctrl = Arc::new(DummyController::default());
        let mot = motor(&ctrl);
        assert!(matches!(
            mot.amove(f64::INFINITY).await,
            Err(BorealisError::SoftLimit { value, .. }) if value.is_infinite()
        ));
        assert!(mot.amove(f64::NAN).await.is_err());
        assert!(mot.check_soft_limits(f64::NEG_INFINITY).await.is_err());
        assert!(ctrl.command_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_issues_no_move() {
        let ctrl = Arc::new(DummyController::default());
        ctrl.set_ready("1", false).await;
        let mot = motor(&ctrl);
        let err = mot.amove(1.0).await.unwrap_err();
        assert!(matches!(err, BorealisError::NotReady { ref name } if name == "DummyMotor"));
        assert!(ctrl.command_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_rmove() {
        let ctrl = Arc::new(DummyController::default());
        let mot = motor(&ctrl).with_offset(1.0);
        mot.amove(2.0).await.unwrap();
        mot.rmove(-0.5).await.unwrap();
        assert_eq!(mot.user_position().await.unwrap(), 1.5);
        assert_eq!(mot.dial_position().await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_set_current_as_zero() {
        let ctrl = Arc::new(DummyController::default());
        let mot = motor(&ctrl).with_offset(1.0);
        mot.amove(7.0).await.unwrap();
        mot.set_current_as_zero().await.unwrap();
        assert_eq!(mot.dial_position().await.unwrap(), 0.0);
        assert_eq!(mot.user_position().await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_stuck_axis_times_out() {
        let ctrl = Arc::new(DummyController::default());
        ctrl.set_stuck("1", true).await;
        let mot = motor(&ctrl).with_settle_policy(SettlePolicy {
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
            ..SettlePolicy::default()
        });
        let err = mot.amove(1.0).await.unwrap_err();
        assert!(matches!(err, BorealisError::Timeout { position, .. } if position == 0.0));
        assert_eq!(ctrl.move_count("1").await, 1);
    }

    #[tokio::test]
    async fn test_limit_switch_aborts_wait() {
        let ctrl = Arc::new(DummyController::default());
        ctrl.set_limit_switch("1", true).await;
        let err = motor(&ctrl).amove(1.0).await.unwrap_err();
        assert!(matches!(err, BorealisError::LimitSwitch { .. }));
    }

    #[test]
    fn test_device_info() {
        let ctrl = Arc::new(DummyController::new("huber"));
        let mot = motor(&ctrl).with_offset(0.5);
        let info = mot.device_info();
        assert_eq!(info.name, "DummyMotor");
        assert_eq!(info.descriptor.attrs["controller"], AttrValue::from("huber"));
        assert_eq!(info.descriptor.attrs["offset"], AttrValue::Float(0.5));
        assert_eq!(info.descriptor.data_sets["user_position"], 1);
    }
}
