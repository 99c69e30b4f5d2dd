//! Pseudo-motor: a derived position over a tree of motion nodes.
//!
//! A pseudo-motor owns three things:
//!
//! - an ordered list of children (motors or other pseudo-motors)
//! - one **conversion law** per child, mapping the pseudo-motor target to that
//!   child's user target
//! - one **position law**, mapping the children's current user positions to the
//!   reported aggregate position
//!
//! The two kinds of law are independent. The position law does not have to invert
//! the conversion laws: it may read a subset of the children, a non-invertible
//! combination, or a constant. `amove(x)` followed by `user_position()` therefore
//! only returns `x` when the caller supplies consistent laws.
//!
//! # Example (Bragg energy over a theta motor)
//!
//! ```rust,ignore
//! let energy = PseudoMotor::new(
//!     "energy",
//!     vec![theta.clone()],
//!     vec![Arc::new(|e| energy_to_theta(e, D_HKL))],
//! )?
//! .with_position_law(Arc::new(|p: &[f64]| theta_to_energy(p[0], D_HKL)));
//! energy.amove(9.5).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::{AppResult, BorealisError};
use crate::hardware::{Component, DeviceInfo, HasDeviceInfo};
use crate::motion::MotionNode;

/// Maps the pseudo-motor target to one child's user target.
pub type ConversionLaw = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Maps the children's current user positions (declared order) to one position.
pub type PositionLaw = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Aggregate motion node over an ordered list of children.
pub struct PseudoMotor {
    alias: String,
    children: Vec<Arc<dyn MotionNode>>,
    conversion_laws: Vec<ConversionLaw>,
    position_law: PositionLaw,
}

impl PseudoMotor {
    /// Build a pseudo-motor reporting the user position of its first child.
    ///
    /// # Errors
    /// - `LawCountMismatch` if `children.len() != conversion_laws.len()`
    /// - `EmptyComposition` if there are no children
    /// - `CyclicComposition` if a node below it is its own descendant
    pub fn new(
        alias: impl Into<String>,
        children: Vec<Arc<dyn MotionNode>>,
        conversion_laws: Vec<ConversionLaw>,
    ) -> AppResult<Self> {
        let alias = alias.into();
        if children.len() != conversion_laws.len() {
            error!(
                pseudo_motor = %alias,
                children = children.len(),
                laws = conversion_laws.len(),
                "Motor list and conversion law list lengths differ"
            );
            return Err(BorealisError::LawCountMismatch {
                children: children.len(),
                laws: conversion_laws.len(),
            });
        }
        if children.is_empty() {
            return Err(BorealisError::EmptyComposition(alias));
        }
        ensure_acyclic(&alias, &children)?;

        info!(pseudo_motor = %alias, children = children.len(), "PseudoMotor created");
        Ok(Self {
            alias,
            children,
            conversion_laws,
            position_law: Arc::new(first_child),
        })
    }

    /// Replace the default "first child" position law.
    pub fn with_position_law(mut self, law: PositionLaw) -> Self {
        self.position_law = law;
        self
    }

    /// Component alias.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// `(name, user_position)` of every direct child, in declared order.
    pub async fn positions(&self) -> AppResult<Vec<(String, f64)>> {
        let mut out = Vec::with_capacity(self.children.len());
        for child in &self.children {
            let position = child.user_position().await?;
            info!(pseudo_motor = %self.alias, child = child.name(), position, "Child position");
            out.push((child.name().to_string(), position));
        }
        Ok(out)
    }

    /// Child targets for a pseudo-motor target, in declared order.
    pub fn child_targets(&self, target: f64) -> Vec<f64> {
        self.conversion_laws.iter().map(|law| law(target)).collect()
    }

    async fn ensure_ready(&self) -> AppResult<()> {
        if self.is_ready().await? {
            return Ok(());
        }
        error!(
            pseudo_motor = %self.alias,
            "Command interrupted due to all motors not ready yet (i.e. not idle)"
        );
        Err(BorealisError::NotReady {
            name: self.alias.clone(),
        })
    }
}

fn first_child(positions: &[f64]) -> f64 {
    positions.first().copied().unwrap_or(f64::NAN)
}

/// Walk the child graph once, failing if a node is reached again below itself.
///
/// Nodes are compared by address. Names only label the error: distinct nodes may
/// share a name, and a shared child reached through two branches is not a cycle.
fn ensure_acyclic(root: &str, children: &[Arc<dyn MotionNode>]) -> AppResult<()> {
    let mut path = Vec::new();
    for child in children {
        visit(root, child, &mut path)?;
    }
    Ok(())
}

fn visit<'a>(
    root: &str,
    node: &'a Arc<dyn MotionNode>,
    path: &mut Vec<&'a Arc<dyn MotionNode>>,
) -> AppResult<()> {
    if path.iter().any(|ancestor| Arc::ptr_eq(ancestor, node)) {
        let via = path
            .iter()
            .map(|ancestor| ancestor.name())
            .chain(std::iter::once(node.name()))
            .collect::<Vec<_>>()
            .join(" -> ");
        error!(pseudo_motor = %root, via = %via, "Motion node is its own descendant");
        return Err(BorealisError::CyclicComposition {
            name: root.to_string(),
            via,
        });
    }
    path.push(node);
    for child in node.children() {
        visit(root, child, path)?;
    }
    path.pop();
    Ok(())
}

impl std::fmt::Debug for PseudoMotor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PseudoMotor")
            .field("alias", &self.alias)
            .field(
                "children",
                &self.children.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Component for PseudoMotor {
    fn name(&self) -> &str {
        &self.alias
    }

    fn as_device_info(&self) -> Option<&dyn HasDeviceInfo> {
        Some(self)
    }
}

impl HasDeviceInfo for PseudoMotor {
    fn device_info(&self) -> DeviceInfo {
        let children: Vec<String> = self.children.iter().map(|c| c.name().to_string()).collect();
        DeviceInfo::new(self.alias.as_str())
            .with_attr("children", children)
            .with_data_set("user_position", 1)
    }
}

#[async_trait]
impl MotionNode for PseudoMotor {
    async fn user_position(&self) -> AppResult<f64> {
        let mut positions = Vec::with_capacity(self.children.len());
        for child in &self.children {
            positions.push(child.user_position().await?);
        }
        Ok((self.position_law)(&positions))
    }

    async fn is_ready(&self) -> AppResult<bool> {
        for child in &self.children {
            if !child.is_ready().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn check_soft_limits(&self, target: f64) -> AppResult<()> {
        debug!(pseudo_motor = %self.alias, target, "Checking all (pseudo)motor soft limits");
        for (child, law) in self.children.iter().zip(&self.conversion_laws) {
            let child_target = law(target);
            child.check_soft_limits(child_target).await?;
            debug!(child = child.name(), child_target, "Valid target");
        }
        Ok(())
    }

    async fn amove(&self, target: f64) -> AppResult<()> {
        self.ensure_ready().await?;
        self.check_soft_limits(target).await?;

        // Children already moved stay put if a later one fails.
        for (child, law) in self.children.iter().zip(&self.conversion_laws) {
            child.amove(law(target)).await?;
        }
        debug!(pseudo_motor = %self.alias, target, "PseudoMotor moved");
        Ok(())
    }

    fn children(&self) -> &[Arc<dyn MotionNode>] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::hardware::DummyController;
    use crate::motion::{Motor, SoftLimits};

    fn law(f: fn(f64) -> f64) -> ConversionLaw {
        Arc::new(f)
    }

    fn two_motors(ctrl: &Arc<DummyController>) -> (Arc<Motor>, Arc<Motor>) {
        (
            Arc::new(Motor::new("DummyMotor1", "1", ctrl.clone())),
            Arc::new(Motor::new("DummyMotor2", "2", ctrl.clone())),
        )
    }

    #[tokio::test]
    async fn test_construction_checks_law_count() {
        let ctrl = Arc::new(DummyController::default());
        let (m1, m2) = two_motors(&ctrl);
        let err = PseudoMotor::new("pm", vec![m1, m2], vec![law(|x| x)]).unwrap_err();
        assert!(matches!(err, BorealisError::LawCountMismatch { children: 2, laws: 1 }));
    }

    #[test]
    fn test_construction_rejects_empty() {
        assert!(matches!(
            PseudoMotor::new("pm", vec![], vec![]),
            Err(BorealisError::EmptyComposition(_))
        ));
    }

    /// Node whose children are set after construction, so it can list itself.
    struct Looping {
        children: OnceLock<Vec<Arc<dyn MotionNode>>>,
    }

    impl Component for Looping {
        fn name(&self) -> &str {
            "looping"
        }

        fn as_device_info(&self) -> Option<&dyn HasDeviceInfo> {
            None
        }
    }

    #[async_trait]
    impl MotionNode for Looping {
        async fn user_position(&self) -> AppResult<f64> {
            Ok(0.0)
        }

        async fn is_ready(&self) -> AppResult<bool> {
            Ok(true)
        }

        async fn check_soft_limits(&self, _target: f64) -> AppResult<()> {
            Ok(())
        }

        async fn amove(&self, _target: f64) -> AppResult<()> {
            Ok(())
        }

        fn children(&self) -> &[Arc<dyn MotionNode>] {
            self.children.get().map(Vec::as_slice).unwrap_or(&[])
        }
    }

    #[test]
    fn test_construction_rejects_node_below_itself() {
        let looping = Arc::new(Looping {
            children: OnceLock::new(),
        });
        let node: Arc<dyn MotionNode> = looping.clone();
        assert!(looping.children.set(vec![node.clone()]).is_ok());

        let err = PseudoMotor::new("pm", vec![node], vec![law(|x| x)]).unwrap_err();
        assert!(matches!(
            err,
            BorealisError::CyclicComposition { ref name, ref via }
                if name == "pm" && via == "looping -> looping"
        ));
    }

    #[tokio::test]
    async fn test_child_may_share_the_pseudo_motor_name() {
        let ctrl = Arc::new(DummyController::default());
        let theta = Arc::new(Motor::new("theta", "1", ctrl.clone()));
        let pm = PseudoMotor::new("theta", vec![theta], vec![law(|x| x / 2.0)]).unwrap();

        pm.amove(20.0).await.unwrap();
        assert_eq!(pm.user_position().await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn test_shared_children_are_not_cycles() {
        let ctrl = Arc::new(DummyController::default());
        let (m1, m2) = two_motors(&ctrl);
        let inner: Arc<dyn MotionNode> = Arc::new(
            PseudoMotor::new(
                "inner",
                vec![m1.clone(), m2.clone()],
                vec![law(|x| x), law(|x| 2.0 * x)],
            )
            .unwrap(),
        );
        let outer = PseudoMotor::new(
            "outer",
            vec![inner, m1, m2],
            vec![law(|x| 10.0 * x), law(|x| x), law(|x| 2.0 * x)],
        );
        assert!(outer.is_ok());
    }

    #[tokio::test]
    async fn test_amove_and_default_position_law() {
        let ctrl = Arc::new(DummyController::default());
        let m1 = Arc::new(Motor::new("m1", "1", ctrl.clone()).with_offset(-1.0));
        let m2 = Arc::new(Motor::new("m2", "2", ctrl.clone()).with_offset(2.0));
        let pm = PseudoMotor::new(
            "pm",
            vec![m1.clone(), m2.clone()],
            vec![law(|x| x), law(|x| 10.0 * x)],
        )
        .unwrap();

        pm.amove(10.0).await.unwrap();
        assert_eq!(m1.user_position().await.unwrap(), 10.0);
        assert_eq!(m2.user_position().await.unwrap(), 100.0);
        assert_eq!(pm.user_position().await.unwrap(), 10.0);
        assert_eq!(
            pm.positions().await.unwrap(),
            vec![("m1".to_string(), 10.0), ("m2".to_string(), 100.0)]
        );
    }

    #[tokio::test]
    async fn test_validates_every_child_before_moving() {
        let ctrl = Arc::new(DummyController::default());
        let m1 = Arc::new(Motor::new("m1", "1", ctrl.clone()));
        let limits = SoftLimits::new(-5.0, 5.0).unwrap();
        let m2 = Arc::new(Motor::new("m2", "2", ctrl.clone()).with_soft_limits(limits));
        let pm = PseudoMotor::new("pm", vec![m1, m2], vec![law(|x| x), law(|x| 2.0 * x)]).unwrap();

        let err = pm.amove(3.0).await.unwrap_err();
        assert!(matches!(
            err,
            BorealisError::SoftLimit { ref alias, value, .. } if alias == "m2" && value == 6.0
        ));
        assert!(ctrl.command_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_child_blocks_move() {
        let ctrl = Arc::new(DummyController::default());
        let (m1, m2) = two_motors(&ctrl);
        ctrl.set_ready("2", false).await;
        let pm = PseudoMotor::new("pm", vec![m1, m2], vec![law(|x| x), law(|x| -x)]).unwrap();

        assert!(!pm.is_ready().await.unwrap());
        assert!(matches!(
            pm.amove(1.0).await,
            Err(BorealisError::NotReady { ref name }) if name == "pm"
        ));
        assert!(ctrl.command_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_mid_sequence_keeps_earlier_moves() {
        let ctrl = Arc::new(DummyController::default());
        let (m1, m2) = two_motors(&ctrl);
        ctrl.set_limit_switch("2", true).await;
        let pm =
            PseudoMotor::new("pm", vec![m1.clone(), m2], vec![law(|x| x), law(|x| x)]).unwrap();

        let err = pm.amove(4.0).await.unwrap_err();
        assert!(matches!(err, BorealisError::LimitSwitch { .. }));
        assert_eq!(m1.user_position().await.unwrap(), 4.0);
    }

    #[tokio::test]
    async fn test_custom_position_law() {
        let ctrl = Arc::new(DummyController::default());
        let (m1, m2) = two_motors(&ctrl);
        let pm = PseudoMotor::new("pm", vec![m1, m2], vec![law(|x| x), law(|x| 3.0 * x)])
            .unwrap()
            .with_position_law(Arc::new(|p: &[f64]| p.iter().sum::<f64>() / p.len() as f64));
        pm.amove(2.0).await.unwrap();
        assert_eq!(pm.user_position().await.unwrap(), 4.0);
        assert_eq!(pm.child_targets(2.0), vec![2.0, 6.0]);
    }
}
