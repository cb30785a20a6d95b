// Closed-loop alignment on a detected visual target
//
// Each tick takes the latest target offset and turns it into a motion intent:
// lateral correction on dx, forward-only correction on dy. Inside the deadband
// on both axes the vehicle stops and reports Aligned.

use tracing::{debug, info};

use crate::config::AlignmentConfig;
use crate::messages::{AlignmentState, MotionIntent, TargetOffset};
use crate::motor::{MotionController, MotionError};

/// Result of one alignment tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentDecision {
    pub state: AlignmentState,
    pub intent: MotionIntent,
}

impl AlignmentDecision {
    fn stop(state: AlignmentState) -> Self {
        Self {
            state,
            intent: MotionIntent::zero(),
        }
    }
}

pub struct AlignmentController {
    config: AlignmentConfig,
    max_speed: f64,
    state: AlignmentState,
    // Kept for diagnostics only, never fed back into control
    last_offset: Option<TargetOffset>,
}

impl AlignmentController {
    pub fn new(config: AlignmentConfig, max_speed_rpm: i32) -> Self {
        Self {
            config,
            max_speed: max_speed_rpm as f64,
            state: AlignmentState::Seeking,
            last_offset: None,
        }
    }

    pub fn state(&self) -> AlignmentState {
        self.state
    }

    pub fn last_offset(&self) -> Option<TargetOffset> {
        self.last_offset
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Decide what to do with this tick's sample; `None` means no target
    pub fn decide(&mut self, target: Option<TargetOffset>) -> AlignmentDecision {
        // A non-finite offset is as good as no detection
        let target = target.filter(|t| t.dx.is_finite() && t.dy.is_finite());

        let decision = match target {
            None => AlignmentDecision::stop(AlignmentState::Seeking),
            Some(offset) => self.correct(offset),
        };

        if decision.state != self.state {
            info!("Alignment {:?} -> {:?}", self.state, decision.state);
        }
        debug!(
            "Alignment offset {:?} (previous {:?}) -> {:?}",
            target, self.last_offset, decision.intent
        );

        self.state = decision.state;
        self.last_offset = target;
        decision
    }

    fn correct(&self, offset: TargetOffset) -> AlignmentDecision {
        let cfg = &self.config;
        let deadband = cfg.deadband_px;

        if offset.dx.abs() < deadband && offset.dy.abs() < deadband {
            return AlignmentDecision::stop(AlignmentState::Aligned);
        }

        // Body-frame velocity components (rpm scale)
        let mut x = 0.0;
        let mut y = 0.0;

        if offset.dx.abs() >= deadband {
            let speed =
                (cfg.max_lateral_fraction * self.max_speed).min(offset.dx.abs() * cfg.lateral_gain);
            x = speed.copysign(offset.dx);
        }

        // Forward only, a target above centre does not back the vehicle up
        if offset.dy.abs() >= deadband {
            y = (cfg.max_forward_fraction * self.max_speed).min(offset.dy.abs() * cfg.forward_gain);
        }

        let scale = x.abs().max(y.abs());
        let intent = if scale > 0.0 {
            MotionIntent::new(x / scale, y / scale, 0.0, scale)
        } else {
            MotionIntent::zero()
        };

        AlignmentDecision {
            state: AlignmentState::Seeking,
            intent,
        }
    }

    /// Decide and apply: stop when aligned or lost, otherwise drive the correction
    pub fn step(
        &mut self,
        target: Option<TargetOffset>,
        motion: &mut MotionController,
    ) -> Result<AlignmentState, MotionError> {
        let decision = self.decide(target);
        if decision.intent.is_zero() {
            motion.stop_all()?;
        } else {
            motion.drive_intent(&decision.intent)?;
        }
        Ok(decision.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VehicleConfig;
    use crate::motor::{Bus, LoopbackTransport};

    fn controller() -> AlignmentController {
        AlignmentController::new(
            AlignmentConfig {
                deadband_px: 20.0,
                lateral_gain: 2.0,
                max_lateral_fraction: 0.3,
                forward_gain: 1.5,
                max_forward_fraction: 0.2,
                ..AlignmentConfig::default()
            },
            5000,
        )
    }

    #[test]
    fn test_centred_target_is_aligned() {
        let mut align = controller();
        let decision = align.decide(Some(TargetOffset::new(0.0, 0.0)));
        assert_eq!(decision.state, AlignmentState::Aligned);
        assert_eq!(decision.intent, MotionIntent::zero());
    }

    #[test]
    fn test_inside_deadband_is_aligned() {
        let mut align = controller();
        let decision = align.decide(Some(TargetOffset::new(-19.9, 19.9)));
        assert_eq!(decision.state, AlignmentState::Aligned);
    }

    #[test]
    fn test_lateral_correction_right() {
        let mut align = controller();
        let decision = align.decide(Some(TargetOffset::new(100.0, 0.0)));
        assert_eq!(decision.state, AlignmentState::Seeking);
        // min(0.3 * 5000, 100 * 2) = 200
        assert_eq!(decision.intent, MotionIntent::new(1.0, 0.0, 0.0, 200.0));
    }

    #[test]
    fn test_lateral_correction_left() {
        let mut align = controller();
        let decision = align.decide(Some(TargetOffset::new(-100.0, 5.0)));
        assert_eq!(decision.intent, MotionIntent::new(-1.0, 0.0, 0.0, 200.0));
    }

    #[test]
    fn test_lateral_speed_capped() {
        let mut align = controller();
        let decision = align.decide(Some(TargetOffset::new(2000.0, 0.0)));
        assert_eq!(decision.intent.speed_scale, 1500.0);
    }

    #[test]
    fn test_forward_only_on_dy() {
        let mut align = controller();
        let below = align.decide(Some(TargetOffset::new(0.0, 100.0)));
        assert_eq!(below.intent, MotionIntent::new(0.0, 1.0, 0.0, 150.0));

        // Negative dy still drives forward
        let above = align.decide(Some(TargetOffset::new(0.0, -100.0)));
        assert_eq!(above.intent, MotionIntent::new(0.0, 1.0, 0.0, 150.0));

        // Capped at 0.2 * 5000
        let far = align.decide(Some(TargetOffset::new(0.0, 5000.0)));
        assert_eq!(far.intent.speed_scale, 1000.0);
    }

    #[test]
    fn test_combined_correction_sums_components() {
        let mut align = controller();
        // x = 200, y = min(1000, 60 * 1.5) = 90
        let decision = align.decide(Some(TargetOffset::new(100.0, 60.0)));
        let intent = decision.intent;
        assert_eq!(intent.speed_scale, 200.0);
        assert_eq!(intent.lateral * intent.speed_scale, 200.0);
        assert!((intent.longitudinal * intent.speed_scale - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_target_stops_and_seeks() {
        let mut align = controller();
        align.decide(Some(TargetOffset::new(0.0, 0.0)));
        assert_eq!(align.state(), AlignmentState::Aligned);

        let decision = align.decide(None);
        assert_eq!(decision.state, AlignmentState::Seeking);
        assert_eq!(decision.intent, MotionIntent::zero());
        assert_eq!(align.last_offset(), None);
    }

    #[test]
    fn test_nan_offset_treated_as_lost() {
        let mut align = controller();
        let decision = align.decide(Some(TargetOffset::new(f64::NAN, 0.0)));
        assert_eq!(decision, AlignmentDecision::stop(AlignmentState::Seeking));
    }

    #[tokio::test]
    async fn test_step_drives_motion_controller() {
        let can0 = LoopbackTransport::new();
        let can1 = LoopbackTransport::new();
        let mut motion = MotionController::start(
            &VehicleConfig::default(),
            [Bus::new("can0", can0.clone()), Bus::new("can1", can1.clone())],
        )
        .unwrap();
        motion.enable_all().unwrap();

        let mut align = controller();
        let state = align
            .step(Some(TargetOffset::new(100.0, 0.0)), &mut motion)
            .unwrap();
        assert_eq!(state, AlignmentState::Seeking);
        assert_eq!(
            motion.nodes().map(|n| n.last_commanded_speed),
            [-200, -200, 200, 200]
        );

        let state = align
            .step(Some(TargetOffset::new(3.0, -4.0)), &mut motion)
            .unwrap();
        assert_eq!(state, AlignmentState::Aligned);
        assert_eq!(motion.nodes().map(|n| n.last_commanded_speed), [0; 4]);

        motion.shutdown().await.unwrap();
    }
}
