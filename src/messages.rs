// Define message types exchanged with the input and vision collaborators

use serde::{Deserialize, Serialize};

/// Desired vehicle motion for one control tick.
///
/// `lateral`, `longitudinal` and `yaw` are unit-less in [-1, 1];
/// `speed_scale` (rpm) multiplies the whole mix.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionIntent {
    pub lateral: f64,
    pub longitudinal: f64,
    pub yaw: f64,
    pub speed_scale: f64,
}

impl MotionIntent {
    pub fn new(lateral: f64, longitudinal: f64, yaw: f64, speed_scale: f64) -> Self {
        Self {
            lateral,
            longitudinal,
            yaw,
            speed_scale,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Pin the axes into [-1, 1] and the scale to non-negative
    pub fn clamped(self) -> Self {
        Self {
            lateral: clamp_unit(self.lateral),
            longitudinal: clamp_unit(self.longitudinal),
            yaw: clamp_unit(self.yaw),
            speed_scale: if self.speed_scale.is_finite() {
                self.speed_scale.max(0.0)
            } else {
                0.0
            },
        }
    }

    /// True when the intent would command all wheels to zero
    pub fn is_zero(&self) -> bool {
        self.speed_scale == 0.0
            || (self.lateral == 0.0 && self.longitudinal == 0.0 && self.yaw == 0.0)
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) }
}

/// Remote-control payload: joystick axes plus two throttles.
///
/// `joy` is required and unknown fields are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeleopCommand {
    /// [x, y] in [-1, 1]
    pub joy: [f64; 2],
    /// Speed (rpm)
    #[serde(default)]
    pub throttle1: f64,
    /// Yaw in [-1, 1]
    #[serde(default)]
    pub throttle2: f64,
}

impl From<&TeleopCommand> for MotionIntent {
    fn from(cmd: &TeleopCommand) -> Self {
        MotionIntent::new(cmd.joy[0], cmd.joy[1], cmd.throttle2, cmd.throttle1).clamped()
    }
}

/// Manual feed message, either shape is accepted on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManualCommand {
    Intent(MotionIntent),
    Teleop(TeleopCommand),
}

impl From<&ManualCommand> for MotionIntent {
    fn from(cmd: &ManualCommand) -> Self {
        match cmd {
            ManualCommand::Intent(intent) => intent.clamped(),
            ManualCommand::Teleop(teleop) => MotionIntent::from(teleop),
        }
    }
}

/// Offset of the detected target from the image centre
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetOffset {
    pub dx: f64,
    pub dy: f64,
}

impl TargetOffset {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Offset of a pixel position from the given centre
    pub fn from_pixel(x: f64, y: f64, center: (f64, f64)) -> Self {
        Self::new(x - center.0, y - center.1)
    }

    /// Offset of a normalized (0..1) position scaled to a `width` x `height` image
    pub fn from_normalized(nx: f64, ny: f64, width: f64, height: f64, center: (f64, f64)) -> Self {
        Self::from_pixel(nx * width, ny * height, center)
    }
}

/// One processed vision frame. Neither field set means nothing was detected.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSample {
    /// Offset from the image centre, when the detector computed it
    pub target: Option<TargetOffset>,
    /// Raw pixel position of the target centre
    pub position: Option<[f64; 2]>,
}

impl VisionSample {
    pub fn lost() -> Self {
        Self::default()
    }

    pub fn offset(target: TargetOffset) -> Self {
        Self {
            target: Some(target),
            position: None,
        }
    }

    /// Target offset, resolving a raw position against `center`
    pub fn resolve(&self, center: (f64, f64)) -> Option<TargetOffset> {
        self.target
            .or_else(|| self.position.map(|[x, y]| TargetOffset::from_pixel(x, y, center)))
    }
}

/// Alignment verdict for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentState {
    Seeking,
    Aligned,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teleop_to_intent() {
        let cmd = TeleopCommand {
            joy: [0.5, -2.0],
            throttle1: 1200.0,
            throttle2: 0.25,
        };
        let intent = MotionIntent::from(&cmd);
        assert_eq!(intent, MotionIntent::new(0.5, -1.0, 0.25, 1200.0));
    }

    #[test]
    fn test_manual_command_accepts_both_shapes() {
        let intent: ManualCommand = serde_json::from_str(
            r#"{"lateral": 0.1, "longitudinal": 0.2, "yaw": 0.0, "speed_scale": 800}"#,
        )
        .unwrap();
        assert_eq!(
            MotionIntent::from(&intent),
            MotionIntent::new(0.1, 0.2, 0.0, 800.0)
        );

        let teleop: ManualCommand =
            serde_json::from_str(r#"{"joy": [1, 0], "throttle1": 500, "throttle2": 0}"#).unwrap();
        assert_eq!(
            MotionIntent::from(&teleop),
            MotionIntent::new(1.0, 0.0, 0.0, 500.0)
        );
    }

    #[test]
    fn test_manual_command_rejects_malformed_objects() {
        // Intent missing speed_scale
        assert!(
            serde_json::from_str::<ManualCommand>(
                r#"{"lateral": 1.0, "longitudinal": 0.0, "yaw": 0.0}"#
            )
            .is_err()
        );
        assert!(serde_json::from_str::<ManualCommand>(r#"{"hello": "world"}"#).is_err());
        assert!(serde_json::from_str::<ManualCommand>("{}").is_err());

        // Throttles may be omitted
        let cmd: ManualCommand = serde_json::from_str(r#"{"joy": [0, 1]}"#).unwrap();
        assert_eq!(
            cmd,
            ManualCommand::Teleop(TeleopCommand {
                joy: [0.0, 1.0],
                throttle1: 0.0,
                throttle2: 0.0,
            })
        );
    }

    #[test]
    fn test_negative_scale_clamped() {
        let intent = MotionIntent::new(0.0, 1.0, 0.0, -10.0).clamped();
        assert_eq!(intent.speed_scale, 0.0);
        assert!(intent.is_zero());
    }

    #[test]
    fn test_target_offset_conversions() {
        let offset = TargetOffset::from_pixel(420.0, 200.0, (320.0, 240.0));
        assert_eq!(offset, TargetOffset::new(100.0, -40.0));

        let offset = TargetOffset::from_normalized(0.75, 0.5, 640.0, 480.0, (320.0, 240.0));
        assert_eq!(offset, TargetOffset::new(160.0, 0.0));
    }

    #[test]
    fn test_vision_sample_no_target() {
        let sample: VisionSample = serde_json::from_str(r#"{"target": null}"#).unwrap();
        assert_eq!(sample.resolve((320.0, 240.0)), None);
        assert_eq!(sample, VisionSample::lost());
    }

    #[test]
    fn test_vision_sample_from_position() {
        let sample: VisionSample = serde_json::from_str(r#"{"position": [350, 240]}"#).unwrap();
        assert_eq!(
            sample.resolve((320.0, 240.0)),
            Some(TargetOffset::new(30.0, 0.0))
        );

        // A precomputed offset wins over the raw position
        let sample = VisionSample {
            target: Some(TargetOffset::new(-5.0, 5.0)),
            position: Some([0.0, 0.0]),
        };
        assert_eq!(
            sample.resolve((320.0, 240.0)),
            Some(TargetOffset::new(-5.0, 5.0))
        );
    }
}
