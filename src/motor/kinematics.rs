// Mecanum inverse kinematics for the 4-wheel diamond (X) layout
// Converts a motion intent (lateral, longitudinal, yaw, speed scale) to wheel speeds.

use serde::{Deserialize, Serialize};

use crate::messages::MotionIntent;

/// Mixing coefficients, one row per wheel: [lateral, longitudinal, yaw].
///
/// The whole matrix is configuration so that differing sign groupings or
/// yaw couplings show up as one reviewable value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixingMatrix {
    pub front_left: [f64; 3],
    pub front_right: [f64; 3],
    pub rear_right: [f64; 3],
    pub rear_left: [f64; 3],
}

impl MixingMatrix {
    /// Diamond layout with yaw coupling `k` on the front pair
    pub fn diamond(k: f64) -> Self {
        Self {
            front_left: [-1.0, 1.0, k],
            front_right: [-1.0, -1.0, k],
            rear_right: [1.0, -1.0, 1.0],
            rear_left: [1.0, 1.0, 1.0],
        }
    }

    /// Yaw coefficient of the front pair
    pub fn yaw_coupling(&self) -> f64 {
        self.front_left[2]
    }

    fn rows(&self) -> [[f64; 3]; 4] {
        [
            self.front_left,
            self.front_right,
            self.rear_right,
            self.rear_left,
        ]
    }

    /// Mix an intent into signed wheel speeds (rpm). No clamping happens here.
    pub fn solve(&self, intent: &MotionIntent) -> WheelSpeeds {
        let input = [intent.lateral, intent.longitudinal, intent.yaw];
        let [front_left, front_right, rear_right, rear_left] = self.rows().map(|row| {
            intent.speed_scale * (row[0] * input[0] + row[1] * input[1] + row[2] * input[2])
        });

        WheelSpeeds {
            front_left,
            front_right,
            rear_right,
            rear_left,
        }
    }
}

impl Default for MixingMatrix {
    fn default() -> Self {
        Self::diamond(crate::config::YAW_COUPLING)
    }
}

/// Wheel speeds (rpm) before clamping, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelSpeeds {
    pub front_left: f64,
    pub front_right: f64,
    pub rear_right: f64,
    pub rear_left: f64,
}

impl WheelSpeeds {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns speeds as array [front_left, front_right, rear_right, rear_left]
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.front_left,
            self.front_right,
            self.rear_right,
            self.rear_left,
        ]
    }

    /// Round to whole rpm and clamp every wheel into ±`max_rpm`
    pub fn to_rpm(&self, max_rpm: i32) -> [i32; 4] {
        let max = max_rpm.abs() as f64;
        self.as_array().map(|speed| {
            if speed.is_nan() {
                0
            } else {
                speed.round().clamp(-max, max) as i32
            }
        })
    }
}

/// Solve with the default diamond matrix
pub fn solve(intent: &MotionIntent) -> WheelSpeeds {
    MixingMatrix::default().solve(intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_intent() {
        let wheels = solve(&MotionIntent::zero());
        assert_eq!(wheels, WheelSpeeds::zero());
    }

    #[test]
    fn test_pure_lateral() {
        // k only multiplies yaw, so it cannot matter here
        for k in [1.0, 1.3] {
            let wheels = MixingMatrix::diamond(k).solve(&MotionIntent::new(1.0, 0.0, 0.0, 1000.0));
            assert_eq!(wheels.as_array(), [-1000.0, -1000.0, 1000.0, 1000.0]);
        }
    }

    #[test]
    fn test_pure_longitudinal() {
        let wheels = solve(&MotionIntent::new(0.0, 1.0, 0.0, 500.0));
        assert_eq!(wheels.as_array(), [500.0, -500.0, -500.0, 500.0]);
    }

    #[test]
    fn test_pure_yaw_symmetric() {
        let wheels = MixingMatrix::diamond(1.0).solve(&MotionIntent::new(0.0, 0.0, 1.0, 750.0));
        assert_eq!(wheels.as_array(), [750.0; 4]);
    }

    #[test]
    fn test_yaw_coupling_front_only() {
        let matrix = MixingMatrix::diamond(1.3);
        assert_eq!(matrix.yaw_coupling(), 1.3);

        let wheels = matrix.solve(&MotionIntent::new(0.0, 0.0, 1.0, 1000.0));
        assert!((wheels.front_left - 1300.0).abs() < 1e-9);
        assert!((wheels.front_right - 1300.0).abs() < 1e-9);
        assert_eq!(wheels.rear_right, 1000.0);
        assert_eq!(wheels.rear_left, 1000.0);
    }

    #[test]
    fn test_solver_does_not_clamp() {
        // Diagonal plus yaw exceeds the scale; the solver must not hide that
        let wheels = solve(&MotionIntent::new(1.0, 1.0, 1.0, 5000.0));
        assert_eq!(wheels.rear_left, 15000.0);
    }

    #[test]
    fn test_to_rpm_clamps_and_rounds() {
        let wheels = WheelSpeeds {
            front_left: 12.6,
            front_right: -9000.0,
            rear_right: 9000.0,
            rear_left: f64::NAN,
        };
        assert_eq!(wheels.to_rpm(5000), [13, -5000, 5000, 0]);
    }
}
