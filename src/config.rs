// Timeouts, topics, wheel wiring and controller tuning
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::MixingMatrix;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 20;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(500);

// Heartbeat cadence; the motor watchdog window is a multiple of this
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(100);

// Zenoh topics
pub const TOPIC_CMD_MOTION: &str = "vehicle/cmd/motion"; // manual intent
pub const TOPIC_VISION_TARGET: &str = "vehicle/vision/target"; // target offsets
pub const TOPIC_HEALTH: &str = "vehicle/state/health"; // health status
pub const TOPIC_ALIGNMENT: &str = "vehicle/state/alignment"; // aligned / seeking

// Motor configuration
pub const CAN_CHANNELS: [&str; 2] = ["can0", "can1"];

/// Largest wheel speed ever sent (rpm)
pub const MAX_SPEED_RPM: i32 = 5000;

/// Front pair yaw coupling. Call sites in the field used both 1.0 and 1.3;
/// needs confirming on the vehicle.
pub const YAW_COUPLING: f64 = 1.0;

// Camera geometry (640x480 stream)
pub const IMAGE_WIDTH: f64 = 640.0;
pub const IMAGE_HEIGHT: f64 = 480.0;

/// Logical wheel positions, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    RearRight,
    RearLeft,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::RearRight,
        Wheel::RearLeft,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Where one wheel motor lives on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelConfig {
    /// CAN arbitration id
    pub address: u16,
    /// Protocol station number (1-4)
    pub station_no: u8,
    /// Index into `VehicleConfig::channels`
    pub channel: usize,
}

/// Default wiring: front pair on can0, rear pair on can1
pub const WHEEL_LAYOUT: [WheelConfig; 4] = [
    WheelConfig { address: 0x65, station_no: 0x01, channel: 0 }, // front left
    WheelConfig { address: 0x66, station_no: 0x02, channel: 0 }, // front right
    WheelConfig { address: 0x67, station_no: 0x03, channel: 1 }, // rear right
    WheelConfig { address: 0x68, station_no: 0x04, channel: 1 }, // rear left
];

/// Alignment tuning (pixels unless the vision feed is normalized)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub center_x: f64,
    pub center_y: f64,
    pub deadband_px: f64,
    pub max_lateral_fraction: f64,
    pub max_forward_fraction: f64,
    pub lateral_gain: f64,
    pub forward_gain: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            center_x: IMAGE_WIDTH / 2.0,
            center_y: IMAGE_HEIGHT / 2.0,
            deadband_px: 20.0,
            max_lateral_fraction: 0.3,
            max_forward_fraction: 0.2,
            lateral_gain: 2.0,
            forward_gain: 1.5,
        }
    }
}

impl AlignmentConfig {
    /// Image centre the offsets are measured from
    pub fn center(&self) -> (f64, f64) {
        (self.center_x, self.center_y)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Everything the vehicle needs at load time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Per-wheel wiring, indexed by `Wheel`
    pub wheels: [WheelConfig; 4],
    /// SocketCAN interface names
    pub channels: [String; 2],
    pub kinematics: MixingMatrix,
    pub max_speed_rpm: i32,
    pub heartbeat_period_ms: u64,
    pub alignment: AlignmentConfig,
    pub loop_hz: u64,
    pub cmd_timeout_ms: u64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            wheels: WHEEL_LAYOUT,
            channels: CAN_CHANNELS.map(String::from),
            kinematics: MixingMatrix::diamond(YAW_COUPLING),
            max_speed_rpm: MAX_SPEED_RPM,
            heartbeat_period_ms: HEARTBEAT_PERIOD.as_millis() as u64,
            alignment: AlignmentConfig::default(),
            loop_hz: LOOP_HZ,
            cmd_timeout_ms: CMD_TIMEOUT.as_millis() as u64,
        }
    }
}

impl VehicleConfig {
    /// Load a JSON config file; missing fields fall back to defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        for (i, wheel) in self.wheels.iter().enumerate() {
            if !(1..=4).contains(&wheel.station_no) {
                return invalid(format!(
                    "wheel {} station number {} outside 1..=4",
                    i, wheel.station_no
                ));
            }
            if wheel.channel >= self.channels.len() {
                return invalid(format!("wheel {} uses unknown channel {}", i, wheel.channel));
            }
            if wheel.address > 0x7FF {
                return invalid(format!(
                    "wheel {} address 0x{:X} is not a standard CAN id",
                    i, wheel.address
                ));
            }
            if self.wheels[..i].iter().any(|w| w.address == wheel.address) {
                return invalid(format!("duplicate address 0x{:X}", wheel.address));
            }
        }

        for channel in 0..self.channels.len() {
            let served = self.wheels.iter().filter(|w| w.channel == channel).count();
            if served != 2 {
                return invalid(format!(
                    "channel {} serves {} wheels, expected 2",
                    self.channels[channel], served
                ));
            }
        }

        if self.max_speed_rpm < 0 {
            return invalid(format!("max_speed_rpm {} is negative", self.max_speed_rpm));
        }
        if self.heartbeat_period_ms == 0 {
            return invalid("heartbeat_period_ms must be positive".to_string());
        }
        // loop_period() works in whole milliseconds
        if self.loop_hz == 0 || self.loop_hz > 1000 {
            return invalid(format!("loop_hz {} outside 1..=1000", self.loop_hz));
        }
        if self.alignment.deadband_px < 0.0 {
            return invalid("alignment deadband must not be negative".to_string());
        }
        Ok(())
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }

    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.cmd_timeout_ms)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(1000 / self.loop_hz)
    }

    pub fn wheel(&self, wheel: Wheel) -> &WheelConfig {
        &self.wheels[wheel.index()]
    }
}
