// High-level motion controller for the mecanum base
//
// Owns the four motor nodes, the two buses and the heartbeat scheduler.
// Combines kinematics and the frame codec to provide a simple API.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::bus::{Bus, BusError};
use super::frame::{EncodeError, encode_enable, encode_speed, encode_stop};
use super::heartbeat::HeartbeatScheduler;
use super::kinematics::MixingMatrix;
use super::node::{MotorNode, NodeSnapshot, NodeState};
use crate::config::{ConfigError, VehicleConfig, Wheel};
use crate::messages::MotionIntent;

#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Speed encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Drives the four wheels. Nodes are only reachable through this type.
pub struct MotionController {
    buses: [Arc<Bus>; 2],
    nodes: [MotorNode; 4],
    matrix: MixingMatrix,
    max_speed_rpm: i32,
    heartbeat: Option<HeartbeatScheduler>,
}

impl MotionController {
    /// Wire the nodes onto `buses` per the config and start the heartbeat.
    ///
    /// Must be called from within a Tokio runtime. Nodes start disabled.
    pub fn start(config: &VehicleConfig, buses: [Bus; 2]) -> Result<Self, MotionError> {
        config.validate()?;

        let buses = buses.map(Arc::new);
        let nodes = Wheel::ALL.map(|wheel| {
            let wheel_config = config.wheel(wheel);
            MotorNode::new(wheel, wheel_config, buses[wheel_config.channel].clone())
        });

        let heartbeat = HeartbeatScheduler::spawn(
            nodes.iter().map(MotorNode::heartbeat_link).collect(),
            config.heartbeat_period(),
        );

        Ok(Self {
            buses,
            nodes,
            matrix: config.kinematics,
            max_speed_rpm: config.max_speed_rpm,
            heartbeat: Some(heartbeat),
        })
    }

    fn set_enabled(&mut self, enable: bool) -> Result<(), MotionError> {
        let target = if enable {
            NodeState::Enabled
        } else {
            NodeState::Disabled
        };
        let mut first_err = None;

        for node in &self.nodes {
            match node.send(&encode_enable(node.station_no(), enable)) {
                Ok(()) => node.set_state(target),
                Err(e) => {
                    warn!("Failed to set {:?} to {:?}: {}", node.wheel(), target, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Enable every motor. Heartbeats for a node start with its next tick.
    pub fn enable_all(&mut self) -> Result<(), MotionError> {
        info!("Enabling all motors");
        self.set_enabled(true)
    }

    /// Disable every motor; heartbeats stop for disabled nodes
    pub fn disable_all(&mut self) -> Result<(), MotionError> {
        info!("Disabling all motors");
        self.set_enabled(false)
    }

    /// Send one speed frame per wheel, in wire order.
    ///
    /// Speeds are clamped to ±max before encoding. A bus failure on one wheel
    /// is logged and the rest still go out; returns how many frames were sent.
    /// Driving a disabled node is not rejected, but may have no effect.
    pub fn drive(&mut self, speeds: [i32; 4]) -> Result<usize, MotionError> {
        debug!(
            "Setting wheel speeds: fl={}, fr={}, rr={}, rl={}",
            speeds[0], speeds[1], speeds[2], speeds[3]
        );

        let max = self.max_speed_rpm;
        let mut sent = 0;
        for (node, &rpm) in self.nodes.iter_mut().zip(speeds.iter()) {
            let rpm = rpm.clamp(-max, max);
            let frame = encode_speed(node.station_no(), rpm as i64)?;

            if node.state() == NodeState::Disabled {
                debug!("Driving disabled node {:?}", node.wheel());
            }

            match node.send(&frame) {
                Ok(()) => {
                    node.set_last_commanded_speed(rpm);
                    sent += 1;
                }
                Err(e) => warn!("Dropped speed frame for {:?}: {}", node.wheel(), e),
            }
        }
        Ok(sent)
    }

    /// Solve an intent through the mixing matrix and drive the result
    pub fn drive_intent(&mut self, intent: &MotionIntent) -> Result<usize, MotionError> {
        let speeds = self.matrix.solve(intent).to_rpm(self.max_speed_rpm);
        self.drive(speeds)
    }

    /// Zero speed on all wheels
    pub fn stop_all(&mut self) -> Result<usize, MotionError> {
        self.drive([0; 4])
    }

    /// Send the dedicated stop command to every node
    pub fn emergency_stop_all(&mut self) -> usize {
        info!("Emergency stop on all motors");
        let mut sent = 0;
        for node in self.nodes.iter_mut() {
            match node.send(&encode_stop(node.station_no())) {
                Ok(()) => {
                    node.set_last_commanded_speed(0);
                    sent += 1;
                }
                Err(e) => warn!("Stop frame for {:?} failed: {}", node.wheel(), e),
            }
        }
        sent
    }

    pub fn move_forward(&mut self, speed: f64) -> Result<usize, MotionError> {
        self.drive_intent(&MotionIntent::new(0.0, 1.0, 0.0, speed))
    }

    pub fn move_backward(&mut self, speed: f64) -> Result<usize, MotionError> {
        self.drive_intent(&MotionIntent::new(0.0, -1.0, 0.0, speed))
    }

    pub fn move_left(&mut self, speed: f64) -> Result<usize, MotionError> {
        self.drive_intent(&MotionIntent::new(-1.0, 0.0, 0.0, speed))
    }

    pub fn move_right(&mut self, speed: f64) -> Result<usize, MotionError> {
        self.drive_intent(&MotionIntent::new(1.0, 0.0, 0.0, speed))
    }

    /// Turn counter-clockwise; 0..90 degrees maps onto 0..half of max speed
    pub fn turn_left(&mut self, angle_deg: f64) -> Result<usize, MotionError> {
        let speed = self.turn_speed(angle_deg);
        self.drive_intent(&MotionIntent::new(0.0, 0.0, 1.0, speed))
    }

    /// Turn clockwise; 0..90 degrees maps onto 0..half of max speed
    pub fn turn_right(&mut self, angle_deg: f64) -> Result<usize, MotionError> {
        let speed = self.turn_speed(angle_deg);
        self.drive_intent(&MotionIntent::new(0.0, 0.0, -1.0, speed))
    }

    fn turn_speed(&self, angle_deg: f64) -> f64 {
        let ratio = (angle_deg / 90.0).clamp(0.0, 1.0);
        self.max_speed_rpm as f64 * ratio * 0.5
    }

    /// Read-only view of all nodes, in wire order
    pub fn nodes(&self) -> [NodeSnapshot; 4] {
        [
            self.nodes[0].snapshot(),
            self.nodes[1].snapshot(),
            self.nodes[2].snapshot(),
            self.nodes[3].snapshot(),
        ]
    }

    pub fn node(&self, wheel: Wheel) -> NodeSnapshot {
        self.nodes[wheel.index()].snapshot()
    }

    pub fn matrix(&self) -> &MixingMatrix {
        &self.matrix
    }

    pub fn max_speed_rpm(&self) -> i32 {
        self.max_speed_rpm
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .as_ref()
            .is_some_and(HeartbeatScheduler::is_running)
    }

    /// Stop the wheels, join the heartbeat, then release both buses.
    ///
    /// The buses are released even when the stop fails; that error is
    /// returned afterwards.
    pub async fn shutdown(mut self) -> Result<(), MotionError> {
        info!("Shutting down motion controller");
        let stopped = self.stop_all();

        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }
        for bus in &self.buses {
            bus.close();
        }

        stopped.map(|_| ())
    }
}

impl Drop for MotionController {
    fn drop(&mut self) {
        // Dropped without shutdown(): the heartbeat cannot be joined here, so
        // abort it before stopping the wheels and closing the buses
        if let Some(heartbeat) = self.heartbeat.take() {
            warn!("Motion controller dropped without shutdown");
            heartbeat.abort();
            if let Err(e) = self.stop_all() {
                warn!("Failed to stop motors on drop: {}", e);
            }
            for bus in &self.buses {
                bus.close();
            }
        }
    }
}
