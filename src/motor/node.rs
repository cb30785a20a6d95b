// One wheel motor controller: identity on the network plus drive state

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use super::bus::{Bus, BusError};
use super::frame::{Frame, encode_heartbeat};
use crate::config::{Wheel, WheelConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Disabled,
    Enabled,
}

/// State shared between the owning node and its heartbeat link
#[derive(Debug, Default)]
struct NodeStatus {
    enabled: AtomicBool,
    heartbeats: AtomicU64,
    last_heartbeat_at: Mutex<Option<Instant>>,
}

impl NodeStatus {
    fn last_heartbeat_at(&self) -> Option<Instant> {
        *self
            .last_heartbeat_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
        *self
            .last_heartbeat_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
    }
}

/// A wheel motor, owned by the motion controller
#[derive(Debug)]
pub struct MotorNode {
    wheel: Wheel,
    address: u16,
    station_no: u8,
    channel: usize,
    bus: Arc<Bus>,
    last_commanded_speed: i32,
    status: Arc<NodeStatus>,
}

impl MotorNode {
    pub fn new(wheel: Wheel, config: &WheelConfig, bus: Arc<Bus>) -> Self {
        Self {
            wheel,
            address: config.address,
            station_no: config.station_no,
            channel: config.channel,
            bus,
            last_commanded_speed: 0,
            status: Arc::new(NodeStatus::default()),
        }
    }

    pub fn wheel(&self) -> Wheel {
        self.wheel
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn station_no(&self) -> u8 {
        self.station_no
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn state(&self) -> NodeState {
        if self.status.enabled.load(Ordering::SeqCst) {
            NodeState::Enabled
        } else {
            NodeState::Disabled
        }
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        self.status
            .enabled
            .store(state == NodeState::Enabled, Ordering::SeqCst);
    }

    pub fn last_commanded_speed(&self) -> i32 {
        self.last_commanded_speed
    }

    pub(crate) fn set_last_commanded_speed(&mut self, rpm: i32) {
        self.last_commanded_speed = rpm;
    }

    /// Send a frame to this node on its bus
    pub fn send(&self, frame: &Frame) -> Result<(), BusError> {
        self.bus.send(self.address, frame)
    }

    /// Handle for the heartbeat scheduler; it can read state and send, nothing more
    pub fn heartbeat_link(&self) -> HeartbeatLink {
        HeartbeatLink {
            wheel: self.wheel,
            address: self.address,
            station_no: self.station_no,
            bus: self.bus.clone(),
            status: self.status.clone(),
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            wheel: self.wheel,
            address: self.address,
            station_no: self.station_no,
            channel: self.channel,
            state: self.state(),
            last_commanded_speed: self.last_commanded_speed,
            heartbeats: self.status.heartbeats.load(Ordering::Relaxed),
            last_heartbeat_at: self.status.last_heartbeat_at(),
        }
    }
}

/// Read-only view of a node for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSnapshot {
    pub wheel: Wheel,
    pub address: u16,
    pub station_no: u8,
    pub channel: usize,
    pub state: NodeState,
    pub last_commanded_speed: i32,
    pub heartbeats: u64,
    pub last_heartbeat_at: Option<Instant>,
}

/// Send-capable reference to a node used by the heartbeat scheduler
#[derive(Debug, Clone)]
pub struct HeartbeatLink {
    wheel: Wheel,
    address: u16,
    station_no: u8,
    bus: Arc<Bus>,
    status: Arc<NodeStatus>,
}

impl HeartbeatLink {
    pub fn wheel(&self) -> Wheel {
        self.wheel
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn is_enabled(&self) -> bool {
        self.status.enabled.load(Ordering::SeqCst)
    }

    /// Send one heartbeat frame and record it
    pub fn beat(&self) -> Result<(), BusError> {
        self.bus
            .send(self.address, &encode_heartbeat(self.station_no))?;
        self.status.record_heartbeat();
        Ok(())
    }
}
