// Motor control module for the mecanum CAN base
//
// Provides:
// - Command frame codec for the wheel motor controllers
// - Bus abstraction with loopback and SocketCAN transports
// - Per-node state and the heartbeat scheduler
// - Mecanum inverse kinematics (motion intent -> wheel speeds)
// - High-level motion controller API

pub mod bus;
mod driver;
pub mod frame;
pub mod heartbeat;
pub mod kinematics;
pub mod node;

#[cfg(feature = "socketcan")]
pub use bus::SocketCanTransport;
pub use bus::{Bus, BusError, FrameTransport, LoopbackTransport};
pub use driver::{MotionController, MotionError};
pub use frame::{DecodeError, EncodeError, Frame};
pub use kinematics::{MixingMatrix, WheelSpeeds};
pub use node::{NodeSnapshot, NodeState};
