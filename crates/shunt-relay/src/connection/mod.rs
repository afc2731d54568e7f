//! Agent connection management

mod control;
mod health;

pub use control::{ControlCommand, ControlHandle, ControlSlot, COMMAND_QUEUE_SIZE};
pub use health::HealthMonitor;
