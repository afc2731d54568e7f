//! Session tracking

mod cleanup;
mod registry;

pub use cleanup::run_sweep;
pub use registry::{Rejected, SessionRegistry, SessionState, TOMBSTONE_RETENTION};
