//! Tunnel management for connecting to the relay

mod connector;
mod provision;
mod reconnect;

pub use connector::{communicate_connector, ControlChannel, TunnelConnector, TunnelEvent};
pub use provision::Provisioner;
pub use reconnect::ExponentialBackoff;
