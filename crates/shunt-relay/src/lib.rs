//! shunt-relay: Public side of a shunt tunnel
//!
//! The relay runs on a publicly reachable host. It accepts public client
//! connections, asks the agent's control channel for a data channel per
//! client, and relays bytes between each client and its data channel.

pub mod connection;
pub mod server;
pub mod session;
pub mod state;

pub use server::RelayServer;
pub use session::SessionRegistry;
pub use state::RelayState;
