//! Relay server

mod handler;
mod listener;

pub use handler::{handle_communicate, handle_public};
pub use listener::RelayServer;
