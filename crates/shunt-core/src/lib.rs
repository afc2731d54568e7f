//! shunt-core: Core abstractions and configuration for shunt
//!
//! This crate provides the pieces shared by the relay and the agent: the
//! error taxonomy, configuration structures, the plain/TLS transport, and
//! the bidirectional byte relay that joins two connections.

pub mod config;
pub mod error;
pub mod relay;
pub mod time;
pub mod tls;
pub mod transport;

pub use error::ShuntError;
pub use relay::{RelayOptions, RelayStats};
pub use transport::{Connector, Listener, Stream};
