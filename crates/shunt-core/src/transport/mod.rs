//! Stream transport: plain TCP or TLS
//!
//! Everything above this module sees a [`Stream`], whatever the wire
//! underneath. Half-close is `AsyncWriteExt::shutdown`, full close is drop.

mod connector;
mod listener;
mod stream;

pub use connector::Connector;
pub use listener::{Incoming, Listener};
pub use stream::Stream;
