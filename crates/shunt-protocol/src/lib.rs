//! shunt-protocol: Wire protocol for shunt tunnels
//!
//! This crate defines the bytes exchanged between the public relay and the
//! private-side agent: the handshake that opens every communicate-channel
//! connection, the session identifier that correlates a data channel with a
//! waiting public client, and the framed control messages.

pub mod codec;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod session;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use handshake::{Handshake, HandshakeKind, MAGIC, PROTOCOL_VERSION};
pub use message::{Message, MessageType};
pub use session::{SessionId, SessionIdGenerator, SESSION_ID_LEN};
