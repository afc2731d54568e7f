//! Control-channel messages
//!
//! Once an agent has opened a control channel (see `handshake`), both ends
//! exchange framed messages over it:
//!
//! 1. Relay sends `NewSession` whenever a public client connects. The agent
//!    answers out of band by opening a data channel carrying the same id.
//! 2. Relay sends `Heartbeat` periodically, the agent echoes the timestamp
//!    back in `HeartbeatAck`. Either side treats a silent peer as dead.

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Request to open a data channel for a pending session
    NewSession = 0x01,
    /// Heartbeat ping
    Heartbeat = 0x02,
    /// Heartbeat acknowledgment
    HeartbeatAck = 0x03,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::NewSession),
            0x02 => Some(Self::Heartbeat),
            0x03 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A public client is waiting; open a data channel for it
    NewSession {
        /// Identifier to present in the data handshake
        session_id: SessionId,
    },

    /// Heartbeat ping
    Heartbeat {
        /// Timestamp for latency measurement
        timestamp: u64,
    },

    /// Heartbeat acknowledgment
    HeartbeatAck {
        /// Echo of the original timestamp
        timestamp: u64,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::NewSession { .. } => MessageType::NewSession,
            Message::Heartbeat { .. } => MessageType::Heartbeat,
            Message::HeartbeatAck { .. } => MessageType::HeartbeatAck,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for msg_type in [
            MessageType::NewSession,
            MessageType::Heartbeat,
            MessageType::HeartbeatAck,
        ] {
            let byte = msg_type.as_u8();
            let recovered = MessageType::from_u8(byte).unwrap();
            assert_eq!(recovered, msg_type);
        }
    }

    #[test]
    fn test_unknown_message_type() {
        assert_eq!(MessageType::from_u8(0x00), None);
        assert_eq!(MessageType::from_u8(0xFF), None);
    }

    #[test]
    fn test_message_type_of_new_session() {
        let msg = Message::NewSession {
            session_id: SessionId::from_parts(1, 2),
        };
        assert_eq!(msg.message_type(), MessageType::NewSession);
    }
}
