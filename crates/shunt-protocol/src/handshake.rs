//! Communicate-channel handshake
//!
//! Every connection an agent opens to the relay's communicate address starts
//! with a fixed-size handshake that says what the connection is for:
//!
//! ```text
//! +-------+---------+------+------------------------+
//! | magic | version | kind | session id (DATA only) |
//! |  4 B  |   1 B   | 1 B  |          16 B          |
//! +-------+---------+------+------------------------+
//! ```
//!
//! A control handshake registers the connection as the agent's control
//! channel. A data handshake binds the connection to the pending session
//! named by the trailing identifier.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::session::{SessionId, SESSION_ID_LEN};

/// Magic bytes opening every handshake
pub const MAGIC: [u8; 4] = *b"SHNT";

/// Current protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the common handshake prefix (magic, version, kind)
pub const PREFIX_SIZE: usize = 6;

/// Handshake kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeKind {
    /// Long-lived control channel
    Control = 0x01,
    /// Per-session data channel
    Data = 0x02,
}

impl HandshakeKind {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Control),
            0x02 => Some(Self::Data),
            _ => None,
        }
    }
}

/// What a communicate-channel connection declared itself to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Agent control registration
    Control,
    /// Data channel for the given session
    Data(SessionId),
}

impl Handshake {
    /// Kind byte for this handshake
    pub fn kind(&self) -> HandshakeKind {
        match self {
            Handshake::Control => HandshakeKind::Control,
            Handshake::Data(_) => HandshakeKind::Data,
        }
    }

    /// Encoded length of this handshake
    pub fn encoded_len(&self) -> usize {
        match self {
            Handshake::Control => PREFIX_SIZE,
            Handshake::Data(_) => PREFIX_SIZE + SESSION_ID_LEN,
        }
    }

    /// Encode the handshake into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_slice(&MAGIC);
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u8(self.kind() as u8);
        if let Handshake::Data(session_id) = self {
            dst.put_slice(session_id.as_bytes());
        }
    }

    /// Write the handshake to a stream and flush it
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read exactly one handshake from a stream
    ///
    /// Reads only the bytes belonging to the handshake, so whatever follows
    /// (control frames, tunneled payload) stays in the stream.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut prefix = [0u8; PREFIX_SIZE];
        reader.read_exact(&mut prefix).await?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&prefix[..4]);
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let version = prefix[4];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let kind = HandshakeKind::from_u8(prefix[5])
            .ok_or(ProtocolError::UnknownHandshakeKind(prefix[5]))?;

        match kind {
            HandshakeKind::Control => Ok(Handshake::Control),
            HandshakeKind::Data => {
                let mut id = [0u8; SESSION_ID_LEN];
                reader.read_exact(&mut id).await?;
                let session_id = SessionId::from_bytes(id);
                tracing::trace!("Read data handshake for {}", session_id);
                Ok(Handshake::Data(session_id))
            }
        }
    }
}
