//! Session identifier type
//!
//! A session identifier correlates a public client connection waiting on the
//! relay with the data channel the agent opens for it. Identifiers are 16
//! bytes: an 8-byte big-endian counter followed by 8 random bytes. The
//! counter makes them unique for the lifetime of a generator, the random
//! tail makes them unguessable for peers that did not receive them over the
//! control channel.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Encoded length of a session identifier in bytes
pub const SESSION_ID_LEN: usize = 16;

/// Unique identifier for a tunneled session
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    /// Create a session ID from raw bytes
    pub fn from_bytes(bytes: [u8; SESSION_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an identifier from a sequence number and a random tail
    pub fn from_parts(sequence: u64, nonce: u64) -> Self {
        let mut bytes = [0u8; SESSION_ID_LEN];
        bytes[..8].copy_from_slice(&sequence.to_be_bytes());
        bytes[8..].copy_from_slice(&nonce.to_be_bytes());
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self)
    }
}

/// Allocates session identifiers that never repeat within one generator
pub struct SessionIdGenerator {
    /// Next sequence number to hand out
    next_sequence: AtomicU64,
}

impl SessionIdGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self {
            // Start at 1 so an all-zero id is never valid
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Allocate a new session ID
    pub fn allocate(&self) -> SessionId {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        SessionId::from_parts(sequence, rand::random::<u64>())
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_session_id_display_is_hex() {
        let id = SessionId::from_parts(42, 0xdead_beef);
        assert_eq!(format!("{}", id), "000000000000002a00000000deadbeef");
        assert_eq!(format!("{:?}", id), "SessionId(000000000000002a00000000deadbeef)");
    }

    #[test]
    fn test_generator_ids_are_unique() {
        let generator = SessionIdGenerator::new();
        let ids: HashSet<SessionId> = (0..10_000).map(|_| generator.allocate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_generator_sequence_increases() {
        let generator = SessionIdGenerator::new();
        let first = generator.allocate();
        let second = generator.allocate();
        assert_eq!(first.as_bytes()[..8], 1u64.to_be_bytes());
        assert_eq!(second.as_bytes()[..8], 2u64.to_be_bytes());
    }

    #[test]
    fn test_generator_unique_across_threads() {
        let generator = std::sync::Arc::new(SessionIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = std::sync::Arc::clone(&generator);
                std::thread::spawn(move || (0..1000).map(|_| generator.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate id {}", id);
            }
        }
    }
}
