//! Pending session registry
//!
//! Holds public client connections between the moment they are accepted and
//! the moment the agent delivers a matching data channel. Each entry moves
//! `Pending -> Bound` or `Pending -> Closed`; once it leaves `Pending` only a
//! connection-less tombstone remains so late or duplicate data channels can
//! be told apart, until the sweep prunes it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use shunt_core::error::SessionError;
use shunt_protocol::{SessionId, SessionIdGenerator};

/// How long bound/closed tombstones are kept
pub const TOMBSTONE_RETENTION: Duration = Duration::from_secs(60);

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a data channel
    Pending,
    /// Data channel attached, connections handed to a relay pair
    Bound,
    /// Expired or failed before a data channel arrived
    Closed,
}

enum Slot<C> {
    Pending { connection: C, created_at: Instant },
    Bound { at: Instant },
    Closed { at: Instant },
}

impl<C> Slot<C> {
    fn state(&self) -> SessionState {
        match self {
            Slot::Pending { .. } => SessionState::Pending,
            Slot::Bound { .. } => SessionState::Bound,
            Slot::Closed { .. } => SessionState::Closed,
        }
    }
}

/// A connection the registry refused, handed back so the caller can close it
#[derive(Debug)]
pub struct Rejected<C> {
    pub error: SessionError,
    pub connection: C,
}

/// Registry of sessions keyed by identifier
///
/// `C` is the public-side connection type. Per-identifier operations are
/// serialized by the map's shard locks, so a bind racing an expiry for the
/// same session sees exactly one winner.
pub struct SessionRegistry<C> {
    sessions: DashMap<SessionId, Slot<C>>,
    ids: SessionIdGenerator,
    pending: AtomicUsize,
    provisioning_timeout: Duration,
    max_pending: Option<usize>,
    tombstone_retention: Duration,
}

impl<C> SessionRegistry<C> {
    /// Create a registry whose pending sessions expire after `provisioning_timeout`
    pub fn new(provisioning_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ids: SessionIdGenerator::new(),
            pending: AtomicUsize::new(0),
            provisioning_timeout,
            max_pending: None,
            tombstone_retention: TOMBSTONE_RETENTION,
        }
    }

    /// Limit the number of sessions waiting for a data channel
    pub fn with_max_pending(mut self, max_pending: Option<usize>) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Override how long tombstones are kept
    pub fn with_tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention = retention;
        self
    }

    pub fn provisioning_timeout(&self) -> Duration {
        self.provisioning_timeout
    }

    /// Register a public connection as a pending session
    ///
    /// The identifier is recorded before it is returned, so a data channel
    /// can never arrive for an id the registry does not know yet.
    pub fn create_session(&self, connection: C) -> Result<SessionId, Rejected<C>> {
        if let Some(max) = self.max_pending {
            let reserved = self
                .pending
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < max).then_some(n + 1)
                });
            if reserved.is_err() {
                return Err(Rejected {
                    error: SessionError::LimitExceeded(max),
                    connection,
                });
            }
        } else {
            self.pending.fetch_add(1, Ordering::AcqRel);
        }

        let session_id = self.ids.allocate();
        self.sessions.insert(
            session_id,
            Slot::Pending {
                connection,
                created_at: Instant::now(),
            },
        );

        tracing::debug!("Session {} created", session_id);
        Ok(session_id)
    }

    /// Attach a data connection to a pending session
    ///
    /// On success the public connection leaves the registry and both are
    /// returned to the caller. A session past its provisioning deadline is
    /// treated as expired even if the sweep has not visited it yet.
    pub fn bind_session<D>(&self, session_id: SessionId, data: D) -> Result<(C, D), Rejected<D>> {
        let not_found = |data| Rejected {
            error: SessionError::NotFound(session_id),
            connection: data,
        };

        let Some(mut slot) = self.sessions.get_mut(&session_id) else {
            return Err(not_found(data));
        };

        let now = Instant::now();
        match std::mem::replace(&mut *slot, Slot::Bound { at: now }) {
            Slot::Pending {
                connection,
                created_at,
            } => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                if now.saturating_duration_since(created_at) >= self.provisioning_timeout {
                    *slot = Slot::Closed { at: now };
                    drop(slot);
                    drop(connection);
                    tracing::warn!("{}", SessionError::ProvisioningTimeout(session_id));
                    return Err(not_found(data));
                }
                tracing::debug!(
                    "Session {} bound after {:?}",
                    session_id,
                    now.saturating_duration_since(created_at)
                );
                Ok((connection, data))
            }
            previous @ Slot::Bound { .. } => {
                *slot = previous;
                Err(Rejected {
                    error: SessionError::AlreadyBound(session_id),
                    connection: data,
                })
            }
            previous @ Slot::Closed { .. } => {
                *slot = previous;
                Err(not_found(data))
            }
        }
    }

    /// Remove a pending session whose data channel will never be requested
    ///
    /// Returns the public connection if the session was still pending.
    pub fn fail_session(&self, session_id: SessionId) -> Option<C> {
        let (_, slot) = self
            .sessions
            .remove_if(&session_id, |_, slot| matches!(slot, Slot::Pending { .. }))?;

        match slot {
            Slot::Pending { connection, .. } => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                Some(connection)
            }
            Slot::Bound { .. } | Slot::Closed { .. } => None,
        }
    }

    /// Expire pending sessions past the provisioning deadline
    pub fn expire_stale(&self) -> usize {
        self.expire_stale_at(Instant::now())
    }

    /// Expire pending sessions relative to `now`
    ///
    /// Expired sessions have their public connection closed and become
    /// tombstones. Tombstones older than the retention window are pruned.
    /// Returns the number of sessions expired by this call.
    pub fn expire_stale_at(&self, now: Instant) -> usize {
        let mut expired = 0;

        self.sessions.retain(|session_id, slot| match slot {
            Slot::Pending { created_at, .. } => {
                if now.saturating_duration_since(*created_at) < self.provisioning_timeout {
                    return true;
                }
                // Dropping the pending slot closes the public connection
                *slot = Slot::Closed { at: now };
                self.pending.fetch_sub(1, Ordering::AcqRel);
                expired += 1;
                tracing::warn!("{}", SessionError::ProvisioningTimeout(*session_id));
                true
            }
            Slot::Bound { at } | Slot::Closed { at } => {
                now.saturating_duration_since(*at) < self.tombstone_retention
            }
        });

        expired
    }

    /// Current state of a session, if the registry still knows it
    pub fn state(&self, session_id: SessionId) -> Option<SessionState> {
        self.sessions.get(&session_id).map(|slot| slot.state())
    }

    /// Number of sessions waiting for a data channel
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of entries, tombstones included
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
