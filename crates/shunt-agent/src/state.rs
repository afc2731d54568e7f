//! Agent connection state

use tokio::sync::watch;

/// Where the agent is in its control channel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No control channel
    Disconnected,
    /// Dialing the relay, possibly backing off between attempts
    Connecting,
    /// Control channel registered and being read
    Registered,
}

/// Observable connection state shared between the agent and its callers
pub struct AgentState {
    tx: watch::Sender<ConnectionState>,
}

impl AgentState {
    /// Create new agent state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    /// Record a state transition
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!("Agent state {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}
