//! Provisioning timeout sweep
//!
//! A public client waits at most `provisioning-timeout` for its data
//! channel. This task periodically expires sessions past that deadline and
//! prunes old tombstones from the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SessionRegistry;

/// Run the sweep until `cancel` fires.
///
/// # Arguments
///
/// * `registry` - The session registry to sweep
/// * `interval` - Time between sweeps
/// * `cancel` - Cancellation token for graceful shutdown
pub async fn run_sweep<C>(
    registry: Arc<SessionRegistry<C>>,
    interval: Duration,
    cancel: CancellationToken,
) where
    C: Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(
        "Starting session sweep (timeout: {:?}, interval: {:?})",
        registry.provisioning_timeout(),
        interval
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let expired = registry.expire_stale();
                if expired > 0 {
                    tracing::info!("Expired {} sessions waiting for a data channel", expired);
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("Session sweep shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expires_pending_sessions() {
        let registry = Arc::new(SessionRegistry::new(Duration::from_secs(3)));
        let id = registry.create_session(()).unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sweep(
            Arc::clone(&registry),
            Duration::from_secs(1),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(registry.state(id), Some(SessionState::Pending));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.state(id), Some(SessionState::Closed));

        cancel.cancel();
        task.await.unwrap();
    }
}
