//! Background expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pairing::PairingManager;

/// Run [`PairingManager::expire_sweep`] every `interval` until `cancel`
/// fires. A sweep in progress is allowed to finish.
pub fn spawn_expiry_sweeper(
    manager: Arc<PairingManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            match manager.expire_sweep().await {
                Ok(removed) => {
                    let metrics = manager.metrics().snapshot();
                    debug!(removed, ?metrics, "sweep tick");
                }
                Err(e) => warn!(error = %e, "expiry sweep failed"),
            }
        }
        debug!("expiry sweeper stopped");
    })
}
