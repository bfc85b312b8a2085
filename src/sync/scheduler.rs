/// Periodic full refresh driven by a tokio interval
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::RateSynchronizer;
use crate::types::SyncMode;
use crate::utils::CallGuard;

/// Run a full refresh every `period` until `cancel` fires.
///
/// The first tick fires immediately. Failed runs are logged and the loop keeps going.
pub fn spawn_refresh_loop(
    sync: Arc<RateSynchronizer>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let guard = CallGuard::new(cancel.clone(), None);

        info!("Refresh loop started (every {:?})", period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match sync.synchronize_guarded(SyncMode::FullRefresh, &guard).await {
                        Ok(report) => info!("Scheduled refresh wrote {} rates", report.written),
                        Err(e) if e.is_cancelled() => break,
                        Err(e) => warn!("Scheduled refresh failed ({}): {}", e.error_code(), e),
                    }
                }
            }
        }

        info!("Refresh loop stopped");
    })
}
