//! Background task returning abandoned claims to their pools.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::services::test_set_pool::PoolManager;

/// Configuration for the claim reaper.
#[derive(Debug, Clone, Copy)]
pub struct ClaimReaperConfig {
    /// WORKING pool executions idle this long go back to PENDING (0 disables)
    pub timeout_secs: u64,
    /// How often to sweep (in seconds)
    pub interval_secs: u64,
}

/// Start the claim reaper background task.
///
/// Does nothing when the timeout is 0.
pub fn start_claim_reaper(pool: Arc<PoolManager>, config: ClaimReaperConfig) {
    if config.timeout_secs == 0 {
        info!("Claim reaper disabled");
        return;
    }

    tokio::spawn(async move {
        info!(
            "Starting claim reaper (timeout: {} seconds, interval: {} seconds)",
            config.timeout_secs, config.interval_secs
        );

        let timeout = Duration::from_secs(config.timeout_secs);
        let mut ticker = interval(Duration::from_secs(config.interval_secs.max(1)));

        loop {
            ticker.tick().await;

            if let Err(e) = pool.release_stale_claims(timeout).await {
                error!("Claim reaper error: {}", e);
            }
        }
    });
}
