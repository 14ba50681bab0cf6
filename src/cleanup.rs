//! Scheduled cleanup of expired sessions.
//!
//! Expired sessions are already rejected (and deleted) when presented, so this
//! only keeps the table from growing with sessions nobody comes back for.
//! Idle rate-limit buckets are dropped on the same schedule.

use crate::db::Database;
use crate::jwt::now_secs;
use crate::rate_limit::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, rate_limit: &RateLimitConfig) {
    let buckets = rate_limit.prune();
    debug!(buckets, "Pruned idle rate limit buckets");

    let now = match now_secs() {
        Ok(now) => now,
        Err(e) => {
            error!("Skipping cleanup: {}", e);
            return;
        }
    };

    match db.sessions().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    db: Database,
    rate_limit: Arc<RateLimitConfig>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately and startup already ran a sweep.
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(&db, &rate_limit).await;
        }
    })
}
