//! Operational sweep for jobs stuck in `generating`.
//!
//! A worker's host can die mid-generation, leaving its placeholder row
//! `generating` forever and blocking regeneration (the placeholder is the
//! de-duplication marker). The sweep reclassifies rows untouched for longer
//! than the stale timeout as `failed`, after which a fresh request creates
//! a new job.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::db::{annotation_repo, Database};

/// Fails every job that has been `generating` for longer than
/// `stale_after`. Returns the number of reclaimed jobs.
pub fn reclaim_stale(db: &Database, stale_after: Duration) -> Result<u64, crate::db::DatabaseError> {
    let stale_after =
        chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::days(36500));
    let now = Utc::now();
    let cutoff = (now - stale_after).to_rfc3339();

    let reclaimed = annotation_repo::reclaim_stale(db, &cutoff, &now.to_rfc3339())?;
    if reclaimed > 0 {
        info!(reclaimed, "Reclaimed stale annotation jobs");
    }
    Ok(reclaimed)
}

/// Spawns a background task running the sweep on a fixed interval.
pub fn spawn_sweeper(db: Database, stale_after: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately; skip it so a fresh process does
        // not race its own just-dispatched workers.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = reclaim_stale(&db, stale_after) {
                error!("Stale-job sweep failed: {}", e);
            }
        }
    })
}
