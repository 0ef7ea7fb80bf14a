//! Background job: forget pick flows nobody has looked at in a while.
//!
//! Finished flows stay in memory so the status page can still route the
//! browser; a kiosk that never comes back would otherwise keep them forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::picker::PickFlows;

const SWEEP_EVERY: Duration = Duration::from_secs(300);

/// Spawn the background cleanup task. Call this once at startup.
pub fn spawn(flows: Arc<PickFlows>, max_age: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(SWEEP_EVERY);
        loop {
            interval.tick().await;
            sweep(&flows, max_age);
        }
    });
}

fn sweep(flows: &PickFlows, max_age: Duration) {
    let evicted = flows.evict_stale(max_age);
    if evicted > 0 {
        tracing::info!(evicted, remaining = flows.len(), "evicted stale pick flows");
    }
}
