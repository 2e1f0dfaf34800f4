use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::sync::Synchronizer;

/// Spawns the periodic full sync. Does nothing when no interval is configured.
pub fn start_background_workers(synchronizer: Synchronizer, every: Option<Duration>) {
    let Some(every) = every else {
        info!("periodic sync disabled");
        return;
    };

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_sync_pass(&synchronizer).await;
        }
    });
}

pub async fn run_sync_pass(synchronizer: &Synchronizer) {
    match synchronizer.sync_all().await {
        Ok(report) if report.errors.is_empty() => {
            info!(events = report.events.len(), "periodic sync finished");
        }
        Ok(report) => {
            warn!(
                events = report.events.len(),
                errors = ?report.errors,
                "periodic sync finished with errors"
            );
        }
        Err(err) => error!(%err, "periodic sync could not start"),
    }
}
