//! Fixed-rate driver for the root-group periodic entry points.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::core::RootResourceGroup;

/// Spawn a background task that drains queued queries and replenishes CPU
/// quota for every tree on a fixed interval (typically one second).
///
/// CPU quota is generated in whole elapsed seconds; sub-second remainders
/// carry over to the next tick so slow timers do not under-replenish.
/// Abort the returned handle to stop the driver.
pub fn spawn_scheduling_driver(
    roots: Vec<RootResourceGroup>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_quota_generation = Instant::now();
        loop {
            interval.tick().await;
            let elapsed_seconds = last_quota_generation.elapsed().as_secs();
            if elapsed_seconds > 0 {
                last_quota_generation += Duration::from_secs(elapsed_seconds);
            }
            for root in &roots {
                if elapsed_seconds > 0 {
                    root.generate_cpu_quota(elapsed_seconds);
                }
                root.process_queued_queries();
            }
        }
    })
}
