//! One watcher per observation cell, keeping the health stream aware of which
//! tablets currently exist in (cell, keyspace, shard).

use std::sync::Arc;
use tokio::task::JoinHandle;
use throttler_core::{HealthStream, Logger, TopologyService};

const DEFAULT_REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15);

struct Watcher {
    task: JoinHandle<()>,
}

/// Owns one background watcher per configured observation cell.
pub struct FleetWatcherSet {
    watchers: std::sync::Mutex<Vec<Watcher>>,
}

impl FleetWatcherSet {
    /// Starts one watcher per cell in `observation_cells`. Each watcher polls the
    /// topology service on `refresh_interval` and forwards the current tablet list
    /// for (cell, keyspace, shard) to the health stream.
    pub fn start(
        observation_cells: &[String],
        keyspace: impl Into<String>,
        shard: impl Into<String>,
        topology: Arc<dyn TopologyService>,
        health_stream: Arc<dyn HealthStream>,
        logger: Arc<dyn Logger>,
        refresh_interval: Option<std::time::Duration>,
    ) -> Self {
        let keyspace = keyspace.into();
        let shard = shard.into();
        let interval = refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL);

        let watchers = observation_cells
            .iter()
            .cloned()
            .map(|cell| {
                let topology = Arc::clone(&topology);
                let health_stream = Arc::clone(&health_stream);
                let logger = Arc::clone(&logger);
                let keyspace = keyspace.clone();
                let shard = shard.clone();

                let task = tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        match topology.list_tablets(&cell, &keyspace, &shard).await {
                            Ok(tablets) => {
                                health_stream.notify_membership(&cell, &tablets).await;
                            }
                            Err(e) => {
                                // Background-transient: logged and retried next tick,
                                // never surfaced past this task.
                                logger.warn(&format!(
                                    "topology refresh failed for cell {cell} ({keyspace}/{shard}): {e}"
                                ));
                            }
                        }
                    }
                });

                Watcher { task }
            })
            .collect();

        Self {
            watchers: std::sync::Mutex::new(watchers),
        }
    }

    /// Stops every watcher. Idempotent: calling twice (or on an already-stopped
    /// set) is a no-op.
    pub fn stop(&self) {
        let mut watchers = self.watchers.lock().expect("fleet watcher set mutex poisoned");
        for watcher in watchers.drain(..) {
            watcher.task.abort();
        }
    }
}

impl Drop for FleetWatcherSet {
    fn drop(&mut self) {
        if let Ok(mut watchers) = self.watchers.lock() {
            for watcher in watchers.drain(..) {
                watcher.task.abort();
            }
        }
    }
}
