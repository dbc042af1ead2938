//! UDP liveness sweeper (C6): a periodic task that prunes UDP sessions
//! whose `last_seen` exceeds the configured idle threshold.

use std::time::Duration;

use chat_core::Registry;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl Sweeper {
    /// Spawn the sweeper loop. `period` elapses between passes; any UDP
    /// session idle for at least `idle_timeout` is detached each pass.
    pub fn start(registry: Registry, period: Duration, idle_timeout: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let pruned = registry.sweep_idle_udp(Instant::now(), idle_timeout).await;
                        if pruned > 0 {
                            debug!(pruned, "udp liveness sweep pruned idle sessions");
                        }
                    }
                }
            }
        });

        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
