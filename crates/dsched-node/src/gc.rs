//! Supervised background ticker driving the Persistent-Cache Store's GC
//! sweep (§9 "background goroutines", §10.6), cancellable by a shared
//! shutdown token so the process can drain in-flight sweeps before exit.

use dsched_core_traits::PersistentCacheBackend;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

/// Spawns the ticker and returns its `JoinHandle`; drop the paired
/// `watch::Sender` (or send `true`) to request a clean stop.
pub fn spawn_gc_sweeper(
    backend: Arc<dyn PersistentCacheBackend>,
    sweep_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match backend.run_gc().await {
                        Ok(evicted) if evicted > 0 => {
                            log::info!("gc sweep evicted {evicted} stale persistent-cache hosts");
                        }
                        Ok(_) => log::debug!("gc sweep found nothing stale"),
                        Err(e) => log::error!("gc sweep failed: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("gc sweeper shutting down");
                        break;
                    }
                }
            }
        }
    })
}
