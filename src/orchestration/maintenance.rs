//! Background sweep of expired pending messages and idle task locks.

use super::keyed_lock::KeyedLocks;
use super::pending_buffer::PendingMessageBuffer;
use crate::models::TaskKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub purged_messages: u64,
    pub pruned_task_locks: usize,
}

#[derive(Debug, Clone)]
pub struct MaintenanceSweeper {
    buffer: Arc<PendingMessageBuffer>,
    task_locks: Arc<KeyedLocks<(TaskKind, i64)>>,
    interval: Duration,
}

impl MaintenanceSweeper {
    pub fn new(
        buffer: Arc<PendingMessageBuffer>,
        task_locks: Arc<KeyedLocks<(TaskKind, i64)>>,
        interval: Duration,
    ) -> Self {
        Self {
            buffer,
            task_locks,
            interval,
        }
    }

    pub async fn run_once(&self) -> SweepStats {
        let stats = SweepStats {
            purged_messages: self.buffer.purge_expired().await,
            pruned_task_locks: self.task_locks.prune_idle(),
        };
        debug!(
            purged_messages = stats.purged_messages,
            pruned_task_locks = stats.pruned_task_locks,
            "Maintenance sweep finished"
        );
        stats
    }

    /// Run the sweep every `interval` until the handle is shut down
    pub fn spawn(self) -> MaintenanceHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);

        let join = tokio::spawn(async move {
            info!(interval_ms = self.interval.as_millis() as u64, "Maintenance sweeper started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {
                        self.run_once().await;
                    }
                    _ = signal.notified() => {
                        debug!("Shutdown notification received");
                        break;
                    }
                }
            }
            info!("Maintenance sweeper stopped");
        });

        MaintenanceHandle { shutdown, join }
    }
}

#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the sweeper and wait for it to exit
    pub async fn shutdown(self) {
        // notify_one stores a permit if the loop is mid-sweep
        self.shutdown.notify_one();
        let _ = self.join.await;
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
