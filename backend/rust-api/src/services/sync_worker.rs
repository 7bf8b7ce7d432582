use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{config::SyncConfig, metrics::SESSION_SYNC_TICKS_TOTAL, services::session_service::SessionService};

/// Drives the clock of every live session and periodically writes the
/// in-memory state back to the session store.
pub struct SessionSyncWorker {
    sessions: Arc<SessionService>,
    config: SyncConfig,
    ticks: u64,
}

impl SessionSyncWorker {
    pub fn new(sessions: Arc<SessionService>, config: SyncConfig) -> Self {
        Self {
            sessions,
            config,
            ticks: 0,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let period = Duration::from_millis(self.config.tick_interval_ms.max(1));
        info!(
            "Starting session sync worker (tick {}ms, flush every {} ticks)",
            period.as_millis(),
            self.config.flush_every_ticks
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match self.run_once().await {
                Ok(()) => {
                    SESSION_SYNC_TICKS_TOTAL
                        .with_label_values(&["success"])
                        .inc();
                }
                Err(err) => {
                    SESSION_SYNC_TICKS_TOTAL
                        .with_label_values(&["error"])
                        .inc();
                    warn!(error = %err, "Session sync tick failed");
                }
            }
        }
    }

    /// One clock tick, plus a flush when the tick count reaches the flush period.
    pub async fn run_once(&mut self) -> Result<()> {
        let ticked = self.sessions.tick_all().await;
        self.ticks += 1;
        debug!(ticked, tick = self.ticks, "Session clock advanced");

        if self.ticks % self.config.flush_every_ticks.max(1) != 0 {
            return Ok(());
        }

        let report = self.sessions.flush_all().await;
        if report.flushed > 0 || report.evicted > 0 {
            info!(
                flushed = report.flushed,
                evicted = report.evicted,
                "Session flush completed"
            );
        }
        if report.failed > 0 {
            bail!("{} of {} session writes failed", report.failed, report.failed + report.flushed);
        }

        Ok(())
    }
}
