//! # Command Poller
//!
//! Drives the poll channel: one [`CommandIngressRouter::poll_once`] per
//! period while the agent runs. A failed cycle is logged and the next period
//! tries again; there is no retry in between.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::ingress::CommandIngressRouter;

/// Periodic poll loop.
pub struct CommandPoller {
    router: Arc<CommandIngressRouter>,
    period: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

#[derive(Clone)]
pub struct CommandPollerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CommandPollerHandle {
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Poller shutdown channel closed".into()))
    }
}

impl CommandPoller {
    pub fn new(router: Arc<CommandIngressRouter>, period: Duration) -> (Self, CommandPollerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            CommandPoller {
                router,
                period,
                shutdown_rx,
            },
            CommandPollerHandle { shutdown_tx },
        )
    }

    pub async fn run(mut self) {
        info!(period_secs = self.period.as_secs(), "Command poller starting");

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.router.poll_once().await {
                        Ok(report) => debug!(fetched = report.fetched, since_id = report.since_id, "Poll cycle done"),
                        Err(err) if err.is_not_registered() => debug!("Not registered, poll skipped"),
                        Err(err) => warn!(error = %err, kind = err.kind(), "Poll cycle failed"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Command poller shutting down");
                    break;
                }
            }
        }

        info!("Command poller stopped");
    }
}
