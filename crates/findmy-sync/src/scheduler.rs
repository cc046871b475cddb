//! # Location Scheduler
//!
//! Periodic location acquisition and upload.
//!
//! ## Cadence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  t=0        t=5m        t=10m       t=15m                               │
//! │   │          │           │           │                                  │
//! │   ▼          ▼           ▼           ▼                                  │
//! │  tick ──►  tick  ──►   tick  ──►   tick       (missed ticks skipped)   │
//! │   │                                                                     │
//! │   ├── not registered ──► skip silently                                  │
//! │   ├── location error ──► log, wait for next tick                        │
//! │   └── sample ──► upload (unknown accuracy sent as -1)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Runs as a background task. Control it through [`LocationSchedulerHandle`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use findmy_core::{CoreError, LocationSample};

use crate::client::RemoteApi;
use crate::error::{SyncError, SyncResult};
use crate::location::LocationService;
use crate::protocol::LocationUpload;
use crate::registration::RegistrationManager;

/// What one scheduler tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Device not registered yet.
    Skipped,
    Uploaded(LocationSample),
    LocationError(CoreError),
    /// Upload failed; carries the error kind.
    UploadFailed(String),
}

/// Periodic location reporter.
pub struct LocationScheduler {
    registration: Arc<RegistrationManager>,
    api: Arc<dyn RemoteApi>,
    location: LocationService,
    period: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running scheduler.
#[derive(Clone)]
pub struct LocationSchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl LocationSchedulerHandle {
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Scheduler shutdown channel closed".into()))
    }
}

impl LocationScheduler {
    pub fn new(
        registration: Arc<RegistrationManager>,
        api: Arc<dyn RemoteApi>,
        location: LocationService,
        period: Duration,
    ) -> (Self, LocationSchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let scheduler = LocationScheduler {
            registration,
            api,
            location,
            period,
            shutdown_rx,
        };
        (scheduler, LocationSchedulerHandle { shutdown_tx })
    }

    /// Runs until shut down. The first tick fires immediately.
    pub async fn run(mut self) {
        info!(period_secs = self.period.as_secs(), "Location scheduler starting");

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_once().await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Location scheduler shutting down");
                    break;
                }
            }
        }

        info!("Location scheduler stopped");
    }

    /// Acquires one sample and uploads it.
    pub async fn tick_once(&self) -> TickOutcome {
        let identity = match self.registration.identity().await {
            Ok(identity) => identity,
            Err(err) => {
                if !err.is_not_registered() {
                    warn!(error = %err, "Could not read identity");
                }
                return TickOutcome::Skipped;
            }
        };

        let sample = match self.location.current_location().await {
            Ok(sample) => sample,
            Err(err) => {
                warn!(error = %err, "Location cycle failed");
                return TickOutcome::LocationError(err);
            }
        };

        let upload = LocationUpload::from(&sample);
        match self
            .api
            .upload_location(&identity.id, &identity.auth_token, &upload)
            .await
        {
            Ok(()) => {
                debug!(accuracy = sample.accuracy_meters, "Location uploaded");
                TickOutcome::Uploaded(sample)
            }
            Err(err) => {
                warn!(error = %err, kind = err.kind(), "Location upload failed");
                TickOutcome::UploadFailed(err.kind().to_string())
            }
        }
    }
}
