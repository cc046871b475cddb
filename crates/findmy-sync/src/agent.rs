//! # Agent
//!
//! Wires the engine together and resumes it from persisted state.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Agent                                      │
//! │                                                                         │
//! │  bootstrap():                                                           │
//! │    1. warn if the fake-shutdown password is still the default          │
//! │    2. RegistrationManager::ensure_registered()                         │
//! │    3. SimMonitor::check_on_boot()                                      │
//! │    4. resume LocationScheduler if tracking_enabled                     │
//! │    5. start CommandPoller                                              │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Ingress Router │  │ LocationSched. │  │  CommandPoller         │    │
//! │  │ SMS / push in  │  │ every 5 min    │  │  every poll interval   │    │
//! │  └───────┬────────┘  └───────┬────────┘  └──────────┬─────────────┘    │
//! │          └─────────► CommandExecutor ◄──────────────┘                   │
//! │                              │                                          │
//! │                          SyncClient                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every collaborator is passed in through the constructor; nothing here
//! reaches for a global.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use findmy_core::DeviceIdentity;
use findmy_db::DeviceState;

use crate::alarm::AlarmController;
use crate::audit::SecurityAudit;
use crate::auth::CommandAuthenticator;
use crate::client::RemoteApi;
use crate::config::AgentConfig;
use crate::error::SyncResult;
use crate::executor::CommandExecutor;
use crate::ingress::CommandIngressRouter;
use crate::location::{LocationProvider, LocationService};
use crate::platform::{AlarmPlayer, DeviceAdmin, MessageDisplay, PlatformInfo, SimReader};
use crate::poller::{CommandPoller, CommandPollerHandle};
use crate::registration::RegistrationManager;
use crate::scheduler::{LocationScheduler, LocationSchedulerHandle};
use crate::sim::{SimCheck, SimMonitor};

// =============================================================================
// Platform bundle
// =============================================================================

/// Host capabilities handed to the agent.
#[derive(Clone)]
pub struct PlatformServices {
    pub info: Arc<dyn PlatformInfo>,
    pub admin: Arc<dyn DeviceAdmin>,
    pub alarm: Arc<dyn AlarmPlayer>,
    pub display: Arc<dyn MessageDisplay>,
    pub location: Arc<dyn LocationProvider>,
    pub sim: Arc<dyn SimReader>,
}

// =============================================================================
// Agent Status
// =============================================================================

/// Snapshot for status queries.
#[derive(Debug, Clone, Default)]
pub struct AgentStatus {
    pub registered: bool,
    pub device_id: Option<String>,
    pub tracking: bool,
    pub polling: bool,
    pub last_sim_check: Option<SimCheck>,

    /// The fake-shutdown password has never been changed.
    pub default_fake_shutdown_password: bool,
}

// =============================================================================
// Agent
// =============================================================================

pub struct Agent {
    config: Arc<AgentConfig>,
    state: DeviceState,
    api: Arc<dyn RemoteApi>,
    registration: Arc<RegistrationManager>,
    executor: Arc<CommandExecutor>,
    router: Arc<CommandIngressRouter>,
    sim_monitor: SimMonitor,
    location: LocationService,
    status: Arc<RwLock<AgentStatus>>,
    scheduler: Option<LocationSchedulerHandle>,
    poller: Option<CommandPollerHandle>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        state: DeviceState,
        api: Arc<dyn RemoteApi>,
        platform: PlatformServices,
    ) -> Self {
        let registration = Arc::new(RegistrationManager::new(
            state.clone(),
            Arc::clone(&api),
            platform.info,
        ));
        let location = LocationService::new(
            platform.location,
            config.fresh_location_timeout(),
            config.fresh_update_interval(),
        );
        let alarm = Arc::new(AlarmController::new(platform.alarm, config.alarm_ceiling()));

        let executor = Arc::new(CommandExecutor::new(
            Arc::clone(&api),
            Arc::clone(&registration),
            platform.admin,
            alarm,
            location.clone(),
            platform.display,
            config.commands.wipe_destructive,
        ));

        let audit = Arc::new(SecurityAudit::from_settings(&config.audit));
        let router = Arc::new(CommandIngressRouter::new(
            Arc::clone(&registration),
            CommandAuthenticator::new(audit),
            Arc::clone(&executor),
            Arc::clone(&api),
        ));

        let sim_monitor = SimMonitor::new(
            platform.sim,
            Arc::clone(&registration),
            Arc::clone(&api),
            location.clone(),
        );

        Agent {
            config: Arc::new(config),
            state,
            api,
            registration,
            executor,
            router,
            sim_monitor,
            location,
            status: Arc::new(RwLock::new(AgentStatus::default())),
            scheduler: None,
            poller: None,
        }
    }

    pub fn router(&self) -> Arc<CommandIngressRouter> {
        Arc::clone(&self.router)
    }

    pub fn registration(&self) -> Arc<RegistrationManager> {
        Arc::clone(&self.registration)
    }

    pub async fn status(&self) -> AgentStatus {
        self.status.read().await.clone()
    }

    /// Resumes from persisted state and starts the background loops.
    pub async fn bootstrap(&mut self) -> SyncResult<DeviceIdentity> {
        let default_password = self.state.uses_default_fake_shutdown_password().await?;
        if default_password {
            warn!("Fake-shutdown password is still the factory default; change it");
        }

        let identity = self.registration.ensure_registered().await?;
        info!(device_id = %identity.id, name = %identity.name, "Agent identity ready");

        let sim_check = match self.sim_monitor.check_on_boot().await {
            Ok(check) => Some(check),
            Err(err) => {
                warn!(error = %err, "SIM check failed");
                None
            }
        };

        if self.config.location.track_on_start || self.state.tracking_enabled().await? {
            self.start_tracking().await?;
        }
        self.start_polling();

        {
            let mut status = self.status.write().await;
            status.registered = true;
            status.device_id = Some(identity.id.clone());
            status.polling = self.poller.is_some();
            status.last_sim_check = sim_check;
            status.default_fake_shutdown_password = default_password;
        }

        info!("Agent started");
        Ok(identity)
    }

    /// Persists the tracking flag and starts the location scheduler.
    pub async fn start_tracking(&mut self) -> SyncResult<()> {
        self.state.set_tracking_enabled(true).await?;

        if self.scheduler.is_none() {
            let (scheduler, handle) = LocationScheduler::new(
                Arc::clone(&self.registration),
                Arc::clone(&self.api),
                self.location.clone(),
                self.config.location_interval(),
            );
            tokio::spawn(scheduler.run());
            self.scheduler = Some(handle);
            info!("Location tracking started");
        }

        self.status.write().await.tracking = true;
        Ok(())
    }

    /// Clears the tracking flag and stops the location scheduler.
    pub async fn stop_tracking(&mut self) -> SyncResult<()> {
        self.state.set_tracking_enabled(false).await?;

        if let Some(handle) = self.scheduler.take() {
            if let Err(err) = handle.shutdown().await {
                warn!(error = %err, "Scheduler already stopped");
            }
            info!("Location tracking stopped");
        }

        self.status.write().await.tracking = false;
        Ok(())
    }

    fn start_polling(&mut self) {
        if self.poller.is_some() {
            return;
        }
        let (poller, handle) =
            CommandPoller::new(Arc::clone(&self.router), self.config.poll_interval());
        tokio::spawn(poller.run());
        self.poller = Some(handle);
    }

    /// Stops background loops and any running alarm. Persisted flags are
    /// left as they are so the next start resumes them.
    pub async fn shutdown(&mut self) -> SyncResult<()> {
        info!("Shutting down agent");

        if let Some(handle) = self.scheduler.take() {
            let _ = handle.shutdown().await;
        }
        if let Some(handle) = self.poller.take() {
            let _ = handle.shutdown().await;
        }
        self.executor.alarm().stop().await;

        {
            let mut status = self.status.write().await;
            status.tracking = false;
            status.polling = false;
        }

        info!("Agent stopped");
        Ok(())
    }
}
