//! Headless host capabilities.
//!
//! A server or desktop running the agent has no device administrator, no
//! speaker the agent may take over, no SIM and usually no GNSS. Each
//! capability here is the honest answer for such a host.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use findmy_core::{LocationSample, SimIdentity};
use findmy_sync::config::{DeviceSettings, StaticFix};
use findmy_sync::{
    AgentConfig, AlarmPlayer, DeviceAdmin, FreshLocationRequest, LocationProvider,
    MessageDisplay, PlatformError, PlatformInfo, PlatformResult, PlatformServices, SimReader,
};

/// Builds the platform bundle for this host.
pub fn headless_services(config: &AgentConfig) -> PlatformServices {
    PlatformServices {
        info: Arc::new(HostInfo::new(config.device.clone())),
        admin: Arc::new(NoDeviceAdmin),
        alarm: Arc::new(LoggingAlarm),
        display: Arc::new(LoggingDisplay),
        location: Arc::new(StaticLocation::new(config.location.static_fix)),
        sim: Arc::new(NoSim),
    }
}

// =============================================================================
// Host info
// =============================================================================

pub struct HostInfo {
    settings: DeviceSettings,
}

impl HostInfo {
    pub fn new(settings: DeviceSettings) -> Self {
        HostInfo { settings }
    }
}

impl PlatformInfo for HostInfo {
    fn platform_id(&self) -> Option<String> {
        self.settings.platform_id.clone()
    }

    fn manufacturer(&self) -> String {
        self.settings.manufacturer.clone()
    }

    fn model(&self) -> String {
        self.settings.model.clone()
    }

    fn os_version(&self) -> String {
        self.settings.os_version.clone()
    }

    fn device_name(&self) -> Option<String> {
        self.settings.name.clone()
    }
}

// =============================================================================
// Device admin
// =============================================================================

/// Never active, so LOCK and WIPE fail with the admin-unavailable reason.
pub struct NoDeviceAdmin;

impl DeviceAdmin for NoDeviceAdmin {
    fn is_admin_active(&self) -> bool {
        false
    }

    fn lock_now(&self) -> PlatformResult<()> {
        Err(PlatformError::new("no device administrator on this host"))
    }

    fn wipe_data(&self) -> PlatformResult<()> {
        Err(PlatformError::new("no device administrator on this host"))
    }
}

// =============================================================================
// Alarm and display
// =============================================================================

pub struct LoggingAlarm;

impl AlarmPlayer for LoggingAlarm {
    fn start_looping_max_volume(&self) -> PlatformResult<()> {
        warn!("ALARM sounding");
        Ok(())
    }

    fn stop(&self) {
        info!("Alarm silenced");
    }
}

pub struct LoggingDisplay;

impl MessageDisplay for LoggingDisplay {
    fn show_message(&self, message: &str) -> PlatformResult<()> {
        info!(%message, "Message for the finder");
        Ok(())
    }

    fn flag_wipe_request(&self) -> PlatformResult<()> {
        warn!("Remote wipe requested; data left in place");
        Ok(())
    }
}

// =============================================================================
// Location
// =============================================================================

/// Serves the configured fix, stamped with the current time.
pub struct StaticLocation {
    fix: Option<StaticFix>,
}

impl StaticLocation {
    pub fn new(fix: Option<StaticFix>) -> Self {
        StaticLocation { fix }
    }

    fn sample(&self) -> Option<LocationSample> {
        self.fix.map(|fix| {
            LocationSample::new(
                fix.lat,
                fix.lng,
                fix.accuracy_meters,
                Utc::now().timestamp_millis(),
                "static",
            )
        })
    }
}

#[async_trait]
impl LocationProvider for StaticLocation {
    async fn last_known(&self) -> PlatformResult<Option<LocationSample>> {
        Ok(self.sample())
    }

    fn request_fresh(
        &self,
        _request: FreshLocationRequest,
        reply: oneshot::Sender<LocationSample>,
    ) -> PlatformResult<()> {
        let sample = self
            .sample()
            .ok_or_else(|| PlatformError::new("no location source configured"))?;
        let _ = reply.send(sample);
        Ok(())
    }
}

pub struct NoSim;

impl SimReader for NoSim {
    fn current_sim(&self) -> Option<SimIdentity> {
        None
    }
}
