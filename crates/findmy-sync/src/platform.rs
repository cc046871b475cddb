//! # Platform Collaborators
//!
//! The host capabilities the engine drives. A phone host backs these with OS
//! services; the headless agent ships logging-only stand-ins.
//!
//! ```text
//! ┌───────────────┬──────────────────────────────────────────────────┐
//! │ PlatformInfo  │ platform id, manufacturer, model, os version     │
//! │ DeviceAdmin   │ admin check, lock screen, factory wipe           │
//! │ AlarmPlayer   │ looping max-volume alert                         │
//! │ MessageDisplay│ full-screen message, visible wipe flag           │
//! │ SimReader     │ current SIM card                                 │
//! │ LocationProvider (location.rs) │ cached + fresh fixes            │
//! └───────────────┴──────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use findmy_core::SimIdentity;

/// Failure reported by a host capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        PlatformError(message.into())
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Static facts about the host.
pub trait PlatformInfo: Send + Sync {
    /// Stable platform identifier, if the host exposes one.
    fn platform_id(&self) -> Option<String>;

    fn manufacturer(&self) -> String;

    fn model(&self) -> String;

    fn os_version(&self) -> String;

    /// Operator-chosen name that overrides the derived one.
    fn device_name(&self) -> Option<String> {
        None
    }
}

/// Device-administration capability.
///
/// LOCK and WIPE require [`DeviceAdmin::is_admin_active`].
pub trait DeviceAdmin: Send + Sync {
    fn is_admin_active(&self) -> bool;

    fn lock_now(&self) -> PlatformResult<()>;

    /// Irreversible factory reset. Only called when wipes are configured
    /// destructive.
    fn wipe_data(&self) -> PlatformResult<()>;
}

/// Audible alert.
pub trait AlarmPlayer: Send + Sync {
    /// Starts a looping alert at maximum alarm volume.
    fn start_looping_max_volume(&self) -> PlatformResult<()>;

    /// Stops the alert. Must be safe to call when nothing is playing.
    fn stop(&self);
}

/// On-screen presentation.
pub trait MessageDisplay: Send + Sync {
    fn show_message(&self, message: &str) -> PlatformResult<()>;

    /// Makes a received wipe request visible to whoever holds the device.
    fn flag_wipe_request(&self) -> PlatformResult<()>;
}

/// SIM card access.
pub trait SimReader: Send + Sync {
    /// The inserted SIM, or `None` when it cannot be read.
    fn current_sim(&self) -> Option<SimIdentity>;
}
