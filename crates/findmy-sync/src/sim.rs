//! # SIM Monitor
//!
//! Detects a SIM swap across boots by comparing the inserted card with the
//! persisted `last_sim_serial`.
//!
//! ```text
//! current SIM ── unreadable ─────────────────► Unavailable (nothing stored)
//!      │
//!      ├── no serial stored ─► store ────────► FirstSeen
//!      ├── same serial ──────────────────────► Unchanged
//!      └── different serial ─► report (with best location, once)
//!                             ─► store new ──► Changed
//! ```

use std::sync::Arc;
use tracing::{debug, info, warn};

use findmy_core::SimIdentity;

use crate::client::RemoteApi;
use crate::error::SyncResult;
use crate::location::LocationService;
use crate::platform::SimReader;
use crate::protocol::{LocationUpload, SimChangeReport, SimInfo};
use crate::registration::RegistrationManager;

/// Result of the boot-time SIM check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCheck {
    Unavailable,
    FirstSeen(SimIdentity),
    Unchanged,
    Changed {
        old_serial: String,
        current: SimIdentity,
        /// Whether the server accepted the report.
        reported: bool,
    },
}

pub struct SimMonitor {
    reader: Arc<dyn SimReader>,
    registration: Arc<RegistrationManager>,
    api: Arc<dyn RemoteApi>,
    location: LocationService,
}

impl SimMonitor {
    pub fn new(
        reader: Arc<dyn SimReader>,
        registration: Arc<RegistrationManager>,
        api: Arc<dyn RemoteApi>,
        location: LocationService,
    ) -> Self {
        SimMonitor {
            reader,
            registration,
            api,
            location,
        }
    }

    pub async fn check_on_boot(&self) -> SyncResult<SimCheck> {
        let Some(current) = self.reader.current_sim() else {
            debug!("SIM not readable, skipping SIM check");
            return Ok(SimCheck::Unavailable);
        };

        let state = self.registration.state();
        match state.last_sim_serial().await? {
            None => {
                state.set_last_sim_serial(&current.serial).await?;
                info!("SIM recorded");
                Ok(SimCheck::FirstSeen(current))
            }
            Some(last) if current.is_same_card(&last) => Ok(SimCheck::Unchanged),
            Some(last) => {
                warn!(operator = ?current.operator_name, "SIM change detected");
                let reported = self.report(&last, &current).await;
                state.set_last_sim_serial(&current.serial).await?;
                Ok(SimCheck::Changed {
                    old_serial: last,
                    current,
                    reported,
                })
            }
        }
    }

    /// One attempt; failures are logged, never retried.
    async fn report(&self, old_serial: &str, current: &SimIdentity) -> bool {
        let identity = match self.registration.identity().await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(error = %err, "Cannot report SIM change");
                return false;
            }
        };

        let location = match self.location.current_location().await {
            Ok(sample) => Some(LocationUpload::from(&sample)),
            Err(err) => {
                debug!(error = %err, "SIM change reported without location");
                None
            }
        };

        let report = SimChangeReport {
            old_sim: Some(SimInfo {
                serial: old_serial.to_string(),
                operator: None,
                number: None,
            }),
            new_sim: SimInfo::from(current),
            location,
        };

        match self
            .api
            .report_sim_change(&identity.id, &identity.auth_token, &report)
            .await
        {
            Ok(()) => {
                info!("SIM change reported");
                true
            }
            Err(err) => {
                warn!(error = %err, kind = err.kind(), "SIM change report failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use findmy_db::DeviceState;
    use std::time::Duration;

    fn monitor(state: DeviceState, api: Arc<RecordingApi>, sim: Option<&str>) -> SimMonitor {
        let registration = Arc::new(RegistrationManager::new(
            state,
            api.clone(),
            Arc::new(FixedPlatform::new(Some(DEVICE_ID))),
        ));
        SimMonitor::new(
            Arc::new(FakeSim::new(sim)),
            registration,
            api,
            LocationService::new(
                Arc::new(ScriptedLocation::cached(sample())),
                Duration::from_secs(30),
                Duration::from_secs(10),
            ),
        )
    }

    #[tokio::test]
    async fn test_first_boot_records_serial() {
        let state = registered_state().await;
        let api = Arc::new(RecordingApi::new());

        let check = monitor(state.clone(), api.clone(), Some("8901"))
            .check_on_boot()
            .await
            .unwrap();
        assert!(matches!(check, SimCheck::FirstSeen(_)));
        assert_eq!(state.last_sim_serial().await.unwrap().as_deref(), Some("8901"));
        assert!(api.sim_reports().is_empty());

        let again = monitor(state, api.clone(), Some("8901"))
            .check_on_boot()
            .await
            .unwrap();
        assert_eq!(again, SimCheck::Unchanged);
    }

    #[tokio::test]
    async fn test_swap_is_reported_with_location() {
        let state = registered_state().await;
        state.set_last_sim_serial("8901").await.unwrap();
        let api = Arc::new(RecordingApi::new());

        let check = monitor(state.clone(), api.clone(), Some("8902"))
            .check_on_boot()
            .await
            .unwrap();
        assert!(matches!(check, SimCheck::Changed { reported: true, .. }));

        let reports = api.sim_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].old_sim.as_ref().unwrap().serial, "8901");
        assert_eq!(reports[0].new_sim.serial, "8902");
        assert!(reports[0].location.is_some());
        assert_eq!(state.last_sim_serial().await.unwrap().as_deref(), Some("8902"));
    }

    #[tokio::test]
    async fn test_failed_report_still_stores_new_serial() {
        let state = registered_state().await;
        state.set_last_sim_serial("8901").await.unwrap();
        let api = Arc::new(RecordingApi::offline());

        let check = monitor(state.clone(), api, Some("8902"))
            .check_on_boot()
            .await
            .unwrap();
        assert!(matches!(check, SimCheck::Changed { reported: false, .. }));
        assert_eq!(state.last_sim_serial().await.unwrap().as_deref(), Some("8902"));
    }

    #[tokio::test]
    async fn test_unreadable_sim_does_nothing() {
        let state = registered_state().await;
        let check = monitor(state.clone(), Arc::new(RecordingApi::new()), None)
            .check_on_boot()
            .await
            .unwrap();
        assert_eq!(check, SimCheck::Unavailable);
        assert!(state.last_sim_serial().await.unwrap().is_none());
    }
}
