//! In-process fakes for the engine's collaborators.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

use findmy_core::{DeviceIdentity, LocationSample, SimIdentity};
use findmy_db::{DeviceState, MemoryStateStore};

use crate::client::RemoteApi;
use crate::error::{SyncError, SyncResult};
use crate::location::{FreshLocationRequest, LocationProvider};
use crate::platform::{
    AlarmPlayer, DeviceAdmin, MessageDisplay, PlatformError, PlatformInfo, PlatformResult,
    SimReader,
};
use crate::protocol::{
    AckRequest, LocationUpload, RegisterRequest, RemoteCommand, SimChangeReport,
};

pub const DEVICE_ID: &str = "dev123";
pub const SMS_SECRET: &str = "ab12cd34";
pub const AUTH_TOKEN: &str = "0123456789abcdef0123456789abcdef";

pub fn memory_state() -> DeviceState {
    DeviceState::new(MemoryStateStore::new())
}

pub async fn registered_state() -> DeviceState {
    let state = memory_state();
    state
        .store_identity(&DeviceIdentity {
            id: DEVICE_ID.into(),
            name: "Pixel 7".into(),
            auth_token: AUTH_TOKEN.into(),
            sms_secret: SMS_SECRET.into(),
            registered: true,
        })
        .await
        .unwrap();
    state
}

pub fn remote_command(id: i64, command_type: &str) -> RemoteCommand {
    RemoteCommand {
        id,
        device_id: Some(DEVICE_ID.into()),
        command_type: Some(command_type.into()),
        payload: None,
        status: Some("pending".into()),
        created_at: None,
    }
}

fn offline_error() -> SyncError {
    SyncError::NetworkFailure("connection refused".into())
}

// =============================================================================
// Remote API
// =============================================================================

/// Records every call; optionally fails them all.
#[derive(Default)]
pub struct RecordingApi {
    offline: AtomicBool,
    registrations: Mutex<Vec<RegisterRequest>>,
    locations: Mutex<Vec<LocationUpload>>,
    acks: Mutex<Vec<(i64, AckRequest)>>,
    sim_reports: Mutex<Vec<SimChangeReport>>,
    polls: Mutex<Vec<i64>>,
    batches: Mutex<VecDeque<Vec<RemoteCommand>>>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        let api = Self::default();
        api.set_offline(true);
        api
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(offline_error())
        } else {
            Ok(())
        }
    }

    pub fn queue_batch(&self, batch: Vec<RemoteCommand>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn registrations(&self) -> Vec<RegisterRequest> {
        self.registrations.lock().unwrap().clone()
    }

    pub fn locations(&self) -> Vec<LocationUpload> {
        self.locations.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<(i64, AckRequest)> {
        self.acks.lock().unwrap().clone()
    }

    pub fn sim_reports(&self) -> Vec<SimChangeReport> {
        self.sim_reports.lock().unwrap().clone()
    }

    pub fn polls(&self) -> Vec<i64> {
        self.polls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteApi for RecordingApi {
    async fn register(&self, request: &RegisterRequest) -> SyncResult<String> {
        self.registrations.lock().unwrap().push(request.clone());
        self.check()?;
        Ok("server-token".into())
    }

    async fn upload_location(
        &self,
        _device_id: &str,
        _auth_token: &str,
        location: &LocationUpload,
    ) -> SyncResult<()> {
        self.check()?;
        self.locations.lock().unwrap().push(location.clone());
        Ok(())
    }

    async fn poll_commands(
        &self,
        _device_id: &str,
        _auth_token: &str,
        since_id: i64,
    ) -> SyncResult<Vec<RemoteCommand>> {
        self.check()?;
        self.polls.lock().unwrap().push(since_id);
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn ack_command(
        &self,
        _device_id: &str,
        _auth_token: &str,
        command_id: i64,
        ack: &AckRequest,
    ) -> SyncResult<()> {
        self.check()?;
        self.acks.lock().unwrap().push((command_id, ack.clone()));
        Ok(())
    }

    async fn report_sim_change(
        &self,
        _device_id: &str,
        _auth_token: &str,
        report: &SimChangeReport,
    ) -> SyncResult<()> {
        self.check()?;
        self.sim_reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

// =============================================================================
// Platform
// =============================================================================

pub struct FixedPlatform {
    platform_id: Option<String>,
}

impl FixedPlatform {
    pub fn new(platform_id: Option<&str>) -> Self {
        FixedPlatform {
            platform_id: platform_id.map(str::to_string),
        }
    }
}

impl PlatformInfo for FixedPlatform {
    fn platform_id(&self) -> Option<String> {
        self.platform_id.clone()
    }

    fn manufacturer(&self) -> String {
        "Google".into()
    }

    fn model(&self) -> String {
        "Pixel 7".into()
    }

    fn os_version(&self) -> String {
        "14".into()
    }
}

pub struct FakeAdmin {
    active: bool,
    pub locks: AtomicUsize,
    pub wipes: AtomicUsize,
}

impl FakeAdmin {
    pub fn new(active: bool) -> Self {
        FakeAdmin {
            active,
            locks: AtomicUsize::new(0),
            wipes: AtomicUsize::new(0),
        }
    }
}

impl DeviceAdmin for FakeAdmin {
    fn is_admin_active(&self) -> bool {
        self.active
    }

    fn lock_now(&self) -> PlatformResult<()> {
        self.locks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wipe_data(&self) -> PlatformResult<()> {
        self.wipes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAlarm {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub playing: AtomicBool,
}

impl AlarmPlayer for RecordingAlarm {
    fn start_looping_max_volume(&self) -> PlatformResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingDisplay {
    pub messages: Mutex<Vec<String>>,
    pub wipe_flags: AtomicUsize,
}

impl RecordingDisplay {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl MessageDisplay for RecordingDisplay {
    fn show_message(&self, message: &str) -> PlatformResult<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }

    fn flag_wipe_request(&self) -> PlatformResult<()> {
        self.wipe_flags.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves a cached fix and/or a fresh fix; with neither, fresh requests
/// are held open and never answered.
#[derive(Default)]
pub struct ScriptedLocation {
    cached: Mutex<Option<LocationSample>>,
    fresh: Mutex<Option<LocationSample>>,
    fail_fresh: AtomicBool,
    pub fresh_requests: AtomicUsize,
    pending: Mutex<Vec<oneshot::Sender<LocationSample>>>,
}

impl ScriptedLocation {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn cached(sample: LocationSample) -> Self {
        let provider = Self::default();
        *provider.cached.lock().unwrap() = Some(sample);
        provider
    }

    pub fn fresh(sample: LocationSample) -> Self {
        let provider = Self::default();
        *provider.fresh.lock().unwrap() = Some(sample);
        provider
    }

    pub fn failing() -> Self {
        let provider = Self::default();
        provider.fail_fresh.store(true, Ordering::SeqCst);
        provider
    }

    /// True once every held request has been abandoned by its caller.
    pub fn pending_cancelled(&self) -> bool {
        self.pending.lock().unwrap().iter().all(|tx| tx.is_closed())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[async_trait]
impl LocationProvider for ScriptedLocation {
    async fn last_known(&self) -> PlatformResult<Option<LocationSample>> {
        Ok(self.cached.lock().unwrap().clone())
    }

    fn request_fresh(
        &self,
        _request: FreshLocationRequest,
        reply: oneshot::Sender<LocationSample>,
    ) -> PlatformResult<()> {
        self.fresh_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_fresh.load(Ordering::SeqCst) {
            return Err(PlatformError::new("location permission denied"));
        }
        match self.fresh.lock().unwrap().clone() {
            Some(sample) => {
                let _ = reply.send(sample);
            }
            None => self.pending.lock().unwrap().push(reply),
        }
        Ok(())
    }
}

pub fn sample() -> LocationSample {
    LocationSample::new(52.520008, 13.404954, Some(12.0), 1_714_558_272_000, "gps")
}

pub struct FakeSim {
    sim: Option<SimIdentity>,
}

impl FakeSim {
    pub fn new(serial: Option<&str>) -> Self {
        FakeSim {
            sim: serial.map(|s| SimIdentity {
                serial: s.to_string(),
                operator_name: Some("Carrier".into()),
                number: None,
            }),
        }
    }
}

impl SimReader for FakeSim {
    fn current_sim(&self) -> Option<SimIdentity> {
        self.sim.clone()
    }
}
