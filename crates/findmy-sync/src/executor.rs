//! # Command Executor
//!
//! Drives one command through its state machine, performs the device
//! action, and reports the outcome.
//!
//! ## Execution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PENDING ──► EXECUTING ──► action ──┬──► ACKED   ──┐                    │
//! │                                     ├──► FAILED  ──┼──► ack (PUSH/POLL  │
//! │                                     │              │     with an id)    │
//! │                                     └──► DROPPED ──┘     never for SMS  │
//! │                                          (UNKNOWN, never acked)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | type         | action                                                  |
//! |--------------|---------------------------------------------------------|
//! | LOCK         | needs device admin, else FAILED capability unavailable  |
//! | ALARM        | stop-then-start, auto-stop at the ceiling               |
//! | LOCATE       | cached or fresh fix attached to the payload             |
//! | SHOW_MESSAGE | payload message or the default security notice          |
//! | WIPE         | needs device admin; flagged only unless destructive     |

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use findmy_core::{Command, CommandType, CoreError, LocationSample, DEFAULT_SECURITY_NOTICE};

use crate::alarm::AlarmController;
use crate::client::RemoteApi;
use crate::location::LocationService;
use crate::platform::{DeviceAdmin, MessageDisplay};
use crate::protocol::{AckRequest, LocationUpload};
use crate::registration::RegistrationManager;

/// Result of performing a command's action.
enum Outcome {
    Acked(String),
    Failed(CoreError),
    Dropped(CoreError),
}

/// Runs validated commands against the platform.
pub struct CommandExecutor {
    api: Arc<dyn RemoteApi>,
    registration: Arc<RegistrationManager>,
    admin: Arc<dyn DeviceAdmin>,
    alarm: Arc<AlarmController>,
    location: LocationService,
    display: Arc<dyn MessageDisplay>,
    wipe_destructive: bool,
}

impl CommandExecutor {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        registration: Arc<RegistrationManager>,
        admin: Arc<dyn DeviceAdmin>,
        alarm: Arc<AlarmController>,
        location: LocationService,
        display: Arc<dyn MessageDisplay>,
        wipe_destructive: bool,
    ) -> Self {
        CommandExecutor {
            api,
            registration,
            admin,
            alarm,
            location,
            display,
            wipe_destructive,
        }
    }

    pub fn alarm(&self) -> &Arc<AlarmController> {
        &self.alarm
    }

    pub fn location(&self) -> &LocationService {
        &self.location
    }

    /// Runs the command on its own short-lived task.
    pub fn spawn(self: &Arc<Self>, command: Command) -> JoinHandle<Command> {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.execute(command).await })
    }

    /// Executes and reports a PENDING command, returning it in its terminal
    /// state.
    pub async fn execute(&self, mut command: Command) -> Command {
        let unknown = match &command.command_type {
            CommandType::Unknown(raw) => Some(raw.clone()),
            _ => None,
        };

        let outcome = match unknown {
            Some(raw) => Outcome::Dropped(CoreError::UnknownCommand(raw)),
            None => {
                if let Err(err) = command.begin_execution() {
                    error!(command_type = %command.command_type, error = %err, "Command not executable");
                    return command;
                }
                info!(
                    command_type = %command.command_type,
                    channel = %command.source,
                    command_id = ?command.id,
                    "Executing command"
                );
                self.perform(&mut command).await
            }
        };

        let transition = match outcome {
            Outcome::Acked(message) => command.acknowledge(message),
            Outcome::Failed(reason) => {
                warn!(
                    command_type = %command.command_type,
                    kind = reason.kind(),
                    error = %reason,
                    "Command failed"
                );
                command.fail(reason)
            }
            Outcome::Dropped(reason) => {
                warn!(
                    command_type = %command.command_type,
                    channel = %command.source,
                    "Dropping unknown command"
                );
                command.discard(reason)
            }
        };
        if let Err(err) = transition {
            error!(error = %err, "Command state transition rejected");
        }

        self.report(&command).await;
        command
    }

    async fn perform(&self, command: &mut Command) -> Outcome {
        match command.command_type.clone() {
            CommandType::Lock => self.lock(),
            CommandType::Alarm => self.start_alarm().await,
            CommandType::Locate => self.locate(command).await,
            CommandType::ShowMessage => self.show_message(command),
            CommandType::Wipe => self.wipe(),
            CommandType::Unknown(raw) => Outcome::Dropped(CoreError::UnknownCommand(raw)),
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    fn lock(&self) -> Outcome {
        if !self.admin.is_admin_active() {
            return Outcome::Failed(CoreError::device_admin_unavailable());
        }
        match self.admin.lock_now() {
            Ok(()) => Outcome::Acked("Device locked".to_string()),
            Err(err) => Outcome::Failed(CoreError::ActionFailed(err.to_string())),
        }
    }

    async fn start_alarm(&self) -> Outcome {
        match self.alarm.start().await {
            Ok(()) => Outcome::Acked("Alarm started".to_string()),
            Err(err) => Outcome::Failed(CoreError::ActionFailed(err.to_string())),
        }
    }

    async fn locate(&self, command: &mut Command) -> Outcome {
        let sample = match self.location.current_location().await {
            Ok(sample) => sample,
            Err(err) => return Outcome::Failed(err),
        };

        match serde_json::to_value(&sample) {
            Ok(value) => {
                command.payload.insert("location".to_string(), value);
            }
            Err(err) => warn!(error = %err, "Could not attach location to command"),
        }

        self.upload_fix(&sample).await;
        Outcome::Acked(format!(
            "Location: {:.6}, {:.6} (accuracy {} m)",
            sample.lat, sample.lng, sample.accuracy_meters
        ))
    }

    /// Best-effort upload of a LOCATE fix.
    async fn upload_fix(&self, sample: &LocationSample) {
        let identity = match self.registration.identity().await {
            Ok(identity) => identity,
            Err(err) => {
                debug!(error = %err, "Skipping location upload");
                return;
            }
        };
        let upload = LocationUpload::from(sample);
        if let Err(err) = self
            .api
            .upload_location(&identity.id, &identity.auth_token, &upload)
            .await
        {
            warn!(error = %err, kind = err.kind(), "Location upload after LOCATE failed");
        }
    }

    fn show_message(&self, command: &Command) -> Outcome {
        let message = command.message_text().unwrap_or(DEFAULT_SECURITY_NOTICE);
        if let Err(err) = self.display.show_message(message) {
            // Still acked: the command was received and handled
            warn!(error = %err, "Message display failed");
        }
        Outcome::Acked("Message displayed".to_string())
    }

    fn wipe(&self) -> Outcome {
        if !self.admin.is_admin_active() {
            return Outcome::Failed(CoreError::device_admin_unavailable());
        }

        if self.wipe_destructive {
            warn!("Performing destructive wipe");
            return match self.admin.wipe_data() {
                Ok(()) => Outcome::Acked("Device wiped".to_string()),
                Err(err) => Outcome::Failed(CoreError::ActionFailed(err.to_string())),
            };
        }

        warn!("WIPE received, flagged without erasing data");
        if let Err(err) = self.display.flag_wipe_request() {
            warn!(error = %err, "Could not flag wipe request");
        }
        Outcome::Acked("Wipe request received (not executed)".to_string())
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    async fn report(&self, command: &Command) {
        if !command.source.has_ack_path() {
            debug!(channel = %command.source, status = %command.status(), "No ack path");
            return;
        }
        let Some(command_id) = command.id else {
            debug!(channel = %command.source, "Command carries no id, not acknowledging");
            return;
        };
        let Some(ack) = AckRequest::for_command(command) else {
            debug!(command_id, status = %command.status(), "Status is not acknowledged");
            return;
        };

        let identity = match self.registration.identity().await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(command_id, error = %err, "Cannot acknowledge without identity");
                return;
            }
        };

        match self
            .api
            .ack_command(&identity.id, &identity.auth_token, command_id, &ack)
            .await
        {
            Ok(()) => debug!(command_id, status = %ack.status, "Command acknowledged"),
            Err(err) => warn!(command_id, error = %err, kind = err.kind(), "Acknowledgement failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use findmy_core::{CommandStatus, Payload, SourceChannel};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        api: Arc<RecordingApi>,
        admin: Arc<FakeAdmin>,
        display: Arc<RecordingDisplay>,
        alarm: Arc<RecordingAlarm>,
        executor: CommandExecutor,
    }

    async fn harness(admin_active: bool, location: ScriptedLocation, destructive: bool) -> Harness {
        let api = Arc::new(RecordingApi::new());
        let admin = Arc::new(FakeAdmin::new(admin_active));
        let display = Arc::new(RecordingDisplay::default());
        let alarm = Arc::new(RecordingAlarm::default());
        let registration = Arc::new(RegistrationManager::new(
            registered_state().await,
            api.clone(),
            Arc::new(FixedPlatform::new(Some(DEVICE_ID))),
        ));
        let executor = CommandExecutor::new(
            api.clone(),
            registration,
            admin.clone(),
            Arc::new(AlarmController::new(alarm.clone(), Duration::from_secs(120))),
            LocationService::new(
                Arc::new(location),
                Duration::from_secs(30),
                Duration::from_secs(10),
            ),
            display.clone(),
            destructive,
        );
        Harness {
            api,
            admin,
            display,
            alarm,
            executor,
        }
    }

    fn poll_command(id: i64, kind: CommandType) -> Command {
        Command::new(SourceChannel::Poll, DEVICE_ID, kind, Payload::new()).with_id(id)
    }

    #[tokio::test]
    async fn test_lock_without_admin_fails_and_acks_failed() {
        let h = harness(false, ScriptedLocation::silent(), false).await;

        let cmd = h.executor.execute(poll_command(1, CommandType::Lock)).await;
        assert_eq!(cmd.status(), CommandStatus::Failed);
        assert_eq!(cmd.failure(), Some(&CoreError::device_admin_unavailable()));

        let acks = h.api.acks();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].0, 1);
        assert_eq!(acks[0].1.status, "failed");
        assert_eq!(h.admin.locks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lock_with_admin_is_acked() {
        let h = harness(true, ScriptedLocation::silent(), false).await;
        let cmd = h.executor.execute(poll_command(2, CommandType::Lock)).await;
        assert_eq!(cmd.status(), CommandStatus::Acked);
        assert_eq!(h.admin.locks.load(Ordering::SeqCst), 1);
        assert_eq!(h.api.acks()[0].1.status, "acked");
    }

    #[tokio::test]
    async fn test_wipe_is_non_destructive_by_default() {
        let h = harness(true, ScriptedLocation::silent(), false).await;

        let cmd = h.executor.execute(poll_command(3, CommandType::Wipe)).await;
        assert_eq!(cmd.status(), CommandStatus::Acked);
        assert_eq!(h.admin.wipes.load(Ordering::SeqCst), 0);
        assert_eq!(h.display.wipe_flags.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wipe_destructive_when_configured() {
        let h = harness(true, ScriptedLocation::silent(), true).await;
        let cmd = h.executor.execute(poll_command(3, CommandType::Wipe)).await;
        assert_eq!(cmd.status(), CommandStatus::Acked);
        assert_eq!(h.admin.wipes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_show_message_defaults_to_notice() {
        let h = harness(false, ScriptedLocation::silent(), false).await;

        let mut cmd = poll_command(4, CommandType::ShowMessage);
        cmd.payload.insert("message".into(), "   ".into());
        let cmd = h.executor.execute(cmd).await;
        assert_eq!(cmd.status(), CommandStatus::Acked);

        let mut custom = poll_command(5, CommandType::ShowMessage);
        custom.payload.insert("message".into(), "Call 555-0100".into());
        h.executor.execute(custom).await;

        assert_eq!(
            h.display.messages(),
            vec![DEFAULT_SECURITY_NOTICE.to_string(), "Call 555-0100".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_is_dropped_and_never_acked() {
        let h = harness(true, ScriptedLocation::silent(), false).await;

        let cmd = h
            .executor
            .execute(poll_command(6, CommandType::parse("SELF_DESTRUCT")))
            .await;
        assert_eq!(cmd.status(), CommandStatus::Dropped);
        assert_eq!(
            cmd.failure(),
            Some(&CoreError::UnknownCommand("SELF_DESTRUCT".into()))
        );
        assert!(h.api.acks().is_empty());
    }

    #[tokio::test]
    async fn test_locate_attaches_and_uploads_sample() {
        let h = harness(false, ScriptedLocation::cached(sample()), false).await;

        let cmd = h.executor.execute(poll_command(7, CommandType::Locate)).await;
        assert_eq!(cmd.status(), CommandStatus::Acked);
        assert_eq!(cmd.payload["location"]["lat"], serde_json::json!(52.520008));
        assert_eq!(h.api.locations().len(), 1);
        assert_eq!(h.api.acks()[0].0, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_timeout_fails_with_location_unavailable() {
        let h = harness(false, ScriptedLocation::silent(), false).await;

        let cmd = h.executor.execute(poll_command(8, CommandType::Locate)).await;
        assert_eq!(cmd.status(), CommandStatus::Failed);
        assert_eq!(cmd.failure().map(|e| e.kind()), Some("location_unavailable"));
        assert_eq!(h.api.acks()[0].1.status, "failed");
    }

    #[tokio::test]
    async fn test_sms_and_id_less_push_are_not_acked() {
        let h = harness(true, ScriptedLocation::silent(), false).await;

        let sms = Command::new(SourceChannel::Sms, DEVICE_ID, CommandType::Alarm, Payload::new());
        let cmd = h.executor.execute(sms).await;
        assert_eq!(cmd.status(), CommandStatus::Acked);
        assert_eq!(h.alarm.starts.load(Ordering::SeqCst), 1);

        let push = Command::new(SourceChannel::Push, DEVICE_ID, CommandType::Lock, Payload::new());
        h.executor.execute(push).await;
        assert!(h.api.acks().is_empty());

        let push = Command::new(SourceChannel::Push, DEVICE_ID, CommandType::Lock, Payload::new())
            .with_id(11);
        h.executor.execute(push).await;
        assert_eq!(h.api.acks().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_ack_does_not_change_outcome() {
        let h = harness(true, ScriptedLocation::silent(), false).await;
        h.api.set_offline(true);

        let cmd = h.executor.execute(poll_command(9, CommandType::Lock)).await;
        assert_eq!(cmd.status(), CommandStatus::Acked);
        assert!(h.api.acks().is_empty());
    }
}
