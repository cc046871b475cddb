//! # Command Ingress Router
//!
//! Normalises the three ingress channels into [`Command`]s and hands them to
//! the executor.
//!
//! ## Channels
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SMS text ──► parse_sms ──► authenticate_sms ──► spawn execution       │
//! │               (not ours: Ignored)  (mismatch: Ignored, audited)         │
//! │                                                                         │
//! │  Push map ──► authenticate_push ──► command_type ──► spawn execution   │
//! │               (mismatch: dropped with warning)                          │
//! │                                                                         │
//! │  Poll ──► GET commands?since_id ──► id > since_id, ascending           │
//! │           ──► execute one by one ──► commit since_id = max id          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The poll cursor is committed only after the whole batch has run, so a
//! crash mid-batch redelivers it (at-least-once).

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use findmy_core::sms::parse_sms;
use findmy_core::{Command, CommandType, Payload, PollCursor, SourceChannel};

use crate::auth::CommandAuthenticator;
use crate::client::RemoteApi;
use crate::error::SyncResult;
use crate::executor::CommandExecutor;
use crate::registration::RegistrationManager;

/// Push payload field naming the target device.
pub const PUSH_DEVICE_ID: &str = "device_id";

/// Push payload field naming the command.
pub const PUSH_COMMAND_TYPE: &str = "command_type";

/// Optional push payload field carrying a server command id to ack.
pub const PUSH_COMMAND_ID: &str = "command_id";

/// What happened to an inbound SMS or push message.
#[derive(Debug)]
pub enum Disposition {
    /// Authenticated and handed to the executor. For SMS this means the
    /// message is consumed and must not reach other receivers.
    Accepted(JoinHandle<Command>),
    /// Not a command for this device; nothing ran.
    Ignored,
}

impl Disposition {
    pub fn is_consumed(&self) -> bool {
        matches!(self, Disposition::Accepted(_))
    }

    /// Waits for the execution to finish.
    pub async fn join(self) -> Option<Command> {
        match self {
            Disposition::Accepted(handle) => handle.await.ok(),
            Disposition::Ignored => None,
        }
    }
}

/// Summary of one poll cycle.
#[derive(Debug)]
pub struct PollReport {
    /// Commands the server returned.
    pub fetched: usize,
    /// New commands, in execution order, in their terminal state.
    pub executed: Vec<Command>,
    /// Cursor value persisted after the batch.
    pub since_id: i64,
}

/// Entry point for every inbound command.
pub struct CommandIngressRouter {
    registration: Arc<RegistrationManager>,
    authenticator: CommandAuthenticator,
    executor: Arc<CommandExecutor>,
    api: Arc<dyn RemoteApi>,
    poll_lock: Mutex<()>,
}

impl CommandIngressRouter {
    pub fn new(
        registration: Arc<RegistrationManager>,
        authenticator: CommandAuthenticator,
        executor: Arc<CommandExecutor>,
        api: Arc<dyn RemoteApi>,
    ) -> Self {
        CommandIngressRouter {
            registration,
            authenticator,
            executor,
            api,
            poll_lock: Mutex::new(()),
        }
    }

    // =========================================================================
    // SMS
    // =========================================================================

    /// Handles an SMS body. The body itself is never logged.
    pub async fn handle_sms(&self, body: &str) -> Disposition {
        let Some(sms) = parse_sms(body) else {
            return Disposition::Ignored;
        };

        let identity = match self.registration.identity().await {
            Ok(identity) => identity,
            Err(err) => {
                debug!(error = %err, "SMS command before registration");
                return Disposition::Ignored;
            }
        };

        if self
            .authenticator
            .authenticate_sms(&identity, &sms.device_id, &sms.secret)
            .is_err()
        {
            return Disposition::Ignored;
        }

        info!(command_type = %sms.command, channel = "SMS", "Command accepted");
        let command = Command::new(SourceChannel::Sms, identity.id, sms.command, Payload::new());
        Disposition::Accepted(self.executor.spawn(command))
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// Handles a delivered push data map.
    pub async fn handle_push(&self, mut data: HashMap<String, String>) -> Disposition {
        let identity = match self.registration.identity().await {
            Ok(identity) => identity,
            Err(err) => {
                debug!(error = %err, "Push command before registration");
                return Disposition::Ignored;
            }
        };

        let device_id = data.remove(PUSH_DEVICE_ID).unwrap_or_default();
        if self
            .authenticator
            .authenticate_push(&identity, &device_id)
            .is_err()
        {
            warn!(channel = "PUSH", "Push command addressed to another device, dropped");
            return Disposition::Ignored;
        }

        let Some(command_type) = data.remove(PUSH_COMMAND_TYPE) else {
            warn!(channel = "PUSH", "Push payload without command_type, dropped");
            return Disposition::Ignored;
        };

        let command_id = data
            .get(PUSH_COMMAND_ID)
            .and_then(|id| id.trim().parse::<i64>().ok());
        let payload: Payload = data
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();

        let mut command = Command::new(
            SourceChannel::Push,
            identity.id,
            CommandType::parse(&command_type),
            payload,
        );
        if let Some(id) = command_id {
            command = command.with_id(id);
        }

        info!(command_type = %command.command_type, command_id = ?command.id, channel = "PUSH", "Command accepted");
        Disposition::Accepted(self.executor.spawn(command))
    }

    // =========================================================================
    // Poll
    // =========================================================================

    /// Runs one poll cycle.
    ///
    /// Fails with `NotRegistered` before registration and with a network
    /// error when the server cannot be reached; the cursor is untouched in
    /// both cases.
    pub async fn poll_once(&self) -> SyncResult<PollReport> {
        let _guard = self.poll_lock.lock().await;

        let identity = self.registration.identity().await?;
        self.authenticator.authenticate_poll(&identity)?;

        let state = self.registration.state();
        let mut cursor = PollCursor::new(state.poll_since_id().await?);

        let remote = self
            .api
            .poll_commands(&identity.id, &identity.auth_token, cursor.since_id())
            .await?;
        let fetched = remote.len();

        let mut batch: Vec<_> = remote
            .into_iter()
            .filter(|command| cursor.is_new(command.id))
            .collect();
        batch.sort_by_key(|command| command.id);
        batch.dedup_by_key(|command| command.id);

        let mut executed = Vec::with_capacity(batch.len());
        let mut seen = Vec::with_capacity(batch.len());
        for remote in batch {
            seen.push(remote.id);
            let command = remote.into_command(&identity.id);
            executed.push(self.executor.execute(command).await);
        }

        cursor.advance(seen);
        let since_id = state.commit_poll_since_id(cursor.since_id()).await?;

        if fetched > 0 {
            info!(fetched, executed = executed.len(), since_id, "Poll batch processed");
        }
        Ok(PollReport {
            fetched,
            executed,
            since_id,
        })
    }
}
