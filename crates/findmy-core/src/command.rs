//! # Command Model
//!
//! The single internal representation every ingress channel normalises into,
//! and the status state machine the executor drives it through.
//!
//! ## Status State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   PENDING ──────► EXECUTING ──────┬──► ACKED     (action performed)    │
//! │      │                            ├──► FAILED    (capability / error)  │
//! │      │                            └──► DROPPED   (unknown type)        │
//! │      └────────────────────────────────► DROPPED                        │
//! │                                                                         │
//! │   Terminal states are final. Status never moves backwards.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::SourceChannel;

/// Opaque key/value payload carried by a command.
pub type Payload = BTreeMap<String, serde_json::Value>;

// =============================================================================
// Command Type
// =============================================================================

/// What the operator asked the device to do.
///
/// Parsing never fails: anything outside the supported set becomes
/// [`CommandType::Unknown`] carrying the raw token, so the executor can drop
/// it explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandType {
    Lock,
    Alarm,
    Locate,
    ShowMessage,
    Wipe,
    Unknown(String),
}

impl CommandType {
    /// Parses a command token, case-insensitively.
    ///
    /// `RING` is accepted for ALARM and `GET_LOCATION` for LOCATE.
    pub fn parse(raw: &str) -> Self {
        let token = raw.trim();
        match token.to_ascii_uppercase().as_str() {
            "LOCK" => CommandType::Lock,
            "ALARM" | "RING" => CommandType::Alarm,
            "LOCATE" | "GET_LOCATION" => CommandType::Locate,
            "SHOW_MESSAGE" => CommandType::ShowMessage,
            "WIPE" => CommandType::Wipe,
            _ => CommandType::Unknown(token.to_string()),
        }
    }

    /// Canonical wire name.
    pub fn as_str(&self) -> &str {
        match self {
            CommandType::Lock => "LOCK",
            CommandType::Alarm => "ALARM",
            CommandType::Locate => "LOCATE",
            CommandType::ShowMessage => "SHOW_MESSAGE",
            CommandType::Wipe => "WIPE",
            CommandType::Unknown(raw) => raw,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CommandType::Unknown(_))
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Command Status
// =============================================================================

/// Execution status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[default]
    Pending,
    Executing,
    Acked,
    Failed,
    Dropped,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Acked | CommandStatus::Failed | CommandStatus::Dropped
        )
    }

    /// Returns true if the state machine allows `self -> next`.
    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        use CommandStatus::*;
        matches!(
            (self, next),
            (Pending, Executing)
                | (Pending, Dropped)
                | (Executing, Acked)
                | (Executing, Failed)
                | (Executing, Dropped)
        )
    }

    /// Lower-case name sent to the server in acknowledgements.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Executing => "executing",
            CommandStatus::Acked => "acked",
            CommandStatus::Failed => "failed",
            CommandStatus::Dropped => "dropped",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Executing => "EXECUTING",
            CommandStatus::Acked => "ACKED",
            CommandStatus::Failed => "FAILED",
            CommandStatus::Dropped => "DROPPED",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Command
// =============================================================================

/// A normalised remote command.
///
/// `status` is private: the only way to change it is through the transition
/// methods, which reject anything the state machine does not allow.
#[derive(Debug, Clone)]
pub struct Command {
    /// Server-assigned id. Present for poll commands, and for push commands
    /// whose payload names one.
    pub id: Option<i64>,

    pub device_id: String,
    pub command_type: CommandType,
    pub payload: Payload,
    pub source: SourceChannel,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,

    status: CommandStatus,

    /// Outcome text for ACKED commands.
    outcome: Option<String>,

    /// Reason for FAILED and DROPPED commands.
    failure: Option<CoreError>,
}

impl Command {
    /// Creates a PENDING command stamped with the current time.
    pub fn new(
        source: SourceChannel,
        device_id: impl Into<String>,
        command_type: CommandType,
        payload: Payload,
    ) -> Self {
        Command {
            id: None,
            device_id: device_id.into(),
            command_type,
            payload,
            source,
            created_at: Utc::now(),
            executed_at: None,
            status: CommandStatus::Pending,
            outcome: None,
            failure: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    pub fn failure(&self) -> Option<&CoreError> {
        self.failure.as_ref()
    }

    /// Text reported to the server for this command's terminal state.
    pub fn report_message(&self) -> String {
        match (&self.outcome, &self.failure) {
            (Some(outcome), _) => outcome.clone(),
            (None, Some(failure)) => failure.to_string(),
            (None, None) => self.status.to_string(),
        }
    }

    /// Non-blank `message` payload entry, trimmed.
    pub fn message_text(&self) -> Option<&str> {
        self.payload
            .get("message")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// PENDING -> EXECUTING.
    pub fn begin_execution(&mut self) -> CoreResult<()> {
        self.transition(CommandStatus::Executing)
    }

    /// EXECUTING -> ACKED.
    pub fn acknowledge(&mut self, outcome: impl Into<String>) -> CoreResult<()> {
        self.transition(CommandStatus::Acked)?;
        self.outcome = Some(outcome.into());
        Ok(())
    }

    /// EXECUTING -> FAILED.
    pub fn fail(&mut self, reason: CoreError) -> CoreResult<()> {
        self.transition(CommandStatus::Failed)?;
        self.failure = Some(reason);
        Ok(())
    }

    /// PENDING/EXECUTING -> DROPPED.
    pub fn discard(&mut self, reason: CoreError) -> CoreResult<()> {
        self.transition(CommandStatus::Dropped)?;
        self.failure = Some(reason);
        Ok(())
    }

    fn transition(&mut self, next: CommandStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        if next.is_terminal() {
            self.executed_at = Some(Utc::now());
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn command(kind: CommandType) -> Command {
        Command::new(SourceChannel::Poll, "dev123", kind, Payload::new())
    }

    #[test]
    fn test_parse_known_types_and_aliases() {
        assert_eq!(CommandType::parse("LOCK"), CommandType::Lock);
        assert_eq!(CommandType::parse("lock"), CommandType::Lock);
        assert_eq!(CommandType::parse("ring"), CommandType::Alarm);
        assert_eq!(CommandType::parse("GET_LOCATION"), CommandType::Locate);
        assert_eq!(CommandType::parse(" show_message "), CommandType::ShowMessage);
        assert_eq!(CommandType::parse("WIPE"), CommandType::Wipe);
    }

    #[test]
    fn test_parse_unknown_keeps_raw_token() {
        let parsed = CommandType::parse("SELF_DESTRUCT");
        assert_eq!(parsed, CommandType::Unknown("SELF_DESTRUCT".into()));
        assert!(parsed.is_unknown());
        assert_eq!(parsed.to_string(), "SELF_DESTRUCT");

        assert_eq!(CommandType::parse(""), CommandType::Unknown(String::new()));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut cmd = command(CommandType::Lock);
        assert_eq!(cmd.status(), CommandStatus::Pending);
        assert!(cmd.executed_at.is_none());

        cmd.begin_execution().unwrap();
        assert_eq!(cmd.status(), CommandStatus::Executing);

        cmd.acknowledge("locked").unwrap();
        assert_eq!(cmd.status(), CommandStatus::Acked);
        assert_eq!(cmd.outcome(), Some("locked"));
        assert!(cmd.executed_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut cmd = command(CommandType::Lock);
        cmd.begin_execution().unwrap();
        cmd.fail(CoreError::device_admin_unavailable()).unwrap();

        assert!(cmd.begin_execution().is_err());
        assert!(cmd.acknowledge("late").is_err());
        assert!(cmd.discard(CoreError::UnknownCommand("x".into())).is_err());
        assert_eq!(cmd.status(), CommandStatus::Failed);
        assert_eq!(cmd.report_message(), "Capability unavailable: device admin");
    }

    #[test]
    fn test_cannot_skip_execution() {
        let mut cmd = command(CommandType::Alarm);
        let err = cmd.acknowledge("started").unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidTransition {
                from: CommandStatus::Pending,
                to: CommandStatus::Acked,
            }
        );

        // Dropping straight from PENDING is allowed
        cmd.discard(CoreError::UnknownCommand("X".into())).unwrap();
        assert_eq!(cmd.status(), CommandStatus::Dropped);
    }

    #[test]
    fn test_message_text_ignores_blank() {
        let mut cmd = command(CommandType::ShowMessage);
        assert_eq!(cmd.message_text(), None);

        cmd.payload.insert("message".into(), "   ".into());
        assert_eq!(cmd.message_text(), None);

        cmd.payload.insert("message".into(), " Call me ".into());
        assert_eq!(cmd.message_text(), Some("Call me"));
    }
}
