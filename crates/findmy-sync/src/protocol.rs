//! # Wire Protocol
//!
//! JSON bodies exchanged with the FindMy server.
//!
//! ## Endpoints
//! ```text
//! ┌──────────────────────────────────────────┬──────────────────────────────┐
//! │ request                                  │ body / response              │
//! ├──────────────────────────────────────────┼──────────────────────────────┤
//! │ POST /api/register_device                │ RegisterRequest              │
//! │                                          │ → {status, device_token}     │
//! │ POST /api/devices/{id}/location          │ LocationUpload               │
//! │ GET  /api/devices/{id}/commands/poll     │ ?since_id=N                  │
//! │                                          │ → {status, data: [Remote     │
//! │                                          │    Command, ...]}            │
//! │ POST /api/devices/{id}/commands/{c}/ack  │ AckRequest                   │
//! │ POST /api/devices/{id}/sim_change        │ SimChangeReport              │
//! └──────────────────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Every response is wrapped in an [`ApiEnvelope`]. A call succeeded only if
//! the HTTP status is 2xx **and** the envelope status is `ok` or `success`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use findmy_core::types::Redacted;
use findmy_core::{Command, CommandType, LocationSample, Payload, SimIdentity, SourceChannel};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Response Envelope
// =============================================================================

/// Common response wrapper.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub message: Option<String>,

    /// List payloads (poll results) arrive here. An empty poll omits it.
    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default)]
    pub device_token: Option<String>,

    #[serde(default, deserialize_with = "optional_id")]
    pub command_id: Option<i64>,
}

impl ApiEnvelope {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok") || self.status.eq_ignore_ascii_case("success")
    }

    /// Decodes the poll list from `data`.
    ///
    /// Entries are decoded one at a time. An entry that cannot be decoded
    /// (no usable id) is logged and skipped so the rest of the batch still
    /// runs and the cursor can move past it.
    pub fn into_commands(self) -> SyncResult<Vec<RemoteCommand>> {
        let entries = match self.data {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(SyncError::DeserializationFailed(format!(
                    "poll data is not a list: {}",
                    other
                )))
            }
        };

        let mut commands = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<RemoteCommand>(entry) {
                Ok(command) => commands.push(command),
                Err(e) => warn!(error = %e, "Skipping malformed command entry"),
            }
        }
        Ok(commands)
    }

    /// Best human-readable explanation for a failed call.
    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("status '{}'", self.status))
    }
}

// =============================================================================
// Registration
// =============================================================================

/// `POST /api/register_device` body.
#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub device_id: String,
    pub device_name: String,
    /// Locally generated token offered to the server.
    pub auth_token: String,
    pub model: String,
    pub os_version: String,
    pub fcm_token: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("device_id", &self.device_id)
            .field("device_name", &self.device_name)
            .field("auth_token", &Redacted(&self.auth_token))
            .field("model", &self.model)
            .field("os_version", &self.os_version)
            .field("fcm_token", &self.fcm_token.is_some())
            .finish()
    }
}

// =============================================================================
// Location
// =============================================================================

/// `POST /api/devices/{id}/location` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpload {
    pub lat: f64,
    pub lng: f64,
    /// Meters, `-1` when unknown.
    pub accuracy: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub provider: String,
}

impl From<&LocationSample> for LocationUpload {
    fn from(sample: &LocationSample) -> Self {
        LocationUpload {
            lat: sample.lat,
            lng: sample.lng,
            accuracy: sample.accuracy_meters,
            timestamp: sample.timestamp_millis,
            provider: sample.provider.clone(),
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// One entry of the poll list.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCommand {
    #[serde(deserialize_with = "required_id")]
    pub id: i64,

    #[serde(default)]
    pub device_id: Option<String>,

    /// Missing or `null` becomes an unknown command.
    #[serde(rename = "type", default)]
    pub command_type: Option<String>,

    #[serde(default)]
    pub payload: Option<Value>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub created_at: Option<Value>,
}

impl RemoteCommand {
    /// Normalises into a PENDING poll command.
    pub fn into_command(self, device_id: &str) -> Command {
        let created_at = self.created_at.as_ref().and_then(parse_timestamp);
        let mut command = Command::new(
            SourceChannel::Poll,
            device_id,
            CommandType::parse(self.command_type.as_deref().unwrap_or_default()),
            payload_from_value(self.payload),
        )
        .with_id(self.id);

        if let Some(created_at) = created_at {
            command = command.with_created_at(created_at);
        }
        command
    }
}

/// `POST /api/devices/{id}/commands/{cmdId}/ack` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRequest {
    /// `acked` or `failed`.
    pub status: String,
    pub message: String,
    /// Seconds since the Unix epoch.
    pub executed_at: i64,
}

impl AckRequest {
    /// Builds the ack for a command in a reportable terminal state.
    ///
    /// Returns `None` for commands that are not ACKED or FAILED.
    pub fn for_command(command: &Command) -> Option<Self> {
        use findmy_core::CommandStatus;

        match command.status() {
            CommandStatus::Acked | CommandStatus::Failed => Some(AckRequest {
                status: command.status().as_wire_str().to_string(),
                message: command.report_message(),
                executed_at: command.executed_at.unwrap_or_else(Utc::now).timestamp(),
            }),
            _ => None,
        }
    }
}

// =============================================================================
// SIM change
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimInfo {
    pub serial: String,
    pub operator: Option<String>,
    pub number: Option<String>,
}

impl From<&SimIdentity> for SimInfo {
    fn from(sim: &SimIdentity) -> Self {
        SimInfo {
            serial: sim.serial.clone(),
            operator: sim.operator_name.clone(),
            number: sim.number.clone(),
        }
    }
}

/// `POST /api/devices/{id}/sim_change` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimChangeReport {
    pub old_sim: Option<SimInfo>,
    pub new_sim: SimInfo,
    pub location: Option<LocationUpload>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Turns a JSON payload into a command payload.
///
/// Objects map directly. A string holding a JSON object is decoded, since
/// some backends store payloads as text. Anything else lands under `value`.
pub fn payload_from_value(value: Option<Value>) -> Payload {
    match value {
        None | Some(Value::Null) => Payload::new(),
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(Value::String(text)) => serde_json::from_str::<Payload>(&text).unwrap_or_else(|_| {
            let mut payload = Payload::new();
            payload.insert("value".to_string(), Value::String(text));
            payload
        }),
        Some(other) => {
            let mut payload = Payload::new();
            payload.insert("value".to_string(), other);
            payload
        }
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC), or epoch seconds/millis.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Anything past year 33658 in seconds is really milliseconds
            if raw > 1_000_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

fn id_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Ids may arrive as numbers or numeric strings.
fn required_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid command id: {}", value)))
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}
