//! # Domain Types
//!
//! Value types shared by every layer of the agent.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Domain Types                                   │
//! │                                                                         │
//! │  DeviceIdentity   who we are: id, name, auth token, SMS secret         │
//! │  SourceChannel    where a command came from: SMS | PUSH | POLL         │
//! │  LocationSample   one fix, consumed once by upload                     │
//! │  SimIdentity      SIM serial + operator, compared across boots         │
//! │  PollCursor       since_id high-water mark, never decreases            │
//! │  Redacted         display wrapper that hides secrets in release logs   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Redaction
// =============================================================================

/// Display wrapper for credentials.
///
/// Prints the wrapped value in debug builds and `********` otherwise, so a
/// stray `%token` in a log line cannot leak a credential from a release
/// build.
pub struct Redacted<'a>(pub &'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if cfg!(debug_assertions) {
            f.write_str(self.0)
        } else {
            f.write_str("********")
        }
    }
}

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

// =============================================================================
// Device Identity
// =============================================================================

/// The device's identity and credentials.
///
/// ## Lifecycle
/// ```text
/// fresh install ──ensure_registered()──► registered ──reset()──► fresh
///                  (remote or local)      (immutable id,
///                                          token rotates only on
///                                          re-registration)
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Stable device id (platform-derived or random).
    pub id: String,

    /// Human-readable name reported at registration.
    pub name: String,

    /// Bearer credential for every call except registration.
    pub auth_token: String,

    /// Shared secret required in SMS commands.
    pub sms_secret: String,

    /// Whether registration (remote or local) has completed.
    pub registered: bool,
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("auth_token", &Redacted(&self.auth_token))
            .field("sms_secret", &Redacted(&self.sms_secret))
            .field("registered", &self.registered)
            .finish()
    }
}

// =============================================================================
// Source Channel
// =============================================================================

/// The ingress channel a command arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceChannel {
    /// Text message, authenticated by device id + SMS secret.
    Sms,
    /// Push notification payload, authenticated by device id.
    Push,
    /// Server poll, filtered server-side by bearer token.
    Poll,
}

impl SourceChannel {
    /// Returns true if outcomes on this channel are acknowledged to the
    /// server. SMS has no way back.
    pub fn has_ack_path(&self) -> bool {
        matches!(self, SourceChannel::Push | SourceChannel::Poll)
    }

    /// Upper-case channel name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceChannel::Sms => "SMS",
            SourceChannel::Push => "PUSH",
            SourceChannel::Poll => "POLL",
        }
    }
}

impl fmt::Display for SourceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Location Sample
// =============================================================================

/// A single location fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,

    /// Horizontal accuracy in meters, or [`LocationSample::UNKNOWN_ACCURACY`].
    pub accuracy_meters: f64,

    /// Fix time, milliseconds since the Unix epoch.
    pub timestamp_millis: i64,

    /// Name of the provider that produced the fix (e.g. `gps`, `fused`).
    pub provider: String,
}

impl LocationSample {
    /// Sentinel for "accuracy not reported".
    pub const UNKNOWN_ACCURACY: f64 = -1.0;

    /// Builds a sample, mapping a missing or nonsensical accuracy to the
    /// `-1` sentinel.
    pub fn new(
        lat: f64,
        lng: f64,
        accuracy_meters: Option<f64>,
        timestamp_millis: i64,
        provider: impl Into<String>,
    ) -> Self {
        let accuracy_meters = match accuracy_meters {
            Some(a) if a.is_finite() && a >= 0.0 => a,
            _ => Self::UNKNOWN_ACCURACY,
        };

        LocationSample {
            lat,
            lng,
            accuracy_meters,
            timestamp_millis,
            provider: provider.into(),
        }
    }

    /// Returns true if the provider reported an accuracy.
    pub fn has_accuracy(&self) -> bool {
        self.accuracy_meters >= 0.0
    }
}

// =============================================================================
// SIM Identity
// =============================================================================

/// The SIM currently in the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimIdentity {
    pub serial: String,
    pub operator_name: Option<String>,
    pub number: Option<String>,
}

impl SimIdentity {
    pub fn new(serial: impl Into<String>) -> Self {
        SimIdentity {
            serial: serial.into(),
            operator_name: None,
            number: None,
        }
    }

    /// A SIM counts as swapped only when the serial differs.
    pub fn is_same_card(&self, last_serial: &str) -> bool {
        self.serial == last_serial
    }
}

// =============================================================================
// Poll Cursor
// =============================================================================

/// High-water mark of server command ids already processed.
///
/// ## Invariant
/// `since_id` never decreases, whatever order the server returns ids in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollCursor {
    since_id: i64,
}

impl PollCursor {
    pub fn new(since_id: i64) -> Self {
        PollCursor { since_id }
    }

    pub fn since_id(&self) -> i64 {
        self.since_id
    }

    /// Returns true if a command with this id has not been seen yet.
    pub fn is_new(&self, id: i64) -> bool {
        id > self.since_id
    }

    /// Moves the cursor to the largest id given, if that is ahead of it.
    ///
    /// Returns true if the cursor moved.
    pub fn advance<I>(&mut self, ids: I) -> bool
    where
        I: IntoIterator<Item = i64>,
    {
        match ids.into_iter().max() {
            Some(max) if max > self.since_id => {
                self.since_id = max;
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
