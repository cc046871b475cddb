//! # findmy-core: Pure Domain Logic for the FindMy Device Agent
//!
//! This crate holds the remote-command protocol's domain model as plain
//! types and pure functions. Nothing in here touches the network, the disk,
//! or a clock source other than `chrono::Utc::now()` for stamping commands.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      FindMy Agent Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │         Host (phone OS / headless agent binary)                 │   │
//! │  │   SMS receiver ─┐  push service ─┐  location / admin / alarm   │   │
//! │  └─────────────────┼────────────────┼──────────────────────────────┘   │
//! │                    ▼                ▼                                   │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            findmy-sync (router, executor, scheduler)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ findmy-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  command  │  │    sms    │  │ validation│  │   │
//! │  │   │ Identity  │  │  Command  │  │  grammar  │  │   rules   │  │   │
//! │  │   │ Location  │  │  Status   │  │  parser   │  │  secrets  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Identity, location, SIM and cursor value types
//! - [`command`] - Command model and its status state machine
//! - [`sms`] - SMS command grammar
//! - [`validation`] - Identifier and secret rules
//! - [`error`] - Domain error taxonomy
//!
//! ## Example Usage
//!
//! ```rust
//! use findmy_core::sms::parse_sms;
//! use findmy_core::command::CommandType;
//!
//! let sms = parse_sms("findmy dev123 ab12cd34").unwrap();
//! assert_eq!(sms.device_id, "dev123");
//! assert_eq!(sms.command, CommandType::Locate);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod command;
pub mod error;
pub mod sms;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use command::{Command, CommandStatus, CommandType, Payload};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Leading token of every SMS command, matched case-insensitively.
pub const SMS_TAG: &str = "FINDMY";

/// Length of the SMS shared secret.
pub const SMS_SECRET_LEN: usize = 8;

/// Message shown by SHOW_MESSAGE when the payload carries none.
pub const DEFAULT_SECURITY_NOTICE: &str =
    "This device is being tracked for security purposes.";

/// Hard ceiling on a single alarm run.
pub const ALARM_CEILING_MS: u64 = 120_000;

/// Location reporting period.
pub const LOCATION_INTERVAL_SECS: u64 = 300;

/// How long a fresh location request may run before it is cancelled.
pub const FRESH_LOCATION_TIMEOUT_SECS: u64 = 30;

/// Update interval requested from the location provider for fresh fixes.
pub const FRESH_LOCATION_UPDATE_SECS: u64 = 10;

/// Platform identifiers that are shared by many devices and therefore
/// unusable as a device id.
///
/// ## Why a list?
/// A batch of Android 2.2 handsets all report the same `ANDROID_ID`.
/// Treat any of these as "no stable id" and fall back to a random one.
pub const KNOWN_BAD_PLATFORM_IDS: &[&str] = &["9774d56d682e549c"];

/// Factory default for the fake-shutdown password.
pub const DEFAULT_FAKE_SHUTDOWN_PASSWORD: &str = "1234";

/// Device name used until registration derives a real one.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";
