//! # Error Types
//!
//! Domain error taxonomy for the remote-command protocol.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  findmy-core errors (this file)                                        │
//! │  ├── CoreError        - Protocol taxonomy (what went wrong, and where) │
//! │  └── ValidationError  - Malformed identifiers, secrets, passwords      │
//! │                                                                         │
//! │  findmy-db errors                                                      │
//! │  └── DbError          - Persisted state failures                       │
//! │                                                                         │
//! │  findmy-sync errors                                                    │
//! │  └── SyncError        - Transport, config, wraps CoreError/DbError     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Handling Policy
//!
//! Nothing here is fatal to the agent:
//!
//! | variant                  | effect                                        |
//! |--------------------------|-----------------------------------------------|
//! | `NotRegistered`          | scheduler tick skipped, surfaced to callers    |
//! | `AuthenticationRejected` | inbound message dropped                        |
//! | `CapabilityUnavailable`  | command FAILED (acked FAILED for push/poll)    |
//! | `LocationUnavailable`    | LOCATE FAILED, scheduler cycle reports error   |
//! | `NetworkFailure`         | logged, abandoned until the next cycle         |
//! | `UnknownCommand`         | command DROPPED, never acked                   |

use thiserror::Error;

use crate::command::CommandStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Protocol-level errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// No device identity has been established yet.
    ///
    /// ## When This Occurs
    /// - Credential accessors called before the first `ensure_registered()`
    /// - Scheduler tick or poll cycle on a fresh install
    #[error("Device is not registered")]
    NotRegistered,

    /// An inbound message failed its channel's credential check.
    #[error("Authentication rejected on {channel} channel: {reason}")]
    AuthenticationRejected { channel: String, reason: String },

    /// The device lacks a capability the command needs (e.g. device admin).
    #[error("Capability unavailable: {capability}")]
    CapabilityUnavailable { capability: String },

    /// No location fix could be obtained.
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    /// A server call failed at the transport level or was rejected.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The command type is outside the supported set.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The platform accepted a command but the action itself failed.
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// A command status change that would move backwards or leave a
    /// terminal state.
    #[error("Invalid command transition: {from} -> {to}")]
    InvalidTransition {
        from: CommandStatus,
        to: CommandStatus,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Short stable name of the variant, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::NotRegistered => "not_registered",
            CoreError::AuthenticationRejected { .. } => "authentication_rejected",
            CoreError::CapabilityUnavailable { .. } => "capability_unavailable",
            CoreError::LocationUnavailable(_) => "location_unavailable",
            CoreError::NetworkFailure(_) => "network_failure",
            CoreError::UnknownCommand(_) => "unknown_command",
            CoreError::ActionFailed(_) => "action_failed",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::Validation(_) => "validation",
        }
    }

    /// Convenience constructor for the device-admin capability.
    pub fn device_admin_unavailable() -> Self {
        CoreError::CapabilityUnavailable {
            capability: "device admin".to_string(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., whitespace in an identifier).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// The value is a well-known default that must be changed.
    #[error("{field} must not be the factory default")]
    FactoryDefault { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::CapabilityUnavailable {
            capability: "device admin".to_string(),
        };
        assert_eq!(err.to_string(), "Capability unavailable: device admin");

        let err = CoreError::InvalidTransition {
            from: CommandStatus::Acked,
            to: CommandStatus::Executing,
        };
        assert_eq!(
            err.to_string(),
            "Invalid command transition: ACKED -> EXECUTING"
        );
    }

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(CoreError::NotRegistered.kind(), "not_registered");
        assert_eq!(
            CoreError::LocationUnavailable("timeout".into()).kind(),
            "location_unavailable"
        );
        assert_eq!(
            CoreError::device_admin_unavailable().kind(),
            "capability_unavailable"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "device_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
