//! # Sync Error Types
//!
//! Error types for the command engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  NetworkFailure │  │  SerializationFailed    │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  DeserializationFailed  │ │
//! │  │  ConfigLoad/Save│  │  ServerRejected │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Domain       │  │    Storage      │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Core(CoreError)│  │  DatabaseError  │  │  ChannelError           │ │
//! │  │                 │  │                 │  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these stop the agent. Network errors are logged and the work is
//! abandoned until the next cycle; there is no automatic retry.

use thiserror::Error;

use findmy_core::CoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error type covering all engine failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid agent configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid server URL.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Connection could not be made or broke mid-request.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Request exceeded the fixed request timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Server answered with a non-2xx status or a non-success envelope.
    #[error("Server rejected request (HTTP {status}): {message}")]
    ServerRejected { status: u16, message: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Failed to serialize a request body.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to decode a response body.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Domain & Storage Errors
    // =========================================================================
    /// Protocol-level failure from findmy-core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Persisted state could not be read or written.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Agent is shutting down.
    #[error("Agent is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<findmy_db::DbError> for SyncError {
    fn from(err: findmy_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else if err.is_builder() {
            SyncError::InvalidConfig(err.to_string())
        } else {
            SyncError::NetworkFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::DeserializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the same call could succeed on a later cycle.
    ///
    /// Nothing retries automatically; this only decides how loudly a
    /// failure is logged.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::NetworkFailure(_) | SyncError::Timeout(_) => true,
            SyncError::ServerRejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true for any failure talking to the server.
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkFailure(_)
                | SyncError::Timeout(_)
                | SyncError::ServerRejected { .. }
                | SyncError::DeserializationFailed(_)
        ) || matches!(self, SyncError::Core(CoreError::NetworkFailure(_)))
    }

    /// Returns true if the device has no identity yet.
    pub fn is_not_registered(&self) -> bool {
        matches!(self, SyncError::Core(CoreError::NotRegistered))
    }

    /// Stable taxonomy name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Core(core) => core.kind(),
            _ if self.is_network_failure() => "network_failure",
            _ if self.is_config_error() => "config",
            SyncError::DatabaseError(_) => "storage",
            _ => "internal",
        }
    }

    /// Maps this error onto the domain taxonomy, for recording as a
    /// command's failure reason.
    pub fn to_core_error(&self) -> CoreError {
        match self {
            SyncError::Core(core) => core.clone(),
            _ if self.is_network_failure() => CoreError::NetworkFailure(self.to_string()),
            _ => CoreError::ActionFailed(self.to_string()),
        }
    }
}
