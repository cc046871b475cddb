//! # Secure State Store
//!
//! The key/value contract every backend implements, the fixed set of keys
//! the agent persists, and [`DeviceState`], the typed view the rest of the
//! agent uses.
//!
//! ## Persisted Keys
//! ```text
//! ┌──────────────────────────┬───────────┬───────────────────────────────┐
//! │ key                      │ type      │ default                       │
//! ├──────────────────────────┼───────────┼───────────────────────────────┤
//! │ device_id                │ string    │ (none)                        │
//! │ device_name              │ string    │ "Unknown Device"              │
//! │ device_token             │ secret    │ (none)                        │
//! │ sms_secret               │ secret    │ (none)                        │
//! │ is_registered            │ bool      │ false                         │
//! │ tracking_enabled         │ bool      │ false                         │
//! │ last_sim_serial          │ string    │ (none)                        │
//! │ server_url               │ string    │ seeded from config            │
//! │ fake_shutdown_password   │ secret    │ "1234"                        │
//! │ poll_since_id            │ i64       │ 0                             │
//! │ push_token               │ string    │ (none)                        │
//! └──────────────────────────┴───────────┴───────────────────────────────┘
//! ```
//!
//! Writes are last-writer-wins per key. Backends may encrypt values at
//! rest; callers only see plain strings.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use findmy_core::validation::{validate_device_id, validate_fake_shutdown_password};
use findmy_core::{DeviceIdentity, DEFAULT_FAKE_SHUTDOWN_PASSWORD, UNKNOWN_DEVICE_NAME};

use crate::error::{DbError, DbResult};

// =============================================================================
// Keys
// =============================================================================

/// Every key the agent persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    DeviceId,
    DeviceName,
    DeviceToken,
    SmsSecret,
    IsRegistered,
    TrackingEnabled,
    LastSimSerial,
    ServerUrl,
    FakeShutdownPassword,
    PollSinceId,
    PushToken,
}

impl StateKey {
    /// Keys that make up the device identity. Cleared together on reset.
    pub const IDENTITY: [StateKey; 6] = [
        StateKey::DeviceId,
        StateKey::DeviceName,
        StateKey::DeviceToken,
        StateKey::SmsSecret,
        StateKey::IsRegistered,
        StateKey::PollSinceId,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            StateKey::DeviceId => "device_id",
            StateKey::DeviceName => "device_name",
            StateKey::DeviceToken => "device_token",
            StateKey::SmsSecret => "sms_secret",
            StateKey::IsRegistered => "is_registered",
            StateKey::TrackingEnabled => "tracking_enabled",
            StateKey::LastSimSerial => "last_sim_serial",
            StateKey::ServerUrl => "server_url",
            StateKey::FakeShutdownPassword => "fake_shutdown_password",
            StateKey::PollSinceId => "poll_since_id",
            StateKey::PushToken => "push_token",
        }
    }

    /// Returns true for credentials that must never be logged.
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            StateKey::DeviceToken | StateKey::SmsSecret | StateKey::FakeShutdownPassword
        )
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Store Contract
// =============================================================================

/// Persisted key/value store.
///
/// Only the contract matters to the agent; whether a backend encrypts at
/// rest is its own business.
#[async_trait]
pub trait SecureStateStore: Send + Sync {
    /// Loads a value. Returns `None` if the key was never written.
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Stores a value, replacing any previous one.
    async fn put(&self, key: &str, value: &str) -> DbResult<()>;

    /// Deletes a key. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> DbResult<()>;

    /// Checks if a key exists.
    async fn contains(&self, key: &str) -> DbResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

// =============================================================================
// Typed View
// =============================================================================

/// Typed accessors over a [`SecureStateStore`].
///
/// Cheap to clone; every clone talks to the same backend.
#[derive(Clone)]
pub struct DeviceState {
    store: Arc<dyn SecureStateStore>,
}

impl fmt::Debug for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceState").finish_non_exhaustive()
    }
}

impl DeviceState {
    pub fn new(store: impl SecureStateStore + 'static) -> Self {
        DeviceState {
            store: Arc::new(store),
        }
    }

    pub fn from_arc(store: Arc<dyn SecureStateStore>) -> Self {
        DeviceState { store }
    }

    // =========================================================================
    // Primitive accessors
    // =========================================================================

    pub async fn get_string(&self, key: StateKey) -> DbResult<Option<String>> {
        self.store.get(key.as_str()).await
    }

    pub async fn put_string(&self, key: StateKey, value: &str) -> DbResult<()> {
        if key.is_secret() {
            debug!(key = %key, "Writing secret state");
        } else {
            debug!(key = %key, value = %value, "Writing state");
        }
        self.store.put(key.as_str(), value).await
    }

    pub async fn remove(&self, key: StateKey) -> DbResult<()> {
        self.store.remove(key.as_str()).await
    }

    pub async fn get_bool(&self, key: StateKey, default: bool) -> DbResult<bool> {
        match self.get_string(key).await? {
            None => Ok(default),
            Some(raw) => match raw.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(DbError::invalid_value(
                    key.as_str(),
                    format!("expected true/false, found '{}'", other),
                )),
            },
        }
    }

    pub async fn put_bool(&self, key: StateKey, value: bool) -> DbResult<()> {
        self.put_string(key, if value { "true" } else { "false" }).await
    }

    pub async fn get_i64(&self, key: StateKey, default: i64) -> DbResult<i64> {
        match self.get_string(key).await? {
            None => Ok(default),
            Some(raw) => raw.parse::<i64>().map_err(|e| {
                DbError::invalid_value(key.as_str(), format!("expected integer: {}", e))
            }),
        }
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub async fn device_id(&self) -> DbResult<Option<String>> {
        self.get_string(StateKey::DeviceId).await
    }

    pub async fn device_name(&self) -> DbResult<String> {
        Ok(self
            .get_string(StateKey::DeviceName)
            .await?
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string()))
    }

    pub async fn device_token(&self) -> DbResult<Option<String>> {
        self.get_string(StateKey::DeviceToken).await
    }

    pub async fn sms_secret(&self) -> DbResult<Option<String>> {
        self.get_string(StateKey::SmsSecret).await
    }

    pub async fn is_registered(&self) -> DbResult<bool> {
        self.get_bool(StateKey::IsRegistered, false).await
    }

    /// Loads the full identity. Returns `None` unless the device is
    /// registered and every credential is present.
    pub async fn load_identity(&self) -> DbResult<Option<DeviceIdentity>> {
        if !self.is_registered().await? {
            return Ok(None);
        }

        let (Some(id), Some(auth_token), Some(sms_secret)) = (
            self.device_id().await?,
            self.device_token().await?,
            self.sms_secret().await?,
        ) else {
            return Ok(None);
        };

        Ok(Some(DeviceIdentity {
            id,
            name: self.device_name().await?,
            auth_token,
            sms_secret,
            registered: true,
        }))
    }

    /// Persists a complete identity.
    ///
    /// `is_registered` is written last, so a crash half-way through leaves
    /// the device unregistered rather than registered with missing
    /// credentials.
    pub async fn store_identity(&self, identity: &DeviceIdentity) -> DbResult<()> {
        validate_device_id(&identity.id)
            .map_err(|e| DbError::invalid_value(StateKey::DeviceId.as_str(), e.to_string()))?;

        self.put_string(StateKey::DeviceId, &identity.id).await?;
        self.put_string(StateKey::DeviceName, &identity.name).await?;
        self.put_string(StateKey::DeviceToken, &identity.auth_token)
            .await?;
        self.put_string(StateKey::SmsSecret, &identity.sms_secret)
            .await?;
        self.put_bool(StateKey::IsRegistered, identity.registered)
            .await?;

        info!(device_id = %identity.id, "Device identity persisted");
        Ok(())
    }

    /// Removes every identity key, returning the device to a fresh state.
    pub async fn clear_identity(&self) -> DbResult<()> {
        // Registered flag first, mirroring store_identity
        self.remove(StateKey::IsRegistered).await?;
        for key in StateKey::IDENTITY {
            self.remove(key).await?;
        }
        info!("Device identity cleared");
        Ok(())
    }

    // =========================================================================
    // Tracking, SIM, server
    // =========================================================================

    pub async fn tracking_enabled(&self) -> DbResult<bool> {
        self.get_bool(StateKey::TrackingEnabled, false).await
    }

    pub async fn set_tracking_enabled(&self, enabled: bool) -> DbResult<()> {
        self.put_bool(StateKey::TrackingEnabled, enabled).await
    }

    pub async fn last_sim_serial(&self) -> DbResult<Option<String>> {
        self.get_string(StateKey::LastSimSerial).await
    }

    pub async fn set_last_sim_serial(&self, serial: &str) -> DbResult<()> {
        self.put_string(StateKey::LastSimSerial, serial).await
    }

    pub async fn server_url(&self) -> DbResult<Option<String>> {
        self.get_string(StateKey::ServerUrl).await
    }

    pub async fn set_server_url(&self, url: &str) -> DbResult<()> {
        self.put_string(StateKey::ServerUrl, url).await
    }

    /// Returns the persisted server URL, storing `seed` first if none is
    /// persisted yet.
    pub async fn server_url_or_seed(&self, seed: &str) -> DbResult<String> {
        match self.server_url().await? {
            Some(url) => Ok(url),
            None => {
                self.set_server_url(seed).await?;
                Ok(seed.to_string())
            }
        }
    }

    pub async fn push_token(&self) -> DbResult<Option<String>> {
        self.get_string(StateKey::PushToken).await
    }

    pub async fn set_push_token(&self, token: &str) -> DbResult<()> {
        self.put_string(StateKey::PushToken, token).await
    }

    // =========================================================================
    // Fake shutdown password
    // =========================================================================

    pub async fn fake_shutdown_password(&self) -> DbResult<String> {
        Ok(self
            .get_string(StateKey::FakeShutdownPassword)
            .await?
            .unwrap_or_else(|| DEFAULT_FAKE_SHUTDOWN_PASSWORD.to_string()))
    }

    /// Stores a new password after checking it against the password rules.
    pub async fn set_fake_shutdown_password(&self, password: &str) -> DbResult<()> {
        validate_fake_shutdown_password(password).map_err(|e| {
            DbError::invalid_value(StateKey::FakeShutdownPassword.as_str(), e.to_string())
        })?;
        self.put_string(StateKey::FakeShutdownPassword, password)
            .await
    }

    pub async fn uses_default_fake_shutdown_password(&self) -> DbResult<bool> {
        Ok(self.fake_shutdown_password().await? == DEFAULT_FAKE_SHUTDOWN_PASSWORD)
    }

    // =========================================================================
    // Poll cursor
    // =========================================================================

    pub async fn poll_since_id(&self) -> DbResult<i64> {
        self.get_i64(StateKey::PollSinceId, 0).await
    }

    /// Persists a new cursor value, refusing to move it backwards.
    ///
    /// Returns the value now stored.
    pub async fn commit_poll_since_id(&self, since_id: i64) -> DbResult<i64> {
        let current = self.poll_since_id().await?;
        if since_id <= current {
            return Ok(current);
        }
        self.put_string(StateKey::PollSinceId, &since_id.to_string())
            .await?;
        Ok(since_id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
