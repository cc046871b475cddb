//! # Registration Manager
//!
//! Establishes and persists the device identity.
//!
//! ## Registration Flow
//! ```text
//! ensure_registered()
//!        │
//!        ├── identity persisted? ──yes──► return it (idempotent)
//!        │
//!        ▼
//!  derive device id ──► generate token + SMS secret
//!        │
//!        ▼
//!  POST /api/register_device
//!        │
//!        ├── ok ────────────► persist server token
//!        └── any failure ───► persist offered token (local registration)
//! ```
//!
//! Concurrent callers are serialised on an internal mutex, so a boot-time
//! registration racing a push-token refresh cannot register twice.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use findmy_core::validation::{is_usable_platform_id, validate_device_id};
use findmy_core::{CoreError, DeviceIdentity, SMS_SECRET_LEN};
use findmy_db::DeviceState;

use crate::client::RemoteApi;
use crate::error::{SyncError, SyncResult};
use crate::platform::PlatformInfo;
use crate::protocol::RegisterRequest;

/// Owns the device identity lifecycle.
pub struct RegistrationManager {
    state: DeviceState,
    api: Arc<dyn RemoteApi>,
    platform: Arc<dyn PlatformInfo>,
    lock: Mutex<()>,
}

impl RegistrationManager {
    pub fn new(
        state: DeviceState,
        api: Arc<dyn RemoteApi>,
        platform: Arc<dyn PlatformInfo>,
    ) -> Self {
        RegistrationManager {
            state,
            api,
            platform,
            lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Registers the device if it is not registered yet.
    ///
    /// Never fails because of the server: a rejected or unreachable
    /// registration falls back to local registration. Only storage errors
    /// propagate.
    pub async fn ensure_registered(&self) -> SyncResult<DeviceIdentity> {
        let _guard = self.lock.lock().await;

        if let Some(identity) = self.state.load_identity().await? {
            debug!(device_id = %identity.id, "Device already registered");
            return Ok(identity);
        }

        // A stored id survives an interrupted registration
        let device_id = match self.state.device_id().await? {
            Some(id) if validate_device_id(&id).is_ok() => id,
            _ => derive_device_id(self.platform.platform_id().as_deref()),
        };
        let device_name = self
            .platform
            .device_name()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| {
                derive_device_name(&self.platform.manufacturer(), &self.platform.model())
            });

        let offered_token = generate_token();
        let request = RegisterRequest {
            device_id: device_id.clone(),
            device_name: device_name.clone(),
            auth_token: offered_token.clone(),
            model: self.platform.model(),
            os_version: self.platform.os_version(),
            fcm_token: self.state.push_token().await?,
        };

        let auth_token = match self.api.register(&request).await {
            Ok(token) => {
                info!(device_id = %device_id, "Device registered with server");
                token
            }
            Err(err) => {
                warn!(
                    device_id = %device_id,
                    error = %err,
                    kind = err.kind(),
                    "Remote registration failed, registering locally"
                );
                offered_token
            }
        };

        let mut sms_secret = generate_sms_secret();
        while sms_secret == auth_token {
            sms_secret = generate_sms_secret();
        }

        let identity = DeviceIdentity {
            id: device_id,
            name: device_name,
            auth_token,
            sms_secret,
            registered: true,
        };
        self.state.store_identity(&identity).await?;
        Ok(identity)
    }

    /// The persisted identity, or `NotRegistered`.
    pub async fn identity(&self) -> SyncResult<DeviceIdentity> {
        self.state
            .load_identity()
            .await?
            .ok_or(SyncError::Core(CoreError::NotRegistered))
    }

    pub async fn auth_token(&self) -> SyncResult<String> {
        Ok(self.identity().await?.auth_token)
    }

    pub async fn device_id(&self) -> SyncResult<String> {
        Ok(self.identity().await?.id)
    }

    pub async fn sms_secret(&self) -> SyncResult<String> {
        Ok(self.identity().await?.sms_secret)
    }

    pub async fn is_registered(&self) -> SyncResult<bool> {
        Ok(self.state.load_identity().await?.is_some())
    }

    /// Persists a refreshed push token. It is reported on the next
    /// registration.
    pub async fn update_push_token(&self, token: &str) -> SyncResult<()> {
        self.state.set_push_token(token).await?;
        debug!("Push token updated");
        Ok(())
    }

    /// Forgets the identity. The next `ensure_registered` starts over.
    pub async fn reset(&self) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        self.state.clear_identity().await?;
        info!("Registration reset");
        Ok(())
    }
}

// =============================================================================
// Derivation helpers
// =============================================================================

/// Uses the platform id when it is usable, else a random UUID.
pub fn derive_device_id(platform_id: Option<&str>) -> String {
    match platform_id {
        Some(id) if is_usable_platform_id(id) => id.trim().to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

/// `"Samsung SM-G991B"` style name; the manufacturer is left out when the
/// model already starts with it.
pub fn derive_device_name(manufacturer: &str, model: &str) -> String {
    if model
        .to_lowercase()
        .starts_with(&manufacturer.to_lowercase())
    {
        capitalize(model)
    } else {
        format!("{} {}", capitalize(manufacturer), model)
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}

/// 32 hex characters.
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Random lower-case alphanumeric SMS secret.
pub fn generate_sms_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SMS_SECRET_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}
