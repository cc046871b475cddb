//! # Command Authenticator
//!
//! Per-channel credential checks for inbound commands.
//!
//! | channel | credential                     | on failure              |
//! |---------|--------------------------------|-------------------------|
//! | SMS     | device id + SMS secret, exact  | drop, no ack, no body   |
//! | PUSH    | device id, exact               | drop with warning       |
//! | POLL    | filtered server-side by token  | n/a                     |
//!
//! Rejections are recorded on the [`SecurityAudit`] log with the channel and
//! a reason; the submitted credentials themselves are never logged.

use std::sync::Arc;

use findmy_core::{CoreError, CoreResult, DeviceIdentity, SourceChannel};

use crate::audit::SecurityAudit;

/// Validates inbound commands against the persisted identity.
pub struct CommandAuthenticator {
    audit: Arc<SecurityAudit>,
}

impl CommandAuthenticator {
    pub fn new(audit: Arc<SecurityAudit>) -> Self {
        CommandAuthenticator { audit }
    }

    pub fn authenticate_sms(
        &self,
        identity: &DeviceIdentity,
        device_id: &str,
        secret: &str,
    ) -> CoreResult<()> {
        if device_id != identity.id {
            return Err(self.reject(SourceChannel::Sms, "device id mismatch"));
        }
        if secret != identity.sms_secret {
            return Err(self.reject(SourceChannel::Sms, "secret mismatch"));
        }
        Ok(())
    }

    pub fn authenticate_push(&self, identity: &DeviceIdentity, device_id: &str) -> CoreResult<()> {
        if device_id != identity.id {
            return Err(self.reject(SourceChannel::Push, "device id mismatch"));
        }
        Ok(())
    }

    /// Poll results are already scoped to our bearer token.
    pub fn authenticate_poll(&self, _identity: &DeviceIdentity) -> CoreResult<()> {
        Ok(())
    }

    fn reject(&self, channel: SourceChannel, reason: &str) -> CoreError {
        self.audit.record(channel, reason);
        CoreError::AuthenticationRejected {
            channel: channel.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AUTH_TOKEN, DEVICE_ID, SMS_SECRET};

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            id: DEVICE_ID.into(),
            name: "Pixel 7".into(),
            auth_token: AUTH_TOKEN.into(),
            sms_secret: SMS_SECRET.into(),
            registered: true,
        }
    }

    fn authenticator() -> CommandAuthenticator {
        CommandAuthenticator::new(Arc::new(SecurityAudit::new(true, 10)))
    }

    #[test]
    fn test_sms_requires_exact_id_and_secret() {
        let auth = authenticator();
        let identity = identity();

        assert!(auth.authenticate_sms(&identity, "dev123", "ab12cd34").is_ok());

        let err = auth
            .authenticate_sms(&identity, "dev123", "AB12CD34")
            .unwrap_err();
        assert_eq!(err.kind(), "authentication_rejected");
        assert!(!err.to_string().contains("AB12CD34"));

        assert!(auth.authenticate_sms(&identity, "DEV123", "ab12cd34").is_err());
        assert!(auth.authenticate_sms(&identity, "dev123", "").is_err());
    }

    #[test]
    fn test_push_requires_exact_id() {
        let auth = authenticator();
        let identity = identity();
        assert!(auth.authenticate_push(&identity, "dev123").is_ok());

        let err = auth.authenticate_push(&identity, "other").unwrap_err();
        assert_eq!(
            err,
            CoreError::AuthenticationRejected {
                channel: "PUSH".into(),
                reason: "device id mismatch".into(),
            }
        );
    }

    #[test]
    fn test_poll_always_accepted() {
        assert!(authenticator().authenticate_poll(&identity()).is_ok());
    }
}
