//! # Validation Module
//!
//! Rules for identifiers, secrets and the fake-shutdown password.
//!
//! ## Where These Run
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Points                                  │
//! │                                                                         │
//! │  Registration                                                          │
//! │  ├── platform id   → is_usable_platform_id (sentinel ids rejected)     │
//! │  ├── device id     → validate_device_id                                │
//! │  └── sms secret    → validate_sms_secret (+ distinct from token)       │
//! │                                                                         │
//! │  Settings                                                              │
//! │  └── fake-shutdown password → validate_fake_shutdown_password          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{DEFAULT_FAKE_SHUTDOWN_PASSWORD, KNOWN_BAD_PLATFORM_IDS, SMS_SECRET_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest device id accepted.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Shortest fake-shutdown password accepted.
pub const MIN_FAKE_SHUTDOWN_PASSWORD_LEN: usize = 4;

// =============================================================================
// Identifiers
// =============================================================================

/// Returns true if a platform-reported id can serve as the device id.
///
/// ## Example
/// ```rust
/// use findmy_core::validation::is_usable_platform_id;
///
/// assert!(is_usable_platform_id("a1b2c3d4e5f60718"));
/// assert!(!is_usable_platform_id("9774d56d682e549c"));
/// assert!(!is_usable_platform_id("   "));
/// ```
pub fn is_usable_platform_id(platform_id: &str) -> bool {
    let id = platform_id.trim();
    !id.is_empty()
        && !KNOWN_BAD_PLATFORM_IDS
            .iter()
            .any(|bad| bad.eq_ignore_ascii_case(id))
        && validate_device_id(id).is_ok()
}

/// Validates a device id.
///
/// ## Rules
/// - Must not be empty
/// - At most 128 characters
/// - ASCII letters, digits, `-` and `_` only (it appears in URL paths and
///   in SMS tokens)
pub fn validate_device_id(device_id: &str) -> ValidationResult<()> {
    if device_id.is_empty() {
        return Err(ValidationError::Required {
            field: "device_id".to_string(),
        });
    }

    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "device_id".to_string(),
            max: MAX_DEVICE_ID_LEN,
        });
    }

    if !device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "device_id".to_string(),
            reason: "only letters, digits, '-' and '_' are allowed".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Secrets
// =============================================================================

/// Validates an SMS shared secret: exactly 8 ASCII alphanumerics.
pub fn validate_sms_secret(secret: &str) -> ValidationResult<()> {
    if secret.len() != SMS_SECRET_LEN {
        return Err(ValidationError::InvalidFormat {
            field: "sms_secret".to_string(),
            reason: format!("must be exactly {} characters", SMS_SECRET_LEN),
        });
    }

    if !secret.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "sms_secret".to_string(),
            reason: "only letters and digits are allowed".to_string(),
        });
    }

    Ok(())
}

/// The SMS secret and the bearer token must never be the same value.
pub fn validate_distinct_credentials(sms_secret: &str, auth_token: &str) -> ValidationResult<()> {
    if sms_secret == auth_token {
        return Err(ValidationError::InvalidFormat {
            field: "sms_secret".to_string(),
            reason: "must differ from the auth token".to_string(),
        });
    }
    Ok(())
}

/// Validates a fake-shutdown password.
///
/// ## Rules
/// - At least 4 characters
/// - Not the factory default `"1234"`
pub fn validate_fake_shutdown_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < MIN_FAKE_SHUTDOWN_PASSWORD_LEN {
        return Err(ValidationError::TooShort {
            field: "fake_shutdown_password".to_string(),
            min: MIN_FAKE_SHUTDOWN_PASSWORD_LEN,
        });
    }

    if password == DEFAULT_FAKE_SHUTDOWN_PASSWORD {
        return Err(ValidationError::FactoryDefault {
            field: "fake_shutdown_password".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
