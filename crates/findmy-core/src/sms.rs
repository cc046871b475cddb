//! # SMS Command Grammar
//!
//! ```text
//! FINDMY <device_id> <sms_secret> [COMMAND]
//!   │         │           │           └── optional, defaults to LOCATE
//!   │         │           └────────────── shared secret, exact match
//!   │         └────────────────────────── device id, exact match
//!   └──────────────────────────────────── tag, case-insensitive
//! ```
//!
//! Tokens are separated by any run of whitespace. Anything after the
//! command token is ignored. This module only recognises the shape of a
//! message; checking the credentials is the authenticator's job.

use crate::command::CommandType;
use crate::SMS_TAG;

/// A message that matched the grammar. Credentials are not yet verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsCommand {
    pub device_id: String,
    pub secret: String,
    pub command: CommandType,
}

/// Parses an SMS body.
///
/// Returns `None` for anything that is not a FINDMY command: fewer than
/// three tokens, or a different leading tag. Callers drop those silently.
pub fn parse_sms(body: &str) -> Option<SmsCommand> {
    let mut tokens = body.split_whitespace();

    let tag = tokens.next()?;
    if !tag.eq_ignore_ascii_case(SMS_TAG) {
        return None;
    }

    let device_id = tokens.next()?;
    let secret = tokens.next()?;
    let command = tokens
        .next()
        .map(CommandType::parse)
        .unwrap_or(CommandType::Locate);

    Some(SmsCommand {
        device_id: device_id.to_string(),
        secret: secret.to_string(),
        command,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_message_defaults_to_locate() {
        let parsed = parse_sms("findmy dev123 ab12cd34").unwrap();
        assert_eq!(parsed.device_id, "dev123");
        assert_eq!(parsed.secret, "ab12cd34");
        assert_eq!(parsed.command, CommandType::Locate);
    }

    #[test]
    fn test_explicit_command_any_case() {
        let parsed = parse_sms("FindMy dev123 ab12cd34 alarm").unwrap();
        assert_eq!(parsed.command, CommandType::Alarm);

        let parsed = parse_sms("FINDMY dev123 ab12cd34 ring").unwrap();
        assert_eq!(parsed.command, CommandType::Alarm);
    }

    #[test]
    fn test_irregular_whitespace() {
        let parsed = parse_sms("  FINDMY\tdev123 \n  ab12cd34    LOCK  extra words").unwrap();
        assert_eq!(parsed.device_id, "dev123");
        assert_eq!(parsed.command, CommandType::Lock);
    }

    #[test]
    fn test_non_matching_texts_produce_nothing() {
        let rejects = [
            "",
            "   ",
            "FINDMY",
            "FINDMY dev123",
            "hello dev123 ab12cd34",
            "FINDMYX dev123 ab12cd34",
            "see you at 5, findmy dev123 ab12cd34",
        ];
        for body in rejects {
            assert!(parse_sms(body).is_none(), "should reject {:?}", body);
        }
    }

    #[test]
    fn test_unknown_command_token_is_kept() {
        let parsed = parse_sms("FINDMY dev123 ab12cd34 explode").unwrap();
        assert_eq!(parsed.command, CommandType::Unknown("explode".into()));
    }
}
