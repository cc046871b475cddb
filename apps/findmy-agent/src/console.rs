//! Line-oriented console ingress.
//!
//! Stands in for the SMS receiver and the push service on a headless host:
//!
//! ```text
//! sms FINDMY dev123 ab12cd34 LOCATE  -> SMS channel
//! push device_id=dev123 command_type=ALARM command_id=9
//! poll                               -> one poll cycle now
//! track on | track off
//! status [--reveal]                 -> SMS secret masked unless revealed
//! ```

use std::collections::HashMap;

use findmy_core::types::Redacted;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Sms(String),
    Push(HashMap<String, String>),
    Poll,
    Track(bool),
    /// `reveal` prints the SMS secret, still masked in release builds.
    Status { reveal: bool },
    Empty,
    Invalid(String),
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "" => ConsoleCommand::Empty,
        "sms" if !rest.is_empty() => ConsoleCommand::Sms(rest.to_string()),
        "push" => parse_push(rest),
        "poll" => ConsoleCommand::Poll,
        "status" => match rest {
            "" => ConsoleCommand::Status { reveal: false },
            "--reveal" => ConsoleCommand::Status { reveal: true },
            _ => ConsoleCommand::Invalid("usage: status [--reveal]".into()),
        },
        "track" => match rest.to_ascii_lowercase().as_str() {
            "on" => ConsoleCommand::Track(true),
            "off" => ConsoleCommand::Track(false),
            _ => ConsoleCommand::Invalid("usage: track on|off".into()),
        },
        _ => ConsoleCommand::Invalid(format!("unknown input: {verb}")),
    }
}

/// Status line for the SMS secret.
pub fn secret_line(secret: &str, reveal: bool) -> String {
    if reveal {
        format!("sms secret: {}", Redacted(secret))
    } else {
        "sms secret: ******** (status --reveal to show)".to_string()
    }
}

fn parse_push(rest: &str) -> ConsoleCommand {
    let mut data = HashMap::new();
    for pair in rest.split_whitespace() {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                data.insert(key.to_string(), value.to_string());
            }
            _ => return ConsoleCommand::Invalid(format!("expected key=value, got {pair}")),
        }
    }
    ConsoleCommand::Push(data)
}
