use std::fmt;

use crate::error::{CoreError, CoreResult};

/// The command string standing in for an interactive session (no command
/// requested by the client).
pub const INTERACTIVE: &str = "<interactive>";

/// Prefix marking a command that is stored with control bytes escaped.
const BINARY_PREFIX: &str = "<binary>";

// ---------------------------------------------------------------------------
// Value escaping
//
// Audit record values and <binary> commands share one escape grammar:
// bytes 0x00-0x1f become \xNN, `"` becomes \" and `\` becomes \\.
// Everything else passes through, so escape-then-unescape is the identity.
// ---------------------------------------------------------------------------

pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape_value(value: &str) -> CoreResult<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                let byte = match (hi, lo) {
                    (Some(h), Some(l)) => u8::from_str_radix(&format!("{}{}", h, l), 16)
                        .map_err(|_| CoreError::BadEscape(value.to_string()))?,
                    _ => return Err(CoreError::BadEscape(value.to_string())),
                };
                out.push(byte as char);
            }
            _ => return Err(CoreError::BadEscape(value.to_string())),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// <binary> command codec
// ---------------------------------------------------------------------------

/// Encode a command for inclusion in a policy file. Commands containing
/// control bytes or backslashes get the `<binary> ` prefix with the shared
/// escape grammar; everything else is written verbatim.
pub fn encode_command(command: &str) -> String {
    let needs_encoding = command
        .chars()
        .any(|c| (c as u32) < 0x20 || c == '\\');
    if needs_encoding {
        let mut escaped = String::with_capacity(command.len());
        for c in command.chars() {
            match c {
                '\\' => escaped.push_str("\\\\"),
                c if (c as u32) < 0x20 => escaped.push_str(&format!("\\x{:02x}", c as u32)),
                c => escaped.push(c),
            }
        }
        format!("{} {}", BINARY_PREFIX, escaped)
    } else {
        command.to_string()
    }
}

/// Decode a command as written in a policy file.
pub fn decode_command(text: &str) -> CoreResult<String> {
    match text.strip_prefix(BINARY_PREFIX) {
        Some(rest) => unescape_value(rest.trim_start()),
        None => Ok(text.to_string()),
    }
}

// ---------------------------------------------------------------------------
// AuditRecord — one structured record per decision or failure
// ---------------------------------------------------------------------------

/// Syslog priority of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Info,
    Err,
}

impl Priority {
    /// Numeric severity as defined by syslog(3).
    pub fn severity(&self) -> u8 {
        match self {
            Priority::Info => 6,
            Priority::Err => 3,
        }
    }
}

/// An ordered list of `name="value"` fields. Construction keeps field order
/// and drops empty values, so rendering is a straight join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    fields: Vec<(&'static str, String)>,
}

impl AuditRecord {
    pub fn new(record_type: &str) -> Self {
        Self {
            fields: vec![("type", record_type.to_string())],
        }
    }

    /// Append a field, skipping it when the value is empty.
    pub fn field(mut self, name: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.fields.push((name, value));
        }
        self
    }

    pub fn record_type(&self) -> &str {
        &self.fields[0].1
    }

    /// `info` for allowed decisions, `err` for everything else.
    pub fn priority(&self) -> Priority {
        if self.record_type() == "allowed" {
            Priority::Info
        } else {
            Priority::Err
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| format!("{}=\"{}\"", name, escape_value(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_passthrough() {
        assert_eq!(escape_value("echo 42"), "echo 42");
    }

    #[test]
    fn test_escape_specials() {
        assert_eq!(escape_value("a\"b"), "a\\\"b");
        assert_eq!(escape_value("a\\b"), "a\\\\b");
        assert_eq!(escape_value("a\nb"), "a\\x0ab");
        assert_eq!(escape_value("\x01"), "\\x01");
    }

    #[test]
    fn test_escape_unescape_identity_on_byte_strings() {
        let all_bytes: String = (0u8..=255).map(|b| b as char).collect();
        let escaped = escape_value(&all_bytes);
        assert_eq!(unescape_value(&escaped).unwrap(), all_bytes);
    }

    #[test]
    fn test_unescape_rejects_truncated_and_unknown() {
        assert!(unescape_value("\\").is_err());
        assert!(unescape_value("\\x4").is_err());
        assert!(unescape_value("\\xzz").is_err());
        assert!(unescape_value("\\q").is_err());
    }

    #[test]
    fn test_encode_command_verbatim() {
        assert_eq!(encode_command("ls -l /tmp"), "ls -l /tmp");
    }

    #[test]
    fn test_encode_command_binary() {
        assert_eq!(encode_command("a\tb"), "<binary> a\\x09b");
        assert_eq!(encode_command("a\\b"), "<binary> a\\\\b");
    }

    #[test]
    fn test_decode_command_roundtrip() {
        for cmd in ["plain command", "a\tb\nc", "back\\slash", INTERACTIVE] {
            assert_eq!(decode_command(&encode_command(cmd)).unwrap(), cmd);
        }
    }

    #[test]
    fn test_decode_plain_is_verbatim() {
        assert_eq!(decode_command("echo #").unwrap(), "echo #");
    }

    #[test]
    fn test_record_field_order_and_empty_omission() {
        let record = AuditRecord::new("allowed")
            .field("user", "alice")
            .field("remoteip", "")
            .field("label", "")
            .field("command", "echo 42");
        assert_eq!(
            record.render(),
            "type=\"allowed\" user=\"alice\" command=\"echo 42\""
        );
    }

    #[test]
    fn test_record_escapes_values() {
        let record = AuditRecord::new("disallowed")
            .field("user", "alice")
            .field("command", "say \"hi\"");
        assert_eq!(
            record.render(),
            "type=\"disallowed\" user=\"alice\" command=\"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn test_record_priority() {
        assert_eq!(AuditRecord::new("allowed").priority(), Priority::Info);
        assert_eq!(AuditRecord::new("training").priority(), Priority::Err);
        assert_eq!(AuditRecord::new("disallowed").priority(), Priority::Err);
        assert_eq!(AuditRecord::new("configerror").priority(), Priority::Err);
        assert_eq!(Priority::Info.severity(), 6);
        assert_eq!(Priority::Err.severity(), 3);
    }

    #[test]
    fn test_record_get() {
        let record = AuditRecord::new("execerror")
            .field("command", "ls")
            .field("error", "not found");
        assert_eq!(record.get("error"), Some("not found"));
        assert_eq!(record.get("user"), None);
    }
}
