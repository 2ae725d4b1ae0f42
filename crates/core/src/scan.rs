//! Textual field recovery for messages that may not parse.

use std::sync::LazyLock;

use regex::Regex;

static MESSAGE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"messageId"\s*:\s*"([^"]+)""#).expect("MESSAGE_ID_RE should compile")
});

static MESSAGE_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"messageType"\s*:\s*"([^"]+)""#).expect("MESSAGE_TYPE_RE should compile")
});

/// Recovers the first `messageId` string value from raw text, even when the
/// text is not valid JSON. The key match is case-insensitive.
pub fn message_id_from_json(raw: &str) -> Option<&str> {
    MESSAGE_ID_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Recovers the `messageType` of a raw message for tracing.
///
/// Falls back to `"response"` for anything carrying `responseToMessageId`
/// and to `"unknown"` otherwise.
pub fn message_type_from_json(raw: &str) -> &str {
    if let Some(m) = MESSAGE_TYPE_RE.captures(raw).and_then(|caps| caps.get(1)) {
        return m.as_str();
    }
    if raw.contains("\"responseToMessageId\"") {
        "response"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_message_id_from_broken_json() {
        assert_eq!(
            message_id_from_json(r#"{"messageId": "abc-1", "payload": {"#),
            Some("abc-1")
        );
        assert_eq!(message_id_from_json(r#"{"MESSAGEID":"x"}"#), Some("x"));
        assert_eq!(message_id_from_json("{ invalid"), None);
        assert_eq!(message_id_from_json(r#"{"messageId": ""}"#), None);
    }

    #[test]
    fn message_type_fallbacks() {
        assert_eq!(
            message_type_from_json(r#"{"messageType":"form.submitted"}"#),
            "form.submitted"
        );
        assert_eq!(
            message_type_from_json(r#"{"messageId":"r","responseToMessageId":"m"}"#),
            "response"
        );
        assert_eq!(message_type_from_json("garbage"), "unknown");
    }
}
