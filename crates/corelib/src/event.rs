//! Signed event envelopes.
//!
//! Only the fields the planner reads are interpreted; signatures are not
//! verified.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Relay list metadata (outbox/inbox declarations).
pub const KIND_RELAY_LIST: u32 = 10002;
/// Relay monitor announcement.
pub const KIND_MONITOR_ANNOUNCEMENT: u32 = 10166;
/// Relay discovery report published by a monitor.
pub const KIND_RELAY_DISCOVERY: u32 = 30166;

/// Event as it appears on the wire and in JSONL dumps.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    pub pubkey: String,
    #[serde(default)]
    pub created_at: i64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// Decodes one JSON object.
    pub fn from_json(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::MalformedEvent(e.to_string()))
    }

    /// Tags whose name is `name` and that carry at least one value.
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [String]> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.len() >= 2 && t[0] == name)
            .map(|t| t.as_slice())
    }

    /// First value of the first tag called `name`.
    pub fn first_tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.len() >= 2 && t[0] == name)
            .map(|t| t[1].as_str())
    }
}

/// Parses the leading decimal integer of a tag value, `0` if there is none.
///
/// Monitors are not strict about formatting (`"120ms"`, `" 45"`), so this
/// reads as much of a signed integer as it can.
pub fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits.bytes().take_while(u8::is_ascii_digit).count();
    let value = digits[..end].parse::<i64>().unwrap_or(0);
    if negative {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_minimal_event() {
        let ev = Event::from_json(r#"{"pubkey":"AB","kind":10002,"tags":[["r","wss://x"],["p"]]}"#)
            .unwrap();
        assert_eq!(ev.kind, KIND_RELAY_LIST);
        assert_eq!(ev.tags_named("r").count(), 1);
        assert_eq!(ev.tags_named("p").count(), 0);
        assert_eq!(ev.first_tag_value("r"), Some("wss://x"));
    }

    #[test]
    fn test_first_tag_value_outlives_name() {
        let ev = Event::from_json(r#"{"pubkey":"a","kind":30166,"tags":[["d"],["d","wss://r/"],["d","x"]]}"#).unwrap();
        let value = {
            let name = String::from("d");
            ev.first_tag_value(&name)
        };
        assert_eq!(value, Some("wss://r/"));
        assert_eq!(ev.first_tag_value("missing"), None);
    }

    #[test]
    fn test_decode_rejects_bad_tags() {
        assert!(Event::from_json(r#"{"pubkey":"a","kind":10002,"tags":"nope"}"#).is_err());
        assert!(Event::from_json("{not json").is_err());
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int("120"), 120);
        assert_eq!(leading_int(" 45ms"), 45);
        assert_eq!(leading_int("-3"), -3);
        assert_eq!(leading_int("abc"), 0);
        assert_eq!(leading_int(""), 0);
    }
}
