//! Router configuration codec.
//!
//! Encodes a [`SubscriptionPlan`] in the router's config syntax:
//!
//! ```text
//! connectionTimeout = 20
//!
//! streams {
//!   follows_relay_example_com_1 {
//!     dir = "down"
//!     filter = {"authors":["..."],"kinds":[1]}
//!
//!     urls = [
//!       "wss://relay.example.com"
//!     ]
//!   }
//!
//! }
//! ```

use std::fmt::Write as _;
use std::io;

use serde_json::{Map, Value};

use crate::plan::{StreamSpec, SubscriptionPlan};

/// Seconds the router waits when connecting to a relay.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 20;

#[derive(Clone, Debug)]
pub struct RouterConfigCodec {
    connection_timeout_secs: u64,
}

impl Default for RouterConfigCodec {
    fn default() -> Self {
        Self {
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
        }
    }
}

impl RouterConfigCodec {
    pub fn with_connection_timeout(connection_timeout_secs: u64) -> Self {
        Self { connection_timeout_secs }
    }

    /// Renders the whole plan.
    pub fn encode(&self, plan: &SubscriptionPlan) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "connectionTimeout = {}", self.connection_timeout_secs);
        out.push('\n');
        out.push_str("streams {\n");
        for stream in plan.streams() {
            encode_stream(&mut out, stream);
        }
        out.push_str("}\n");
        out
    }

    /// Renders the plan into `w`.
    pub fn write<W: io::Write>(&self, plan: &SubscriptionPlan, mut w: W) -> io::Result<()> {
        w.write_all(self.encode(plan).as_bytes())?;
        w.flush()
    }
}

fn encode_stream(out: &mut String, stream: &StreamSpec) {
    let _ = writeln!(out, "  {} {{", stream.name);
    let _ = writeln!(out, "    dir = \"{}\"", stream.dir.as_str());
    if let Some(filter) = filter_of(stream) {
        let _ = writeln!(out, "    filter = {filter}");
    }
    out.push('\n');
    out.push_str("    urls = [\n");
    for url in &stream.urls {
        let _ = writeln!(out, "      \"{url}\"");
    }
    out.push_str("    ]\n");
    out.push_str("  }\n\n");
}

/// Filter object for a stream, `None` if it has no predicates at all.
pub fn filter_of(stream: &StreamSpec) -> Option<Value> {
    let mut filter = Map::new();
    if !stream.authors.is_empty() {
        filter.insert("authors".into(), serde_json::json!(stream.authors));
    }
    if let Some(p) = &stream.mentions {
        filter.insert("#p".into(), serde_json::json!([p]));
    }
    if let Some(kinds) = &stream.kinds {
        filter.insert("kinds".into(), serde_json::json!(kinds));
    }
    (!filter.is_empty()).then_some(Value::Object(filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Direction;
    use corelib::{PubKey, RelayUrl};

    fn stream(authors: &[&str], mentions: Option<&str>, kinds: Option<Vec<u32>>) -> StreamSpec {
        StreamSpec {
            name: "s_1".into(),
            dir: Direction::Down,
            authors: authors.iter().map(|a| PubKey::normalize(a)).collect(),
            mentions: mentions.map(PubKey::normalize),
            kinds,
            urls: vec![RelayUrl::parse("wss://a.example").unwrap()],
        }
    }

    #[test]
    fn test_filter_keys() {
        let f = filter_of(&stream(&["aa"], None, Some(vec![0, 1]))).unwrap();
        assert_eq!(f.to_string(), r#"{"authors":["aa"],"kinds":[0,1]}"#);

        let f = filter_of(&stream(&[], Some("bb"), None)).unwrap();
        assert_eq!(f.to_string(), r##"{"#p":["bb"]}"##);

        assert!(filter_of(&stream(&[], None, None)).is_none());
    }

    #[test]
    fn test_encode_layout() {
        let mut plan = SubscriptionPlan::default();
        let relays = vec![RelayUrl::parse("wss://me.example").unwrap()];
        plan.add_user_streams(&format!("{:064x}", 7), &relays, None).unwrap();

        let text = RouterConfigCodec::default().encode(&plan);
        assert!(text.starts_with("connectionTimeout = 20\n\nstreams {\n"));
        assert!(text.contains("  self_outbox_me_example {\n    dir = \"up\"\n"));
        assert!(text.contains("  notifs_inbox_me_example {\n    dir = \"down\"\n    filter = {\"#p\":["));
        assert!(text.contains("    urls = [\n      \"wss://me.example\"\n    ]\n  }\n\n"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_empty_plan() {
        let text = RouterConfigCodec::with_connection_timeout(5).encode(&SubscriptionPlan::default());
        assert_eq!(text, "connectionTimeout = 5\n\nstreams {\n}\n");
    }
}
