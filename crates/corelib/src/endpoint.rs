//! Relay URL canonicalization.
//!
//! Relays are identified by a canonical websocket URL. Canonical form is:
//! lowercase, `ws://` or `wss://`, no query or fragment, non-empty host and
//! no trailing slash. The port is kept in the URL itself, but the
//! [`HostKey`] used for exclusion and deduplication drops it.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::UrlError;

/// Canonical relay URL.
///
/// Ordering and equality are those of the canonical string, so sorted
/// collections of `RelayUrl` are byte-wise deterministic.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct RelayUrl(String);

impl RelayUrl {
    /// Parses and canonicalizes a raw relay URL.
    ///
    /// Rules, in order: trim whitespace, lowercase, require `ws`/`wss`,
    /// reject query strings and fragments, require a host, strip trailing
    /// slashes.
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let lowered = raw.trim().to_lowercase();
        if lowered.is_empty() || lowered == "/" {
            return Err(UrlError::Empty);
        }

        let (scheme, rest) = split_scheme(&lowered).ok_or(UrlError::UnsupportedScheme)?;
        if rest.contains(['?', '#']) {
            return Err(UrlError::QueryOrFragment);
        }
        if rest.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(UrlError::Malformed(raw.trim().to_string()));
        }

        let (authority, path) = split_authority(rest);
        validate_authority(authority)?;

        let path = path.trim_end_matches('/');
        Ok(Self(format!("{scheme}://{authority}{path}")))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `ws` or `wss`.
    pub fn scheme(&self) -> &str {
        split_scheme(&self.0).map(|(s, _)| s).unwrap_or_default()
    }

    /// Authority component (`host[:port]`).
    pub fn authority(&self) -> &str {
        self.rest().map(|r| split_authority(r).0).unwrap_or_default()
    }

    /// Path component, empty for bare hosts.
    pub fn path(&self) -> &str {
        self.rest().map(|r| split_authority(r).1).unwrap_or_default()
    }

    /// Hostname without port (IPv6 brackets removed).
    pub fn host(&self) -> &str {
        host_of_authority(self.authority())
    }

    /// Explicit port, if one was given.
    pub fn port(&self) -> Option<u16> {
        port_of_authority(self.authority()).and_then(|p| p.parse().ok())
    }

    /// Deduplication key for this relay.
    pub fn host_key(&self) -> HostKey {
        HostKey(self.host().to_string())
    }

    /// True if the canonical URL contains `/inbox` anywhere, so
    /// `wss://inbox.example` counts as well as `wss://r.example/inbox`.
    pub fn is_inbox(&self) -> bool {
        self.0.contains("/inbox")
    }

    /// Form used in monitor `d` tags: canonical URL plus one trailing slash.
    pub fn dtag(&self) -> String {
        format!("{}/", self.0)
    }

    fn rest(&self) -> Option<&str> {
        split_scheme(&self.0).map(|(_, r)| r)
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RelayUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for RelayUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn split_scheme(s: &str) -> Option<(&'static str, &str)> {
    if let Some(rest) = s.strip_prefix("wss://") {
        Some(("wss", rest))
    } else {
        s.strip_prefix("ws://").map(|rest| ("ws", rest))
    }
}

fn split_authority(rest: &str) -> (&str, &str) {
    match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    }
}

fn validate_authority(authority: &str) -> Result<(), UrlError> {
    if authority.is_empty() {
        return Err(UrlError::MissingHost);
    }
    if authority.contains('@') {
        return Err(UrlError::Malformed(format!("userinfo in {authority}")));
    }

    if let Some(inner) = authority.strip_prefix('[') {
        let close = inner
            .find(']')
            .ok_or_else(|| UrlError::Malformed(format!("unclosed bracket in {authority}")))?;
        if close == 0 {
            return Err(UrlError::MissingHost);
        }
        return match &inner[close + 1..] {
            "" => Ok(()),
            tail => match tail.strip_prefix(':') {
                Some(port) => validate_port(port, authority),
                None => Err(UrlError::Malformed(format!("garbage after host in {authority}"))),
            },
        };
    }

    if authority.contains(['[', ']']) {
        return Err(UrlError::Malformed(format!("stray bracket in {authority}")));
    }
    let host = host_of_authority(authority);
    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }
    match port_of_authority(authority) {
        Some(port) => validate_port(port, authority),
        None => Ok(()),
    }
}

fn validate_port(port: &str, authority: &str) -> Result<(), UrlError> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) || port.parse::<u16>().is_err() {
        return Err(UrlError::Malformed(format!("bad port in {authority}")));
    }
    Ok(())
}

fn host_of_authority(authority: &str) -> &str {
    if let Some(inner) = authority.strip_prefix('[') {
        return inner.split(']').next().unwrap_or_default();
    }
    authority.split(':').next().unwrap_or_default()
}

fn port_of_authority(authority: &str) -> Option<&str> {
    if let Some(inner) = authority.strip_prefix('[') {
        return inner.split_once(']').and_then(|(_, tail)| tail.strip_prefix(':'));
    }
    authority.split_once(':').map(|(_, port)| port)
}

/// Hostname used to group relays that live on the same machine.
///
/// Never used for addressing. The port is not part of the key, so
/// `wss://a.example:443` and `wss://a.example:8080` share a host key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct HostKey(String);

impl HostKey {
    /// Extracts a host key from a loosely formatted string.
    ///
    /// Accepts bare hosts as well as URLs: the scheme, path, query, fragment
    /// and port are all stripped. Returns `None` when nothing is left.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let s = lowered
            .strip_prefix("wss://")
            .or_else(|| lowered.strip_prefix("ws://"))
            .unwrap_or(&lowered);
        let s = s.trim_end_matches('/');
        let authority = match s.find(['/', '?', '#']) {
            Some(i) => &s[..i],
            None => s,
        };
        let host = host_of_authority(authority);
        if host.is_empty() {
            None
        } else {
            Some(Self(host.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hosts that must never be used as write targets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExclusionSet(BTreeSet<HostKey>);

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from raw lines; blank lines and `#` comments are ignored.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = lines
            .into_iter()
            .filter(|l| !l.as_ref().trim_start().starts_with('#'))
            .filter_map(|l| HostKey::from_raw(l.as_ref()))
            .collect();
        Self(hosts)
    }

    pub fn contains(&self, host: &HostKey) -> bool {
        self.0.contains(host)
    }

    /// True if the relay's host is excluded.
    pub fn excludes(&self, url: &RelayUrl) -> bool {
        self.contains(&url.host_key())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(s: &str) -> String {
        RelayUrl::parse(s).unwrap().to_string()
    }

    #[test]
    fn test_valid_urls() {
        let cases = [
            ("ws://relay.example.com", "ws://relay.example.com"),
            ("wss://relay.example.com:443", "wss://relay.example.com:443"),
            ("wss://relay.example.com/nested/path", "wss://relay.example.com/nested/path"),
            ("ws://relay.example.com/", "ws://relay.example.com"),
            ("wss://relay.example.com/path/", "wss://relay.example.com/path"),
            ("Ws://ReLaY.ExAmPlE.CoM", "ws://relay.example.com"),
            ("\n  ws://relay.example.com \n", "ws://relay.example.com"),
            ("wss://localhost:8443", "wss://localhost:8443"),
            ("ws://192.168.1.1", "ws://192.168.1.1"),
            ("wss://[::1]:7777", "wss://[::1]:7777"),
        ];
        for (input, expected) in cases {
            assert_eq!(canon(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_invalid_urls() {
        let cases = [
            ("", UrlError::Empty),
            ("   ", UrlError::Empty),
            ("http://relay.example.com", UrlError::UnsupportedScheme),
            ("https://relay.example.com", UrlError::UnsupportedScheme),
            ("relay.example.com", UrlError::UnsupportedScheme),
            ("://invalid", UrlError::UnsupportedScheme),
            ("ws://relay.example.com?param=value", UrlError::QueryOrFragment),
            ("ws://relay.example.com#fragment", UrlError::QueryOrFragment),
            ("ws://", UrlError::MissingHost),
            ("ws:///path", UrlError::MissingHost),
        ];
        for (input, expected) in cases {
            assert_eq!(RelayUrl::parse(input), Err(expected), "input {input:?}");
        }
        assert!(matches!(RelayUrl::parse("ws://[invalid"), Err(UrlError::Malformed(_))));
        assert!(matches!(RelayUrl::parse("ws://a.example:port"), Err(UrlError::Malformed(_))));
        assert!(matches!(RelayUrl::parse("ws://a.example:"), Err(UrlError::Malformed(_))));
    }

    #[test]
    fn test_components() {
        let url = RelayUrl::parse("wss://Relay.Example.com:8080/sub/inbox").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host(), "relay.example.com");
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.path(), "/sub/inbox");
        assert!(url.is_inbox());
        assert_eq!(url.host_key().as_str(), "relay.example.com");

        assert!(RelayUrl::parse("wss://inbox.example").unwrap().is_inbox());
        assert!(!RelayUrl::parse("wss://my-inbox.example/feed").unwrap().is_inbox());

        let v6 = RelayUrl::parse("ws://[fe80::1]").unwrap();
        assert_eq!(v6.host(), "fe80::1");
        assert_eq!(v6.port(), None);
    }

    #[test]
    fn test_dtag_has_single_trailing_slash() {
        let url = RelayUrl::parse("wss://relay.example.com/").unwrap();
        assert_eq!(url.dtag(), "wss://relay.example.com/");
        assert_eq!(RelayUrl::parse(&url.dtag()).unwrap(), url);
    }

    #[test]
    fn test_host_key_ignores_port() {
        let a = RelayUrl::parse("wss://a.example:443").unwrap();
        let b = RelayUrl::parse("wss://a.example:8080").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.host_key(), b.host_key());
    }

    #[test]
    fn test_exclusion_case_insensitive() {
        let ex = ExclusionSet::from_lines(["WSS://BAD.EXAMPLE/", "# comment", "", "other.example"]);
        assert_eq!(ex.len(), 2);
        assert!(ex.excludes(&RelayUrl::parse("wss://bad.example").unwrap()));
        assert!(ex.excludes(&RelayUrl::parse("wss://bad.example/x").unwrap()));
        assert!(ex.excludes(&RelayUrl::parse("ws://bad.example:7000").unwrap()));
        assert!(ex.excludes(&RelayUrl::parse("ws://other.example").unwrap()));
        assert!(!ex.excludes(&RelayUrl::parse("wss://good.example").unwrap()));
    }
}
