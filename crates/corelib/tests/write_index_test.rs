//! Integration tests for URL canonicalization and write-index construction.
//!
//! # Test Strategy
//!
//! 1. **Canonical form**: idempotence and case/whitespace/slash invariance
//! 2. **Index rules**: exclusion, role filtering, inbox paths
//! 3. **Outbox selection**: host uniqueness, subset of the index
//! 4. **Scenarios**: small hand-built populations with known answers

use corelib::{unique_by_host, ExclusionSet, PubKey, RelayUrl, WriteIndexBuilder};
use proptest::prelude::*;
use std::collections::HashSet;

fn relay_list(pubkey: &str, tags: &[(&str, Option<&str>)]) -> String {
    let tags: Vec<Vec<String>> = tags
        .iter()
        .map(|(url, mode)| {
            let mut t = vec!["r".to_string(), url.to_string()];
            if let Some(m) = mode {
                t.push(m.to_string());
            }
            t
        })
        .collect();
    serde_json::json!({
        "id": "00",
        "pubkey": pubkey,
        "created_at": 1_700_000_000,
        "kind": 10002,
        "tags": tags,
        "content": "",
        "sig": "",
    })
    .to_string()
}

fn arb_host() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9]{0,8}", prop::sample::select(vec!["com", "net", "example"]))
        .prop_map(|(name, tld)| format!("{name}.{tld}"))
}

fn arb_relay() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["ws", "wss"]),
        arb_host(),
        prop::option::of(1u16..9000),
        prop::option::of("[a-z]{1,6}"),
    )
        .prop_map(|(scheme, host, port, path)| {
            let mut s = format!("{scheme}://{host}");
            if let Some(p) = port {
                s.push_str(&format!(":{p}"));
            }
            if let Some(p) = path {
                s.push('/');
                s.push_str(&p);
            }
            s
        })
}

// ============================================================================
// Canonical Form Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_canonicalization_is_idempotent(raw in arb_relay()) {
        let once = RelayUrl::parse(&raw).unwrap();
        let twice = RelayUrl::parse(once.as_str()).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_case_whitespace_and_slash_do_not_matter(
        raw in arb_relay(),
        upper in any::<bool>(),
        pad in "[ \t\n]{0,3}",
        slashes in 0usize..3,
    ) {
        let mut variant = if upper { raw.to_uppercase() } else { raw.clone() };
        variant.push_str(&"/".repeat(slashes));
        let variant = format!("{pad}{variant}{pad}");
        prop_assert_eq!(RelayUrl::parse(&variant).unwrap(), RelayUrl::parse(&raw).unwrap());
    }

    #[test]
    fn prop_excluded_hosts_never_indexed(
        relays in prop::collection::vec(arb_relay(), 1..12),
        excluded_idx in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
    ) {
        let excluded: Vec<String> = excluded_idx.iter().map(|i| i.get(&relays).to_uppercase()).collect();
        let ex = ExclusionSet::from_lines(&excluded);
        let mut b = WriteIndexBuilder::new(&ex);
        let tags: Vec<(&str, Option<&str>)> = relays.iter().map(|r| (r.as_str(), None)).collect();
        b.ingest_line(&relay_list("k", &tags)).unwrap();
        let (index, _) = b.build();
        for url in index.relays() {
            prop_assert!(!ex.excludes(url));
        }
    }

    #[test]
    fn prop_outbox_is_host_unique_subset(relays in prop::collection::vec(arb_relay(), 0..20)) {
        let ex = ExclusionSet::new();
        let mut b = WriteIndexBuilder::new(&ex);
        let tags: Vec<(&str, Option<&str>)> = relays.iter().map(|r| (r.as_str(), Some("write"))).collect();
        b.ingest_line(&relay_list("k", &tags)).unwrap();
        let (index, _) = b.build();

        let outbox = unique_by_host(&index);
        let hosts: HashSet<_> = outbox.iter().map(RelayUrl::host_key).collect();
        prop_assert_eq!(hosts.len(), outbox.len());
        for url in &outbox {
            prop_assert!(index.writers(url).is_some());
        }
        let all_hosts: HashSet<_> = index.relays().map(RelayUrl::host_key).collect();
        prop_assert_eq!(all_hosts.len(), outbox.len());
    }
}

// ============================================================================
// Index Rule Tests
// ============================================================================

#[test]
fn test_role_filtering() {
    // read never contributes; write and unmarked always do
    let ex = ExclusionSet::new();
    let mut b = WriteIndexBuilder::new(&ex);
    b.ingest_line(&relay_list(
        "k1",
        &[
            ("wss://w.example", Some("write")),
            ("wss://u.example", None),
            ("wss://r.example", Some("read")),
        ],
    ))
    .unwrap();
    let (index, stats) = b.build();

    assert!(index.writers(&RelayUrl::parse("wss://w.example").unwrap()).is_some());
    assert!(index.writers(&RelayUrl::parse("wss://u.example").unwrap()).is_some());
    assert!(index.writers(&RelayUrl::parse("wss://r.example").unwrap()).is_none());
    assert_eq!(stats.tags_read_only, 1);
}

#[test]
fn test_bad_record_does_not_abort_batch() {
    // One malformed line in the middle; both neighbours still land
    let ex = ExclusionSet::new();
    let mut b = WriteIndexBuilder::new(&ex);
    let lines = [
        relay_list("k1", &[("wss://a.example", None)]),
        r#"{"pubkey":"k9","kind":10002,"tags":[["r",1]]}"#.to_string(),
        relay_list("k2", &[("wss://a.example", None)]),
    ];
    let results: Vec<_> = lines.iter().map(|l| b.ingest_line(l)).collect();
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());

    let (index, stats) = b.build();
    assert_eq!(index.pair_count(), 2);
    assert_eq!(stats.skipped_undecodable, 1);
}

#[test]
fn test_exclusion_case_insensitivity() {
    let ex = ExclusionSet::from_lines(["WSS://BAD.EXAMPLE/"]);
    let mut b = WriteIndexBuilder::new(&ex);
    b.ingest_line(&relay_list(
        "k1",
        &[("wss://bad.example", None), ("wss://bad.example/x", None), ("wss://ok.example", None)],
    ))
    .unwrap();
    let (index, stats) = b.build();
    assert_eq!(index.len(), 1);
    assert_eq!(stats.tags_excluded, 2);
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[test]
fn test_scenario_shared_write_relay() {
    // k1..k3 write to a.example; k1 reads from b.example only
    let ex = ExclusionSet::new();
    let mut b = WriteIndexBuilder::new(&ex);
    b.ingest_line(&relay_list("k1", &[("wss://a.example", Some("write")), ("wss://b.example", Some("read"))]))
        .unwrap();
    b.ingest_line(&relay_list("k2", &[("wss://a.example", None)])).unwrap();
    b.ingest_line(&relay_list("k3", &[("wss://a.example", Some("write"))])).unwrap();
    let (index, _) = b.build();

    assert_eq!(index.len(), 1);
    let a = RelayUrl::parse("wss://a.example").unwrap();
    let writers: Vec<_> = index.writers(&a).unwrap().iter().map(PubKey::as_str).collect();
    assert_eq!(writers, ["k1", "k2", "k3"]);
    assert_eq!(unique_by_host(&index), vec![a]);
}
