//! Host-unique outbox relay selection.

use std::collections::HashSet;

use crate::endpoint::RelayUrl;
use crate::index::WriteIndex;

/// One relay per distinct host, independent of replica assignment.
///
/// Relays are visited in sorted order and the first relay seen for each
/// host wins, so the result is deterministic and every host is represented
/// by its lexicographically smallest URL.
pub fn unique_by_host(index: &WriteIndex) -> Vec<RelayUrl> {
    let mut seen = HashSet::new();
    index
        .relays()
        .filter(|url| seen.insert(url.host_key()))
        .cloned()
        .collect()
}
