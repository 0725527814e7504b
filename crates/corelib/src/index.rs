//! Write index: relay -> set of pubkeys that declared it as a write relay.
//!
//! The index is assembled by a [`WriteIndexBuilder`] from relay-list
//! events and frozen into an immutable [`WriteIndex`]. Every record goes
//! through a fallible per-record transform; a bad record is counted and
//! skipped, never propagated.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::endpoint::{ExclusionSet, RelayUrl};
use crate::error::SkipReason;
use crate::event::{Event, KIND_RELAY_LIST};
use crate::key::{KeySet, PubKey};

/// Per-run counters for index construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub records_seen: usize,
    pub records_indexed: usize,
    pub skipped_not_object: usize,
    pub skipped_undecodable: usize,
    pub skipped_wrong_kind: usize,
    pub tags_invalid_url: usize,
    pub tags_excluded: usize,
    pub tags_inbox: usize,
    pub tags_read_only: usize,
}

impl IndexStats {
    pub fn records_skipped(&self) -> usize {
        self.skipped_not_object + self.skipped_undecodable + self.skipped_wrong_kind
    }

    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::NotAnObject => self.skipped_not_object += 1,
            SkipReason::Undecodable => self.skipped_undecodable += 1,
            SkipReason::WrongKind => self.skipped_wrong_kind += 1,
        }
    }
}

/// What happened to one `r` tag.
enum TagOutcome {
    Indexed(RelayUrl),
    InvalidUrl,
    Excluded,
    Inbox,
    ReadOnly,
}

/// Accumulates write-relay memberships for one analysis run.
#[derive(Debug)]
pub struct WriteIndexBuilder<'a> {
    exclusions: &'a ExclusionSet,
    map: BTreeMap<RelayUrl, BTreeSet<PubKey>>,
    stats: IndexStats,
}

impl<'a> WriteIndexBuilder<'a> {
    pub fn new(exclusions: &'a ExclusionSet) -> Self {
        Self {
            exclusions,
            map: BTreeMap::new(),
            stats: IndexStats::default(),
        }
    }

    /// Ingests one line of a JSONL dump.
    ///
    /// Returns the number of new memberships added, or why the line was
    /// skipped.
    pub fn ingest_line(&mut self, line: &str) -> Result<usize, SkipReason> {
        let line = line.trim();
        let outcome = if line.is_empty() || !line.starts_with('{') {
            Err(SkipReason::NotAnObject)
        } else {
            match Event::from_json(line) {
                Ok(ev) => return self.ingest_event(&ev),
                Err(e) => {
                    trace!(error = %e, "skipping undecodable record");
                    Err(SkipReason::Undecodable)
                }
            }
        };
        self.stats.records_seen += 1;
        if let Err(reason) = outcome {
            self.skip(reason);
        }
        outcome
    }

    /// Ingests one raw line. Bytes that are not UTF-8 count as an
    /// undecodable record.
    pub fn ingest_bytes(&mut self, line: &[u8]) -> Result<usize, SkipReason> {
        match std::str::from_utf8(line) {
            Ok(line) => self.ingest_line(line),
            Err(e) => {
                trace!(error = %e, "skipping record that is not utf-8");
                self.stats.records_seen += 1;
                self.skip(SkipReason::Undecodable);
                Err(SkipReason::Undecodable)
            }
        }
    }

    /// Ingests a decoded event.
    pub fn ingest_event(&mut self, ev: &Event) -> Result<usize, SkipReason> {
        self.stats.records_seen += 1;
        if ev.kind != KIND_RELAY_LIST {
            self.skip(SkipReason::WrongKind);
            return Err(SkipReason::WrongKind);
        }

        let key = PubKey::normalize(&ev.pubkey);
        let mut added = 0;
        for tag in ev.tags_named("r") {
            match self.classify(tag) {
                TagOutcome::Indexed(url) => {
                    if self.map.entry(url).or_default().insert(key.clone()) {
                        added += 1;
                    }
                }
                TagOutcome::InvalidUrl => self.stats.tags_invalid_url += 1,
                TagOutcome::Excluded => self.stats.tags_excluded += 1,
                TagOutcome::Inbox => self.stats.tags_inbox += 1,
                TagOutcome::ReadOnly => self.stats.tags_read_only += 1,
            }
        }
        self.stats.records_indexed += 1;
        Ok(added)
    }

    fn classify(&self, tag: &[String]) -> TagOutcome {
        let url = match RelayUrl::parse(&tag[1]) {
            Ok(url) => url,
            Err(e) => {
                trace!(raw = %tag[1], error = %e, "skipping relay tag");
                return TagOutcome::InvalidUrl;
            }
        };
        if self.exclusions.excludes(&url) {
            return TagOutcome::Excluded;
        }
        if url.is_inbox() {
            return TagOutcome::Inbox;
        }
        // No marker means the relay is used for both directions.
        let mode = tag.get(2).map(|m| m.trim().to_lowercase()).unwrap_or_default();
        match mode.as_str() {
            "" | "write" => TagOutcome::Indexed(url),
            _ => TagOutcome::ReadOnly,
        }
    }

    fn skip(&mut self, reason: SkipReason) {
        self.stats.record_skip(reason);
        metrics::counter!("relayplan_index_records_skipped_total").increment(1);
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Freezes the index.
    pub fn build(self) -> (WriteIndex, IndexStats) {
        let index = WriteIndex { map: self.map };
        debug!(
            relays = index.len(),
            pubkeys = index.keys().len(),
            records = self.stats.records_seen,
            skipped = self.stats.records_skipped(),
            "write index built"
        );
        (index, self.stats)
    }
}

/// Immutable relay -> writers mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteIndex {
    map: BTreeMap<RelayUrl, BTreeSet<PubKey>>,
}

impl WriteIndex {
    /// Rebuilds an index from `(pubkey, relay)` pairs.
    ///
    /// Relays that fail canonicalization are dropped; keys are normalized.
    pub fn from_pairs<I, K, U>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, U)>,
        K: AsRef<str>,
        U: AsRef<str>,
    {
        let mut map: BTreeMap<RelayUrl, BTreeSet<PubKey>> = BTreeMap::new();
        for (key, raw) in pairs {
            let Ok(url) = RelayUrl::parse(raw.as_ref()) else {
                continue;
            };
            map.entry(url).or_default().insert(PubKey::normalize(key.as_ref()));
        }
        Self { map }
    }

    /// Every membership as a sorted `(pubkey, relay)` list.
    pub fn pairs(&self) -> Vec<(PubKey, RelayUrl)> {
        let mut pairs: Vec<_> = self
            .map
            .iter()
            .flat_map(|(url, keys)| keys.iter().map(move |k| (k.clone(), url.clone())))
            .collect();
        pairs.sort();
        pairs
    }

    /// Keeps only memberships of keys in `population`; relays left with no
    /// writers are dropped.
    pub fn restrict_to(&self, population: &KeySet) -> Self {
        let map = self
            .map
            .iter()
            .filter_map(|(url, keys)| {
                let kept: BTreeSet<PubKey> = keys.intersection(population).cloned().collect();
                (!kept.is_empty()).then(|| (url.clone(), kept))
            })
            .collect();
        Self { map }
    }

    /// Keeps only relays accepted by `keep`.
    pub fn filter_relays<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&RelayUrl) -> bool,
    {
        let map = self
            .map
            .iter()
            .filter(|(url, _)| keep(url))
            .map(|(url, keys)| (url.clone(), keys.clone()))
            .collect();
        Self { map }
    }

    /// Writers declared for `url`.
    pub fn writers(&self, url: &RelayUrl) -> Option<&BTreeSet<PubKey>> {
        self.map.get(url)
    }

    /// Relays in sorted order.
    pub fn relays(&self) -> impl Iterator<Item = &RelayUrl> {
        self.map.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelayUrl, &BTreeSet<PubKey>)> {
        self.map.iter()
    }

    /// All distinct keys appearing anywhere in the index.
    pub fn keys(&self) -> KeySet {
        self.map.values().flatten().cloned().collect()
    }

    /// Number of relays `key` writes to.
    pub fn degree(&self, key: &PubKey) -> usize {
        self.map.values().filter(|keys| keys.contains(key)).count()
    }

    /// Number of relays.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Total memberships.
    pub fn pair_count(&self) -> usize {
        self.map.values().map(BTreeSet::len).sum()
    }
}
