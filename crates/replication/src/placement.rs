//! Relay -> author assignment produced by a replication strategy.

use std::collections::BTreeMap;

use corelib::{PubKey, RelayUrl};

/// Selected relays and the authors assigned to each.
///
/// # Invariants
///
/// - `selected` holds each relay at most once, in the order it was chosen
/// - every relay in `selected` has a sorted, duplicate-free author list
/// - `need[k] + assignment_count(k) == replication_factor` for every author
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assignment {
    replication_factor: usize,
    selected: Vec<RelayUrl>,
    assigned: BTreeMap<RelayUrl, Vec<PubKey>>,
    need: BTreeMap<PubKey, usize>,
}

impl Assignment {
    pub(crate) fn new(replication_factor: usize, need: BTreeMap<PubKey, usize>) -> Self {
        Self {
            replication_factor,
            selected: Vec::new(),
            assigned: BTreeMap::new(),
            need,
        }
    }

    /// Records a selected relay with the authors assigned to it.
    pub(crate) fn push(&mut self, relay: RelayUrl, mut authors: Vec<PubKey>) {
        authors.sort();
        authors.dedup();
        for author in &authors {
            if let Some(n) = self.need.get_mut(author) {
                *n = n.saturating_sub(1);
            }
        }
        self.selected.push(relay.clone());
        self.assigned.insert(relay, authors);
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Relays in selection order.
    pub fn selected(&self) -> &[RelayUrl] {
        &self.selected
    }

    /// Authors assigned to `relay`, sorted.
    pub fn authors_for(&self, relay: &RelayUrl) -> &[PubKey] {
        self.assigned.get(relay).map(Vec::as_slice).unwrap_or_default()
    }

    /// `(relay, authors)` in selection order.
    pub fn iter(&self) -> impl Iterator<Item = (&RelayUrl, &[PubKey])> {
        self.selected.iter().map(move |r| (r, self.authors_for(r)))
    }

    /// Replicas an author still lacks.
    pub fn need(&self, author: &PubKey) -> usize {
        self.need.get(author).copied().unwrap_or(0)
    }

    /// Number of distinct relays `author` is assigned to.
    pub fn assignment_count(&self, author: &PubKey) -> usize {
        self.need
            .get(author)
            .map(|n| self.replication_factor - n)
            .unwrap_or(0)
    }

    /// Authors that ended with fewer than `replication_factor` relays.
    pub fn under_replicated(&self) -> impl Iterator<Item = &PubKey> {
        self.need.iter().filter(|(_, n)| **n > 0).map(|(k, _)| k)
    }

    /// Every author the strategy was asked to place.
    pub fn authors(&self) -> impl Iterator<Item = &PubKey> {
        self.need.keys()
    }

    pub fn relay_count(&self) -> usize {
        self.selected.len()
    }

    /// Total `(relay, author)` assignments.
    pub fn pair_count(&self) -> usize {
        self.assigned.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_decrements_need() {
        let k1 = PubKey::normalize("k1");
        let k2 = PubKey::normalize("k2");
        let need = [(k1.clone(), 2), (k2.clone(), 2)].into_iter().collect();
        let mut a = Assignment::new(2, need);

        let relay = RelayUrl::parse("wss://a.example").unwrap();
        a.push(relay.clone(), vec![k2.clone(), k1.clone(), k1.clone()]);

        assert_eq!(a.authors_for(&relay), &[k1.clone(), k2.clone()]);
        assert_eq!(a.need(&k1), 1);
        assert_eq!(a.assignment_count(&k1), 1);
        assert_eq!(a.under_replicated().count(), 2);
        assert_eq!(a.pair_count(), 2);
    }

    #[test]
    fn test_unknown_relay_has_no_authors() {
        let a = Assignment::default();
        assert!(a.authors_for(&RelayUrl::parse("wss://x.example").unwrap()).is_empty());
        assert!(a.is_empty());
    }
}
