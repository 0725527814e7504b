//! Greedy multi-replica relay selection.
//!
//! Chooses relays one at a time, always taking the relay that covers the
//! most authors still needing a replica. With a replication factor of 1 this
//! is the classic greedy set cover (ln(n) approximation); for higher factors
//! it is a heuristic with no stronger guarantee.
//!
//! # Algorithm
//!
//! 1. Every author starts with `need = R`
//! 2. The marginal gain of a relay is the number of its writers with
//!    `need > 0` that are not already assigned to it
//! 3. Pick the relay with the largest gain; ties go to the smallest URL
//! 4. Assign every needing writer to it and decrement their need
//! 5. Stop when no relay has positive gain or every need is zero
//!
//! # Performance
//!
//! Gains never increase as the run progresses, so candidates live in a
//! priority queue keyed by their last known gain and are re-evaluated lazily
//! when they reach the top. A re-evaluated candidate that still outranks the
//! rest of the queue is the true maximum, which makes the result identical to
//! a full rescan each round.
//!
//! - **Time**: O(s * w) gain evaluations in the worst case, typically far fewer
//!   (s = selected relays, w = writers per relay)
//! - **Space**: O(relays + authors)

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use corelib::{PubKey, RelayUrl, WriteIndex};
use priority_queue::PriorityQueue;
use tracing::{debug, info};

use crate::placement::Assignment;
use crate::strategy::ReplicationStrategy;

/// Queue priority: larger gain first, then smaller URL.
type Rank = (usize, Reverse<RelayUrl>);

/// Greedy multi-replica set cover.
///
/// # Example
///
/// ```rust
/// use corelib::WriteIndex;
/// use replication::{GreedyStrategy, ReplicationStrategy};
///
/// let index = WriteIndex::from_pairs([("k1", "wss://a.example"), ("k2", "wss://a.example")]);
/// let assignment = GreedyStrategy::new(1).assign(&index);
/// assert_eq!(assignment.relay_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct GreedyStrategy {
    /// Distinct relays per author; never below 1.
    replication_factor: usize,
}

impl GreedyStrategy {
    /// Create a greedy strategy. A factor of 0 is clamped to 1.
    pub fn new(replication_factor: usize) -> Self {
        Self {
            replication_factor: replication_factor.max(1),
        }
    }
}

impl Default for GreedyStrategy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ReplicationStrategy for GreedyStrategy {
    fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    fn assign(&self, index: &WriteIndex) -> Assignment {
        let r = self.replication_factor;
        let need: BTreeMap<PubKey, usize> = index.keys().into_iter().map(|k| (k, r)).collect();
        let mut outstanding: usize = need.len() * r;
        let mut assignment = Assignment::new(r, need);

        // Writers already assigned to each relay; only populated on selection.
        let mut assigned: BTreeMap<&RelayUrl, BTreeSet<&PubKey>> = BTreeMap::new();

        let mut queue: PriorityQueue<&RelayUrl, Rank> = PriorityQueue::new();
        for (relay, writers) in index.iter() {
            if !writers.is_empty() {
                queue.push(relay, (writers.len(), Reverse(relay.clone())));
            }
        }

        while outstanding > 0 {
            let Some((relay, _)) = queue.pop() else {
                break;
            };
            let gain = marginal_gain(index, &assignment, assigned.get(relay), relay);
            if gain == 0 {
                // Gains never grow back, drop the candidate for good.
                continue;
            }
            let rank = (gain, Reverse(relay.clone()));
            if queue.peek().is_some_and(|(_, top)| *top > rank) {
                queue.push(relay, rank);
                continue;
            }

            let taken = assigned.entry(relay).or_default();
            let mut authors = Vec::with_capacity(gain);
            for writer in index.writers(relay).into_iter().flatten() {
                if assignment.need(writer) > 0 && taken.insert(writer) {
                    authors.push(writer.clone());
                }
            }
            outstanding -= authors.len();
            debug!(relay = %relay, gain, outstanding, "selected relay");
            assignment.push(relay.clone(), authors);
        }

        info!(
            strategy = self.name(),
            replicas = r,
            relays = assignment.relay_count(),
            pairs = assignment.pair_count(),
            under_replicated = assignment.under_replicated().count(),
            "assignment complete"
        );
        assignment
    }

    fn name(&self) -> &'static str {
        "GreedyStrategy"
    }
}

fn marginal_gain(
    index: &WriteIndex,
    assignment: &Assignment,
    taken: Option<&BTreeSet<&PubKey>>,
    relay: &RelayUrl,
) -> usize {
    index
        .writers(relay)
        .into_iter()
        .flatten()
        .filter(|w| assignment.need(w) > 0)
        .filter(|w| !taken.is_some_and(|t| t.contains(w)))
        .count()
}
