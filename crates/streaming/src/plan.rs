//! Stream partitioning.
//!
//! Each selected relay's author list is split into chunks of at most
//! `chunk_size` authors; each chunk becomes one router stream. Authors that
//! fail the 64-hex check are dropped here. Optional extras: catch-all
//! streams for authors still short of their replica count, and the user's
//! own outbound and mention streams.

use std::collections::BTreeMap;

use corelib::{KeySet, PubKey, RelayUrl};
use replication::Assignment;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PlanError;

/// Default number of authors per stream.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Direction of a router stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Pull matching events from the relays.
    Down,
    /// Push matching local events to the relays.
    Up,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Down => "down",
            Direction::Up => "up",
        }
    }
}

/// One router stream: a filter applied against a set of relays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamSpec {
    pub name: String,
    pub dir: Direction,
    /// `authors` filter; empty means no author restriction.
    pub authors: Vec<PubKey>,
    /// `#p` filter for mention streams.
    pub mentions: Option<PubKey>,
    pub kinds: Option<Vec<u32>>,
    pub urls: Vec<RelayUrl>,
}

impl StreamSpec {
    /// True if the stream carries an author or mention predicate.
    pub fn has_key_filter(&self) -> bool {
        !self.authors.is_empty() || self.mentions.is_some()
    }
}

/// Knobs for [`build_plan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionConfig {
    /// Maximum authors per stream; 0 is treated as 1.
    pub chunk_size: usize,
    /// Prefix for generated stream names.
    pub prefix: String,
    /// Optional event-kind filter copied onto every stream.
    pub kinds: Option<Vec<u32>>,
    /// Add catch-all streams for authors below the replication factor.
    pub include_unassigned: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            prefix: "follows".to_string(),
            kinds: None,
            include_unassigned: false,
        }
    }
}

/// Ordered list of streams for one router.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionPlan {
    streams: Vec<StreamSpec>,
    #[serde(skip)]
    replication_factor: usize,
}

impl SubscriptionPlan {
    pub fn streams(&self) -> &[StreamSpec] {
        &self.streams
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Streams each author appears in (as an `authors` entry).
    pub fn replica_counts(&self) -> BTreeMap<&PubKey, usize> {
        let mut counts = BTreeMap::new();
        for stream in &self.streams {
            for author in &stream.authors {
                *counts.entry(author).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Adds the user's personal streams on each of their relays.
    ///
    /// Per relay: an outbound stream pushing the user's own posts
    /// (`self_outbox_*`) and an inbound stream for events mentioning the
    /// user (`notifs_inbox_*`). Returns the number of streams added.
    pub fn add_user_streams(
        &mut self,
        user: &str,
        relays: &[RelayUrl],
        kinds: Option<&[u32]>,
    ) -> Result<usize, PlanError> {
        let user = PubKey::parse(user).map_err(|_| PlanError::InvalidUserKey(user.trim().to_string()))?;
        if relays.is_empty() {
            warn!(user = user.short(), "no user relays, skipping personal streams");
            return Ok(0);
        }

        let kinds = kinds.map(<[u32]>::to_vec);
        for relay in relays {
            let safe = safe_name(relay);
            self.streams.push(StreamSpec {
                name: format!("self_outbox_{safe}"),
                dir: Direction::Up,
                authors: vec![user.clone()],
                mentions: None,
                kinds: kinds.clone(),
                urls: vec![relay.clone()],
            });
            self.streams.push(StreamSpec {
                name: format!("notifs_inbox_{safe}"),
                dir: Direction::Down,
                authors: Vec::new(),
                mentions: Some(user.clone()),
                kinds: kinds.clone(),
                urls: vec![relay.clone()],
            });
        }
        info!(user = user.short(), relays = relays.len(), "added personal streams");
        Ok(relays.len() * 2)
    }
}

/// Partitions an assignment into router streams.
///
/// `population` is the set of authors the plan is for; it is only consulted
/// for catch-all streams.
pub fn build_plan(assignment: &Assignment, population: &KeySet, config: &PartitionConfig) -> SubscriptionPlan {
    let chunk_size = config.chunk_size.max(1);
    let mut plan = SubscriptionPlan {
        streams: Vec::new(),
        replication_factor: assignment.replication_factor(),
    };

    for (relay, authors) in assignment.iter() {
        let valid: Vec<PubKey> = authors.iter().filter(|a| a.is_valid()).cloned().collect();
        if valid.len() < authors.len() {
            debug!(relay = %relay, dropped = authors.len() - valid.len(), "dropped invalid authors");
        }
        let safe = safe_name(relay);
        for (i, chunk) in valid.chunks(chunk_size).enumerate() {
            plan.streams.push(StreamSpec {
                name: format!("{}_{}_{}", config.prefix, safe, i + 1),
                dir: Direction::Down,
                authors: chunk.to_vec(),
                mentions: None,
                kinds: config.kinds.clone(),
                urls: vec![relay.clone()],
            });
        }
    }

    if config.include_unassigned {
        add_unassigned(&mut plan, assignment.selected(), population, config, chunk_size);
    }

    if plan.is_empty() {
        warn!("subscription plan is empty");
    } else {
        info!(streams = plan.len(), relays = assignment.relay_count(), "subscription plan built");
    }
    plan
}

fn add_unassigned(
    plan: &mut SubscriptionPlan,
    selected: &[RelayUrl],
    population: &KeySet,
    config: &PartitionConfig,
    chunk_size: usize,
) {
    let counts = plan.replica_counts();
    let short: Vec<PubKey> = population
        .iter()
        .filter(|k| k.is_valid())
        .filter(|k| counts.get(k).copied().unwrap_or(0) < plan.replication_factor)
        .cloned()
        .collect();
    if short.is_empty() {
        return;
    }
    if selected.is_empty() {
        warn!(authors = short.len(), "no selected relays to query for unassigned authors");
        return;
    }

    let chunks: Vec<_> = short.chunks(chunk_size).map(<[PubKey]>::to_vec).collect();
    for (i, chunk) in chunks.into_iter().enumerate() {
        plan.streams.push(StreamSpec {
            name: format!("{}_unassigned_{}", config.prefix, i + 1),
            dir: Direction::Down,
            authors: chunk,
            mentions: None,
            kinds: config.kinds.clone(),
            urls: selected.to_vec(),
        });
    }
    info!(authors = short.len(), "added catch-all streams for under-replicated authors");
}

/// Stream-name-safe form of a relay URL: scheme dropped, `:` `/` `.` -> `_`.
pub fn safe_name(relay: &RelayUrl) -> String {
    let s = relay.as_str();
    let s = s
        .strip_prefix("wss://")
        .or_else(|| s.strip_prefix("ws://"))
        .unwrap_or(s);
    s.replace([':', '/', '.'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::WriteIndex;
    use replication::{GreedyStrategy, ReplicationStrategy};

    fn hex(n: u8) -> String {
        format!("{n:064x}")
    }

    #[test]
    fn test_safe_name() {
        let url = RelayUrl::parse("wss://relay.example.com:443/sub").unwrap();
        assert_eq!(safe_name(&url), "relay_example_com_443_sub");
    }

    #[test]
    fn test_chunks_named_per_relay() {
        let pairs: Vec<_> = (0..5).map(|n| (hex(n), "wss://a.example".to_string())).collect();
        let a = GreedyStrategy::new(1).assign(&WriteIndex::from_pairs(pairs));
        let config = PartitionConfig {
            chunk_size: 2,
            ..Default::default()
        };
        let plan = build_plan(&a, &KeySet::new(), &config);

        let names: Vec<_> = plan.streams().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["follows_a_example_1", "follows_a_example_2", "follows_a_example_3"]);
        let sizes: Vec<_> = plan.streams().iter().map(|s| s.authors.len()).collect();
        assert_eq!(sizes, [2, 2, 1]);
    }

    #[test]
    fn test_invalid_authors_dropped() {
        let a = GreedyStrategy::new(1).assign(&WriteIndex::from_pairs([
            (hex(1), "wss://a.example"),
            ("not-hex".to_string(), "wss://a.example"),
        ]));
        let plan = build_plan(&a, &KeySet::new(), &PartitionConfig::default());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.streams()[0].authors, vec![PubKey::normalize(&hex(1))]);
    }

    #[test]
    fn test_unassigned_streams_cover_short_authors() {
        let a = GreedyStrategy::new(2).assign(&WriteIndex::from_pairs([
            (hex(1), "wss://a.example"),
            (hex(1), "wss://b.example"),
            (hex(2), "wss://a.example"),
        ]));
        let population: KeySet = [1, 2, 3].into_iter().map(|n| PubKey::normalize(&hex(n))).collect();
        let config = PartitionConfig {
            include_unassigned: true,
            kinds: Some(vec![1]),
            ..Default::default()
        };
        let plan = build_plan(&a, &population, &config);

        let catch_all = plan.streams().last().unwrap();
        assert_eq!(catch_all.name, "follows_unassigned_1");
        assert_eq!(
            catch_all.authors,
            vec![PubKey::normalize(&hex(2)), PubKey::normalize(&hex(3))]
        );
        assert_eq!(catch_all.urls.len(), 2);
        assert_eq!(catch_all.kinds, Some(vec![1]));
    }

    #[test]
    fn test_user_streams() {
        let mut plan = SubscriptionPlan::default();
        let relays = vec![RelayUrl::parse("wss://me.example").unwrap()];
        assert_eq!(plan.add_user_streams(&hex(9).to_uppercase(), &relays, None), Ok(2));

        let outbox = &plan.streams()[0];
        assert_eq!(outbox.name, "self_outbox_me_example");
        assert_eq!(outbox.dir, Direction::Up);
        let inbox = &plan.streams()[1];
        assert_eq!(inbox.name, "notifs_inbox_me_example");
        assert_eq!(inbox.mentions, Some(PubKey::normalize(&hex(9))));
        assert!(inbox.authors.is_empty());

        assert!(matches!(
            plan.add_user_streams("zz", &relays, None),
            Err(PlanError::InvalidUserKey(_))
        ));
        assert_eq!(plan.add_user_streams(&hex(9), &[], None), Ok(0));
    }
}
