//! Liveness fusion.
//!
//! Combines monitor reports into one [`RelayLiveness`] per target relay.
//!
//! # Rules
//!
//! For every report inside the lookback window whose `d` tag canonicalizes
//! to a target:
//! 1. The monitor joins the relay's distinct monitor set
//! 2. `last_checked` becomes the latest observation time
//! 3. Each RTT phase keeps its smallest positive sample
//! 4. If the report is within `frequency * grace_factor` of `now` and has
//!    any positive RTT, the relay is `online`
//!
//! A relay never goes back from `online` within one pass. Relays nobody
//! reported on stay `unknown`.
//!
//! # Thread Safety
//!
//! Records live in a [`DashMap`], so [`LivenessFusion::fold`] takes `&self`
//! and may be called from several tasks at once. Folding is commutative:
//! the finished report does not depend on arrival order.

use std::collections::{BTreeMap, BTreeSet};

use corelib::{RelayUrl, WriteIndex};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::model::{FrequencyTable, LivenessStatus, MonitorReport, RelayLiveness};

/// Default lookback: three days.
pub const DEFAULT_LOOKBACK_SECS: i64 = 3 * 24 * 3600;
/// Default multiple of a monitor's frequency a report stays fresh for.
pub const DEFAULT_GRACE_FACTOR: i64 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FusionConfig {
    /// Reports older than `now - lookback_secs` are ignored.
    pub lookback_secs: i64,
    pub grace_factor: i64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            lookback_secs: DEFAULT_LOOKBACK_SECS,
            grace_factor: DEFAULT_GRACE_FACTOR,
        }
    }
}

impl FusionConfig {
    /// Oldest observation time still considered at `now`.
    pub fn since(&self, now: i64) -> i64 {
        now.saturating_sub(self.lookback_secs)
    }
}

/// What happened to a folded report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FoldOutcome {
    Applied,
    /// The `d` tag names a relay that is not a target.
    UnknownTarget,
    OutsideLookback,
    /// The `d` tag is not a relay URL.
    InvalidTarget,
}

/// Report fusion for one pass at a fixed `now`.
#[derive(Debug)]
pub struct LivenessFusion {
    records: DashMap<RelayUrl, RelayLiveness>,
    frequencies: FrequencyTable,
    config: FusionConfig,
    now: i64,
}

impl LivenessFusion {
    /// Starts a pass with every target `unknown`.
    pub fn new<I>(targets: I, config: FusionConfig, frequencies: FrequencyTable, now: i64) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        let records: DashMap<RelayUrl, RelayLiveness> = targets
            .into_iter()
            .map(|url| (url.clone(), RelayLiveness::new(url)))
            .collect();
        debug!(targets = records.len(), monitors = frequencies.len(), now, "liveness pass started");
        Self {
            records,
            frequencies,
            config,
            now,
        }
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Number of target relays.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Folds one report into the matching target's record.
    pub fn fold(&self, report: &MonitorReport) -> FoldOutcome {
        if report.observed_at < self.config.since(self.now) {
            return FoldOutcome::OutsideLookback;
        }
        let Ok(url) = RelayUrl::parse(&report.target) else {
            trace!(target_tag = %report.target, "report for unparseable relay");
            return FoldOutcome::InvalidTarget;
        };
        let Some(mut record) = self.records.get_mut(&url) else {
            return FoldOutcome::UnknownTarget;
        };

        let frequency = i64::try_from(self.frequencies.frequency(&report.monitor)).unwrap_or(i64::MAX);
        let window = frequency.saturating_mul(self.config.grace_factor);
        let was_online = record.is_online();
        record.apply(report, window, self.now);
        if !was_online && record.is_online() {
            trace!(relay = %url, monitor = %report.monitor, "relay online");
        }
        FoldOutcome::Applied
    }

    /// Snapshot of every record, ordered by URL.
    pub fn finish(&self) -> LivenessReport {
        let relays: BTreeMap<RelayUrl, RelayLiveness> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let report = LivenessReport { relays };
        info!(
            relays = report.len(),
            online = report.count(LivenessStatus::Online),
            unknown = report.count(LivenessStatus::Unknown),
            "liveness pass finished"
        );
        report
    }
}

/// Finished liveness pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LivenessReport {
    relays: BTreeMap<RelayUrl, RelayLiveness>,
}

impl LivenessReport {
    pub fn get(&self, url: &RelayUrl) -> Option<&RelayLiveness> {
        self.relays.get(url)
    }

    /// Records in URL order.
    pub fn iter(&self) -> impl Iterator<Item = &RelayLiveness> {
        self.relays.values()
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn count(&self, status: LivenessStatus) -> usize {
        self.relays.values().filter(|r| r.status == status).count()
    }

    /// Relays judged online.
    pub fn online(&self) -> BTreeSet<RelayUrl> {
        self.relays
            .values()
            .filter(|r| r.is_online())
            .map(|r| r.url.clone())
            .collect()
    }

    /// The index restricted to online relays. `unknown` counts as not
    /// online.
    pub fn online_pairs(&self, index: &WriteIndex) -> WriteIndex {
        let online = self.online();
        index.filter_relays(|url| online.contains(url))
    }
}
