//! Monitor events and per-relay liveness records.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use corelib::event::{leading_int, KIND_MONITOR_ANNOUNCEMENT, KIND_RELAY_DISCOVERY};
use corelib::{Event, RelayUrl};
use serde::Serialize;

/// Probe interval assumed for monitors that do not announce one.
pub const DEFAULT_FREQUENCY_SECS: u64 = 3600;

/// Liveness verdict for one relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessStatus {
    Online,
    /// Reserved; fusion never produces it.
    Offline,
    Unknown,
}

impl LivenessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessStatus::Online => "online",
            LivenessStatus::Offline => "offline",
            LivenessStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LivenessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitor's declared probe interval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorAnnouncement {
    pub monitor: String,
    pub frequency_secs: u64,
    pub announced_at: i64,
}

impl MonitorAnnouncement {
    /// Decodes a monitor announcement event; `None` for any other kind.
    ///
    /// A missing or non-positive `frequency` falls back to
    /// [`DEFAULT_FREQUENCY_SECS`].
    pub fn from_event(ev: &Event) -> Option<Self> {
        if ev.kind != KIND_MONITOR_ANNOUNCEMENT {
            return None;
        }
        let frequency = ev.first_tag_value("frequency").map(leading_int).unwrap_or(0);
        Some(Self {
            monitor: ev.pubkey.to_lowercase(),
            frequency_secs: u64::try_from(frequency)
                .ok()
                .filter(|f| *f > 0)
                .unwrap_or(DEFAULT_FREQUENCY_SECS),
            announced_at: ev.created_at,
        })
    }
}

/// One monitor's observation of one relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorReport {
    pub monitor: String,
    /// Raw `d` tag; canonicalized during fusion.
    pub target: String,
    pub observed_at: i64,
    pub rtt_open: Option<u64>,
    pub rtt_read: Option<u64>,
    pub rtt_write: Option<u64>,
}

impl MonitorReport {
    /// Decodes a relay discovery event; `None` for other kinds or when the
    /// `d` tag is missing.
    ///
    /// RTT tags may repeat; the smallest positive value per phase is kept.
    pub fn from_event(ev: &Event) -> Option<Self> {
        if ev.kind != KIND_RELAY_DISCOVERY {
            return None;
        }
        let target = ev.first_tag_value("d")?.to_string();
        Some(Self {
            monitor: ev.pubkey.to_lowercase(),
            target,
            observed_at: ev.created_at,
            rtt_open: min_rtt(ev, "rtt-open"),
            rtt_read: min_rtt(ev, "rtt-read"),
            rtt_write: min_rtt(ev, "rtt-write"),
        })
    }

    /// True if at least one phase carries a positive RTT.
    pub fn has_rtt(&self) -> bool {
        self.rtt_open.is_some() || self.rtt_read.is_some() || self.rtt_write.is_some()
    }
}

fn min_rtt(ev: &Event, tag: &str) -> Option<u64> {
    ev.tags_named(tag)
        .filter_map(|t| u64::try_from(leading_int(&t[1])).ok())
        .filter(|v| *v > 0)
        .min()
}

/// Monitor -> probe interval, built from announcements.
#[derive(Clone, Debug, Default)]
pub struct FrequencyTable {
    entries: HashMap<String, (u64, i64)>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an announcement; the most recent one per monitor wins.
    pub fn insert(&mut self, announcement: &MonitorAnnouncement) {
        let entry = self
            .entries
            .entry(announcement.monitor.clone())
            .or_insert((announcement.frequency_secs, announcement.announced_at));
        if announcement.announced_at >= entry.1 {
            *entry = (announcement.frequency_secs, announcement.announced_at);
        }
    }

    /// Probe interval for `monitor`, the default if it never announced.
    pub fn frequency(&self, monitor: &str) -> u64 {
        self.entries
            .get(monitor)
            .map(|(freq, _)| *freq)
            .unwrap_or(DEFAULT_FREQUENCY_SECS)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<&'a MonitorAnnouncement> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item = &'a MonitorAnnouncement>>(iter: I) -> Self {
        let mut table = Self::new();
        for announcement in iter {
            table.insert(announcement);
        }
        table
    }
}

/// Fused liveness of one relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelayLiveness {
    pub url: RelayUrl,
    pub status: LivenessStatus,
    pub rtt_open: Option<u64>,
    pub rtt_read: Option<u64>,
    pub rtt_write: Option<u64>,
    /// Distinct monitors that reported on this relay.
    pub monitors: BTreeSet<String>,
    /// Reports applied, including repeats from the same monitor.
    pub reports: usize,
    pub last_checked: Option<i64>,
}

impl RelayLiveness {
    pub fn new(url: RelayUrl) -> Self {
        Self {
            url,
            status: LivenessStatus::Unknown,
            rtt_open: None,
            rtt_read: None,
            rtt_write: None,
            monitors: BTreeSet::new(),
            reports: 0,
            last_checked: None,
        }
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_online(&self) -> bool {
        self.status == LivenessStatus::Online
    }

    /// Folds one report in. `window_secs` is the freshness window of the
    /// reporting monitor.
    pub(crate) fn apply(&mut self, report: &MonitorReport, window_secs: i64, now: i64) {
        self.reports += 1;
        self.monitors.insert(report.monitor.clone());
        self.last_checked = Some(
            self.last_checked
                .map_or(report.observed_at, |t| t.max(report.observed_at)),
        );
        keep_min(&mut self.rtt_open, report.rtt_open);
        keep_min(&mut self.rtt_read, report.rtt_read);
        keep_min(&mut self.rtt_write, report.rtt_write);

        let recent = report.observed_at >= now.saturating_sub(window_secs);
        if recent && report.has_rtt() {
            self.status = LivenessStatus::Online;
        }
    }
}

fn keep_min(slot: &mut Option<u64>, sample: Option<u64>) {
    if let Some(v) = sample.filter(|v| *v > 0) {
        *slot = Some(slot.map_or(v, |current| current.min(v)));
    }
}
