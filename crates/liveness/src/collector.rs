//! Concurrent acquisition from monitor sources.
//!
//! Runs in two phases, each source under its own deadline:
//! 1. **Announcements**: every source is asked for monitor frequencies
//! 2. **Reports**: every source streams reports for the target `d` tags;
//!    each source's reports are folded by their own task as they arrive
//!
//! A source that fails or runs out of time contributes whatever it sent
//! before that point and is otherwise ignored.

use std::sync::Arc;
use std::time::Duration;

use corelib::RelayUrl;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::fusion::{FoldOutcome, FusionConfig, LivenessFusion, LivenessReport};
use crate::model::{FrequencyTable, MonitorAnnouncement};
use crate::source::{MonitorSource, ReportQuery};

/// Default per-source deadline.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

const REPORT_CHANNEL_CAPACITY: usize = 256;

/// What one source contributed to a pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    pub announcements: usize,
    pub received: usize,
    pub applied: usize,
    pub unknown_target: usize,
    pub outside_lookback: usize,
    pub invalid_target: usize,
    /// Last failure, including timeouts.
    pub error: Option<String>,
}

impl SourceSummary {
    fn record(&mut self, outcome: FoldOutcome) {
        self.received += 1;
        match outcome {
            FoldOutcome::Applied => self.applied += 1,
            FoldOutcome::UnknownTarget => self.unknown_target += 1,
            FoldOutcome::OutsideLookback => self.outside_lookback += 1,
            FoldOutcome::InvalidTarget => self.invalid_target += 1,
        }
    }
}

/// Outcome of [`MonitorCollector::collect`].
#[derive(Clone, Debug, Default)]
pub struct CollectionSummary {
    pub report: LivenessReport,
    /// Distinct monitors with an announced frequency.
    pub monitors: usize,
    pub sources: Vec<SourceSummary>,
}

/// Drives a set of [`MonitorSource`]s into one liveness pass.
pub struct MonitorCollector {
    sources: Vec<Arc<dyn MonitorSource>>,
    timeout: Duration,
    config: FusionConfig,
}

impl MonitorCollector {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            sources: Vec::new(),
            timeout: DEFAULT_SOURCE_TIMEOUT,
            config,
        }
    }

    /// Per-source deadline, applied separately to each phase.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn MonitorSource>) {
        self.sources.push(source);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Runs both phases for `targets` and returns the fused report.
    pub async fn collect(&self, targets: &[RelayUrl], now: i64) -> CollectionSummary {
        let mut summaries: Vec<SourceSummary> = self
            .sources
            .iter()
            .map(|s| SourceSummary {
                source: s.name().to_string(),
                ..Default::default()
            })
            .collect();

        let frequencies = self.gather_announcements(&mut summaries).await;
        let monitors = frequencies.len();
        info!(sources = self.sources.len(), monitors, "monitor announcements gathered");

        let query = Arc::new(ReportQuery::new(
            targets.iter().map(RelayUrl::dtag).collect(),
            self.config.since(now),
        ));
        let fusion = Arc::new(LivenessFusion::new(
            targets.iter().cloned(),
            self.config,
            frequencies,
            now,
        ));

        let mut tasks = JoinSet::new();
        for (i, source) in self.sources.iter().enumerate() {
            let source = Arc::clone(source);
            let query = Arc::clone(&query);
            let fusion = Arc::clone(&fusion);
            let deadline = self.timeout;
            tasks.spawn(async move { (i, drain_source(source, query, fusion, deadline).await) });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, drained)) => {
                    let summary = &mut summaries[i];
                    summary.received += drained.received;
                    summary.applied += drained.applied;
                    summary.unknown_target += drained.unknown_target;
                    summary.outside_lookback += drained.outside_lookback;
                    summary.invalid_target += drained.invalid_target;
                    if drained.error.is_some() {
                        summary.error = drained.error;
                    }
                }
                Err(e) => warn!(error = %e, "monitor source task failed"),
            }
        }

        for s in &summaries {
            debug!(
                source = %s.source,
                received = s.received,
                applied = s.applied,
                unknown_target = s.unknown_target,
                failed = s.error.is_some(),
                "monitor source finished"
            );
        }
        CollectionSummary {
            report: fusion.finish(),
            monitors,
            sources: summaries,
        }
    }

    async fn gather_announcements(&self, summaries: &mut [SourceSummary]) -> FrequencyTable {
        let mut tasks = JoinSet::new();
        for (i, source) in self.sources.iter().enumerate() {
            let source = Arc::clone(source);
            let deadline = self.timeout;
            tasks.spawn(async move { (i, timeout(deadline, source.announcements()).await) });
        }

        let mut announcements: Vec<MonitorAnnouncement> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((i, result)) = joined else {
                warn!("announcement task failed");
                continue;
            };
            let summary = &mut summaries[i];
            match result {
                Ok(Ok(found)) => {
                    summary.announcements = found.len();
                    announcements.extend(found);
                }
                Ok(Err(e)) => {
                    warn!(source = %summary.source, error = %e, "failed to fetch monitor announcements");
                    summary.error = Some(e.to_string());
                }
                Err(_) => {
                    warn!(source = %summary.source, "timed out fetching monitor announcements");
                    summary.error = Some("announcements timed out".to_string());
                }
            }
        }
        announcements.iter().collect()
    }
}

/// Streams one source's reports into `fusion` until the source finishes,
/// fails or hits `deadline`.
async fn drain_source(
    source: Arc<dyn MonitorSource>,
    query: Arc<ReportQuery>,
    fusion: Arc<LivenessFusion>,
    deadline: Duration,
) -> SourceSummary {
    let (tx, mut rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
    let producer = timeout(deadline, source.reports(&query, tx));
    let consumer = async {
        let mut summary = SourceSummary::default();
        while let Some(report) = rx.recv().await {
            let outcome = fusion.fold(&report);
            metrics::counter!("relayplan_liveness_reports_folded_total").increment(1);
            summary.record(outcome);
        }
        summary
    };

    let (produced, mut summary) = tokio::join!(producer, consumer);
    match produced {
        Ok(Ok(sent)) => debug!(source = source.name(), sent, "monitor reports streamed"),
        Ok(Err(e)) => {
            warn!(source = source.name(), error = %e, "monitor source failed");
            summary.error = Some(e.to_string());
        }
        Err(_) => {
            warn!(source = source.name(), received = summary.received, "monitor source timed out");
            summary.error = Some("reports timed out".to_string());
        }
    }
    summary
}
