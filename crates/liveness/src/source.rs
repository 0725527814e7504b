//! Monitor report sources.
//!
//! A source yields monitor announcements and streams relay reports into a
//! channel. Sources know nothing about fusion; the collector drives them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use corelib::Event;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::model::{MonitorAnnouncement, MonitorReport};

/// `d` tags per report query batch. Relay URLs are long and monitor relays
/// reject oversized filters, so batches stay small.
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Which reports a source should deliver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportQuery {
    /// `d` tag values of interest.
    pub targets: BTreeSet<String>,
    /// Oldest observation time of interest.
    pub since: i64,
    pub batch_size: usize,
}

impl ReportQuery {
    pub fn new(targets: BTreeSet<String>, since: i64) -> Self {
        Self {
            targets,
            since,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Targets split into batches of at most `batch_size`.
    pub fn batches(&self) -> Vec<BTreeSet<&str>> {
        let targets: Vec<&str> = self.targets.iter().map(String::as_str).collect();
        targets
            .chunks(self.batch_size.max(1))
            .map(|chunk| chunk.iter().copied().collect())
            .collect()
    }

    fn admits(&self, batch: &BTreeSet<&str>, report: &MonitorReport) -> bool {
        report.observed_at >= self.since && batch.contains(report.target.as_str())
    }
}

/// Supplier of monitor data.
///
/// # Thread Safety
///
/// Sources are shared between collector tasks and must be `Send + Sync`.
#[async_trait]
pub trait MonitorSource: Send + Sync + 'static {
    /// Name used in logs and summaries.
    fn name(&self) -> &str;

    /// Every monitor announcement the source knows of.
    async fn announcements(&self) -> Result<Vec<MonitorAnnouncement>, SourceError>;

    /// Sends matching reports into `sink`, returning how many were sent.
    async fn reports(
        &self,
        query: &ReportQuery,
        sink: mpsc::Sender<MonitorReport>,
    ) -> Result<usize, SourceError>;
}

async fn send_batched(
    query: &ReportQuery,
    reports: &[MonitorReport],
    sink: &mpsc::Sender<MonitorReport>,
    delay: Option<Duration>,
) -> Result<usize, SourceError> {
    let mut sent = 0;
    for batch in query.batches() {
        for report in reports.iter().filter(|r| query.admits(&batch, r)) {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            sink.send(report.clone()).await.map_err(|_| SourceError::SinkClosed)?;
            sent += 1;
        }
    }
    Ok(sent)
}

/// In-memory source.
#[derive(Clone, Debug, Default)]
pub struct StaticMonitorSource {
    name: String,
    announcements: Vec<MonitorAnnouncement>,
    reports: Vec<MonitorReport>,
    delay: Option<Duration>,
}

impl StaticMonitorSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_announcements(mut self, announcements: Vec<MonitorAnnouncement>) -> Self {
        self.announcements = announcements;
        self
    }

    pub fn with_reports(mut self, reports: Vec<MonitorReport>) -> Self {
        self.reports = reports;
        self
    }

    /// Waits `delay` before each report, simulating a slow monitor.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl MonitorSource for StaticMonitorSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn announcements(&self) -> Result<Vec<MonitorAnnouncement>, SourceError> {
        Ok(self.announcements.clone())
    }

    async fn reports(
        &self,
        query: &ReportQuery,
        sink: mpsc::Sender<MonitorReport>,
    ) -> Result<usize, SourceError> {
        send_batched(query, &self.reports, &sink, self.delay).await
    }
}

/// Source backed by a JSONL dump of monitor events.
///
/// Lines that are not events, or events of other kinds, are skipped.
#[derive(Clone, Debug)]
pub struct JsonlMonitorSource {
    name: String,
    path: PathBuf,
}

impl JsonlMonitorSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            path,
        }
    }

    async fn events(&self) -> Result<Vec<Event>, SourceError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|error| SourceError::Io {
            source_name: self.name.clone(),
            error,
        })?;
        let mut skipped = 0usize;
        let events: Vec<Event> = bytes
            .split(|b| *b == b'\n')
            .filter(|l| !l.iter().all(u8::is_ascii_whitespace))
            .filter_map(|l| match std::str::from_utf8(l).ok().and_then(|l| Event::from_json(l).ok()) {
                Some(ev) => Some(ev),
                None => {
                    skipped += 1;
                    None
                }
            })
            .collect();
        if skipped > 0 {
            warn!(source = %self.name, skipped, "undecodable monitor events skipped");
        }
        debug!(source = %self.name, events = events.len(), "monitor events loaded");
        Ok(events)
    }
}

#[async_trait]
impl MonitorSource for JsonlMonitorSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn announcements(&self) -> Result<Vec<MonitorAnnouncement>, SourceError> {
        Ok(self.events().await?.iter().filter_map(MonitorAnnouncement::from_event).collect())
    }

    async fn reports(
        &self,
        query: &ReportQuery,
        sink: mpsc::Sender<MonitorReport>,
    ) -> Result<usize, SourceError> {
        let reports: Vec<MonitorReport> =
            self.events().await?.iter().filter_map(MonitorReport::from_event).collect();
        send_batched(query, &reports, &sink, None).await
    }
}
