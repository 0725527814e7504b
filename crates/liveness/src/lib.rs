//! Relay liveness from third-party monitor reports.
//!
//! Monitors announce how often they probe relays and publish per-relay
//! reports with round-trip times. This crate:
//! - Decodes announcements and reports from events
//! - Fuses reports into one liveness record per relay
//! - Acquires reports from several monitor sources concurrently, each under
//!   its own deadline

pub mod collector;
pub mod error;
pub mod fusion;
pub mod model;
pub mod source;

pub use collector::{CollectionSummary, MonitorCollector, SourceSummary};
pub use error::SourceError;
pub use fusion::{FoldOutcome, FusionConfig, LivenessFusion, LivenessReport};
pub use model::{FrequencyTable, LivenessStatus, MonitorAnnouncement, MonitorReport, RelayLiveness};
pub use source::{JsonlMonitorSource, MonitorSource, ReportQuery, StaticMonitorSource};
