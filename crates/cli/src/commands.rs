//! Command implementations.

use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use corelib::key::key_set_from_lines;
use corelib::{unique_by_host, ExclusionSet, IndexStats, PubKey, RelayUrl, WriteIndex, WriteIndexBuilder};
use liveness::{FusionConfig, JsonlMonitorSource, LivenessStatus, MonitorCollector, MonitorSource};
use replication::{GreedyStrategy, ReplicationStrategy};
use streaming::{build_plan, PartitionConfig, RouterConfigCodec};
use tracing::{debug, info, warn};

use crate::config::{AnalyzeArgs, GenRouterArgs};
use crate::files::{
    self, monitor_report_lines, pair_lines, read_lines, read_lines_if_exists, write_lines, EXCLUDE_FILE,
    FOLLOWS_FILE, FOLLOW_SETS_DIR, MONITOR_REPORT_FILE, ONLINE_MAP_FILE, OUTBOX_FILE, PAIR_MAP_FILE,
    RELAY_LISTS_FILE, USER_PUBKEY_FILE, USER_RELAYS_FILE, WRITE_MAP_FILE,
};

/// Summary printed after a command completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Analyzed(AnalyzeSummary),
    RouterWritten(RouterSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeSummary {
    pub records_seen: usize,
    pub records_skipped: usize,
    pub write_pairs: usize,
    pub outbox_relays: usize,
    pub liveness: Option<LivenessSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessSummary {
    pub online: usize,
    pub offline: usize,
    pub unknown: usize,
    pub online_pairs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterSummary {
    pub output: String,
    pub streams: usize,
    pub relays: usize,
    pub under_replicated: usize,
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Analyzed(s) => {
                writeln!(f, "Analyze complete.")?;
                writeln!(f, " - Records: {} ({} skipped)", s.records_seen, s.records_skipped)?;
                writeln!(f, " - WRITE pairs: {}", s.write_pairs)?;
                write!(f, " - Outbox relays: {}", s.outbox_relays)?;
                if let Some(l) = &s.liveness {
                    writeln!(f)?;
                    writeln!(
                        f,
                        " - Monitored relays: {} online, {} offline, {} unknown",
                        l.online, l.offline, l.unknown
                    )?;
                    write!(f, " - Online pairs: {} (from {} total)", l.online_pairs, s.write_pairs)?;
                }
                Ok(())
            }
            CommandResult::RouterWritten(s) => write!(
                f,
                "Wrote {} ({} streams over {} relays, {} authors under-replicated)",
                s.output, s.streams, s.relays, s.under_replicated
            ),
        }
    }
}

/// Builds the write index and derived maps from the relay-list dump.
pub fn analyze(data_dir: &Path, args: &AnalyzeArgs) -> anyhow::Result<CommandResult> {
    let input = args.input.clone().unwrap_or_else(|| data_dir.join(RELAY_LISTS_FILE));
    let follows = args.follows.clone().unwrap_or_else(|| data_dir.join(FOLLOWS_FILE));
    let exclude = args.exclude.clone().unwrap_or_else(|| data_dir.join(EXCLUDE_FILE));

    if let Err(e) = files::merge_follow_sets(&data_dir.join(FOLLOW_SETS_DIR), &follows) {
        warn!(error = %e, "failed to merge follow sets");
    }

    let exclusions = ExclusionSet::from_lines(read_lines_if_exists(&exclude)?);
    debug!(hosts = exclusions.len(), "exclusions loaded");

    let (index, stats) = build_index(&input, &exclusions)?;
    let pairs = pair_lines(&index);
    write_lines(&data_dir.join(WRITE_MAP_FILE), &pairs)?;
    write_lines(&data_dir.join(PAIR_MAP_FILE), &pairs)?;

    let outbox = unique_by_host(&index);
    if outbox.is_empty() {
        warn!("no outbox relays derived (write index empty)");
    }
    write_lines(&data_dir.join(OUTBOX_FILE), outbox.iter().map(RelayUrl::as_str))?;

    let mut summary = AnalyzeSummary {
        records_seen: stats.records_seen,
        records_skipped: stats.records_skipped(),
        write_pairs: pairs.len(),
        outbox_relays: outbox.len(),
        liveness: None,
    };
    if args.check_monitors {
        summary.liveness = Some(check_monitors(data_dir, args, &index)?);
    }
    Ok(CommandResult::Analyzed(summary))
}

fn build_index(input: &Path, exclusions: &ExclusionSet) -> anyhow::Result<(WriteIndex, IndexStats)> {
    let file = fs::File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let mut builder = WriteIndexBuilder::new(exclusions);
    for line in BufReader::new(file).split(b'\n') {
        let line = line.with_context(|| format!("failed to read {}", input.display()))?;
        // Skips are counted by the builder.
        let _ = builder.ingest_bytes(&line);
    }
    Ok(builder.build())
}

fn check_monitors(data_dir: &Path, args: &AnalyzeArgs, index: &WriteIndex) -> anyhow::Result<LivenessSummary> {
    let config = FusionConfig {
        lookback_secs: i64::try_from(args.lookback_hours.saturating_mul(3600)).unwrap_or(i64::MAX),
        ..FusionConfig::default()
    };
    let mut collector = MonitorCollector::new(config).with_timeout(Duration::from_secs(args.monitor_timeout));
    for path in &args.monitor_events {
        let source: Arc<dyn MonitorSource> = Arc::new(JsonlMonitorSource::new(path));
        collector.add_source(source);
    }
    if collector.source_count() == 0 {
        warn!("no monitor sources given, every relay will be unknown");
    }

    let targets: Vec<RelayUrl> = index.relays().cloned().collect();
    let now = chrono::Utc::now().timestamp();
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let pass = runtime.block_on(collector.collect(&targets, now));
    let report = pass.report;

    let report_path = data_dir.join(MONITOR_REPORT_FILE);
    if let Err(e) = write_lines(&report_path, monitor_report_lines(&report)) {
        warn!(path = %report_path.display(), error = %e, "failed to write monitor report");
    }

    let online = report.online_pairs(index);
    if online.is_empty() {
        warn!("no online relays, online pair map is empty");
    }
    let online_pairs = pair_lines(&online);
    write_lines(&data_dir.join(ONLINE_MAP_FILE), &online_pairs)?;
    info!(monitors = pass.monitors, relays = report.len(), "liveness report written");

    Ok(LivenessSummary {
        online: report.count(LivenessStatus::Online),
        offline: report.count(LivenessStatus::Offline),
        unknown: report.count(LivenessStatus::Unknown),
        online_pairs: online_pairs.len(),
    })
}

/// Plans subscriptions for the follow list and writes the router config.
pub fn gen_router(data_dir: &Path, args: &GenRouterArgs) -> anyhow::Result<CommandResult> {
    let map_path = data_dir.join(if args.online_only { ONLINE_MAP_FILE } else { PAIR_MAP_FILE });
    if args.online_only {
        info!(path = %map_path.display(), "using online-only pair map");
    }
    let index = files::parse_pair_lines(
        read_lines(&map_path).with_context(|| format!("failed to read {}", map_path.display()))?,
    );
    let follows_path = data_dir.join(FOLLOWS_FILE);
    let follows = key_set_from_lines(
        read_lines(&follows_path).with_context(|| format!("failed to read {}", follows_path.display()))?,
    );

    let index = index.restrict_to(&follows);
    let assignment = GreedyStrategy::new(args.replicas).assign(&index);
    let config = PartitionConfig {
        chunk_size: args.authors_per_stream,
        prefix: args.stream_prefix.clone(),
        kinds: args.kinds_json.as_deref().and_then(parse_kinds),
        include_unassigned: args.include_unassigned,
    };
    let mut plan = build_plan(&assignment, &follows, &config);

    if args.include_notifs {
        let (user, relays) = load_user(data_dir)?;
        plan.add_user_streams(user.as_str(), &relays, config.kinds.as_deref())?;
    }

    let file = create_output(&args.output)?;
    RouterConfigCodec::default()
        .write(&plan, std::io::BufWriter::new(file))
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    Ok(CommandResult::RouterWritten(RouterSummary {
        output: args.output.display().to_string(),
        streams: plan.len(),
        relays: assignment.relay_count(),
        under_replicated: assignment.under_replicated().count(),
    }))
}

fn create_output(path: &Path) -> anyhow::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

/// Parses a JSON array of event kinds; anything else is ignored with a
/// warning.
fn parse_kinds(raw: &str) -> Option<Vec<u32>> {
    match serde_json::from_str::<Vec<u32>>(raw) {
        Ok(kinds) => Some(kinds),
        Err(e) => {
            warn!(kinds = raw, error = %e, "ignoring invalid kinds filter");
            None
        }
    }
}

fn load_user(data_dir: &Path) -> anyhow::Result<(PubKey, Vec<RelayUrl>)> {
    let pubkey_path = data_dir.join(USER_PUBKEY_FILE);
    let Some(raw) = read_lines_if_exists(&pubkey_path)?.into_iter().next() else {
        bail!("no user pubkey found at {}", pubkey_path.display());
    };
    let user = PubKey::parse(&raw).with_context(|| format!("invalid pubkey in {}", pubkey_path.display()))?;

    let relays: Vec<RelayUrl> = read_lines_if_exists(&data_dir.join(USER_RELAYS_FILE))?
        .iter()
        .filter_map(|l| RelayUrl::parse(l).ok())
        .collect();
    Ok((user, relays))
}
