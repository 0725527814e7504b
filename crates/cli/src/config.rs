//! Command-line configuration.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands;

#[derive(Debug, Parser)]
#[command(name = "relayplan")]
#[command(about = "Plan outbox relay subscriptions for a follow list", long_about = None)]
pub struct CliConfig {
    /// Directory holding inputs and outputs
    #[arg(long, global = true, default_value = "./relay_data")]
    pub data_dir: PathBuf,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the write index, pair maps and outbox relay list
    Analyze(AnalyzeArgs),
    /// Generate a router config from the pair map
    GenRouter(GenRouterArgs),
}

#[derive(Clone, Debug, Args)]
pub struct AnalyzeArgs {
    /// Relay-list JSONL (default: <data-dir>/all_relay_lists.jsonl)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Follow list (default: <data-dir>/follows_list.txt)
    #[arg(long)]
    pub follows: Option<PathBuf>,

    /// Excluded relay hosts (default: <data-dir>/outbox_exclude.txt)
    #[arg(long)]
    pub exclude: Option<PathBuf>,

    /// Fuse monitor reports into a liveness report
    #[arg(long)]
    pub check_monitors: bool,

    /// JSONL dumps of monitor events, one source per file
    #[arg(long, num_args = 1..)]
    pub monitor_events: Vec<PathBuf>,

    /// Per-source timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub monitor_timeout: u64,

    /// Ignore monitor reports older than this many hours
    #[arg(long, default_value_t = 72)]
    pub lookback_hours: u64,
}

#[derive(Clone, Debug, Args)]
pub struct GenRouterArgs {
    /// Router config path
    #[arg(long, default_value = "./strfry-router.config")]
    pub output: PathBuf,

    /// Maximum authors per stream
    #[arg(long, default_value_t = 50)]
    pub authors_per_stream: usize,

    /// Prefix for per-relay stream names
    #[arg(long, default_value = "follows")]
    pub stream_prefix: String,

    /// Add catch-all streams for authors short of their replica count
    #[arg(long)]
    pub include_unassigned: bool,

    /// Distinct relays per author (values below 1 are raised to 1)
    #[arg(long, default_value_t = 1)]
    pub replicas: usize,

    /// JSON array of event kinds for every stream, e.g. [0,1,3]
    #[arg(long)]
    pub kinds_json: Option<String>,

    /// Read the online-only pair map written by `analyze --check-monitors`
    #[arg(long)]
    pub online_only: bool,

    /// Add the user's own outbound and mention streams
    #[arg(long)]
    pub include_notifs: bool,
}

impl CliConfig {
    /// Installs logging and runs the selected command.
    pub fn run(self) -> anyhow::Result<()> {
        init_tracing(self.verbose);
        let result = match &self.command {
            Command::Analyze(args) => commands::analyze(&self.data_dir, args)?,
            Command::GenRouter(args) => commands::gen_router(&self.data_dir, args)?,
        };
        println!("{result}");
        Ok(())
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
