//! RPL Trace CLI Application
//!
//! Command-line interface for the RPL trace library. It reads a simulation log
//! and adds:
//! - Configuration files with the DODAG instance table
//! - Topology replay with frame deduplication
//! - JSON reports (timeline layout, topology frames, summary)

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rpl_trace_core::{ExtractConfig, PaginationEngine, PanelGeometry, ParsedTrace, TraceParser};
use std::path::{Path, PathBuf};

mod config;
mod report;
mod state;

use config::{AppConfig, InstanceMode, Overrides};

/// RPL Trace - DODAG topology and space-time layout from simulation logs
#[derive(Parser, Debug)]
#[command(name = "rpl-trace")]
#[command(about = "Reconstruct RPL DODAG topology from simulation logs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Write compact JSON instead of pretty-printed
    #[arg(long, global = true)]
    compact: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lay out receptions and parent changes as a paginated timeline
    Timeline {
        /// Simulation log to read
        log: PathBuf,

        /// Output file for the layout (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Instance id to follow
        #[arg(long)]
        instance: Option<String>,

        /// DAG id of the followed instance
        #[arg(long)]
        dag: Option<String>,

        /// Instance selection mode
        #[arg(long, value_enum)]
        mode: Option<InstanceMode>,

        /// Draw the first two instances in side-by-side panels
        #[arg(long)]
        dual: bool,
    },

    /// Replay parent changes and write deduplicated topology frames
    Topology {
        /// Simulation log to read
        log: PathBuf,

        /// Output file for the frames (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Summarise nodes, event counts and the final topology
    Summary {
        /// Simulation log to read
        log: PathBuf,

        /// Output file for the summary (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    log::info!("RPL Trace CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using trace library v{}", rpl_trace_core::VERSION);

    let mut config = match &cli.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    if cli.compact {
        config.output.pretty = false;
    }

    match &cli.command {
        Command::Timeline {
            log: log_path,
            output,
            instance,
            dag,
            mode,
            dual,
        } => {
            config.apply(&Overrides {
                instance: instance.clone(),
                dag: dag.clone(),
                mode: *mode,
                dual: *dual,
            });
            config.validate()?;
            timeline_mode(&config, log_path, output.as_deref())
        }
        Command::Topology { log: log_path, output } => {
            config.validate()?;
            topology_mode(&config, log_path, output.as_deref())
        }
        Command::Summary { log: log_path, output } => {
            config.validate()?;
            summary_mode(&config, log_path, output.as_deref())
        }
    }
}

/// Parse the log with the configured instance policy
fn load_trace(config: &AppConfig, log_path: &Path) -> Result<ParsedTrace> {
    let parser = TraceParser::new(ExtractConfig {
        policy: config.policy(),
    });
    let trace = parser.parse_file(log_path)?;

    if trace.events.is_empty() {
        bail!("No nodes/events found in {:?}", log_path);
    }

    let nodes: Vec<String> = trace.nodes.iter().map(|n| n.to_string()).collect();
    log::info!("Nodes: {}", nodes.join(", "));
    log::info!(
        "{} DIOs, {} switches (preferred only)",
        trace.stats.receptions,
        trace.stats.parent_changes
    );
    if trace.stats.discarded > 0 {
        log::warn!("{} malformed line(s) discarded", trace.stats.discarded);
    }

    Ok(trace)
}

/// Timeline mode - parse, merge, resolve collisions, paginate
fn timeline_mode(config: &AppConfig, log_path: &Path, output: Option<&Path>) -> Result<()> {
    let trace = load_trace(config, log_path)?;

    let geometry = PanelGeometry::for_trace(&trace, &config.layout);
    let timeline = geometry.timeline(&trace).resolve(&config.collision);
    let engine = PaginationEngine::new(config.layout.clone(), geometry)?;
    let layout = engine.paginate(&timeline);

    log::info!(
        "{} layout event(s) over {:.3}s on {} page(s), {:.2}s per page",
        layout.events().count(),
        timeline.end_time(),
        layout.page_count,
        layout.page_duration
    );

    let report = report::TimelineReport::new(log_path, &trace, &layout);
    report::write_json(&report, output, config.output.pretty)
}

/// Topology mode - one frame per distinct topology
fn topology_mode(config: &AppConfig, log_path: &Path, output: Option<&Path>) -> Result<()> {
    let trace = load_trace(config, log_path)?;
    let replay = state::replay(trace.parent_changes());

    log::info!(
        "{} parent change(s), {} changed the topology, {} frame(s)",
        replay.stats.processed,
        replay.stats.changed,
        replay.stats.frames
    );

    let report = report::TopologyReport::new(log_path, config, &trace, &replay);
    report::write_json(&report, output, config.output.pretty)
}

/// Summary mode - counts and final topology
fn summary_mode(config: &AppConfig, log_path: &Path, output: Option<&Path>) -> Result<()> {
    let trace = load_trace(config, log_path)?;
    let replay = state::replay(trace.parent_changes());

    let report = report::SummaryReport::new(log_path, config, &trace, &replay);
    report::write_json(&report, output, config.output.pretty)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
