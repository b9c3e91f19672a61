//! Report generation
//!
//! JSON reports for the three subcommands. Every report carries the time it was
//! generated and the version of the tool.

use crate::config::AppConfig;
use crate::state::{loops_of, ReplayStats, TopologyFrame, TopologyReplay};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rpl_trace_core::{NodeId, PagedLayout, ParseStats, ParsedTrace, Snapshot, TraceEvent};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Common report header
#[derive(Debug, Clone, Serialize)]
pub struct ReportHeader {
    pub tool_version: String,
    pub generated_at: DateTime<Utc>,
    pub source: String,
}

impl ReportHeader {
    pub fn new(source: &Path) -> Self {
        Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            source: source.display().to_string(),
        }
    }
}

/// Display label for a topology instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceLabel {
    pub key: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<NodeId>,
}

/// Labels for every instance key appearing in the given snapshots
fn instance_labels<'a, I>(config: &AppConfig, snapshots: I) -> Vec<InstanceLabel>
where
    I: IntoIterator<Item = &'a Snapshot>,
{
    let keys: BTreeSet<&str> = snapshots
        .into_iter()
        .flat_map(|s| s.instances().iter().map(|i| i.instance.as_str()))
        .collect();

    keys.into_iter()
        .map(|key| match config.route_for(key) {
            Some(route) => InstanceLabel {
                key: key.to_string(),
                name: route.display_name(),
                root: route.root,
            },
            None => InstanceLabel {
                key: key.to_string(),
                name: format!("Instance {}", key),
                root: None,
            },
        })
        .collect()
}

/// Paginated space-time layout
#[derive(Debug, Serialize)]
pub struct TimelineReport<'a> {
    #[serde(flatten)]
    pub header: ReportHeader,
    pub nodes: Vec<NodeId>,
    pub receptions: usize,
    pub parent_changes: usize,
    pub layout: &'a PagedLayout,
}

impl<'a> TimelineReport<'a> {
    pub fn new(source: &Path, trace: &ParsedTrace, layout: &'a PagedLayout) -> Self {
        Self {
            header: ReportHeader::new(source),
            nodes: trace.nodes.iter().copied().collect(),
            receptions: trace.stats.receptions,
            parent_changes: trace.stats.parent_changes,
            layout,
        }
    }
}

/// Deduplicated topology frames
#[derive(Debug, Serialize)]
pub struct TopologyReport<'a> {
    #[serde(flatten)]
    pub header: ReportHeader,
    pub nodes: Vec<NodeId>,
    pub instances: Vec<InstanceLabel>,
    pub stats: ReplayStats,
    pub frames: &'a [TopologyFrame],
}

impl<'a> TopologyReport<'a> {
    pub fn new(
        source: &Path,
        config: &AppConfig,
        trace: &ParsedTrace,
        replay: &'a TopologyReplay,
    ) -> Self {
        Self {
            header: ReportHeader::new(source),
            nodes: trace.nodes.iter().copied().collect(),
            instances: instance_labels(config, replay.frames.iter().map(|f| &f.snapshot)),
            stats: replay.stats,
            frames: &replay.frames,
        }
    }
}

/// Per-instance event counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstanceCounts {
    pub receptions: usize,
    pub parent_changes: usize,
    pub lost_parents: usize,
}

/// Overview of one log
#[derive(Debug, Serialize)]
pub struct SummaryReport {
    #[serde(flatten)]
    pub header: ReportHeader,
    pub nodes: Vec<NodeId>,
    pub stats: ParseStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<String>,
    pub duration_s: f64,
    pub per_instance: BTreeMap<String, InstanceCounts>,
    pub instances: Vec<InstanceLabel>,
    pub final_topology: Snapshot,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub mutual_loops: BTreeMap<String, Vec<(NodeId, NodeId)>>,
}

impl SummaryReport {
    pub fn new(
        source: &Path,
        config: &AppConfig,
        trace: &ParsedTrace,
        replay: &TopologyReplay,
    ) -> Self {
        let mut per_instance: BTreeMap<String, InstanceCounts> = BTreeMap::new();
        for routed in &trace.events {
            match &routed.event {
                TraceEvent::Reception(r) => {
                    per_instance.entry(r.instance_id.clone()).or_default().receptions += 1;
                }
                TraceEvent::ParentChange(c) => {
                    let counts = per_instance.entry(c.dag_id.clone()).or_default();
                    counts.parent_changes += 1;
                    if c.is_lost() {
                        counts.lost_parents += 1;
                    }
                }
            }
        }

        let first = trace.events.first().map(|e| &e.event);
        let last = trace
            .events
            .iter()
            .map(|e| &e.event)
            .max_by(|a, b| a.relative_time().total_cmp(&b.relative_time()));

        let final_topology = replay.tracker.snapshot();
        let instances = instance_labels(config, std::iter::once(&final_topology));

        Self {
            header: ReportHeader::new(source),
            nodes: trace.nodes.iter().copied().collect(),
            stats: trace.stats,
            first_timestamp: first.map(|e| e.timestamp_text().to_string()),
            last_timestamp: last.map(|e| e.timestamp_text().to_string()),
            duration_s: last.map(|e| e.relative_time()).unwrap_or(0.0),
            per_instance,
            instances,
            final_topology,
            mutual_loops: loops_of(&replay.tracker),
        }
    }
}

/// Write a report as JSON to a file, or to stdout when no path is given
pub fn write_json<T: Serialize>(value: &T, output: Option<&Path>, pretty: bool) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?;
            let mut writer = BufWriter::new(file);
            serialize_into(&mut writer, value, pretty)
                .with_context(|| format!("Failed to write report: {:?}", path))?;
            writer.flush()?;
            log::info!("Report written to {:?}", path);
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serialize_into(&mut writer, value, pretty).context("Failed to write report")?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn serialize_into<W: Write, T: Serialize>(writer: W, value: &T, pretty: bool) -> serde_json::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(writer, value)
    } else {
        serde_json::to_writer(writer, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::replay;
    use rpl_trace_core::{ExtractConfig, TraceParser};

    const LOG: &str = "\
00:00:01.000 Node:2 :Incoming DIO (id, ver, rank) = (30,1,10) from:fe80::1:1:1:7
00:00:01.500 Node:2 :RPL: DAG: fd00 rank 256 Parent: 07, etx 128, Pref Y
00:00:03.000 Node:3 :RPL: DAG: fd00 rank 256 Parent: 02, etx 128, Pref Y
00:00:04.000 Node:3 :RPL: DAG: fd00 rank 256 Parent: zz, Pref Y
";

    #[test]
    fn test_summary_counts_per_instance() {
        let trace = TraceParser::new(ExtractConfig::new()).parse_str(LOG);
        let replay = replay(trace.parent_changes());
        let summary = SummaryReport::new(Path::new("log.txt"), &AppConfig::default(), &trace, &replay);

        assert_eq!(summary.nodes, vec![2, 3, 7]);
        assert_eq!(summary.per_instance["30"].receptions, 1);
        assert_eq!(summary.per_instance["fd00"].parent_changes, 2);
        assert_eq!(summary.stats.discarded, 1);
        assert_eq!(summary.first_timestamp.as_deref(), Some("00:00:01.000"));
        assert_eq!(summary.last_timestamp.as_deref(), Some("00:00:03.000"));
        assert_eq!(summary.duration_s, 2.0);
        assert_eq!(summary.final_topology.edges("fd00"), Some(&[(2, 7), (3, 2)][..]));

        // fd00 resolves to the configured DODAG 1 label
        assert_eq!(summary.instances.len(), 1);
        assert_eq!(summary.instances[0].root, Some(7));
    }

    #[test]
    fn test_write_json_to_file() {
        let trace = TraceParser::new(ExtractConfig::new()).parse_str(LOG);
        let replay = replay(trace.parent_changes());
        let report = TopologyReport::new(Path::new("log.txt"), &AppConfig::default(), &trace, &replay);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        write_json(&report, Some(&path), false).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["frames"].as_array().unwrap().len(), 2);
        assert_eq!(value["stats"]["frames"], 2);
        assert!(value["generated_at"].is_string());
    }
}
