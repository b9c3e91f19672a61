//! Main parsing API
//!
//! [`TraceParser`] is the entry point for turning a simulation log into events.
//! It runs the classifier and extractor over every line, then rebases all events
//! onto the trace epoch (the earliest timestamp seen on any recognised line) so
//! that every relative time is non-negative.

use crate::config::ExtractConfig;
use crate::parse::{EventExtractor, ExtractedEvent, ExtractedKind, LineClassifier, LinePayload};
use crate::types::{NodeId, ParentChangeEvent, ReceptionEvent, Result, TraceError, TraceEvent};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Line and event counters for one parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Lines read
    pub lines: usize,
    /// Lines that matched the timestamp/node prefix
    pub matched: usize,
    /// Lines that matched a grammar anchor but failed to parse
    pub discarded: usize,
    pub receptions: usize,
    pub parent_changes: usize,
    pub lost_parents: usize,
    /// Events dropped by the instance policy
    pub filtered: usize,
    pub tables_opened: usize,
    pub tables_abandoned: usize,
    /// Tables with no end marker before end of input
    pub tables_unterminated: usize,
}

/// An event together with the side its instance was routed to
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedEvent {
    pub side: usize,
    pub event: TraceEvent,
}

/// Everything extracted from one log
#[derive(Debug, Clone, Default)]
pub struct ParsedTrace {
    /// Earliest absolute time seen, in seconds; `None` if nothing matched
    pub epoch: Option<f64>,
    /// Every node id seen as a line origin or as a DIO sender
    pub nodes: BTreeSet<NodeId>,
    /// Events in input order
    pub events: Vec<RoutedEvent>,
    pub stats: ParseStats,
}

impl ParsedTrace {
    /// True when the log contained no recognisable line at all
    pub fn is_empty(&self) -> bool {
        self.epoch.is_none()
    }

    /// Highest node id seen
    pub fn max_node(&self) -> Option<NodeId> {
        self.nodes.iter().next_back().copied()
    }

    /// Events routed to one side, in input order
    pub fn stream(&self, side: usize) -> impl Iterator<Item = &TraceEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| e.side == side)
            .map(|e| &e.event)
    }

    pub fn receptions(&self) -> impl Iterator<Item = &ReceptionEvent> + '_ {
        self.events.iter().filter_map(|e| e.event.as_reception())
    }

    pub fn parent_changes(&self) -> impl Iterator<Item = &ParentChangeEvent> + '_ {
        self.events.iter().filter_map(|e| e.event.as_parent_change())
    }

    /// Distinct sides that received at least one event
    pub fn sides(&self) -> BTreeSet<usize> {
        self.events.iter().map(|e| e.side).collect()
    }
}

/// Parses simulation logs into routed, epoch-relative events
pub struct TraceParser {
    config: ExtractConfig,
}

impl TraceParser {
    /// Create a parser with the given extraction settings
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Parse a log file
    ///
    /// Fails with [`TraceError::InputNotFound`] if the file does not exist.
    /// Bytes that are not valid UTF-8 are replaced rather than rejected.
    ///
    /// # Example
    /// ```no_run
    /// use rpl_trace_core::{ExtractConfig, TraceParser};
    /// use std::path::Path;
    ///
    /// let parser = TraceParser::new(ExtractConfig::new());
    /// let trace = parser.parse_file(Path::new("loglistener.txt")).unwrap();
    /// println!("{} events from {} nodes", trace.events.len(), trace.nodes.len());
    /// ```
    pub fn parse_file(&self, path: &Path) -> Result<ParsedTrace> {
        log::info!("Parsing log file: {:?}", path);

        if !path.is_file() {
            return Err(TraceError::InputNotFound(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let trace = self.parse_reader(BufReader::new(file))?;

        log::info!(
            "Parsed {:?}: {} lines, {} receptions, {} parent changes ({} lost), {} discarded",
            path,
            trace.stats.lines,
            trace.stats.receptions,
            trace.stats.parent_changes,
            trace.stats.lost_parents,
            trace.stats.discarded
        );
        Ok(trace)
    }

    /// Parse any buffered reader line by line
    pub fn parse_reader<R: BufRead>(&self, mut reader: R) -> Result<ParsedTrace> {
        let mut state = ParseState::new(&self.config);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            state.feed(&String::from_utf8_lossy(&buf));
        }

        Ok(state.finish())
    }

    /// Parse an in-memory log
    pub fn parse_str(&self, text: &str) -> ParsedTrace {
        let mut state = ParseState::new(&self.config);
        for line in text.lines() {
            state.feed(line);
        }
        state.finish()
    }
}

impl Default for TraceParser {
    fn default() -> Self {
        Self::new(ExtractConfig::default())
    }
}

/// Accumulator for a single pass over the input
struct ParseState {
    extractor: EventExtractor,
    epoch: Option<f64>,
    nodes: BTreeSet<NodeId>,
    pending: Vec<ExtractedEvent>,
    stats: ParseStats,
}

impl ParseState {
    fn new(config: &ExtractConfig) -> Self {
        Self {
            extractor: EventExtractor::new(config.policy.clone()),
            epoch: None,
            nodes: BTreeSet::new(),
            pending: Vec::new(),
            stats: ParseStats::default(),
        }
    }

    fn feed(&mut self, line: &str) {
        self.stats.lines += 1;

        let Some(classified) = LineClassifier::classify(line) else {
            return;
        };
        self.stats.matched += 1;

        let record = &classified.record;
        self.nodes.insert(record.node_id);
        self.epoch = Some(match self.epoch {
            Some(epoch) => epoch.min(record.absolute_time),
            None => record.absolute_time,
        });

        if let LinePayload::Discarded(_) = classified.payload {
            self.stats.discarded += 1;
        }

        if let Some(event) = self.extractor.process(&classified) {
            if let ExtractedKind::Reception { sender, .. } = &event.kind {
                self.nodes.insert(*sender);
            }
            self.pending.push(event);
        }
    }

    fn finish(self) -> ParsedTrace {
        let extracted = self.extractor.stats();
        let open_tables = self.extractor.open_tables();
        if !open_tables.is_empty() {
            log::warn!(
                "{} neighbour table(s) never closed (nodes {:?})",
                open_tables.len(),
                open_tables
            );
        }

        let stats = ParseStats {
            receptions: extracted.receptions,
            parent_changes: extracted.parent_changes,
            lost_parents: extracted.lost_parents,
            filtered: extracted.filtered,
            tables_opened: extracted.tables_opened,
            tables_abandoned: extracted.tables_abandoned,
            tables_unterminated: open_tables.len(),
            ..self.stats
        };

        let epoch = self.epoch;
        let base = epoch.unwrap_or(0.0);
        let events = self
            .pending
            .into_iter()
            .map(|e| rebase(e, base))
            .collect();

        ParsedTrace {
            epoch,
            nodes: self.nodes,
            events,
            stats,
        }
    }
}

/// Convert an extracted event to epoch-relative time
fn rebase(event: ExtractedEvent, epoch: f64) -> RoutedEvent {
    let relative_time = (event.absolute_time - epoch).max(0.0);
    let timestamp_text = event.timestamp_text;

    let event_out = match event.kind {
        ExtractedKind::Reception {
            receiver,
            sender,
            instance,
        } => TraceEvent::Reception(ReceptionEvent {
            relative_time,
            timestamp_text,
            receiver_node: receiver,
            sender_node: sender,
            instance_id: instance,
        }),
        ExtractedKind::ParentChange { node, parent, dag } => {
            TraceEvent::ParentChange(ParentChangeEvent {
                relative_time,
                timestamp_text,
                node,
                parent,
                dag_id: dag,
            })
        }
    };

    RoutedEvent {
        side: event.side,
        event: event_out,
    }
}
