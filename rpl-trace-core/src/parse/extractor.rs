//! Event extraction
//!
//! Turns classified lines into domain events. Receptions and DAG announcements
//! map one line to one event. Neighbour tables span several lines, so the
//! extractor keeps one small state machine per node:
//!
//! ```text
//!   Idle --TableStart--> InTable { preferred_seen: false }
//!   InTable --preferred entry--> emit ParentChange, preferred_seen = true
//!   InTable --TableEnd--> emit ParentChange(None) if !preferred_seen, Idle
//! ```
//!
//! Parent changes that matched a route are keyed by the route's instance id, so
//! announcements (DAG id) and tables (instance id) of one DODAG update the same
//! topology. Events carry absolute time; the parser rebases them once the epoch
//! is known.

use crate::config::InstancePolicy;
use crate::parse::classifier::{ClassifiedLine, LinePayload};
use crate::types::NodeId;
use std::collections::HashMap;

/// Per-node neighbour-table state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableState {
    Idle,
    InTable {
        instance: String,
        /// Side from the instance policy; `None` means the table is consumed silently
        side: Option<usize>,
        preferred_seen: bool,
    },
}

/// Event payload before the epoch is applied
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedKind {
    Reception {
        receiver: NodeId,
        sender: NodeId,
        instance: String,
    },
    ParentChange {
        node: NodeId,
        parent: Option<NodeId>,
        dag: String,
    },
}

/// An event with its absolute time and the side it was routed to
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEvent {
    pub absolute_time: f64,
    pub timestamp_text: String,
    pub side: usize,
    pub kind: ExtractedKind,
}

/// Counters kept while extracting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExtractStats {
    pub receptions: usize,
    pub parent_changes: usize,
    pub lost_parents: usize,
    pub filtered: usize,
    pub tables_opened: usize,
    pub tables_abandoned: usize,
}

/// Drives the neighbour-table state machines and applies the instance policy
pub struct EventExtractor {
    policy: InstancePolicy,
    tables: HashMap<NodeId, TableState>,
    stats: ExtractStats,
}

impl EventExtractor {
    pub fn new(policy: InstancePolicy) -> Self {
        Self {
            policy,
            tables: HashMap::new(),
            stats: ExtractStats::default(),
        }
    }

    /// Feed one classified line; returns the event it produced, if any
    pub fn process(&mut self, line: &ClassifiedLine) -> Option<ExtractedEvent> {
        let node = line.record.node_id;

        match &line.payload {
            LinePayload::Reception { instance, sender } => {
                let Some(side) = self.policy.route_instance(instance) else {
                    self.stats.filtered += 1;
                    return None;
                };
                self.stats.receptions += 1;
                Some(self.event(
                    line,
                    side,
                    ExtractedKind::Reception {
                        receiver: node,
                        sender: *sender,
                        instance: instance.clone(),
                    },
                ))
            }

            LinePayload::Announcement {
                dag,
                parent,
                preferred,
            } => {
                // Inside a table the line is one of its rows
                if self.in_table(node) {
                    return self.table_entry(line, *parent, *preferred);
                }
                if !*preferred {
                    return None;
                }
                let Some(side) = self.policy.route_dag(dag) else {
                    self.stats.filtered += 1;
                    return None;
                };
                let key = self.policy.topology_key(side, dag);
                Some(self.parent_change(line, side, *parent, key))
            }

            LinePayload::TableStart { instance } => {
                if self.in_table(node) {
                    log::warn!(
                        "[{}] node {}: neighbour table restarted before its end marker",
                        line.record.timestamp_text,
                        node
                    );
                    self.stats.tables_abandoned += 1;
                }
                log::debug!("node {}: table open for instance {}", node, instance);
                self.stats.tables_opened += 1;
                self.tables.insert(
                    node,
                    TableState::InTable {
                        instance: instance.clone(),
                        side: self.policy.route_instance(instance),
                        preferred_seen: false,
                    },
                );
                None
            }

            LinePayload::TableEntry { parent, preferred } => {
                self.table_entry(line, *parent, *preferred)
            }

            LinePayload::TableEnd => {
                let state = self.tables.insert(node, TableState::Idle)?;
                let TableState::InTable {
                    instance,
                    side,
                    preferred_seen,
                } = state
                else {
                    return None;
                };
                log::debug!(
                    "node {}: table closed for instance {} (preferred seen: {})",
                    node,
                    instance,
                    preferred_seen
                );
                match (preferred_seen, side) {
                    (false, Some(side)) => {
                        let key = self.policy.topology_key(side, &instance);
                        Some(self.parent_change(line, side, None, key))
                    }
                    (false, None) => {
                        self.stats.filtered += 1;
                        None
                    }
                    (true, _) => None,
                }
            }

            LinePayload::Discarded(reason) => {
                log::trace!(
                    "[{}] node {}: discarded line ({})",
                    line.record.timestamp_text,
                    node,
                    reason
                );
                None
            }

            LinePayload::Other => None,
        }
    }

    /// Current table state of a node
    pub fn table_state(&self, node: NodeId) -> &TableState {
        self.tables.get(&node).unwrap_or(&TableState::Idle)
    }

    /// Nodes whose table was still open when input ended
    pub fn open_tables(&self) -> Vec<NodeId> {
        let mut open: Vec<NodeId> = self
            .tables
            .iter()
            .filter(|(_, state)| matches!(state, TableState::InTable { .. }))
            .map(|(node, _)| *node)
            .collect();
        open.sort_unstable();
        open
    }

    pub fn stats(&self) -> ExtractStats {
        self.stats
    }

    fn in_table(&self, node: NodeId) -> bool {
        matches!(self.tables.get(&node), Some(TableState::InTable { .. }))
    }

    fn table_entry(
        &mut self,
        line: &ClassifiedLine,
        parent: Option<NodeId>,
        preferred: bool,
    ) -> Option<ExtractedEvent> {
        let node = line.record.node_id;
        let Some(TableState::InTable {
            instance,
            side,
            preferred_seen,
        }) = self.tables.get_mut(&node)
        else {
            // Rows outside a table carry no instance; ignore them
            return None;
        };
        if !preferred {
            return None;
        }
        *preferred_seen = true;
        let instance = instance.clone();
        let side = *side;
        match side {
            Some(side) => {
                let key = self.policy.topology_key(side, &instance);
                Some(self.parent_change(line, side, parent, key))
            }
            None => {
                self.stats.filtered += 1;
                None
            }
        }
    }

    fn parent_change(
        &mut self,
        line: &ClassifiedLine,
        side: usize,
        parent: Option<NodeId>,
        dag: String,
    ) -> ExtractedEvent {
        self.stats.parent_changes += 1;
        if parent.is_none() {
            self.stats.lost_parents += 1;
        }
        self.event(
            line,
            side,
            ExtractedKind::ParentChange {
                node: line.record.node_id,
                parent,
                dag,
            },
        )
    }

    fn event(&self, line: &ClassifiedLine, side: usize, kind: ExtractedKind) -> ExtractedEvent {
        ExtractedEvent {
            absolute_time: line.record.absolute_time,
            timestamp_text: line.record.timestamp_text.clone(),
            side,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceRoute;
    use crate::parse::classifier::LineClassifier;

    fn run(extractor: &mut EventExtractor, lines: &[&str]) -> Vec<ExtractedEvent> {
        lines
            .iter()
            .filter_map(|l| LineClassifier::classify(l))
            .filter_map(|c| extractor.process(&c))
            .collect()
    }

    fn lost(node: NodeId, dag: &str) -> ExtractedKind {
        ExtractedKind::ParentChange {
            node,
            parent: None,
            dag: dag.to_string(),
        }
    }

    #[test]
    fn test_table_without_preferred_entry_loses_parent() {
        let mut extractor = EventExtractor::new(InstancePolicy::Any);
        let events = run(
            &mut extractor,
            &[
                "00:00:05.000 Node:2 :[INFO: RPL ] --- RPL Neighbour Set for Instance ID: 46 ---",
                "00:00:05.000 Node:2 :[INFO: RPL ] Parent: 08 | Rank 512 | Fresh U, Pref N",
                "00:00:05.001 Node:2 :[INFO: RPL ] --- End of Table ---",
            ],
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, lost(2, "46"));
        assert_eq!(events[0].timestamp_text, "00:00:05.001");
        assert_eq!(*extractor.table_state(2), TableState::Idle);
    }

    #[test]
    fn test_table_with_preferred_entry() {
        let mut extractor = EventExtractor::new(InstancePolicy::Any);
        let events = run(
            &mut extractor,
            &[
                "00:00:05.000 Node:3 :--- RPL Neighbour Set for Instance ID: 30 ---",
                "00:00:05.000 Node:3 :Parent: 07 | Pref Y",
                "00:00:05.000 Node:3 :Parent: 09 | Pref N",
                "00:00:05.000 Node:3 :--- End of Table ---",
            ],
        );
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            ExtractedKind::ParentChange {
                node: 3,
                parent: Some(7),
                dag: "30".to_string(),
            }
        );
    }

    #[test]
    fn test_interleaved_tables_keep_separate_state() {
        let mut extractor = EventExtractor::new(InstancePolicy::Any);
        let events = run(
            &mut extractor,
            &[
                "00:00:01.000 Node:2 :--- RPL Neighbour Set for Instance ID: 30 ---",
                "00:00:01.000 Node:3 :--- RPL Neighbour Set for Instance ID: 46 ---",
                "00:00:01.000 Node:3 :Parent: 08 | Pref Y",
                "00:00:01.000 Node:2 :Parent: 07 | Pref N",
                "00:00:01.000 Node:3 :--- End of Table ---",
                "00:00:01.000 Node:2 :--- End of Table ---",
            ],
        );
        let kinds: Vec<_> = events.into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ExtractedKind::ParentChange {
                    node: 3,
                    parent: Some(8),
                    dag: "46".to_string(),
                },
                lost(2, "30"),
            ]
        );
    }

    #[test]
    fn test_multiple_preferred_entries_each_emit() {
        let mut extractor = EventExtractor::new(InstancePolicy::Any);
        let events = run(
            &mut extractor,
            &[
                "00:00:01.000 Node:4 :--- RPL Neighbour Set for Instance ID: 30 ---",
                "00:00:01.000 Node:4 :Parent: 07 | Pref Y",
                "00:00:01.000 Node:4 :Parent: 05 | Pref Y",
                "00:00:01.000 Node:4 :--- End of Table ---",
            ],
        );
        assert_eq!(events.len(), 2);
        assert_eq!(extractor.stats().parent_changes, 2);
    }

    #[test]
    fn test_rows_and_end_outside_table_are_ignored() {
        let mut extractor = EventExtractor::new(InstancePolicy::Any);
        let events = run(
            &mut extractor,
            &[
                "00:00:01.000 Node:4 :Parent: 07 | Pref Y",
                "00:00:01.000 Node:4 :--- End of Table ---",
            ],
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_restarted_table_is_counted_as_abandoned() {
        let mut extractor = EventExtractor::new(InstancePolicy::Any);
        run(
            &mut extractor,
            &[
                "00:00:01.000 Node:4 :--- RPL Neighbour Set for Instance ID: 30 ---",
                "00:00:02.000 Node:4 :--- RPL Neighbour Set for Instance ID: 30 ---",
            ],
        );
        assert_eq!(extractor.stats().tables_abandoned, 1);
        assert_eq!(extractor.open_tables(), vec![4]);
    }

    #[test]
    fn test_single_instance_policy_filters_receptions_and_dags() {
        let policy = InstancePolicy::Single(InstanceRoute::new("30").with_dag("fd00"));
        let mut extractor = EventExtractor::new(policy);
        let events = run(
            &mut extractor,
            &[
                "00:00:01.000 Node:1 :Incoming DIO (id, ver, rank) = (30,1,10) from:fe80::7",
                "00:00:01.000 Node:1 :Incoming DIO (id, ver, rank) = (46,1,10) from:fe80::8",
                "00:00:01.000 Node:1 :RPL: DAG: fd02 Parent: 08, Pref Y",
                "00:00:01.000 Node:1 :RPL: DAG: fd00 Parent: 07, Pref N",
                "00:00:01.000 Node:1 :RPL: DAG: fd00 Parent: 07, Pref Y",
            ],
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].kind,
            ExtractedKind::Reception { sender: 7, .. }
        ));
        assert!(matches!(
            events[1].kind,
            ExtractedKind::ParentChange {
                parent: Some(7),
                ..
            }
        ));
        assert_eq!(extractor.stats().filtered, 2);
    }

    #[test]
    fn test_routed_policy_assigns_sides() {
        let policy = InstancePolicy::Routed(vec![
            InstanceRoute::new("30").with_dag("fd00"),
            InstanceRoute::new("46").with_dag("fd02"),
        ]);
        let mut extractor = EventExtractor::new(policy);
        let events = run(
            &mut extractor,
            &[
                "00:00:01.000 Node:1 :Incoming DIO (id, ver, rank) = (46,1,10) from:fe80::8",
                "00:00:01.000 Node:1 :RPL: DAG: fd00 Parent: 07, Pref Y",
            ],
        );
        let sides: Vec<usize> = events.iter().map(|e| e.side).collect();
        assert_eq!(sides, vec![1, 0]);
    }

    #[test]
    fn test_announcement_and_table_of_one_route_share_a_key() {
        let policy = InstancePolicy::Single(InstanceRoute::new("30").with_dag("fd00"));
        let mut extractor = EventExtractor::new(policy);
        let events = run(
            &mut extractor,
            &[
                "00:00:01.000 Node:2 :RPL: DAG: fd00 rank 256 Parent: 07, etx 128, Pref Y",
                "00:00:02.000 Node:2 :--- RPL Neighbour Set for Instance ID: 30 ---",
                "00:00:02.000 Node:2 :Parent: 07 | Pref N",
                "00:00:02.000 Node:2 :--- End of Table ---",
            ],
        );
        let kinds: Vec<_> = events.into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ExtractedKind::ParentChange {
                    node: 2,
                    parent: Some(7),
                    dag: "30".to_string(),
                },
                lost(2, "30"),
            ]
        );
    }

    #[test]
    fn test_unrouted_table_is_consumed_silently() {
        let policy = InstancePolicy::Single(InstanceRoute::new("30"));
        let mut extractor = EventExtractor::new(policy);
        let events = run(
            &mut extractor,
            &[
                "00:00:01.000 Node:2 :--- RPL Neighbour Set for Instance ID: 46 ---",
                "00:00:01.000 Node:2 :Parent: 08 | Pref Y",
                "00:00:01.000 Node:2 :--- End of Table ---",
            ],
        );
        assert!(events.is_empty());
        assert_eq!(*extractor.table_state(2), TableState::Idle);
    }
}
