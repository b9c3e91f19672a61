//! Chronological event merge and collision resolution
//!
//! Several event streams (one per side of a dual-panel layout, for example) are
//! merged into a single sequence ordered by `(relative_time, input_order)`.
//! Input order is global across streams: it is the order in which events were
//! pushed, so ties never depend on event content.
//!
//! Simultaneous parent changes would draw on top of each other. They are
//! grouped into batches: maximal runs of parent changes on the same side whose
//! times lie within `epsilon` of the run's first event. Each member gets a
//! 1-based position that selects its colour and bend. Lost-parent events
//! occupy a position in their run but are drawn as a fixed marker, so they get
//! no slot.

use crate::config::CollisionConfig;
use crate::types::{NodeId, TraceEvent};
use std::collections::{HashMap, HashSet};

/// An event tagged for layout
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub event: TraceEvent,
    /// Logical sub-graph (panel) the event belongs to
    pub side: usize,
    /// Added to node ids to get x coordinates
    pub x_offset: f64,
    /// Position in the overall push order
    pub input_order: usize,
}

/// Position of a parent change within its simultaneity batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSlot {
    /// 1-based position within the batch
    pub position: usize,
    /// Number of events in the batch
    pub size: usize,
    pub color: String,
    pub bend_deg: f64,
}

/// A merged entry with its collision assignment
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    pub entry: TimelineEntry,
    /// Set for parent changes that have a parent; `None` otherwise
    pub batch: Option<BatchSlot>,
}

/// Merged, ordered and collision-resolved timeline
#[derive(Debug, Clone, Default)]
pub struct ResolvedTimeline {
    entries: Vec<ResolvedEntry>,
}

impl ResolvedTimeline {
    pub fn entries(&self) -> &[ResolvedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time of the last entry, or 0 when empty
    pub fn end_time(&self) -> f64 {
        self.entries
            .last()
            .map(|e| e.entry.event.relative_time())
            .unwrap_or(0.0)
    }
}

/// Collects tagged streams before merging
#[derive(Debug, Default)]
pub struct EventTimeline {
    entries: Vec<TimelineEntry>,
}

impl EventTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event
    pub fn push(&mut self, event: TraceEvent, side: usize, x_offset: f64) {
        let input_order = self.entries.len();
        self.entries.push(TimelineEntry {
            event,
            side,
            x_offset,
            input_order,
        });
    }

    /// Append a whole stream with a common side and offset
    pub fn push_stream<I>(&mut self, events: I, side: usize, x_offset: f64)
    where
        I: IntoIterator<Item = TraceEvent>,
    {
        for event in events {
            self.push(event, side, x_offset);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by `(relative_time, input_order)`
    pub fn merge(mut self) -> Vec<TimelineEntry> {
        self.entries.sort_by(|a, b| {
            a.event
                .relative_time()
                .total_cmp(&b.event.relative_time())
                .then(a.input_order.cmp(&b.input_order))
        });
        self.entries
    }

    /// Merge and assign batch positions
    pub fn resolve(self, config: &CollisionConfig) -> ResolvedTimeline {
        let entries = self.merge();
        let slots = assign_batches(&entries, config);
        ResolvedTimeline {
            entries: entries
                .into_iter()
                .zip(slots)
                .map(|(entry, batch)| ResolvedEntry { entry, batch })
                .collect(),
        }
    }
}

/// A batch under construction
struct Run {
    anchor: f64,
    /// Entry index and whether the change has a parent
    members: Vec<(usize, bool)>,
}

/// Partition sorted parent changes into batches and assign slots
fn assign_batches(entries: &[TimelineEntry], config: &CollisionConfig) -> Vec<Option<BatchSlot>> {
    let mut slots = vec![None; entries.len()];
    let mut open: HashMap<usize, Run> = HashMap::new();

    for (idx, entry) in entries.iter().enumerate() {
        let Some(change) = entry.event.as_parent_change() else {
            continue;
        };
        let member = (idx, !change.is_lost());
        let key = if config.side_tagging { entry.side } else { 0 };
        let time = change.relative_time;

        if let Some(run) = open
            .get_mut(&key)
            .filter(|run| (time - run.anchor).abs() < config.epsilon_s)
        {
            run.members.push(member);
            continue;
        }

        let fresh = Run {
            anchor: time,
            members: vec![member],
        };
        if let Some(done) = open.insert(key, fresh) {
            close_run(done, &mut slots, config);
        }
    }

    for run in open.into_values() {
        close_run(run, &mut slots, config);
    }
    slots
}

fn close_run(run: Run, slots: &mut [Option<BatchSlot>], config: &CollisionConfig) {
    let size = run.members.len();
    for (i, (idx, has_parent)) in run.members.into_iter().enumerate() {
        if !has_parent {
            continue;
        }
        let position = i + 1;
        slots[idx] = Some(BatchSlot {
            position,
            size,
            color: config.color_for(position).to_string(),
            bend_deg: config.bend_for(position),
        });
    }
}

/// Per-page record of senders already marked
///
/// A sender marker is drawn once per `(time, sender, side)` on a page, no
/// matter how many receivers heard the same DIO.
#[derive(Debug, Default)]
pub struct SenderDedup {
    seen: HashSet<(u64, NodeId, usize)>,
}

impl SenderDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time this key is seen since the last `clear`
    pub fn first_sighting(&mut self, time: f64, sender: NodeId, side: usize) -> bool {
        self.seen.insert((time.to_bits(), sender, side))
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParentChangeEvent, ReceptionEvent};

    fn change(time: f64, node: NodeId, parent: Option<NodeId>) -> TraceEvent {
        TraceEvent::ParentChange(ParentChangeEvent {
            relative_time: time,
            timestamp_text: format!("t={}", time),
            node,
            parent,
            dag_id: "fd00".to_string(),
        })
    }

    fn dio(time: f64, receiver: NodeId, sender: NodeId) -> TraceEvent {
        TraceEvent::Reception(ReceptionEvent {
            relative_time: time,
            timestamp_text: format!("t={}", time),
            receiver_node: receiver,
            sender_node: sender,
            instance_id: "30".to_string(),
        })
    }

    fn positions(timeline: &ResolvedTimeline) -> Vec<Option<usize>> {
        timeline
            .entries()
            .iter()
            .map(|e| e.batch.as_ref().map(|b| b.position))
            .collect()
    }

    #[test]
    fn test_merge_orders_by_time_then_input_order() {
        let mut timeline = EventTimeline::new();
        timeline.push_stream(vec![dio(2.0, 1, 7), dio(1.0, 2, 7)], 0, 0.0);
        timeline.push_stream(vec![dio(1.0, 3, 8), dio(0.5, 4, 8)], 1, 10.0);

        let merged = timeline.merge();
        let order: Vec<usize> = merged.iter().map(|e| e.input_order).collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
        assert_eq!(merged[0].side, 1);
        assert_eq!(merged[0].x_offset, 10.0);
    }

    #[test]
    fn test_simultaneous_changes_get_distinct_positions() {
        let mut timeline = EventTimeline::new();
        timeline.push_stream(vec![change(3.0, 2, Some(7)), change(3.0, 3, Some(7))], 0, 0.0);

        let resolved = timeline.resolve(&CollisionConfig::new());
        let slots: Vec<&BatchSlot> = resolved
            .entries()
            .iter()
            .filter_map(|e| e.batch.as_ref())
            .collect();
        assert_eq!(slots.len(), 2);
        assert_eq!((slots[0].position, slots[0].size), (1, 2));
        assert_eq!((slots[1].position, slots[1].size), (2, 2));
        assert_eq!(slots[0].color, "red");
        assert_eq!(slots[1].color, "blue");
        assert_eq!(slots[0].bend_deg, 10.0);
        assert_eq!(slots[1].bend_deg, 25.0);
    }

    #[test]
    fn test_single_change_gets_base_style() {
        let mut timeline = EventTimeline::new();
        timeline.push(change(1.0, 2, Some(7)), 0, 0.0);
        let resolved = timeline.resolve(&CollisionConfig::new());
        let slot = resolved.entries()[0].batch.as_ref().unwrap();
        assert_eq!((slot.position, slot.size), (1, 1));
        assert_eq!(slot.color, "red");
        assert_eq!(resolved.end_time(), 1.0);
        assert_eq!(ResolvedTimeline::default().end_time(), 0.0);
    }

    #[test]
    fn test_palette_wraps() {
        let mut timeline = EventTimeline::new();
        timeline.push_stream((1..=8).map(|n| change(0.0, n, Some(9))), 0, 0.0);
        let resolved = timeline.resolve(&CollisionConfig::new());
        let last = resolved.entries()[7].batch.as_ref().unwrap();
        assert_eq!(last.position, 8);
        assert_eq!(last.color, "red");
    }

    #[test]
    fn test_epsilon_window_is_anchored_at_first_event() {
        let mut timeline = EventTimeline::new();
        timeline.push_stream(
            vec![
                change(1.0, 2, Some(7)),
                change(1.0005, 3, Some(7)),
                change(1.0012, 4, Some(7)),
            ],
            0,
            0.0,
        );
        let resolved = timeline.resolve(&CollisionConfig::new());
        assert_eq!(positions(&resolved), vec![Some(1), Some(2), Some(1)]);
    }

    #[test]
    fn test_lost_parents_take_a_position_but_no_slot() {
        let mut timeline = EventTimeline::new();
        timeline.push_stream(
            vec![
                change(2.0, 2, Some(7)),
                dio(2.0, 5, 7),
                change(2.0, 3, None),
                change(2.0, 4, Some(7)),
            ],
            0,
            0.0,
        );
        let resolved = timeline.resolve(&CollisionConfig::new());
        assert_eq!(positions(&resolved), vec![Some(1), None, None, Some(3)]);

        let last = resolved.entries()[3].batch.as_ref().unwrap();
        assert_eq!(last.size, 3);
        assert_eq!(last.color, "orange");
        assert_eq!(last.bend_deg, 40.0);
    }

    #[test]
    fn test_sides_batch_independently() {
        let mut timeline = EventTimeline::new();
        timeline.push(change(1.0, 2, Some(7)), 0, 0.0);
        timeline.push(change(1.0, 2, Some(8)), 1, 12.0);
        timeline.push(change(1.0, 3, Some(7)), 0, 0.0);

        let tagged = EventTimeline {
            entries: timeline.entries.clone(),
        }
        .resolve(&CollisionConfig::new());
        assert_eq!(positions(&tagged), vec![Some(1), Some(1), Some(2)]);

        let untagged = timeline.resolve(&CollisionConfig::new().with_side_tagging(false));
        assert_eq!(positions(&untagged), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_sender_dedup() {
        let mut dedup = SenderDedup::new();
        assert!(dedup.first_sighting(1.0, 7, 0));
        assert!(!dedup.first_sighting(1.0, 7, 0));
        assert!(dedup.first_sighting(1.0, 7, 1));
        assert!(dedup.first_sighting(1.5, 7, 0));
        dedup.clear();
        assert!(dedup.is_empty());
        assert!(dedup.first_sighting(1.0, 7, 0));
    }
}
