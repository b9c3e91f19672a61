//! Topology replay and frame deduplication
//!
//! Replays parent changes through the tracker and keeps one frame each time the
//! canonical topology differs from the last frame kept. Repeated announcements
//! of an unchanged parent produce no frame.

use rpl_trace_core::{NodeId, ParentChangeEvent, Snapshot, TopologyStateTracker};
use serde::Serialize;
use std::collections::BTreeMap;

/// A topology state worth rendering
#[derive(Debug, Clone, Serialize)]
pub struct TopologyFrame {
    pub index: usize,
    pub timestamp: String,
    pub relative_time: f64,
    /// The change that produced this frame
    pub node: NodeId,
    pub parent: Option<NodeId>,
    pub dag_id: String,
    pub snapshot: Snapshot,
    /// Two-node loops per instance, as `(child, parent)` edges
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub mutual_loops: BTreeMap<String, Vec<(NodeId, NodeId)>>,
}

/// Counters for one replay
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReplayStats {
    /// Parent changes processed
    pub processed: usize,
    /// Changes that altered the stored parent
    pub changed: usize,
    /// Frames kept after deduplication
    pub frames: usize,
}

/// Result of replaying a trace
#[derive(Debug)]
pub struct TopologyReplay {
    pub frames: Vec<TopologyFrame>,
    pub stats: ReplayStats,
    pub tracker: TopologyStateTracker,
}

/// Fold all parent changes into a tracker, keeping deduplicated frames
pub fn replay<'a, I>(changes: I) -> TopologyReplay
where
    I: IntoIterator<Item = &'a ParentChangeEvent>,
{
    let mut tracker = TopologyStateTracker::new();
    let mut frames = Vec::new();
    let mut stats = ReplayStats::default();

    for change in changes {
        stats.processed += 1;
        if !tracker.apply(change) {
            continue;
        }
        stats.changed += 1;

        let Some(snapshot) = tracker.commit_if_changed() else {
            log::trace!(
                "[{}] node {}: topology back to last frame, skipped",
                change.timestamp_text,
                change.node
            );
            continue;
        };

        let mutual_loops = loops_of(&tracker);
        if !mutual_loops.is_empty() {
            log::debug!("[{}] mutual parent loop(s): {:?}", change.timestamp_text, mutual_loops);
        }

        frames.push(TopologyFrame {
            index: frames.len(),
            timestamp: change.timestamp_text.clone(),
            relative_time: change.relative_time,
            node: change.node,
            parent: change.parent,
            dag_id: change.dag_id.clone(),
            snapshot,
            mutual_loops,
        });
    }

    stats.frames = frames.len();
    TopologyReplay {
        frames,
        stats,
        tracker,
    }
}

/// Mutual loops of every instance that has any
pub fn loops_of(tracker: &TopologyStateTracker) -> BTreeMap<String, Vec<(NodeId, NodeId)>> {
    tracker
        .instances()
        .map(|instance| (instance.to_string(), tracker.mutual_loops(instance)))
        .filter(|(_, loops)| !loops.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(time: f64, node: NodeId, parent: Option<NodeId>) -> ParentChangeEvent {
        ParentChangeEvent {
            relative_time: time,
            timestamp_text: format!("{:.3}", time),
            node,
            parent,
            dag_id: "30".to_string(),
        }
    }

    #[test]
    fn test_replay_deduplicates_frames() {
        let changes = vec![
            change(0.0, 2, Some(7)),
            change(1.0, 2, Some(7)), // repeat: no change
            change(2.0, 2, Some(5)),
            change(3.0, 2, Some(7)),
            change(4.0, 3, Some(2)),
        ];
        let replay = replay(&changes);

        assert_eq!(replay.stats.processed, 5);
        assert_eq!(replay.stats.changed, 4);
        assert_eq!(replay.stats.frames, 4);
        let times: Vec<f64> = replay.frames.iter().map(|f| f.relative_time).collect();
        assert_eq!(times, vec![0.0, 2.0, 3.0, 4.0]);
        assert_eq!(replay.tracker.parent_of("30", 3), Some(2));
    }

    #[test]
    fn test_frames_flag_mutual_loops() {
        let changes = vec![change(0.0, 2, Some(3)), change(1.0, 3, Some(2))];
        let replay = replay(&changes);
        assert!(replay.frames[0].mutual_loops.is_empty());
        assert_eq!(
            replay.frames[1].mutual_loops.get("30"),
            Some(&vec![(2, 3), (3, 2)])
        );
    }
}
