//! Pagination and coordinate assignment
//!
//! Maps the resolved timeline onto pages of fixed height. Time runs downwards:
//! one page covers `T = page_height / y_scale` seconds, an event at time `t`
//! lands on page `floor(t / T)` at `y = (t - page * T) * y_scale`, and its x
//! coordinate is the node id plus the panel offset of its side.
//!
//! The output is a flat stream of [`LayoutItem`]s. A `PageOpened` item precedes
//! the first event of every page that has content; renderers close the previous
//! page when they see it.

use crate::config::{LayoutConfig, PanelConfig};
use crate::parser::ParsedTrace;
use crate::timeline::{BatchSlot, EventTimeline, ResolvedTimeline, SenderDedup};
use crate::topology::TopologyStateTracker;
use crate::types::{NodeId, Result, TraceEvent};
use serde::Serialize;

/// Horizontal placement of one or two panels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PanelGeometry {
    /// Width of one panel in node units (`max_node + 1`)
    pub unit_width: f64,
    /// Gap between panels in node units
    pub gap: f64,
    /// Drawing units per node unit
    pub x_scale: f64,
    pub panels: usize,
}

impl PanelGeometry {
    /// One panel, one drawing unit per node
    pub fn single(max_node: NodeId) -> Self {
        Self {
            unit_width: max_node as f64 + 1.0,
            gap: 0.0,
            x_scale: 1.0,
            panels: 1,
        }
    }

    /// Two panels side by side, scaled to fit the page width
    pub fn dual(max_node: NodeId, config: &PanelConfig) -> Self {
        let unit_width = max_node as f64 + 1.0;
        let span = 2.0 * unit_width + config.gap;
        let x_scale = (config.total_width / span).min(config.max_ratio);
        Self {
            unit_width,
            gap: config.gap,
            x_scale,
            panels: 2,
        }
    }

    /// Geometry matching a layout config and the nodes of a trace
    pub fn for_trace(trace: &ParsedTrace, config: &LayoutConfig) -> Self {
        let max_node = trace.max_node().unwrap_or(0);
        match &config.dual_panel {
            Some(panel) => Self::dual(max_node, panel),
            None => Self::single(max_node),
        }
    }

    /// x offset (node units) of a side; sides beyond the last panel share it
    pub fn offset(&self, side: usize) -> f64 {
        let panel = side.min(self.panels.saturating_sub(1));
        panel as f64 * (self.unit_width + self.gap)
    }

    /// Total width in node units
    pub fn total_units(&self) -> f64 {
        self.panels as f64 * self.unit_width + self.panels.saturating_sub(1) as f64 * self.gap
    }

    /// Build a timeline from a trace, one stream per side at its panel offset
    pub fn timeline(&self, trace: &ParsedTrace) -> EventTimeline {
        let mut timeline = EventTimeline::new();
        for side in trace.sides() {
            timeline.push_stream(trace.stream(side).cloned(), side, self.offset(side));
        }
        timeline
    }
}

/// Signals the start of a page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageHeader {
    pub page_index: usize,
    /// First second of trace time on this page
    pub start_time: f64,
    /// First second of trace time on the next page
    pub end_time: f64,
}

/// Style of a parent-change arrow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrowStyle {
    pub color: String,
    pub bend_deg: f64,
    pub batch_position: usize,
    pub batch_size: usize,
    /// The parent currently has this child as its own parent
    pub mutual_loop: bool,
}

impl ArrowStyle {
    fn from_slot(slot: Option<&BatchSlot>, mutual_loop: bool) -> Self {
        match slot {
            Some(slot) => Self {
                color: slot.color.clone(),
                bend_deg: slot.bend_deg,
                batch_position: slot.position,
                batch_size: slot.size,
                mutual_loop,
            },
            None => Self {
                color: "black".to_string(),
                bend_deg: 0.0,
                batch_position: 1,
                batch_size: 1,
                mutual_loop,
            },
        }
    }
}

/// What to draw at a layout position
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutKind {
    /// Time-axis label
    TimeLabel { text: String },
    /// Large hollow marker at the DIO sender (once per page, time and side)
    SenderMarker { node: NodeId },
    /// Small filled marker at the DIO receiver
    ReceiverMarker { node: NodeId, sender: NodeId },
    /// Arrow from `child` (at x) to `parent` (at `to_x`)
    ParentArrow {
        child: NodeId,
        parent: NodeId,
        to_x: f64,
        style: ArrowStyle,
    },
    /// Fixed marker for a node that lost its preferred parent
    ParentLost { node: NodeId },
}

/// A positioned drawing instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutEvent {
    pub page_index: usize,
    pub x: f64,
    pub y: f64,
    pub side: usize,
    #[serde(flatten)]
    pub kind: LayoutKind,
}

/// One element of the layout stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutItem {
    PageOpened(PageHeader),
    Event(LayoutEvent),
}

/// The full paginated layout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedLayout {
    /// Seconds per page
    pub page_duration: f64,
    pub page_count: usize,
    pub geometry: PanelGeometry,
    pub items: Vec<LayoutItem>,
}

impl PagedLayout {
    /// Layout events only, without page signals
    pub fn events(&self) -> impl Iterator<Item = &LayoutEvent> + '_ {
        self.items.iter().filter_map(|item| match item {
            LayoutItem::Event(event) => Some(event),
            LayoutItem::PageOpened(_) => None,
        })
    }

    /// Page headers in order
    pub fn pages(&self) -> impl Iterator<Item = &PageHeader> + '_ {
        self.items.iter().filter_map(|item| match item {
            LayoutItem::PageOpened(header) => Some(header),
            LayoutItem::Event(_) => None,
        })
    }
}

/// Assigns pages and coordinates to a resolved timeline
pub struct PaginationEngine {
    config: LayoutConfig,
    geometry: PanelGeometry,
}

impl PaginationEngine {
    /// Create an engine; fails if the page settings are not positive
    pub fn new(config: LayoutConfig, geometry: PanelGeometry) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, geometry })
    }

    pub fn geometry(&self) -> &PanelGeometry {
        &self.geometry
    }

    /// Seconds of trace time per page
    pub fn page_duration(&self) -> f64 {
        self.config.page_duration()
    }

    /// Page index and in-page y for a relative time
    pub fn locate(&self, time: f64) -> (usize, f64) {
        let duration = self.page_duration();
        let page_index = (time.max(0.0) / duration).floor() as usize;
        let y = (time - page_index as f64 * duration) * self.config.y_scale;
        (page_index, y)
    }

    /// Lay out every entry of the timeline
    pub fn paginate(&self, timeline: &ResolvedTimeline) -> PagedLayout {
        let duration = self.page_duration();
        let mut pager = PageCursor::new(self.config.min_label_distance);
        let mut topology = TopologyStateTracker::new();
        let mut items = Vec::with_capacity(timeline.len() * 2);

        for resolved in timeline.entries() {
            let entry = &resolved.entry;
            let time = entry.event.relative_time();
            let (page_index, y) = self.locate(time);

            if pager.crosses(page_index) {
                log::debug!("page {} opened at t={:.3}s", page_index, time);
                items.push(LayoutItem::PageOpened(PageHeader {
                    page_index,
                    start_time: page_index as f64 * duration,
                    end_time: (page_index + 1) as f64 * duration,
                }));
            }

            let mut place = |x: f64, kind: LayoutKind| {
                items.push(LayoutItem::Event(LayoutEvent {
                    page_index,
                    x,
                    y,
                    side: entry.side,
                    kind,
                }));
            };

            if pager.keep_label(y) {
                place(
                    0.0,
                    LayoutKind::TimeLabel {
                        text: entry.event.timestamp_text().to_string(),
                    },
                );
            }

            let at = |node: NodeId| node as f64 + entry.x_offset;

            match &entry.event {
                TraceEvent::Reception(dio) => {
                    if pager.senders.first_sighting(time, dio.sender_node, entry.side) {
                        place(
                            at(dio.sender_node),
                            LayoutKind::SenderMarker {
                                node: dio.sender_node,
                            },
                        );
                    }
                    place(
                        at(dio.receiver_node),
                        LayoutKind::ReceiverMarker {
                            node: dio.receiver_node,
                            sender: dio.sender_node,
                        },
                    );
                }
                TraceEvent::ParentChange(change) => {
                    topology.apply(change);
                    match change.parent {
                        None => place(at(change.node), LayoutKind::ParentLost { node: change.node }),
                        Some(parent) => {
                            let mutual_loop = topology.is_mutual_loop(&change.dag_id, change.node);
                            place(
                                at(change.node),
                                LayoutKind::ParentArrow {
                                    child: change.node,
                                    parent,
                                    to_x: at(parent),
                                    style: ArrowStyle::from_slot(resolved.batch.as_ref(), mutual_loop),
                                },
                            );
                        }
                    }
                }
            }
        }

        PagedLayout {
            page_duration: duration,
            page_count: pager.pages_opened,
            geometry: self.geometry,
            items,
        }
    }
}

/// Per-page state reset at every boundary
struct PageCursor {
    current: Option<usize>,
    last_label_y: Option<f64>,
    min_label_distance: f64,
    senders: SenderDedup,
    pages_opened: usize,
}

impl PageCursor {
    fn new(min_label_distance: f64) -> Self {
        Self {
            current: None,
            last_label_y: None,
            min_label_distance,
            senders: SenderDedup::new(),
            pages_opened: 0,
        }
    }

    /// Move to `page_index`; true if a new page was opened
    fn crosses(&mut self, page_index: usize) -> bool {
        if self.current.is_some_and(|current| page_index <= current) {
            return false;
        }
        self.current = Some(page_index);
        self.last_label_y = None;
        self.senders.clear();
        self.pages_opened += 1;
        true
    }

    /// True (and remembered) if a label at `y` is far enough from the last one
    fn keep_label(&mut self, y: f64) -> bool {
        let keep = self
            .last_label_y
            .map_or(true, |last| (y - last).abs() > self.min_label_distance);
        if keep {
            self.last_label_y = Some(y);
        }
        keep
    }
}
