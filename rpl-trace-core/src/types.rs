//! Core types for the RPL trace library
//!
//! This module defines the records and events the parser emits when processing
//! simulation logs. Events are immutable once produced; everything downstream
//! (topology tracking, timeline merge, pagination) consumes them by reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Node identifier as printed by the simulator (`Node:<id>`)
pub type NodeId = u32;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors that can occur while reading a trace or laying it out
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Input log not found: {0:?}")]
    InputNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// The node-and-time prefix shared by every recognised log line
///
/// `absolute_time` is seconds since simulation start as printed on the line;
/// `timestamp_text` keeps the `HH:MM:SS.fff` text as logged, for labels.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseRecord {
    pub absolute_time: f64,
    pub timestamp_text: String,
    pub node_id: NodeId,
    pub message: String,
}

/// A DIO decoded at `receiver_node`, sent by `sender_node`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptionEvent {
    /// Seconds since the trace epoch (always >= 0)
    pub relative_time: f64,
    /// Timestamp text as it appeared in the log
    pub timestamp_text: String,
    pub receiver_node: NodeId,
    pub sender_node: NodeId,
    /// RPL instance the DIO belongs to
    pub instance_id: String,
}

/// A preferred-parent change for `node` in one DAG
///
/// `parent == None` means the node has no preferred parent any more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentChangeEvent {
    /// Seconds since the trace epoch (always >= 0)
    pub relative_time: f64,
    /// Timestamp text as it appeared in the log
    pub timestamp_text: String,
    pub node: NodeId,
    pub parent: Option<NodeId>,
    /// Topology key: the route's instance id when the event was routed, otherwise
    /// the raw DAG id (announcements) or instance id (neighbour tables)
    pub dag_id: String,
}

impl ParentChangeEvent {
    /// True if this event records a loss of upward connectivity
    pub fn is_lost(&self) -> bool {
        self.parent.is_none()
    }
}

/// Any event produced by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Reception(ReceptionEvent),
    ParentChange(ParentChangeEvent),
}

impl TraceEvent {
    /// Seconds since the trace epoch
    pub fn relative_time(&self) -> f64 {
        match self {
            TraceEvent::Reception(e) => e.relative_time,
            TraceEvent::ParentChange(e) => e.relative_time,
        }
    }

    /// Original timestamp text of the line that produced this event
    pub fn timestamp_text(&self) -> &str {
        match self {
            TraceEvent::Reception(e) => &e.timestamp_text,
            TraceEvent::ParentChange(e) => &e.timestamp_text,
        }
    }

    /// The node whose log line produced this event
    pub fn node(&self) -> NodeId {
        match self {
            TraceEvent::Reception(e) => e.receiver_node,
            TraceEvent::ParentChange(e) => e.node,
        }
    }

    pub fn as_reception(&self) -> Option<&ReceptionEvent> {
        match self {
            TraceEvent::Reception(e) => Some(e),
            TraceEvent::ParentChange(_) => None,
        }
    }

    pub fn as_parent_change(&self) -> Option<&ParentChangeEvent> {
        match self {
            TraceEvent::ParentChange(e) => Some(e),
            TraceEvent::Reception(_) => None,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Reception(e) => write!(
                f,
                "[{}] DIO {} -> {} (instance {})",
                e.timestamp_text, e.sender_node, e.receiver_node, e.instance_id
            ),
            TraceEvent::ParentChange(e) => match e.parent {
                Some(parent) => write!(
                    f,
                    "[{}] node {} parent -> {} (dag {})",
                    e.timestamp_text, e.node, parent, e.dag_id
                ),
                None => write!(
                    f,
                    "[{}] node {} lost parent (dag {})",
                    e.timestamp_text, e.node, e.dag_id
                ),
            },
        }
    }
}
