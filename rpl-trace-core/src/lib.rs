//! RPL Trace Library
//!
//! A reusable library for reconstructing RPL DODAG topologies from network
//! simulation logs and laying out DIO receptions and parent changes as a
//! paginated space-time diagram.
//!
//! # Architecture
//!
//! The library is a batch pipeline:
//! - Classifies log lines and extracts reception and parent-change events
//! - Tracks per-instance topology with canonical snapshots for deduplication
//! - Merges event streams chronologically and disambiguates simultaneous events
//! - Assigns pages and drawing coordinates
//!
//! The library does NOT:
//! - Emit any document markup or images
//! - Decide when a topology frame is worth rendering (callers commit snapshots)
//!
//! Reading configuration files and writing reports is in the application layer
//! (rpl-trace-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use rpl_trace_core::{
//!     CollisionConfig, ExtractConfig, InstanceRoute, LayoutConfig, PaginationEngine,
//!     PanelGeometry, TraceParser,
//! };
//! use std::path::Path;
//!
//! let config = ExtractConfig::new()
//!     .with_single_instance(InstanceRoute::new("30").with_dag("fd00"));
//! let trace = TraceParser::new(config)
//!     .parse_file(Path::new("loglistener.txt"))
//!     .unwrap();
//!
//! let layout_config = LayoutConfig::new();
//! let geometry = PanelGeometry::for_trace(&trace, &layout_config);
//! let timeline = geometry.timeline(&trace).resolve(&CollisionConfig::new());
//! let layout = PaginationEngine::new(layout_config, geometry)
//!     .unwrap()
//!     .paginate(&timeline);
//!
//! println!("{} pages", layout.page_count);
//! ```

// Public modules
pub mod config;
pub mod layout;
pub mod parse;
pub mod parser;
pub mod timeline;
pub mod topology;
pub mod types;

// Re-export main types for convenience
pub use config::{
    CollisionConfig, ExtractConfig, InstancePolicy, InstanceRoute, LayoutConfig, PanelConfig,
};
pub use layout::{
    ArrowStyle, LayoutEvent, LayoutItem, LayoutKind, PageHeader, PagedLayout, PaginationEngine,
    PanelGeometry,
};
pub use parser::{ParseStats, ParsedTrace, RoutedEvent, TraceParser};
pub use timeline::{BatchSlot, EventTimeline, ResolvedEntry, ResolvedTimeline, TimelineEntry};
pub use topology::{InstanceEdges, Snapshot, TopologyStateTracker};
pub use types::{
    BaseRecord, NodeId, ParentChangeEvent, ReceptionEvent, Result, TraceError, TraceEvent,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
