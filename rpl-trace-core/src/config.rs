//! Library configuration types
//!
//! This module defines the knobs the parser, the collision resolver and the
//! pagination engine need. Every struct deserializes with sensible defaults so an
//! application config file only has to name what it changes.

use crate::types::{Result, TraceError};
use serde::{Deserialize, Serialize};

/// A named RPL instance the caller is interested in
///
/// Receptions and neighbour tables are matched on `instance`; DAG announcements
/// are matched on `dag` (when set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRoute {
    /// RPL instance id as printed in DIO and neighbour-table lines (e.g. "30")
    pub instance: String,
    /// DAG id prefix as printed in `RPL: DAG:` lines (e.g. "fd00")
    #[serde(default)]
    pub dag: Option<String>,
    /// Display name for reports
    #[serde(default)]
    pub name: Option<String>,
    /// Root node of this DODAG, if known
    #[serde(default)]
    pub root: Option<u32>,
}

impl InstanceRoute {
    /// Create a route matching only an instance id
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            dag: None,
            name: None,
            root: None,
        }
    }

    /// Builder method: also match DAG announcements for this prefix
    pub fn with_dag(mut self, dag: impl Into<String>) -> Self {
        self.dag = Some(dag.into());
        self
    }

    /// Builder method: set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder method: set the root node
    pub fn with_root(mut self, root: u32) -> Self {
        self.root = Some(root);
        self
    }

    /// Name for display, falling back to `Instance <id>`
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Instance {}", self.instance))
    }

    fn matches_instance(&self, instance: &str) -> bool {
        self.instance == instance
    }

    fn matches_dag(&self, dag: &str) -> bool {
        match &self.dag {
            Some(prefix) => prefix.eq_ignore_ascii_case(dag),
            None => true,
        }
    }
}

/// Which instances the extractor keeps, and which side each one lands on
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstancePolicy {
    /// Keep everything, all on side 0
    #[default]
    Any,
    /// Keep one instance only
    Single(InstanceRoute),
    /// Keep any of several instances; side = index of the first matching route
    Routed(Vec<InstanceRoute>),
}

impl InstancePolicy {
    /// Side for an event scoped by instance id, or `None` to drop it
    pub fn route_instance(&self, instance: &str) -> Option<usize> {
        match self {
            InstancePolicy::Any => Some(0),
            InstancePolicy::Single(route) => route.matches_instance(instance).then_some(0),
            InstancePolicy::Routed(routes) => {
                routes.iter().position(|r| r.matches_instance(instance))
            }
        }
    }

    /// Side for an event scoped by DAG id, or `None` to drop it
    pub fn route_dag(&self, dag: &str) -> Option<usize> {
        match self {
            InstancePolicy::Any => Some(0),
            InstancePolicy::Single(route) => route.matches_dag(dag).then_some(0),
            InstancePolicy::Routed(routes) => routes.iter().position(|r| r.matches_dag(dag)),
        }
    }

    /// The route that owns `side`, if the policy names one
    pub fn route(&self, side: usize) -> Option<&InstanceRoute> {
        match self {
            InstancePolicy::Any => None,
            InstancePolicy::Single(route) => (side == 0).then_some(route),
            InstancePolicy::Routed(routes) => routes.get(side),
        }
    }

    /// Topology key for a parent change routed to `side`
    ///
    /// A routed event is keyed by its route's instance id whichever grammar it
    /// came from, so one DODAG never splits across two keys. Without a route the
    /// raw DAG or instance id is kept.
    pub fn topology_key(&self, side: usize, raw: &str) -> String {
        match self.route(side) {
            Some(route) => route.instance.clone(),
            None => raw.to_string(),
        }
    }
}

/// Configuration for line extraction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default)]
    pub policy: InstancePolicy,
}

impl ExtractConfig {
    /// Create an extraction config that keeps every instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: keep a single instance
    pub fn with_single_instance(mut self, route: InstanceRoute) -> Self {
        self.policy = InstancePolicy::Single(route);
        self
    }

    /// Builder method: route several instances to sides in order
    pub fn with_routes(mut self, routes: Vec<InstanceRoute>) -> Self {
        self.policy = InstancePolicy::Routed(routes);
        self
    }
}

/// Cosmetic disambiguation of simultaneous parent changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionConfig {
    /// Two parent changes closer than this (seconds) share a batch
    #[serde(default = "default_epsilon")]
    pub epsilon_s: f64,

    /// Arrow colours, assigned by batch position
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,

    /// Bend of the first arrow in a batch (degrees)
    #[serde(default = "default_base_bend")]
    pub base_bend_deg: f64,

    /// Extra bend for every further arrow in a batch (degrees)
    #[serde(default = "default_bend_increment")]
    pub bend_increment_deg: f64,

    /// When false, simultaneous events on different sides share one batch
    #[serde(default = "default_true")]
    pub side_tagging: bool,
}

fn default_epsilon() -> f64 {
    0.001
}

fn default_palette() -> Vec<String> {
    ["red", "blue", "orange", "teal", "violet", "cyan!70!black", "magenta"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_base_bend() -> f64 {
    10.0
}

fn default_bend_increment() -> f64 {
    15.0
}

fn default_true() -> bool {
    true
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            epsilon_s: default_epsilon(),
            palette: default_palette(),
            base_bend_deg: default_base_bend(),
            bend_increment_deg: default_bend_increment(),
            side_tagging: true,
        }
    }
}

impl CollisionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the batching window
    pub fn with_epsilon(mut self, epsilon_s: f64) -> Self {
        self.epsilon_s = epsilon_s;
        self
    }

    /// Builder method: enable or disable per-side batching
    pub fn with_side_tagging(mut self, enabled: bool) -> Self {
        self.side_tagging = enabled;
        self
    }

    /// Colour for a 1-based batch position
    pub fn color_for(&self, position: usize) -> &str {
        if self.palette.is_empty() {
            return "black";
        }
        &self.palette[(position.saturating_sub(1)) % self.palette.len()]
    }

    /// Bend angle for a 1-based batch position
    pub fn bend_for(&self, position: usize) -> f64 {
        self.base_bend_deg + position.saturating_sub(1) as f64 * self.bend_increment_deg
    }
}

/// Side-by-side panel geometry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Gap between the two panels, in node units
    #[serde(default = "default_gap")]
    pub gap: f64,

    /// Total drawable page width, in drawing units
    #[serde(default = "default_total_width")]
    pub total_width: f64,

    /// Upper bound on drawing units per node unit
    #[serde(default = "default_max_ratio")]
    pub max_ratio: f64,
}

fn default_gap() -> f64 {
    2.0
}

fn default_total_width() -> f64 {
    26.0
}

fn default_max_ratio() -> f64 {
    1.2
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            gap: default_gap(),
            total_width: default_total_width(),
            max_ratio: default_max_ratio(),
        }
    }
}

/// Pagination settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Drawing units per second of trace time
    #[serde(default = "default_y_scale")]
    pub y_scale: f64,

    /// Drawable height of one page, in drawing units
    #[serde(default = "default_page_height")]
    pub page_height: f64,

    /// Minimum vertical distance between two time labels on a page
    #[serde(default = "default_min_label_distance")]
    pub min_label_distance: f64,

    /// Two panels side by side (one per routed instance)
    #[serde(default)]
    pub dual_panel: Option<PanelConfig>,
}

fn default_y_scale() -> f64 {
    0.6
}

fn default_page_height() -> f64 {
    22.0
}

fn default_min_label_distance() -> f64 {
    0.5
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            y_scale: default_y_scale(),
            page_height: default_page_height(),
            min_label_distance: default_min_label_distance(),
            dual_panel: None,
        }
    }
}

impl LayoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set vertical scale and page height
    pub fn with_page(mut self, y_scale: f64, page_height: f64) -> Self {
        self.y_scale = y_scale;
        self.page_height = page_height;
        self
    }

    /// Builder method: enable the side-by-side layout
    pub fn with_dual_panel(mut self, panel: PanelConfig) -> Self {
        self.dual_panel = Some(panel);
        self
    }

    /// Seconds of trace time covered by one page
    pub fn page_duration(&self) -> f64 {
        self.page_height / self.y_scale
    }

    /// Reject settings that would make pagination meaningless
    pub fn validate(&self) -> Result<()> {
        if !(self.y_scale.is_finite() && self.y_scale > 0.0) {
            return Err(TraceError::InvalidConfig(format!(
                "y_scale must be positive, got {}",
                self.y_scale
            )));
        }
        if !(self.page_height.is_finite() && self.page_height > 0.0) {
            return Err(TraceError::InvalidConfig(format!(
                "page_height must be positive, got {}",
                self.page_height
            )));
        }
        if let Some(panel) = &self.dual_panel {
            let positive = |v: f64| v.is_finite() && v > 0.0;
            if !positive(panel.total_width)
                || !positive(panel.max_ratio)
                || !(panel.gap.is_finite() && panel.gap >= 0.0)
            {
                return Err(TraceError::InvalidConfig(
                    "dual panel width, ratio and gap must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}
