//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use rpl_trace_core::{
    CollisionConfig, InstancePolicy, InstanceRoute, LayoutConfig, PanelConfig,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default = "default_instances")]
    pub instances: Vec<InstanceRoute>,
    #[serde(default)]
    pub collision: CollisionConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            instances: default_instances(),
            collision: CollisionConfig::default(),
            layout: LayoutConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// The two DODAGs of the reference simulation setup
fn default_instances() -> Vec<InstanceRoute> {
    vec![
        InstanceRoute::new("30")
            .with_dag("fd00")
            .with_name("DODAG 1 (fd00::)")
            .with_root(7),
        InstanceRoute::new("46")
            .with_dag("fd02")
            .with_name("DODAG 2 (fd02::)")
            .with_root(8),
    ]
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub mode: InstanceMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InstanceMode {
    /// Only the first configured instance
    #[default]
    Single,
    /// Every configured instance, one side each
    Routed,
    /// Every instance in the log, unfiltered
    Any,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: default_pretty(),
        }
    }
}

/// Command-line overrides applied on top of the file configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub instance: Option<String>,
    pub dag: Option<String>,
    pub mode: Option<InstanceMode>,
    pub dual: bool,
}

impl AppConfig {
    /// Apply command-line overrides
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(instance) = &overrides.instance {
            // Bring the chosen instance to the front so `single` mode picks it
            match self.instances.iter().position(|r| &r.instance == instance) {
                Some(idx) => {
                    let route = self.instances.remove(idx);
                    self.instances.insert(0, route);
                }
                None => self.instances.insert(0, InstanceRoute::new(instance.clone())),
            }
        }
        if let Some(dag) = &overrides.dag {
            if let Some(first) = self.instances.first_mut() {
                first.dag = Some(dag.clone());
            }
        }
        if let Some(mode) = overrides.mode {
            self.extraction.mode = mode;
        }
        if overrides.dual {
            self.extraction.mode = InstanceMode::Routed;
            if self.layout.dual_panel.is_none() {
                self.layout.dual_panel = Some(PanelConfig::default());
            }
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.extraction.mode != InstanceMode::Any && self.instances.is_empty() {
            bail!("At least one [[instances]] entry is required unless mode = \"any\"");
        }
        if self.layout.dual_panel.is_some() {
            if self.extraction.mode != InstanceMode::Routed {
                bail!("The dual-panel layout requires mode = \"routed\"");
            }
            if self.instances.len() < 2 {
                bail!("The dual-panel layout requires two [[instances]] entries");
            }
        }
        self.layout.validate()?;
        Ok(())
    }

    /// Instance policy for the extractor
    pub fn policy(&self) -> InstancePolicy {
        match self.extraction.mode {
            InstanceMode::Any => InstancePolicy::Any,
            InstanceMode::Single => match self.instances.first() {
                Some(route) => InstancePolicy::Single(route.clone()),
                None => InstancePolicy::Any,
            },
            InstanceMode::Routed => {
                let mut routes = self.instances.clone();
                if self.layout.dual_panel.is_some() {
                    routes.truncate(2);
                }
                InstancePolicy::Routed(routes)
            }
        }
    }

    /// Configured route describing a topology key (instance id or DAG id)
    pub fn route_for(&self, key: &str) -> Option<&InstanceRoute> {
        self.instances.iter().find(|r| {
            r.instance == key
                || r
                    .dag
                    .as_deref()
                    .is_some_and(|dag| dag.eq_ignore_ascii_case(key))
        })
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
