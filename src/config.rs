//! Configuration system for simulation runs.
//!
//! A run is described declaratively in YAML or JSON: the netlist (inline or
//! by path), the root model, the stimuli and clocks to apply and the nodes to
//! observe.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   horizon: 100
//!   seed: 7
//!   log_level: info
//!
//! netlist:
//!   text: |
//!     gate and2 (a, b, y)
//!       t delta=5
//!       i a=H b=H  o y=H
//!       i          o y=L
//!     model top (a, b, out)
//!       g1 and2 (a, b, out)
//! root: top
//!
//! stimuli:
//!   - node: top.a
//!     state: H
//!     time: 1
//!
//! clocks:
//!   - node: top.b
//!     period: 20
//!     cycles: 4
//!
//! observe: [top.out]
//! trace: [top.a]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::engine::{ClockStimulus, SimError, Simulator};
use crate::flatten::{flatten, FlattenError};
use crate::logic::{State, Strength};
use crate::netlist::{parse_netlist, NetlistError};
use crate::stats::{SimulationStats, StatsCollector};
use crate::template::TemplateRegistry;
use crate::types::SimTime;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Netlist error: {0}")]
    Netlist(#[from] NetlistError),

    #[error("Flatten error: {0}")]
    Flatten(#[from] FlattenError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Global simulation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Time after which the run stops
    #[serde(default = "default_horizon")]
    pub horizon: SimTime,

    /// Seed of the delay/dominance RNG
    #[serde(default)]
    pub seed: u64,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to collect detailed statistics
    #[serde(default)]
    pub collect_stats: bool,
}

fn default_horizon() -> SimTime {
    1000.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_strength() -> String {
    "vdd".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            seed: 0,
            log_level: default_log_level(),
            collect_stats: false,
        }
    }
}

/// Where the netlist comes from. Exactly one field must be set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetlistSource {
    /// Inline netlist text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Path of a netlist file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl NetlistSource {
    /// Reads and parses the netlist.
    pub fn load(&self) -> ConfigResult<TemplateRegistry> {
        let text = match (&self.text, &self.path) {
            (Some(text), None) => text.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            _ => {
                return Err(ConfigError::Validation(
                    "netlist needs exactly one of 'text' or 'path'".to_string(),
                ))
            }
        };
        Ok(parse_netlist(&text)?)
    }
}

/// A forced value applied by name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StimulusConfig {
    /// Hierarchical node name
    pub node: String,

    /// `L`, `X`, `H` or an integer
    pub state: String,

    /// Strength name or index
    #[serde(default = "default_strength")]
    pub strength: String,

    #[serde(default)]
    pub time: SimTime,
}

/// One phase of a clock cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub state: String,
    pub hold: SimTime,
}

/// A repeating clock stimulus.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClockConfig {
    pub node: String,

    pub period: SimTime,

    /// Phases of one cycle; empty means a square wave
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,

    #[serde(default = "default_strength")]
    pub strength: String,

    /// Period jitter
    #[serde(default)]
    pub linear: SimTime,

    /// Number of cycles; zero repeats until the horizon
    #[serde(default)]
    pub cycles: u32,

    #[serde(default)]
    pub start: SimTime,
}

impl ClockConfig {
    /// A square wave: high for the first half of each period, then low.
    pub fn square(node: impl Into<String>, period: SimTime) -> Self {
        Self {
            node: node.into(),
            period,
            phases: Vec::new(),
            strength: default_strength(),
            linear: 0.0,
            cycles: 0,
            start: 0.0,
        }
    }

    /// Sets the number of cycles.
    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.period.is_nan() || self.period <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "Clock on {} needs a positive period",
                self.node
            )));
        }
        for phase in &self.phases {
            parse_state(&phase.state)?;
            if phase.hold < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Clock on {} has a negative phase hold time",
                    self.node
                )));
            }
        }
        parse_strength(&self.strength)?;
        Ok(())
    }
}

fn parse_state(s: &str) -> ConfigResult<State> {
    s.parse().map_err(ConfigError::Validation)
}

fn parse_strength(s: &str) -> ConfigResult<Strength> {
    s.parse().map_err(ConfigError::Validation)
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Netlist source
    #[serde(default)]
    pub netlist: NetlistSource,

    /// Name of the model to flatten
    #[serde(default)]
    pub root: String,

    #[serde(default)]
    pub stimuli: Vec<StimulusConfig>,

    #[serde(default)]
    pub clocks: Vec<ClockConfig>,

    /// Nodes whose changes are recorded
    #[serde(default)]
    pub observe: Vec<String>,

    /// Nodes with diagnostic logging enabled
    #[serde(default)]
    pub trace: Vec<String>,
}

impl SimConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    ///
    /// Node names are checked later, against the flattened network.
    pub fn validate(&self) -> ConfigResult<()> {
        let params = &self.simulation;
        if params.horizon.is_nan() || params.horizon < 0.0 {
            return Err(ConfigError::Validation(format!(
                "Horizon must be non-negative, got {}",
                params.horizon
            )));
        }
        if !LOG_LEVELS.contains(&params.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Unknown log level: {}",
                params.log_level
            )));
        }

        if self.netlist.text.is_some() == self.netlist.path.is_some() {
            return Err(ConfigError::Validation(
                "netlist needs exactly one of 'text' or 'path'".to_string(),
            ));
        }
        if self.root.is_empty() {
            return Err(ConfigError::Validation("No root model given".to_string()));
        }

        for stimulus in &self.stimuli {
            parse_state(&stimulus.state)?;
            parse_strength(&stimulus.strength)?;
            if stimulus.time < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Stimulus on {} has negative time {}",
                    stimulus.node, stimulus.time
                )));
            }
        }
        for clock in &self.clocks {
            clock.validate()?;
        }

        Ok(())
    }

    /// Parses the netlist, flattens the root model and applies stimuli,
    /// clocks and observation. The returned simulator has not run yet.
    pub fn build_simulator(&self) -> ConfigResult<Simulator> {
        let registry = self.netlist.load()?;
        let flattened = flatten(&registry, &self.root)?;
        let mut sim = Simulator::from_flattened(flattened).with_seed(self.simulation.seed);
        sim.set_horizon(self.simulation.horizon);

        for stimulus in &self.stimuli {
            sim.apply_stimulus_by_name(
                &stimulus.node,
                parse_state(&stimulus.state)?,
                parse_strength(&stimulus.strength)?,
                stimulus.time,
            )?;
        }

        for clock in &self.clocks {
            let node = sim
                .find_node(&clock.node)
                .ok_or_else(|| SimError::UnknownNode(clock.node.clone()))?;
            let strength = parse_strength(&clock.strength)?;
            let mut stimulus = if clock.phases.is_empty() {
                ClockStimulus::square(node, clock.period, strength)
            } else {
                let mut stimulus = ClockStimulus::new(node, strength, clock.period);
                for phase in &clock.phases {
                    stimulus = stimulus.with_phase(parse_state(&phase.state)?, phase.hold);
                }
                stimulus
            };
            stimulus = stimulus
                .with_cycles(clock.cycles)
                .with_linear(clock.linear)
                .starting_at(clock.start);
            sim.add_clock(stimulus)?;
        }

        for name in &self.observe {
            sim.observe_by_name(name)?;
        }
        for name in &self.trace {
            let node = sim
                .find_node(name)
                .ok_or_else(|| SimError::UnknownNode(name.clone()))?;
            sim.set_traced(node, true)?;
        }

        tracing::debug!(
            root = %self.root,
            nodes = sim.network().node_count(),
            primitives = sim.network().primitive_count(),
            "simulator built from config"
        );
        Ok(sim)
    }

    /// Installs a tracing subscriber at the configured log level. Returns
    /// false if a global subscriber was already installed.
    pub fn init_logging(&self) -> bool {
        crate::try_init_logging(&self.simulation.log_level)
    }

    /// Builds the simulator and runs it to the configured horizon.
    ///
    /// With `collect_stats` set the run is wall-clock timed and a
    /// [`SimulationStats`] report is returned alongside the simulator.
    pub fn run(&self) -> ConfigResult<(Simulator, Option<SimulationStats>)> {
        let mut sim = self.build_simulator()?;
        if !self.simulation.collect_stats {
            sim.initialize(self.simulation.horizon)?;
            return Ok((sim, None));
        }

        let mut collector = StatsCollector::new();
        collector.set_name(self.root.clone());
        collector.start();
        sim.initialize(self.simulation.horizon)?;
        collector.stop();
        collector.update_from_json(&sim.export_stats());
        Ok((sim, Some(collector.into_stats())))
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Clone, Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run horizon.
    pub fn horizon(mut self, horizon: SimTime) -> Self {
        self.config.simulation.horizon = horizon;
        self
    }

    /// Sets the RNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.simulation.seed = seed;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Enables statistics collection.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.simulation.collect_stats = enable;
        self
    }

    /// Uses inline netlist text.
    pub fn netlist_text(mut self, text: impl Into<String>) -> Self {
        self.config.netlist = NetlistSource {
            text: Some(text.into()),
            path: None,
        };
        self
    }

    /// Reads the netlist from a file.
    pub fn netlist_path(mut self, path: impl Into<String>) -> Self {
        self.config.netlist = NetlistSource {
            text: None,
            path: Some(path.into()),
        };
        self
    }

    /// Sets the root model.
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.config.root = root.into();
        self
    }

    /// Adds a stimulus.
    pub fn stimulus(
        mut self,
        node: impl Into<String>,
        state: impl Into<String>,
        strength: impl Into<String>,
        time: SimTime,
    ) -> Self {
        self.config.stimuli.push(StimulusConfig {
            node: node.into(),
            state: state.into(),
            strength: strength.into(),
            time,
        });
        self
    }

    /// Adds a clock.
    pub fn clock(mut self, clock: ClockConfig) -> Self {
        self.config.clocks.push(clock);
        self
    }

    /// Observes a node.
    pub fn observe(mut self, node: impl Into<String>) -> Self {
        self.config.observe.push(node.into());
        self
    }

    /// Enables diagnostic logging on a node.
    pub fn trace(mut self, node: impl Into<String>) -> Self {
        self.config.trace.push(node.into());
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
