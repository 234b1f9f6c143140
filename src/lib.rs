//! # alsim
//!
//! An event-driven logic simulator for hierarchical netlists.
//!
//! ## Design Principles
//!
//! - **Templates, then a flat network**: a design is a library of gate,
//!   function and model templates. The root model is flattened once into a
//!   global network of nodes, driver records and primitive instances.
//! - **Strength arbitration**: every node carries a `(state, strength)` value
//!   resolved from its forced value and the pending values of its drivers.
//!   The strongest value wins; equal-strength disagreement gives `X`.
//! - **One event at a time**: events fire in time order, higher priority
//!   first and FIFO within ties. Each event's consequences are scheduled
//!   before the next one is dequeued, so a run is reproducible for a given
//!   stimulus set and seed.
//!
//! ## Quick Start
//!
//! ```rust
//! use alsim::{flatten, parse_netlist, Simulator, State, Strength};
//!
//! let registry = parse_netlist(
//!     "gate and2 (a, b, y)
//!        t delta=5
//!        i a=H b=H  o y=H
//!        i          o y=L
//!      model top (a, b, out)
//!        g1 and2 (a, b, out)",
//! )
//! .unwrap();
//!
//! let mut sim = Simulator::from_flattened(flatten(&registry, "top").unwrap());
//! sim.apply_stimulus_by_name("top.a", State::HIGH, Strength::VDD, 1.0).unwrap();
//! sim.apply_stimulus_by_name("top.b", State::HIGH, Strength::VDD, 1.0).unwrap();
//! let out = sim.observe_by_name("top.out").unwrap();
//!
//! sim.initialize(100.0).unwrap();
//! assert_eq!(sim.settled(out).unwrap().state, State::HIGH);
//! assert_eq!(sim.trace(out).unwrap()[0].time, 6.0);
//!
//! let stats = sim.export_stats();
//! println!("Events fired: {}", stats["simulator"]["events_fired"]);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use alsim::config::SimConfig;
//!
//! let config = SimConfig::from_yaml_file("run.yaml")?;
//! let mut sim = config.build_simulator()?;
//! sim.initialize(config.simulation.horizon)?;
//! ```

pub mod types;
pub mod logic;
pub mod template;
pub mod netlist;
pub mod network;
pub mod flatten;
pub mod event;
pub mod queue;
pub mod resolve;
pub mod library;
pub mod evaluate;
pub mod engine;
pub mod config;
pub mod stats;

// Re-export commonly used types
pub use types::{DriverId, NodeId, PrimitiveId, Priority, SimTime};
pub use logic::{Operand, Operator, Signal, State, Strength};
pub use template::{Row, Template, TemplateKind, TemplateRegistry, Timing, Transition};
pub use netlist::{parse_netlist, NetlistError};
pub use network::{Network, Node, Primitive};
pub use flatten::{flatten, FlattenError, Flattened};
pub use event::{Event, EventAction};
pub use queue::EventQueue;
pub use library::Builtin;
pub use engine::{ClockStimulus, SimError, Simulator, Stimulus, TracePoint};
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use stats::{RunStats, SimulationStats, StatsCollector, Timer};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging.
///
/// # Example
///
/// ```rust,ignore
/// alsim::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    subscriber(level).init();
}

/// Like [`init_logging`], but returns false instead of panicking when a
/// global subscriber is already set.
pub fn try_init_logging(level: &str) -> bool {
    subscriber(level).try_init().is_ok()
}

fn subscriber(
    level: &str,
) -> tracing_subscriber::fmt::SubscriberBuilder<
    tracing_subscriber::fmt::format::DefaultFields,
    tracing_subscriber::fmt::format::Format,
    tracing_subscriber::EnvFilter,
> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}
