//! Simulation driver.
//!
//! The [`Simulator`] owns a flattened network, the event queue, the stimulus
//! set and the seeded RNG. Each step pops one event, applies it, arbitrates
//! the node it touched and, if that node changed, re-evaluates the node's
//! dependents. All scheduling caused by an event completes before the next
//! event is popped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use crate::evaluate::{fire_drive, DriveOutcome, Scheduler, SimRng};
use crate::event::{Event, EventAction};
use crate::flatten::Flattened;
use crate::logic::{Signal, State, Strength};
use crate::network::Network;
use crate::queue::EventQueue;
use crate::resolve::resolve;
use crate::stats::RunStats;
use crate::types::{DriverId, NodeId, Priority, SimTime, DEFAULT_PRIORITY, DEFERRED_PRIORITY};

/// Errors that abort a simulation run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("operator '{0}' cannot be used in an input condition")]
    InvalidRelationalOperator(char),

    #[error("operator '{0}' cannot be used in an output assignment")]
    InvalidArithmeticOperator(char),

    #[error("division by zero in '{0}' output")]
    DivisionByZero(char),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("unknown driver record: {0}")]
    UnknownDriver(DriverId),

    #[error("unknown clock: {0}")]
    UnknownClock(usize),

    #[error("clock {0} repeats forever and no horizon is set")]
    UnboundedRun(usize),
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;

/// A value forced onto a node at a given time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    pub node: NodeId,
    pub state: State,
    pub strength: Strength,
    pub time: SimTime,
    pub priority: Priority,
}

impl Stimulus {
    /// Creates a stimulus with the deferred priority, so that it fires after
    /// primitive events scheduled for the same time.
    pub fn new(node: NodeId, state: State, strength: Strength, time: SimTime) -> Self {
        Self {
            node,
            state,
            strength,
            time,
            priority: DEFERRED_PRIORITY,
        }
    }

    /// Sets the firing priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    fn event(&self) -> Event {
        Event::force(self.time, self.priority, self.node, self.state, self.strength)
    }
}

/// A repeating vector of forced values.
///
/// Each cycle forces the phases in order, each held for its duration. The
/// next cycle starts `period + 2·u·linear` after the current one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClockStimulus {
    pub node: NodeId,
    pub strength: Strength,
    /// `(state, hold time)` phases of one cycle
    pub phases: Vec<(State, SimTime)>,
    pub period: SimTime,
    /// Half-width of the uniform jitter added to each period
    pub linear: SimTime,
    /// Number of cycles; zero repeats forever
    pub cycles: u32,
    pub start: SimTime,
    pub priority: Priority,
}

impl ClockStimulus {
    /// Creates a clock with no phases.
    pub fn new(node: NodeId, strength: Strength, period: SimTime) -> Self {
        Self {
            node,
            strength,
            phases: Vec::new(),
            period,
            linear: 0.0,
            cycles: 0,
            start: 0.0,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// A clock that is HIGH for the first half of each period and LOW for
    /// the second.
    pub fn square(node: NodeId, period: SimTime, strength: Strength) -> Self {
        Self::new(node, strength, period)
            .with_phase(State::HIGH, period / 2.0)
            .with_phase(State::LOW, period / 2.0)
    }

    /// Appends a phase.
    pub fn with_phase(mut self, state: State, hold: SimTime) -> Self {
        self.phases.push((state, hold));
        self
    }

    /// Sets the number of cycles.
    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    /// Sets the period jitter.
    pub fn with_linear(mut self, linear: SimTime) -> Self {
        self.linear = linear;
        self
    }

    /// Sets the time of the first cycle.
    pub fn starting_at(mut self, start: SimTime) -> Self {
        self.start = start;
        self
    }
}

/// One settled change of an observed node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub time: SimTime,
    pub value: Signal,
}

/// The event-driven logic simulator.
///
/// # Example
///
/// ```
/// use alsim::{flatten, Operator, Row, State, Strength, Template, TemplateRegistry, Timing, Simulator};
///
/// let inv = Template::gate("inv", &["a", "y"])
///     .with_row(Row::new().when("a", Operator::Eq, State::HIGH).set("y", State::LOW).with_timing(Timing::fixed(1.0)))
///     .with_row(Row::new().set("y", State::HIGH).with_timing(Timing::fixed(1.0)));
/// let top = Template::model("top", &["a", "y"]).with_instance("u", "inv", &["a", "y"]);
/// let registry = TemplateRegistry::new().with(inv).with(top);
///
/// let mut sim = Simulator::from_flattened(flatten(&registry, "top").unwrap());
/// let a = sim.find_node("top.a").unwrap();
/// let y = sim.find_node("top.y").unwrap();
/// sim.apply_stimulus(a, State::HIGH, Strength::VDD, 0.0).unwrap();
/// sim.initialize(10.0).unwrap();
/// assert_eq!(sim.settled(y).unwrap().state, State::LOW);
/// ```
pub struct Simulator {
    network: Network,
    queue: EventQueue,
    stimuli: Vec<Stimulus>,
    clocks: Vec<ClockStimulus>,
    current_time: SimTime,
    horizon: SimTime,
    seed: u64,
    rng: SimRng,
    stats: RunStats,
    traces: BTreeMap<NodeId, Vec<TracePoint>>,
}

impl Simulator {
    /// Creates a simulator over a flattened network with no stimuli.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            queue: EventQueue::new(),
            stimuli: Vec::new(),
            clocks: Vec::new(),
            current_time: 0.0,
            horizon: SimTime::INFINITY,
            seed: 0,
            rng: SimRng::seed_from_u64(0),
            stats: RunStats::default(),
            traces: BTreeMap::new(),
        }
    }

    /// Creates a simulator from a flattened design, keeping its `SET` stimuli.
    pub fn from_flattened(flattened: Flattened) -> Self {
        let mut sim = Self::new(flattened.network);
        sim.stimuli = flattened.stimuli;
        sim
    }

    /// Sets the RNG seed used by subsequent runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.set_seed(seed);
        self
    }

    /// Sets the RNG seed used by subsequent runs.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = SimRng::seed_from_u64(seed);
    }

    /// Returns the RNG seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the network.
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Looks up a node by hierarchical name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.network.find_node(name)
    }

    fn check_node(&self, node: NodeId) -> SimResult<()> {
        match self.network.node(node) {
            Some(_) => Ok(()),
            None => Err(SimError::UnknownNode(node.to_string())),
        }
    }

    fn lookup(&self, name: &str) -> SimResult<NodeId> {
        self.find_node(name)
            .ok_or_else(|| SimError::UnknownNode(name.to_string()))
    }

    /// Adds a stimulus forcing `node` to `(state, strength)` at `time`.
    pub fn apply_stimulus(&mut self, node: NodeId, state: State, strength: Strength, time: SimTime) -> SimResult<()> {
        self.add_stimulus(Stimulus::new(node, state, strength, time))
    }

    /// Adds a stimulus on a node given by name.
    pub fn apply_stimulus_by_name(
        &mut self,
        name: &str,
        state: State,
        strength: Strength,
        time: SimTime,
    ) -> SimResult<NodeId> {
        let node = self.lookup(name)?;
        self.apply_stimulus(node, state, strength, time)?;
        Ok(node)
    }

    /// Adds a prepared stimulus.
    pub fn add_stimulus(&mut self, stimulus: Stimulus) -> SimResult<()> {
        self.check_node(stimulus.node)?;
        self.stimuli.push(stimulus);
        Ok(())
    }

    /// Returns the stimulus set.
    pub fn stimuli(&self) -> &[Stimulus] {
        &self.stimuli
    }

    /// Removes all stimuli and clocks.
    pub fn clear_stimuli(&mut self) {
        self.stimuli.clear();
        self.clocks.clear();
    }

    /// Adds a clock stimulus, returning its index.
    pub fn add_clock(&mut self, clock: ClockStimulus) -> SimResult<usize> {
        self.check_node(clock.node)?;
        self.clocks.push(clock);
        Ok(self.clocks.len() - 1)
    }

    /// Records every settled change of `node` from now on.
    pub fn observe(&mut self, node: NodeId) -> SimResult<()> {
        self.check_node(node)?;
        self.network.nodes[node].observed = true;
        self.traces.entry(node).or_default();
        Ok(())
    }

    /// Observes a node given by name.
    pub fn observe_by_name(&mut self, name: &str) -> SimResult<NodeId> {
        let node = self.lookup(name)?;
        self.observe(node)?;
        Ok(node)
    }

    /// Enables or disables diagnostic logging of firing and arbitration on a node.
    pub fn set_traced(&mut self, node: NodeId, traced: bool) -> SimResult<()> {
        self.check_node(node)?;
        self.network.nodes[node].traced = traced;
        Ok(())
    }

    /// Sets the time after which `run` stops.
    pub fn set_horizon(&mut self, horizon: SimTime) {
        self.horizon = horizon;
    }

    /// Returns the run horizon.
    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    /// Clears all run-time state, re-seeds the RNG and loads the stimuli and
    /// clocks into the queue.
    pub fn reset(&mut self) {
        self.network.reset();
        self.queue.clear();
        self.rng = SimRng::seed_from_u64(self.seed);
        self.current_time = 0.0;
        self.stats = RunStats::default();
        for trace in self.traces.values_mut() {
            trace.clear();
        }

        for stimulus in &self.stimuli {
            self.queue.push(stimulus.event());
        }
        for (index, clock) in self.clocks.iter().enumerate() {
            self.queue.push(Event::clock(clock.start, clock.priority, index, clock.cycles));
        }
        self.stats.events_scheduled = self.queue.len() as u64;
        self.stats.peak_queue_size = self.queue.len();
        debug!(events = self.queue.len(), seed = self.seed, "simulator reset");
    }

    /// Resets the simulator and runs until `horizon`, returning the time of
    /// the last fired event.
    pub fn initialize(&mut self, horizon: SimTime) -> SimResult<SimTime> {
        self.horizon = horizon;
        self.reset();
        self.run()
    }

    /// Runs from the current state until the queue is empty or the next
    /// event lies beyond the horizon.
    ///
    /// Fails with [`SimError::UnboundedRun`] if a clock repeats forever and
    /// the horizon is infinite. Use [`step`](Self::step) or
    /// [`run_steps`](Self::run_steps) to drive such a design.
    pub fn run(&mut self) -> SimResult<SimTime> {
        if self.horizon.is_infinite() {
            if let Some(index) = self.clocks.iter().position(|c| c.cycles == 0) {
                return Err(SimError::UnboundedRun(index));
            }
        }
        while self.step()? {}
        info!(
            time = self.current_time,
            events = self.stats.events_fired,
            changes = self.stats.node_changes,
            pending = self.queue.len(),
            "simulation finished"
        );
        Ok(self.current_time)
    }

    /// Runs at most `steps` events, returning how many fired.
    pub fn run_steps(&mut self, steps: usize) -> SimResult<usize> {
        for done in 0..steps {
            if !self.step()? {
                return Ok(done);
            }
        }
        Ok(steps)
    }

    /// Fires the next event. Returns `false` if nothing is left to fire
    /// before the horizon.
    pub fn step(&mut self) -> SimResult<bool> {
        match self.queue.peek_time() {
            Some(time) if time <= self.horizon => {}
            _ => return Ok(false),
        }
        let Some(event) = self.queue.pop() else {
            return Ok(false);
        };

        let now = event.time;
        self.current_time = now;
        self.stats.events_fired += 1;
        self.stats.final_time = now;
        debug!(time = now, priority = event.priority, kind = event.action.kind(), "event fired");

        let changed = match event.action {
            EventAction::Force {
                node,
                state,
                strength,
            } => {
                let target = self
                    .network
                    .node_mut(node)
                    .ok_or_else(|| SimError::UnknownNode(node.to_string()))?;
                target.forced = Signal::new(state, strength);
                if target.traced {
                    info!(node = %target.name, time = now, value = %target.forced, "stimulus applied");
                }
                resolve(&mut self.network, node, now)
            }
            EventAction::Drive {
                driver,
                op,
                operand,
                strength,
            } => match fire_drive(&mut self.network, driver, op, operand, strength, now)? {
                DriveOutcome::Stale => {
                    self.stats.stale_events += 1;
                    None
                }
                DriveOutcome::Unchanged => None,
                DriveOutcome::Applied(changed) => changed,
            },
            EventAction::Clock { clock, remaining } => {
                self.expand_clock(clock, remaining, now)?;
                None
            }
        };

        if let Some(node) = changed {
            self.stats.node_changes += 1;
            let target = &self.network.nodes[node];
            if target.observed {
                self.traces.entry(node).or_default().push(TracePoint {
                    time: now,
                    value: target.settled,
                });
            }
            let mut scheduler = Scheduler {
                queue: &mut self.queue,
                rng: &mut self.rng,
                stats: &mut self.stats,
                now,
            };
            scheduler.evaluate_dependents(&mut self.network, node)?;
        }
        Ok(true)
    }

    fn expand_clock(&mut self, index: usize, remaining: u32, now: SimTime) -> SimResult<()> {
        let clock = self.clocks.get(index).ok_or(SimError::UnknownClock(index))?;
        let mut events = Vec::with_capacity(clock.phases.len() + 1);
        let mut time = now;
        for &(state, hold) in &clock.phases {
            events.push(Event::force(time, clock.priority, clock.node, state, clock.strength));
            time += hold;
        }

        let next = match remaining {
            0 => Some(0),
            1 => None,
            n => Some(n - 1),
        };
        if let Some(next) = next {
            let jitter = if clock.linear > 0.0 {
                2.0 * self.rng.gen::<f64>() * clock.linear
            } else {
                0.0
            };
            events.push(Event::clock(now + clock.period + jitter, clock.priority, index, next));
        }

        let mut scheduler = Scheduler {
            queue: &mut self.queue,
            rng: &mut self.rng,
            stats: &mut self.stats,
            now,
        };
        for event in events {
            scheduler.push(event);
        }
        Ok(())
    }

    /// Returns the settled value of a node.
    pub fn settled(&self, node: NodeId) -> Option<Signal> {
        self.network.node(node).map(|n| n.settled)
    }

    /// Returns the settled value of a node given by name.
    pub fn settled_by_name(&self, name: &str) -> Option<Signal> {
        self.find_node(name).and_then(|n| self.settled(n))
    }

    /// Returns `(name, settled value)` for every observed node, in id order.
    pub fn observed_states(&self) -> Vec<(String, Signal)> {
        self.traces
            .keys()
            .filter_map(|&id| self.network.node(id))
            .map(|n| (n.name.clone(), n.settled))
            .collect()
    }

    /// Returns the recorded changes of an observed node.
    pub fn trace(&self, node: NodeId) -> Option<&[TracePoint]> {
        self.traces.get(&node).map(Vec::as_slice)
    }

    /// Returns the time of the last fired event.
    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    /// Returns the number of queued events.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Returns the run counters.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Exports run statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "simulator": {
                "current_time": self.current_time,
                "seed": self.seed,
                "events_fired": self.stats.events_fired,
                "stale_events": self.stats.stale_events,
                "node_changes": self.stats.node_changes,
                "primitive_evaluations": self.stats.primitive_evaluations,
                "events_scheduled": self.stats.events_scheduled,
                "duplicates_suppressed": self.stats.duplicates_suppressed,
                "peak_queue_size": self.stats.peak_queue_size,
                "pending_events": self.queue.len(),
            },
            "network": {
                "nodes": self.network.node_count(),
                "primitives": self.network.primitive_count(),
                "drivers": self.network.driver_count(),
                "stimuli": self.stimuli.len(),
                "clocks": self.clocks.len(),
                "observed": self.traces.len(),
            },
        })
    }
}
