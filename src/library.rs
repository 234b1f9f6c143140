//! Built-in procedures invoked by function primitives.
//!
//! Function templates name a procedure; the flattener binds each function
//! instance to a [`Builtin`] value that carries any per-instance state (the
//! flip-flops remember the last clock level they saw).
//!
//! Available procedures (names are case-insensitive):
//!
//! | Name | Ports | Behavior |
//! |---|---|---|
//! | `PMOSTRAN`, `PMOSTRANWEAK` | ctl, a, b | bidirectional switch, on when ctl is not HIGH |
//! | `NMOSTRAN`, `NMOSTRANWEAK` | ctl, a, b | bidirectional switch, on when ctl is not LOW |
//! | `JKFFLOP` | ck, j, k, q, qbar | JK flip-flop |
//! | `DFFLOP` | d, ck, q | D flip-flop |
//! | `BUS_TO_STATE` | b7..b0, out | packs eight bits into an integer state |
//! | `STATE_TO_BUS` | in, b7..b0 | unpacks an integer state into eight bits |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::logic::{Signal, State, Strength};
use crate::network::{Driver, FunctionPort, Node};
use crate::resolve::arbitrate;
use crate::types::{NodeId, PrimitiveId, SimTime};

/// Read-only view of the network handed to a built-in.
pub struct EvalContext<'a> {
    pub nodes: &'a [Node],
    pub drivers: &'a [Driver],
    /// The function's ports, in template order
    pub ports: &'a [FunctionPort],
    pub primitive: PrimitiveId,
    /// The node whose change triggered this evaluation
    pub changed: NodeId,
    pub now: SimTime,
    /// The function's fixed delay
    pub delay: SimTime,
}

impl<'a> EvalContext<'a> {
    /// Node bound to a port.
    pub fn port_node(&self, port: usize) -> NodeId {
        self.ports[port].node
    }

    /// Settled state of the node bound to a port.
    pub fn state(&self, port: usize) -> State {
        self.nodes[self.port_node(port)].settled.state
    }

    /// Load of the node bound to a port.
    pub fn load(&self, port: usize) -> f64 {
        self.nodes[self.port_node(port)].load
    }

    /// Arbitrates the node bound to a port, ignoring this primitive's own
    /// drivers.
    pub fn value_excluding_self(&self, port: usize) -> Signal {
        let node = &self.nodes[self.port_node(port)];
        let others = node
            .drivers
            .iter()
            .map(|&d| &self.drivers[d])
            .filter(|d| d.primitive != self.primitive)
            .map(|d| d.pending);
        arbitrate(node.forced, others)
    }
}

/// A value a built-in wants driven on one of its ports.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriveRequest {
    pub port: usize,
    pub state: State,
    pub strength: Strength,
    pub time: SimTime,
}

impl DriveRequest {
    fn new(port: usize, state: State, strength: Strength, time: SimTime) -> Self {
        Self {
            port,
            state,
            strength,
            time,
        }
    }
}

/// Clock history kept by a flip-flop instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockEdge {
    last: Option<State>,
}

impl ClockEdge {
    /// Records the current clock level and reports a transition into LOW.
    /// The first LOW ever observed counts as a transition.
    fn falls(&mut self, clock: State) -> bool {
        let previous = self.last.replace(clock);
        clock == State::LOW && previous != Some(State::LOW)
    }
}

/// Pass-transistor channel type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    /// Conducts unless the control is HIGH
    P,
    /// Conducts unless the control is LOW
    N,
}

/// The closed set of built-in procedures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    Transistor { channel: Channel, clamp: Strength },
    JkFlipFlop(ClockEdge),
    DFlipFlop(ClockEdge),
    BusToState,
    StateToBus,
}

impl Builtin {
    /// Number of ports the procedure expects.
    pub fn arity(&self) -> usize {
        match self {
            Builtin::Transistor { .. } => 3,
            Builtin::JkFlipFlop(_) => 5,
            Builtin::DFlipFlop(_) => 3,
            Builtin::BusToState | Builtin::StateToBus => 9,
        }
    }

    /// Ports the procedure drives.
    pub fn output_ports(&self) -> Vec<usize> {
        match self {
            Builtin::Transistor { .. } => vec![1, 2],
            Builtin::JkFlipFlop(_) => vec![3, 4],
            Builtin::DFlipFlop(_) => vec![2],
            Builtin::BusToState => vec![8],
            Builtin::StateToBus => (1..=8).collect(),
        }
    }

    /// Forgets per-instance history.
    pub fn reset(&mut self) {
        match self {
            Builtin::JkFlipFlop(edge) | Builtin::DFlipFlop(edge) => *edge = ClockEdge::default(),
            _ => {}
        }
    }

    /// Runs the procedure and returns the values it wants driven.
    pub fn evaluate(&mut self, ctx: &EvalContext<'_>) -> Vec<DriveRequest> {
        match self {
            Builtin::Transistor { channel, clamp } => transistor(*channel, *clamp, ctx),
            Builtin::JkFlipFlop(edge) => {
                if edge.falls(ctx.state(0)) {
                    jk_flip_flop(ctx)
                } else {
                    Vec::new()
                }
            }
            Builtin::DFlipFlop(edge) => {
                if edge.falls(ctx.state(1)) {
                    vec![DriveRequest::new(2, ctx.state(0), Strength::GATE, ctx.now + ctx.delay)]
                } else {
                    Vec::new()
                }
            }
            Builtin::BusToState => {
                let value = (0..8)
                    .filter(|&bit| ctx.state(7 - bit) == State::HIGH)
                    .fold(0i32, |acc, bit| acc | (1 << bit));
                vec![DriveRequest::new(8, State(value), Strength::VDD, ctx.now + ctx.delay)]
            }
            Builtin::StateToBus => {
                let value = ctx.state(0).value();
                (0..8)
                    .map(|bit| {
                        let state = if value & (1 << bit) != 0 { State::HIGH } else { State::LOW };
                        DriveRequest::new(8 - bit, state, Strength::VDD, ctx.now + ctx.delay)
                    })
                    .collect()
            }
        }
    }

    /// Canonical procedure name.
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Transistor { channel: Channel::P, clamp } if *clamp == Strength::GATE => "PMOSTRAN",
            Builtin::Transistor { channel: Channel::P, .. } => "PMOSTRANWEAK",
            Builtin::Transistor { channel: Channel::N, clamp } if *clamp == Strength::GATE => "NMOSTRAN",
            Builtin::Transistor { channel: Channel::N, .. } => "NMOSTRANWEAK",
            Builtin::JkFlipFlop(_) => "JKFFLOP",
            Builtin::DFlipFlop(_) => "DFFLOP",
            Builtin::BusToState => "BUS_TO_STATE",
            Builtin::StateToBus => "STATE_TO_BUS",
        }
    }

    /// Names of every available procedure.
    pub fn names() -> &'static [&'static str] {
        &[
            "PMOSTRAN",
            "PMOSTRANWEAK",
            "NMOSTRAN",
            "NMOSTRANWEAK",
            "JKFFLOP",
            "DFFLOP",
            "BUS_TO_STATE",
            "STATE_TO_BUS",
        ]
    }
}

impl FromStr for Builtin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let transistor = |channel, clamp| Builtin::Transistor { channel, clamp };
        match s.to_ascii_uppercase().as_str() {
            "PMOSTRAN" => Ok(transistor(Channel::P, Strength::GATE)),
            "PMOSTRANWEAK" => Ok(transistor(Channel::P, Strength::NODE)),
            "NMOSTRAN" => Ok(transistor(Channel::N, Strength::GATE)),
            "NMOSTRANWEAK" => Ok(transistor(Channel::N, Strength::NODE)),
            "JKFFLOP" => Ok(Builtin::JkFlipFlop(ClockEdge::default())),
            "DFFLOP" => Ok(Builtin::DFlipFlop(ClockEdge::default())),
            "BUS_TO_STATE" => Ok(Builtin::BusToState),
            "STATE_TO_BUS" => Ok(Builtin::StateToBus),
            _ => Err(format!("unknown built-in procedure '{}'", s)),
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn transistor(channel: Channel, clamp: Strength, ctx: &EvalContext<'_>) -> Vec<DriveRequest> {
    let ctl = ctx.state(0);
    let off = match channel {
        Channel::P => ctl == State::HIGH,
        Channel::N => ctl == State::LOW,
    };
    if off {
        return vec![
            DriveRequest::new(1, State::UNKNOWN, Strength::OFF, ctx.now),
            DriveRequest::new(2, State::UNKNOWN, Strength::OFF, ctx.now),
        ];
    }

    [(1, 2), (2, 1)]
        .into_iter()
        .filter(|&(_, target)| ctx.port_node(target) != ctx.changed)
        .map(|(source, target)| {
            let value = ctx.value_excluding_self(source);
            let strength = value.strength.min(clamp);
            let time = ctx.now + ctx.delay * ctx.load(target);
            DriveRequest::new(target, value.state, strength, time)
        })
        .collect()
}

fn jk_flip_flop(ctx: &EvalContext<'_>) -> Vec<DriveRequest> {
    let (j, k) = (ctx.state(1), ctx.state(2));
    let q = match (j == State::LOW, k == State::LOW) {
        (true, true) => return Vec::new(),
        (true, false) => State::LOW,
        (false, true) => State::HIGH,
        (false, false) if ctx.state(3) == State::HIGH => State::LOW,
        (false, false) => State::HIGH,
    };
    let qbar = if q == State::HIGH { State::LOW } else { State::HIGH };
    let time = ctx.now + ctx.delay;
    vec![
        DriveRequest::new(3, q, Strength::GATE, time),
        DriveRequest::new(4, qbar, Strength::GATE, time),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Network, Primitive, PrimitiveKind};

    /// Builds a network with one node per port, each with the given settled
    /// state, and binds a function primitive to them.
    fn fixture(states: &[State]) -> (Network, Vec<FunctionPort>) {
        let mut net = Network::new();
        let prim = net.add_primitive(Primitive {
            id: 0,
            path: "top.f".to_string(),
            template: "f".to_string(),
            kind: PrimitiveKind::Gate { rows: Vec::new() },
            fanout: false,
            priority: 1,
        });
        let ports = states
            .iter()
            .enumerate()
            .map(|(i, &state)| {
                let node = net.add_node(format!("top.p{}", i));
                net.nodes[node].settled = Signal::new(state, Strength::GATE);
                net.nodes[node].load = 1.0;
                FunctionPort {
                    node,
                    driver: Some(net.add_driver(prim, node)),
                }
            })
            .collect();
        (net, ports)
    }

    fn run(builtin: &mut Builtin, net: &Network, ports: &[FunctionPort], changed: NodeId) -> Vec<DriveRequest> {
        let ctx = EvalContext {
            nodes: &net.nodes,
            drivers: &net.drivers,
            ports,
            primitive: 0,
            changed,
            now: 10.0,
            delay: 2.0,
        };
        builtin.evaluate(&ctx)
    }

    #[test]
    fn test_parse_names() {
        for name in Builtin::names() {
            let builtin: Builtin = name.parse().unwrap();
            assert_eq!(builtin.name(), *name);
        }
        assert_eq!("dfflop".parse::<Builtin>().unwrap().arity(), 3);
        assert!("FIFO".parse::<Builtin>().is_err());
    }

    #[test]
    fn test_output_ports_within_arity() {
        for name in Builtin::names() {
            let builtin: Builtin = name.parse().unwrap();
            assert!(builtin.output_ports().iter().all(|&p| p < builtin.arity()));
        }
    }

    #[test]
    fn test_nmos_off_floats_both_sides() {
        let (net, ports) = fixture(&[State::LOW, State::HIGH, State::LOW]);
        let mut nmos: Builtin = "NMOSTRAN".parse().unwrap();
        let requests = run(&mut nmos, &net, &ports, ports[0].node);

        assert_eq!(requests.len(), 2);
        assert!(requests
            .iter()
            .all(|r| r.state == State::UNKNOWN && r.strength == Strength::OFF && r.time == 10.0));
    }

    #[test]
    fn test_weak_pmos_clamps_and_skips_changed_side() {
        let (mut net, ports) = fixture(&[State::LOW, State::HIGH, State::LOW]);
        net.nodes[ports[1].node].forced = Signal::new(State::HIGH, Strength::VDD);
        let mut pmos: Builtin = "PMOSTRANWEAK".parse().unwrap();

        let requests = run(&mut pmos, &net, &ports, ports[2].node);

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].port, 1);

        let requests = run(&mut pmos, &net, &ports, ports[1].node);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].port, 2);
        assert_eq!(requests[0].state, State::HIGH);
        assert_eq!(requests[0].strength, Strength::NODE);
        assert_eq!(requests[0].time, 12.0);
    }

    #[test]
    fn test_d_flip_flop_edge() {
        let (mut net, ports) = fixture(&[State::HIGH, State::LOW, State::LOW]);
        let mut dff: Builtin = "DFFLOP".parse().unwrap();

        let requests = run(&mut dff, &net, &ports, ports[1].node);
        assert_eq!(requests, vec![DriveRequest::new(2, State::HIGH, Strength::GATE, 12.0)]);

        // clock still low: no new edge
        assert!(run(&mut dff, &net, &ports, ports[0].node).is_empty());

        net.nodes[ports[1].node].settled.state = State::HIGH;
        assert!(run(&mut dff, &net, &ports, ports[1].node).is_empty());

        net.nodes[ports[1].node].settled.state = State::LOW;
        assert_eq!(run(&mut dff, &net, &ports, ports[1].node).len(), 1);

        dff.reset();
        assert_eq!(dff, Builtin::DFlipFlop(ClockEdge::default()));
    }

    #[test]
    fn test_jk_flip_flop_modes() {
        let cases = [
            (State::LOW, State::LOW, State::LOW, None),
            (State::LOW, State::HIGH, State::HIGH, Some(State::LOW)),
            (State::HIGH, State::LOW, State::LOW, Some(State::HIGH)),
            (State::HIGH, State::HIGH, State::HIGH, Some(State::LOW)),
            (State::HIGH, State::HIGH, State::LOW, Some(State::HIGH)),
        ];
        for (j, k, q, expected) in cases {
            let (net, ports) = fixture(&[State::LOW, j, k, q, State::LOW]);
            let mut jk: Builtin = "JKFFLOP".parse().unwrap();
            let requests = run(&mut jk, &net, &ports, ports[0].node);
            match expected {
                None => assert!(requests.is_empty()),
                Some(next) => {
                    assert_eq!(requests[0].port, 3);
                    assert_eq!(requests[0].state, next);
                    assert_ne!(requests[1].state, next);
                }
            }
        }
    }

    #[test]
    fn test_bus_packing() {
        // b7..b0 = 0000_0101
        let mut states = vec![State::LOW; 9];
        states[7] = State::HIGH;
        states[5] = State::HIGH;
        let (net, ports) = fixture(&states);
        let requests = run(&mut Builtin::BusToState, &net, &ports, ports[0].node);
        assert_eq!(requests, vec![DriveRequest::new(8, State(5), Strength::VDD, 12.0)]);

        let mut states = vec![State::LOW; 9];
        states[0] = State(6);
        let (net, ports) = fixture(&states);
        let requests = run(&mut Builtin::StateToBus, &net, &ports, ports[0].node);
        let high: Vec<usize> = requests
            .iter()
            .filter(|r| r.state == State::HIGH)
            .map(|r| r.port)
            .collect();
        assert_eq!(requests.len(), 8);
        assert_eq!(high, vec![7, 6]);
    }
}
